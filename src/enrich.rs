//! Post-scan record enrichment.
//!
//! Freshly scanned records pass through an ordered chain of enrichers before
//! they are merged into the known-file set. An enricher may inspect the file
//! on disk and return a record with extra or corrected metadata, or hand the
//! record back untouched. The chain replaces per-file-type record subclasses
//! with a pluggable hook.

use std::path::Path;
use std::sync::Arc;

use crate::record::FileRecord;

/// One enrichment step. Implementations decide per record whether to act.
pub trait RecordEnricher: Send + Sync {
	/// Returns the (possibly) enriched record. `disk_path` is the absolute
	/// location of the scanned file; the record's identity fields
	/// (`folder_id`, `rel_path`, `version`) must come back unchanged.
	fn enrich(&self, record: FileRecord, disk_path: &Path) -> FileRecord;
}

/// Ordered enrichment pipeline. Empty by default, which leaves records as
/// the scanner produced them.
#[derive(Clone, Default)]
pub struct EnricherChain {
	enrichers: Vec<Arc<dyn RecordEnricher>>,
}

impl EnricherChain {
	pub fn new() -> EnricherChain {
		EnricherChain::default()
	}

	pub fn add(&mut self, enricher: Arc<dyn RecordEnricher>) {
		self.enrichers.push(enricher);
	}

	pub fn is_empty(&self) -> bool {
		self.enrichers.is_empty()
	}

	/// Runs the record through every enricher in registration order.
	pub fn apply(&self, record: FileRecord, disk_path: &Path) -> FileRecord {
		self.enrichers
			.iter()
			.fold(record, |record, enricher| enricher.enrich(record, disk_path))
	}
}
