//! Aggregate folder statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::record::FileRecord;

/// Snapshot of one folder's bookkeeping numbers, recalculated after every
/// merge and published through the statistics listener event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStats {
	/// Live (non-tombstone) records in the known-file set
	pub local_files: usize,

	/// Bytes across all live records
	pub local_bytes: u64,

	/// Tombstones still tracked
	pub tombstones: usize,

	/// Remote records newer than anything local, waiting to arrive
	pub incoming_files: usize,
}

impl FolderStats {
	/// Computes file/byte/tombstone counts from the known-file set; the
	/// incoming count comes from the caller's expected-files pass.
	pub fn calculate(known: &BTreeMap<String, FileRecord>, incoming_files: usize) -> FolderStats {
		let mut stats = FolderStats { incoming_files, ..FolderStats::default() };
		for record in known.values() {
			if record.deleted {
				stats.tombstones += 1;
			} else {
				stats.local_files += 1;
				stats.local_bytes += record.size;
			}
		}
		stats
	}
}

impl fmt::Display for FolderStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} files, {} bytes, {} tombstones, {} incoming",
			self.local_files, self.local_bytes, self.tombstones, self.incoming_files
		)
	}
}
