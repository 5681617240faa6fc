//! Scanner output types.

use std::collections::BTreeMap;

use crate::problems::FilenameProblem;
use crate::record::FileRecord;

/// Classification of one finished directory walk.
///
/// `deleted_files` holds the previously known records that were not found on
/// disk; the tombstone version bump happens when the engine merges the
/// result, so move detection still sees the original size and date.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
	/// Files on disk with no known record, as fresh version-0 records
	pub new_files: Vec<FileRecord>,

	/// Known files whose size or date changed, as bumped records
	pub changed_files: Vec<FileRecord>,

	/// Known records absent from disk (original records, not yet tombstoned)
	pub deleted_files: Vec<FileRecord>,

	/// Tombstoned records found back on disk, as bumped live records
	pub restored_files: Vec<FileRecord>,

	/// Move candidates: path of a deleted record to every new file with the
	/// same size and exact modification time. Many-to-many matches are all
	/// reported; choosing between them is the caller's business.
	pub moved_files: BTreeMap<String, Vec<String>>,

	/// Filename portability problems per relative path
	pub problems: BTreeMap<String, Vec<FilenameProblem>>,

	/// Relative paths that could not be examined this time
	pub unscannable: Vec<String>,

	/// Every file seen on disk during the walk
	pub total_files: usize,
}

impl ScanResult {
	/// True when the walk found anything that would alter the known-file set.
	pub fn has_changes(&self) -> bool {
		!self.new_files.is_empty()
			|| !self.changed_files.is_empty()
			|| !self.deleted_files.is_empty()
			|| !self.restored_files.is_empty()
	}
}

/// How a scan ended. Failures are ordinary values so callers can tell
/// "nothing changed" apart from "could not determine".
#[derive(Debug)]
pub enum ScanOutcome {
	/// Walk completed; the result may still be empty
	Scanned(ScanResult),

	/// The abort flag was raised mid-walk; partial findings were discarded
	Aborted,

	/// A directory listing failed outright (device gone, permissions lost);
	/// partial findings were discarded
	HardwareFailure,
}
