//! Versioned file metadata.
//!
//! A `FileRecord` describes one version of one file path inside a shared
//! folder. Records carry a logical version counter that increases with every
//! local edit, deletion or restoration; conflict ordering between peers is
//! decided on that counter alone. Modification dates only break ties between
//! records of equal version, using the cross-platform margin from `util`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util;

/// Identity of a peer taking part in folder synchronization.
pub type MemberId = uuid::Uuid;

/// Versioned metadata for one file path within one folder.
///
/// A record with `deleted == true` is a tombstone: it still takes part in
/// version ordering so deletions propagate like any other change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
	/// Id of the folder this record belongs to
	pub folder_id: String,

	/// Folder-relative path, '/'-separated on every platform.
	/// Identity key together with `folder_id`; stable across versions.
	pub rel_path: String,

	/// Logical version counter, starts at 0 for a freshly scanned file
	pub version: u64,

	/// Size in bytes, 0 for tombstones
	pub size: u64,

	/// Peer that produced this version
	pub modified_by: MemberId,

	/// Modification time in unix milliseconds
	pub modified_ms: i64,

	/// Tombstone flag
	pub deleted: bool,
}

impl FileRecord {
	/// A fresh version-0 record for a file first seen on disk.
	pub fn new_scanned(
		folder_id: &str,
		rel_path: &str,
		size: u64,
		modified_ms: i64,
		scanner: MemberId,
	) -> FileRecord {
		FileRecord {
			folder_id: folder_id.to_string(),
			rel_path: rel_path.to_string(),
			version: 0,
			size,
			modified_by: scanner,
			modified_ms,
			deleted: false,
		}
	}

	/// The next version of this record after a local disk change. Also used
	/// for restorations, since those are disk changes of a tombstone.
	pub fn bumped_from_disk(&self, size: u64, modified_ms: i64, modifier: MemberId) -> FileRecord {
		FileRecord {
			folder_id: self.folder_id.clone(),
			rel_path: self.rel_path.clone(),
			version: self.version + 1,
			size,
			modified_by: modifier,
			modified_ms,
			deleted: false,
		}
	}

	/// The next version of this record as a locally produced tombstone.
	pub fn tombstone(&self, modifier: MemberId, now_ms: i64) -> FileRecord {
		FileRecord {
			folder_id: self.folder_id.clone(),
			rel_path: self.rel_path.clone(),
			version: self.version + 1,
			size: 0,
			modified_by: modifier,
			modified_ms: now_ms,
			deleted: true,
		}
	}

	/// A tombstone adopting a remote deletion: keeps this record's identity
	/// but takes version, modifier and date from the remote record.
	pub fn adopted_tombstone(&self, remote: &FileRecord) -> FileRecord {
		FileRecord {
			folder_id: self.folder_id.clone(),
			rel_path: self.rel_path.clone(),
			version: remote.version,
			size: 0,
			modified_by: remote.modified_by,
			modified_ms: remote.modified_ms,
			deleted: true,
		}
	}

	/// A live record adopting a remote record's metadata without any data
	/// transfer. Used when size and date already match and only the version
	/// counters drifted apart.
	pub fn adopted_metadata(&self, remote: &FileRecord) -> FileRecord {
		FileRecord {
			folder_id: self.folder_id.clone(),
			rel_path: self.rel_path.clone(),
			version: remote.version,
			size: remote.size,
			modified_by: remote.modified_by,
			modified_ms: remote.modified_ms,
			deleted: false,
		}
	}

	/// Version-first ordering between two records of the same path.
	/// Dates only decide when the version counters are equal.
	pub fn is_newer_than(&self, other: &FileRecord) -> bool {
		if self.version == other.version {
			return util::is_newer_file_date(self.modified_ms, other.modified_ms);
		}
		self.version > other.version
	}

	/// True when the on-disk size and mtime match this record within the
	/// cross-platform date margin.
	pub fn matches_disk(&self, size: u64, modified_ms: i64) -> bool {
		!self.deleted && self.size == size && util::equals_file_date(self.modified_ms, modified_ms)
	}

	/// True when both records describe the same bytes: equal size and equal
	/// date within the margin, regardless of version counters.
	pub fn same_size_and_date(&self, other: &FileRecord) -> bool {
		self.size == other.size && util::equals_file_date(self.modified_ms, other.modified_ms)
	}
}

impl fmt::Display for FileRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.deleted {
			write!(f, "{} (v{}, deleted)", self.rel_path, self.version)
		} else {
			write!(f, "{} (v{}, {} bytes)", self.rel_path, self.version, self.size)
		}
	}
}


// vim: ts=4
