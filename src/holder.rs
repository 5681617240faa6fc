//! Per-path aggregation of every peer's knowledge about one file.

use std::collections::BTreeMap;

use crate::record::{FileRecord, MemberId};

/// All known versions of a single path, one record per peer.
///
/// Holders live inside `DirectoryTree` nodes; they are created when the
/// first record for a path arrives and dropped once no peer knows the path
/// any more.
#[derive(Debug, Clone)]
pub struct FileRecordHolder {
	records: BTreeMap<MemberId, FileRecord>,
	self_id: MemberId,
}

impl FileRecordHolder {
	pub fn new(self_id: MemberId) -> FileRecordHolder {
		FileRecordHolder { records: BTreeMap::new(), self_id }
	}

	/// Stores `record` as `peer`'s view of this path, replacing any earlier one.
	pub fn put(&mut self, peer: MemberId, record: FileRecord) {
		self.records.insert(peer, record);
	}

	/// Drops one peer's record. Returns true if the holder is now empty.
	pub fn remove_peer(&mut self, peer: MemberId) -> bool {
		self.records.remove(&peer);
		self.records.is_empty()
	}

	pub fn record_of(&self, peer: MemberId) -> Option<&FileRecord> {
		self.records.get(&peer)
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// The record this node treats as authoritative for display purposes:
	/// the local record when present, otherwise the newest remote one.
	pub fn best(&self) -> Option<&FileRecord> {
		if let Some(own) = self.records.get(&self.self_id) {
			return Some(own);
		}
		let mut best: Option<&FileRecord> = None;
		for record in self.records.values() {
			match best {
				Some(current) if !record.is_newer_than(current) => {}
				_ => best = Some(record),
			}
		}
		best
	}

	/// Number of peers holding the newest non-deleted version of this path.
	pub fn availability(&self) -> usize {
		let mut newest: Option<&FileRecord> = None;
		for record in self.records.values() {
			if record.deleted {
				continue;
			}
			match newest {
				Some(current) if !record.is_newer_than(current) => {}
				_ => newest = Some(record),
			}
		}
		match newest {
			Some(top) => self
				.records
				.values()
				.filter(|r| !r.deleted && r.version == top.version)
				.count(),
			None => 0,
		}
	}

	/// True if any peer still holds a non-deleted version.
	pub fn is_any_version_available(&self) -> bool {
		self.records.values().any(|r| !r.deleted)
	}

	/// True if the authoritative record is a tombstone.
	pub fn is_deleted(&self) -> bool {
		self.best().map(|r| r.deleted).unwrap_or(false)
	}
}
