//! Hierarchical projection of a folder's file records.
//!
//! The tree is a read-only view rebuilt on demand from the authoritative
//! known-file set and the per-peer remote views. It is never the store of
//! record; consumers rebuild it whenever they need fresh structure.

use std::collections::BTreeMap;

use crate::holder::FileRecordHolder;
use crate::record::{FileRecord, MemberId};

/// One directory level: files directly here plus named subdirectories.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
	self_id: MemberId,
	files: BTreeMap<String, FileRecordHolder>,
	subdirs: BTreeMap<String, DirectoryTree>,
}

impl DirectoryTree {
	pub fn new(self_id: MemberId) -> DirectoryTree {
		DirectoryTree { self_id, files: BTreeMap::new(), subdirs: BTreeMap::new() }
	}

	/// Inserts `record` as `peer`'s view, creating intermediate directories
	/// from the record's relative path.
	pub fn add(&mut self, peer: MemberId, record: FileRecord) {
		let parts: Vec<&str> = record.rel_path.split('/').collect();
		self.add_parts(peer, &parts, record.clone());
	}

	fn add_parts(&mut self, peer: MemberId, parts: &[&str], record: FileRecord) {
		if parts.len() == 1 {
			let self_id = self.self_id;
			self.files
				.entry(parts[0].to_string())
				.or_insert_with(|| FileRecordHolder::new(self_id))
				.put(peer, record);
			return;
		}
		let self_id = self.self_id;
		self.subdirs
			.entry(parts[0].to_string())
			.or_insert_with(|| DirectoryTree::new(self_id))
			.add_parts(peer, &parts[1..], record);
	}

	/// The holder for a relative path, if any peer knows it.
	pub fn lookup(&self, rel_path: &str) -> Option<&FileRecordHolder> {
		let parts: Vec<&str> = rel_path.split('/').collect();
		self.lookup_parts(&parts)
	}

	fn lookup_parts(&self, parts: &[&str]) -> Option<&FileRecordHolder> {
		if parts.len() == 1 {
			return self.files.get(parts[0]);
		}
		self.subdirs.get(parts[0])?.lookup_parts(&parts[1..])
	}

	/// The subdirectory node for a '/'-separated relative directory path.
	pub fn subdir(&self, rel_dir: &str) -> Option<&DirectoryTree> {
		let mut node = self;
		for part in rel_dir.split('/') {
			node = node.subdirs.get(part)?;
		}
		Some(node)
	}

	pub fn files(&self) -> &BTreeMap<String, FileRecordHolder> {
		&self.files
	}

	pub fn subdirs(&self) -> &BTreeMap<String, DirectoryTree> {
		&self.subdirs
	}

	/// A directory is deleted when it has at least one entry and every file
	/// and subdirectory below it is deleted. An empty directory is not.
	pub fn is_deleted(&self) -> bool {
		if self.files.is_empty() && self.subdirs.is_empty() {
			return false;
		}
		for holder in self.files.values() {
			if !holder.is_deleted() {
				return false;
			}
		}
		for dir in self.subdirs.values() {
			if !dir.is_deleted() {
				return false;
			}
		}
		true
	}

	/// True when some peer offers a live version of a path we do not hold
	/// ourselves, here or in any subdirectory.
	pub fn is_expected(&self) -> bool {
		for holder in self.files.values() {
			if holder.record_of(self.self_id).is_none() && holder.is_any_version_available() {
				return true;
			}
		}
		self.subdirs.values().any(|d| d.is_expected())
	}

	/// Drops one peer's records everywhere, pruning holders and directories
	/// that end up empty. Returns true if anything was removed.
	pub fn remove_member(&mut self, peer: MemberId) -> bool {
		let mut changed = false;
		let mut dead_files = Vec::new();
		for (name, holder) in self.files.iter_mut() {
			let before = holder.record_of(peer).is_some();
			if holder.remove_peer(peer) {
				dead_files.push(name.clone());
			}
			changed |= before;
		}
		for name in dead_files {
			self.files.remove(&name);
		}
		let mut dead_dirs = Vec::new();
		for (name, dir) in self.subdirs.iter_mut() {
			changed |= dir.remove_member(peer);
			if dir.files.is_empty() && dir.subdirs.is_empty() {
				dead_dirs.push(name.clone());
			}
		}
		for name in dead_dirs {
			self.subdirs.remove(&name);
		}
		changed
	}

	/// Number of live (non-deleted) files here and below.
	pub fn live_file_count(&self) -> usize {
		let here = self.files.values().filter(|h| !h.is_deleted()).count();
		here + self.subdirs.values().map(|d| d.live_file_count()).sum::<usize>()
	}
}


// vim: ts=4
