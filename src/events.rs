//! Folder event listeners.
//!
//! Consumers observe a folder through `FolderListener`; every method has a
//! no-op default so implementations pick the events they care about.
//! Listener calls are made synchronously from the engine after the relevant
//! state change; implementations must not block for long.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::members::Member;
use crate::problems::FilenameProblem;
use crate::record::FileRecord;
use crate::scan_result::ScanResult;
use crate::stats::FolderStats;

/// Observer of one folder's lifecycle.
pub trait FolderListener: Send + Sync {
	/// A local scan merged changes into the known-file set
	fn on_files_changed(&self, _folder_id: &str, _summary: &ScanResult) {}

	/// Remote deletions were applied locally
	fn on_files_deleted(&self, _folder_id: &str, _removed: &[FileRecord]) {}

	/// A peer announced a new file list or delta
	fn on_remote_contents_changed(&self, _folder_id: &str, _peer: &Member) {}

	/// A member joined (`joined == true`) or left the folder
	fn on_membership_changed(&self, _folder_id: &str, _member: &Member, _joined: bool) {}

	/// Statistics were recalculated after a merge
	fn on_statistics_calculated(&self, _folder_id: &str, _stats: &FolderStats) {}

	/// A completed download replaced a local version that looked
	/// independently edited
	fn on_conflict_detected(&self, _folder_id: &str, _local: &FileRecord, _remote: &FileRecord) {}

	/// The scanner flagged filename portability problems
	fn on_scan_problems(
		&self,
		_folder_id: &str,
		_problems: &BTreeMap<String, Vec<FilenameProblem>>,
	) {
	}
}

/// Listener that ignores every event.
pub struct NoListener;

impl FolderListener for NoListener {}

/// Fan-out to all registered listeners, in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
	listeners: Vec<Arc<dyn FolderListener>>,
}

impl ListenerRegistry {
	pub fn new() -> ListenerRegistry {
		ListenerRegistry::default()
	}

	pub fn add(&mut self, listener: Arc<dyn FolderListener>) {
		self.listeners.push(listener);
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.is_empty()
	}

	pub fn files_changed(&self, folder_id: &str, summary: &ScanResult) {
		for listener in &self.listeners {
			listener.on_files_changed(folder_id, summary);
		}
	}

	pub fn files_deleted(&self, folder_id: &str, removed: &[FileRecord]) {
		for listener in &self.listeners {
			listener.on_files_deleted(folder_id, removed);
		}
	}

	pub fn remote_contents_changed(&self, folder_id: &str, peer: &Member) {
		for listener in &self.listeners {
			listener.on_remote_contents_changed(folder_id, peer);
		}
	}

	pub fn membership_changed(&self, folder_id: &str, member: &Member, joined: bool) {
		for listener in &self.listeners {
			listener.on_membership_changed(folder_id, member, joined);
		}
	}

	pub fn statistics_calculated(&self, folder_id: &str, stats: &FolderStats) {
		for listener in &self.listeners {
			listener.on_statistics_calculated(folder_id, stats);
		}
	}

	pub fn conflict_detected(&self, folder_id: &str, local: &FileRecord, remote: &FileRecord) {
		for listener in &self.listeners {
			listener.on_conflict_detected(folder_id, local, remote);
		}
	}

	pub fn scan_problems(
		&self,
		folder_id: &str,
		problems: &BTreeMap<String, Vec<FilenameProblem>>,
	) {
		for listener in &self.listeners {
			listener.on_scan_problems(folder_id, problems);
		}
	}
}
