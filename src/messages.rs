//! Folder broadcast message payloads.
//!
//! Outbound messages handed to the `Broadcaster` collaborator. The transport
//! layer owns addressing and delivery; these payloads only carry record
//! data, JSON-encoded so every `FileRecord` field survives the trip.

use serde::{Deserialize, Serialize};

use crate::record::FileRecord;

/// One folder-scoped broadcast to all connected members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FolderMessage {
	/// Complete current file list of the sender, replacing any previous view
	FileList { records: Vec<FileRecord> },

	/// Tombstones for files removed since the last broadcast
	FilesDeleted { removed: Vec<FileRecord> },
}

impl FolderMessage {
	/// Number of records carried, whatever the variant.
	pub fn len(&self) -> usize {
		match self {
			FolderMessage::FileList { records } => records.len(),
			FolderMessage::FilesDeleted { removed } => removed.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Inbound file-list traffic from one remote member.
///
/// A full list replaces the stored view for that member; a delta patches it.
/// Removed files arrive as tombstone records so version ordering still
/// applies when merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FileListUpdate {
	Full { records: Vec<FileRecord> },
	Delta { updated: Vec<FileRecord>, removed: Vec<FileRecord> },
}


// vim: ts=4
