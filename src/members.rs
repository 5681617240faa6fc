//! Folder membership and per-peer remote file lists.
//!
//! The registry is plain data: it remembers who participates in a folder,
//! which of them are connected right now, and the last file list each peer
//! reported. Policy decisions about that data live in the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::logging::*;
use crate::record::{FileRecord, MemberId};

/// One peer participating in a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
	pub id: MemberId,
	pub nick: String,

	/// Friends get the more permissive side of the profile's trust split
	pub friend: bool,

	/// Only connected members receive broadcasts and contribute expected files
	pub connected: bool,
}

impl Member {
	pub fn new(id: MemberId, nick: &str, friend: bool) -> Member {
		Member { id, nick: nick.to_string(), friend, connected: false }
	}
}

impl fmt::Display for Member {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.nick, self.id)
	}
}

/// A member plus the last file list it reported.
#[derive(Debug, Clone)]
struct MemberView {
	member: Member,
	files: BTreeMap<String, FileRecord>,
}

/// Peers of one folder and their last-known remote file lists.
#[derive(Debug, Default)]
pub struct MembershipRegistry {
	members: BTreeMap<MemberId, MemberView>,
}

impl MembershipRegistry {
	pub fn new() -> MembershipRegistry {
		MembershipRegistry::default()
	}

	/// Adds a member or updates an existing one. A rejoining peer keeps its
	/// previously reported file list until it announces a new one.
	pub fn join(&mut self, member: Member) {
		match self.members.get_mut(&member.id) {
			Some(view) => view.member = member,
			None => {
				debug!("Member joined: {}", member);
				self.members
					.insert(member.id, MemberView { member, files: BTreeMap::new() });
			}
		}
	}

	/// Removes a member entirely, dropping its file list view.
	pub fn leave(&mut self, id: MemberId) -> Option<Member> {
		let view = self.members.remove(&id)?;
		debug!("Member left: {}", view.member);
		Some(view.member)
	}

	/// Returns true when the flag actually changed.
	pub fn set_connected(&mut self, id: MemberId, connected: bool) -> bool {
		match self.members.get_mut(&id) {
			Some(view) if view.member.connected != connected => {
				view.member.connected = connected;
				true
			}
			_ => false,
		}
	}

	pub fn member(&self, id: MemberId) -> Option<&Member> {
		self.members.get(&id).map(|view| &view.member)
	}

	pub fn members(&self) -> impl Iterator<Item = &Member> {
		self.members.values().map(|view| &view.member)
	}

	pub fn member_count(&self) -> usize {
		self.members.len()
	}

	pub fn connected_count(&self) -> usize {
		self.members.values().filter(|view| view.member.connected).count()
	}

	/// Trust class of a modifier id. Unknown peers are never friends.
	pub fn is_friend(&self, id: MemberId) -> bool {
		self.member(id).map(|member| member.friend).unwrap_or(false)
	}

	/// Replaces a member's whole file list view.
	pub fn replace_file_list(&mut self, id: MemberId, records: Vec<FileRecord>) -> bool {
		let view = match self.members.get_mut(&id) {
			Some(view) => view,
			None => {
				warn!("File list from unknown member {}, ignoring", id);
				return false;
			}
		};
		let mut files = BTreeMap::new();
		for record in records {
			files.insert(record.rel_path.clone(), record);
		}
		debug!("Member {} reported {} files", view.member, files.len());
		view.files = files;
		true
	}

	/// Applies a delta: every record upserts its path in the member's view.
	/// Remote deletions arrive as tombstone records and replace the live
	/// entry the same way.
	pub fn apply_changes(&mut self, id: MemberId, changes: &[FileRecord]) -> bool {
		let view = match self.members.get_mut(&id) {
			Some(view) => view,
			None => {
				warn!("File list delta from unknown member {}, ignoring", id);
				return false;
			}
		};
		for record in changes {
			view.files.insert(record.rel_path.clone(), record.clone());
		}
		true
	}

	pub fn files_of(&self, id: MemberId) -> Option<&BTreeMap<String, FileRecord>> {
		self.members.get(&id).map(|view| &view.files)
	}

	pub fn record_of(&self, id: MemberId, rel_path: &str) -> Option<&FileRecord> {
		self.members.get(&id)?.files.get(rel_path)
	}

	/// Connected members and their views, in stable id order.
	pub fn connected_file_lists(
		&self,
	) -> impl Iterator<Item = (&Member, &BTreeMap<String, FileRecord>)> {
		self.members
			.values()
			.filter(|view| view.member.connected)
			.map(|view| (&view.member, &view.files))
	}
}


// vim: ts=4
