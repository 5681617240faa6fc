//! Per-folder reconciliation engine.
//!
//! A `FolderEngine` owns the authoritative known-file set of one folder and
//! serializes every mutation of it behind a single async lock: scan merges,
//! remote list merges and deletion propagation never overlap. The engine
//! itself moves no file data; downloads, broadcasts and archival go through
//! collaborator traits so the transport layer stays pluggable.

use async_trait::async_trait;
use filetime::FileTime;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::FolderSettings;
use crate::enrich::{EnricherChain, RecordEnricher};
use crate::error::{EngineError, ScanError};
use crate::events::{FolderListener, ListenerRegistry};
use crate::filter::PathFilter;
use crate::logging::*;
use crate::members::{Member, MembershipRegistry};
use crate::messages::{FileListUpdate, FolderMessage};
use crate::problems;
use crate::profile::SyncProfile;
use crate::record::{FileRecord, MemberId};
use crate::scan_result::{ScanOutcome, ScanResult};
use crate::scanner::{self, DirectoryScanner};
use crate::stats::FolderStats;
use crate::store::RecordStore;
use crate::tree::DirectoryTree;
use crate::util;

/// How long a watcher-reported path must stay quiet before it is rescanned.
/// Editors produce bursts of writes on a single save.
pub const DIRTY_SETTLE_MS: i64 = 1000;

/// Whether replacing `local` with a downloaded `remote` would lose an
/// independent local edit. Fresh zero-size locals never count; neither does
/// the initial version-0-on-both-sides state.
fn download_looks_conflicted(local: &FileRecord, remote: &FileRecord) -> bool {
	if local.size == 0 {
		return false;
	}
	if local.version == remote.version
		&& remote.is_newer_than(local)
		&& (local.version != 0 || remote.version != 0)
	{
		return true;
	}
	local.version <= remote.version && util::is_newer_file_date(local.modified_ms, remote.modified_ms)
}

/// Sends folder messages to all connected members. Addressing and delivery
/// are the transport's business; the engine only hands over payloads.
#[async_trait]
pub trait Broadcaster: Send + Sync {
	async fn broadcast(&self, folder_id: &str, message: FolderMessage);
}

/// Discards every broadcast.
pub struct NoBroadcaster;

#[async_trait]
impl Broadcaster for NoBroadcaster {
	async fn broadcast(&self, _folder_id: &str, _message: FolderMessage) {}
}

/// Hands download work to the transfer layer and answers what is already in
/// flight. `download_newest_version` must queue, not block on the transfer.
#[async_trait]
pub trait TransferAgent: Send + Sync {
	async fn download_newest_version(&self, record: &FileRecord, auto: bool);

	fn is_downloading_active(&self, record: &FileRecord) -> bool;

	fn is_downloading_pending(&self, record: &FileRecord) -> bool;

	async fn abort_active_download(&self, record: &FileRecord);
}

/// Transfer layer that never transfers anything.
pub struct NoTransferAgent;

#[async_trait]
impl TransferAgent for NoTransferAgent {
	async fn download_newest_version(&self, record: &FileRecord, _auto: bool) {
		debug!("No transfer agent attached, not downloading {}", record);
	}

	fn is_downloading_active(&self, _record: &FileRecord) -> bool {
		false
	}

	fn is_downloading_pending(&self, _record: &FileRecord) -> bool {
		false
	}

	async fn abort_active_download(&self, _record: &FileRecord) {}
}

/// Offered every local file about to be removed after a remote deletion,
/// or about to be overwritten by a completed download.
#[async_trait]
pub trait Archiver: Send + Sync {
	async fn archive(&self, record: &FileRecord, disk_path: &Path) -> std::io::Result<()>;
}

/// Keeps nothing.
pub struct NoArchiver;

#[async_trait]
impl Archiver for NoArchiver {
	async fn archive(&self, _record: &FileRecord, _disk_path: &Path) -> std::io::Result<()> {
		Ok(())
	}
}

/// External services one folder engine works against.
pub struct Collaborators {
	pub store: Arc<dyn RecordStore>,
	pub broadcaster: Arc<dyn Broadcaster>,
	pub transfer: Arc<dyn TransferAgent>,
	pub archiver: Arc<dyn Archiver>,
}

impl Collaborators {
	/// Store-only setup; every other collaborator is a no-op.
	pub fn new(store: Arc<dyn RecordStore>) -> Collaborators {
		Collaborators {
			store,
			broadcaster: Arc::new(NoBroadcaster),
			transfer: Arc::new(NoTransferAgent),
			archiver: Arc::new(NoArchiver),
		}
	}
}

/// Outcome of weighing one remote record against local knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteVerdict {
	/// The remote version should be downloaded
	Needed,

	/// Local knowledge is as good or better
	NotNeeded,

	/// Same bytes under a higher version number; take over the remote
	/// metadata without a transfer
	AdoptMetadata,
}

struct EngineState {
	known: BTreeMap<String, FileRecord>,
	members: MembershipRegistry,
	filter: PathFilter,
	last_scan_ms: Option<i64>,
	stats: FolderStats,
	dirty: BTreeMap<String, i64>,
}

/// One synchronized folder: its settings, its policy, its known-file set
/// and the remote views reported by other members.
pub struct FolderEngine {
	settings: FolderSettings,
	self_id: MemberId,
	profile: SyncProfile,
	scanner: DirectoryScanner,
	state: Mutex<EngineState>,
	listeners: ListenerRegistry,
	enrichers: EnricherChain,
	store: Arc<dyn RecordStore>,
	broadcaster: Arc<dyn Broadcaster>,
	transfer: Arc<dyn TransferAgent>,
	archiver: Arc<dyn Archiver>,
}

impl FolderEngine {
	/// Loads the folder database and ignore patterns and builds the engine.
	/// Fails on unusable settings or an unreadable database; a missing
	/// database is just an empty folder.
	pub async fn mount(
		settings: FolderSettings,
		self_id: MemberId,
		collaborators: Collaborators,
	) -> Result<FolderEngine, EngineError> {
		settings.validate()?;
		let profile = settings.sync_profile()?;
		let filter = PathFilter::load(&settings.system_dir())?;
		let Collaborators { store, broadcaster, transfer, archiver } = collaborators;
		let mut known = BTreeMap::new();
		for record in store.load(&settings.id).await? {
			known.insert(record.rel_path.clone(), record);
		}
		let stats = FolderStats::calculate(&known, 0);
		info!("Mounted folder '{}' at {}: {}", settings.title(), settings.base.display(), stats);
		let scanner = DirectoryScanner::new(&settings.id, &settings.system_subdir, self_id);
		Ok(FolderEngine {
			settings,
			self_id,
			profile,
			scanner,
			state: Mutex::new(EngineState {
				known,
				members: MembershipRegistry::new(),
				filter,
				last_scan_ms: None,
				stats,
				dirty: BTreeMap::new(),
			}),
			listeners: ListenerRegistry::new(),
			enrichers: EnricherChain::new(),
			store,
			broadcaster,
			transfer,
			archiver,
		})
	}

	pub fn folder_id(&self) -> &str {
		&self.settings.id
	}

	pub fn title(&self) -> &str {
		self.settings.title()
	}

	pub fn settings(&self) -> &FolderSettings {
		&self.settings
	}

	pub fn profile(&self) -> SyncProfile {
		self.profile
	}

	pub fn is_scanning(&self) -> bool {
		self.scanner.is_scanning()
	}

	/// Asks a running scan to stop; the current pass discards its findings.
	pub fn request_scan_abort(&self) {
		self.scanner.request_abort();
	}

	/// Listeners must be attached before the engine is shared.
	pub fn add_listener(&mut self, listener: Arc<dyn FolderListener>) {
		self.listeners.add(listener);
	}

	/// Enrichers run on every scanned record, in registration order.
	pub fn add_enricher(&mut self, enricher: Arc<dyn RecordEnricher>) {
		self.enrichers.add(enricher);
	}

	/// Adds or reconnects a member and fires the membership event.
	pub async fn join_member(&self, member: Member) {
		{
			let mut state = self.state.lock().await;
			state.members.join(member.clone());
		}
		self.listeners.membership_changed(&self.settings.id, &member, true);
	}

	/// Drops a member together with its file-list view. The next directory
	/// tree rebuild no longer carries its records.
	pub async fn remove_member(&self, peer: MemberId) -> bool {
		let departed = {
			let mut state = self.state.lock().await;
			state.members.leave(peer)
		};
		match departed {
			Some(member) => {
				self.listeners.membership_changed(&self.settings.id, &member, false);
				true
			}
			None => false,
		}
	}

	pub async fn set_connected(&self, peer: MemberId, connected: bool) -> bool {
		self.state.lock().await.members.set_connected(peer, connected)
	}

	pub async fn member_count(&self) -> usize {
		self.state.lock().await.members.member_count()
	}

	/// Runs a local scan and merges the outcome into the known-file set.
	/// Unforced scans respect the profile cadence and return `Ok(false)`
	/// when not yet due. A scan already in progress is an error, never a
	/// queued request.
	///
	/// Returns whether the known-file set changed.
	pub async fn scan_local_files(&self, force: bool) -> Result<bool, EngineError> {
		// The scanner refuses overlap on its own; this check answers
		// before waiting on the state lock behind a running scan.
		if self.scanner.is_scanning() {
			return Err(ScanError::AlreadyRunning { folder: self.settings.id.clone() }.into());
		}
		let mut state = self.state.lock().await;
		if !force && !self.profile.schedule.is_due(state.last_scan_ms, util::now_millis()) {
			debug!("Folder '{}' not due for scanning yet", self.settings.title());
			return Ok(false);
		}
		let known = state.known.clone();
		let filter = state.filter.clone();
		let outcome = self.scanner.scan(&self.settings.base, known, filter).await?;
		let result = match outcome {
			ScanOutcome::Scanned(result) => result,
			ScanOutcome::Aborted => return Ok(false),
			ScanOutcome::HardwareFailure => {
				warn!(
					"Keeping database of folder '{}' untouched after failed scan",
					self.settings.title()
				);
				return Ok(false);
			}
		};
		// Problems are reported even when nothing changed
		if !result.problems.is_empty() {
			self.listeners.scan_problems(&self.settings.id, &result.problems);
		}
		let changed = self.merge_scan(&mut state, &result);
		state.last_scan_ms = Some(util::now_millis());
		if changed {
			self.persist(&state).await;
			self.listeners.files_changed(&self.settings.id, &result);
			self.recalculate_stats(&mut state);
			self.broadcast_file_list(&state).await;
		}
		Ok(changed)
	}

	/// Applies a finished scan. New, changed and restored records pass
	/// through the enrichment chain; records missing from disk get their
	/// deletion version bump here, with one timestamp for the whole merge.
	fn merge_scan(&self, state: &mut EngineState, result: &ScanResult) -> bool {
		let now = util::now_millis();
		let mut changed = false;
		for record in result
			.new_files
			.iter()
			.chain(result.changed_files.iter())
			.chain(result.restored_files.iter())
		{
			let disk = self.disk_path(&record.rel_path);
			let record = self.enrichers.apply(record.clone(), &disk);
			state.known.insert(record.rel_path.clone(), record);
			changed = true;
		}
		for old in &result.deleted_files {
			match state.known.get(&old.rel_path) {
				Some(current) if !current.deleted => {
					let tombstone = current.tombstone(self.self_id, now);
					debug!("Marking as deleted: {}", tombstone);
					state.known.insert(old.rel_path.clone(), tombstone);
					changed = true;
				}
				_ => {}
			}
		}
		for (from, candidates) in &result.moved_files {
			info!("Possible move of {} to {}", from, candidates.join(" or "));
		}
		changed
	}

	/// Decides whether a remote record is worth downloading. No side
	/// effects; `AdoptMetadata` is applied by `request_missing_files`.
	pub async fn need_file(
		&self,
		remote: &FileRecord,
		from_peer: MemberId,
		allow_friends: bool,
		allow_others: bool,
	) -> RemoteVerdict {
		let state = self.state.lock().await;
		let verdict = self.evaluate_remote(&state, remote, allow_friends, allow_others);
		debug!("Offer of {} from member {}: {:?}", remote, from_peer, verdict);
		verdict
	}

	fn evaluate_remote(
		&self,
		state: &EngineState,
		remote: &FileRecord,
		allow_friends: bool,
		allow_others: bool,
	) -> RemoteVerdict {
		if remote.deleted {
			return RemoteVerdict::NotNeeded;
		}
		if state.filter.is_excluded(&remote.rel_path) {
			return RemoteVerdict::NotNeeded;
		}
		let friend = state.members.is_friend(remote.modified_by);
		if friend && !allow_friends || !friend && !allow_others {
			return RemoteVerdict::NotNeeded;
		}
		let local = match state.known.get(&remote.rel_path) {
			Some(local) => local,
			None => return RemoteVerdict::Needed,
		};
		// Old databases can disagree on the version while size and date
		// match exactly. Treated as the same file: the higher version is
		// adopted instead of transferred.
		if !local.deleted && remote.version > local.version && local.same_size_and_date(remote) {
			return RemoteVerdict::AdoptMetadata;
		}
		if remote.is_newer_than(local) {
			RemoteVerdict::Needed
		} else {
			RemoteVerdict::NotNeeded
		}
	}

	/// Remote records this node is missing: everything a connected member
	/// offers that is unknown here or strictly newer than the local record,
	/// deduplicated per path keeping the newest offer.
	pub async fn expected_files(&self, include_non_friend: bool) -> Vec<FileRecord> {
		let state = self.state.lock().await;
		self.collect_expected(&state, include_non_friend)
	}

	fn collect_expected(&self, state: &EngineState, include_non_friend: bool) -> Vec<FileRecord> {
		let mut expected: BTreeMap<String, FileRecord> = BTreeMap::new();
		for (_member, files) in state.members.connected_file_lists() {
			for remote in files.values() {
				if !include_non_friend && !state.members.is_friend(remote.modified_by) {
					continue;
				}
				if state.filter.is_excluded(&remote.rel_path) {
					continue;
				}
				let wanted = match state.known.get(&remote.rel_path) {
					// A tombstone for a path never seen here is not incoming
					None => !remote.deleted,
					Some(local) => remote.is_newer_than(local),
				};
				if !wanted {
					continue;
				}
				let superseded = expected
					.get(&remote.rel_path)
					.map(|best| !remote.is_newer_than(best))
					.unwrap_or(false);
				if !superseded {
					expected.insert(remote.rel_path.clone(), remote.clone());
				}
			}
		}
		expected.into_values().collect()
	}

	/// Walks the expected files and hands everything still needed to the
	/// transfer agent; metadata-only matches are adopted on the spot.
	/// Returns the number of downloads requested.
	pub async fn request_missing_files(
		&self,
		allow_friends: bool,
		allow_others: bool,
		auto: bool,
	) -> usize {
		let mut state = self.state.lock().await;
		let expected = self.collect_expected(&state, allow_others);
		let mut requested = 0;
		let mut adopted = false;
		for remote in expected {
			if remote.deleted {
				continue;
			}
			if self.transfer.is_downloading_active(&remote)
				|| self.transfer.is_downloading_pending(&remote)
			{
				continue;
			}
			match self.evaluate_remote(&state, &remote, allow_friends, allow_others) {
				RemoteVerdict::Needed => {
					self.transfer.download_newest_version(&remote, auto).await;
					requested += 1;
				}
				RemoteVerdict::AdoptMetadata => {
					let record = match state.known.get(&remote.rel_path) {
						Some(local) => local.adopted_metadata(&remote),
						None => continue,
					};
					info!("Adopting metadata of {} without transfer", record);
					state.known.insert(record.rel_path.clone(), record);
					adopted = true;
				}
				RemoteVerdict::NotNeeded => {}
			}
		}
		if adopted {
			self.persist(&state).await;
			self.recalculate_stats(&mut state);
		}
		if requested > 0 {
			info!("Requested {} missing files for folder '{}'", requested, self.settings.title());
		}
		requested
	}

	/// Applies remote deletions and restorations to the local folder.
	/// Deletion sync is gated per modifier trust class by the profile
	/// unless `force` is set. Returns the number of records removed.
	pub async fn handle_remote_deleted_files(&self, force: bool) -> usize {
		let mut state = self.state.lock().await;
		// Tombstones everywhere, plus live remotes that may lift a local
		// tombstone. Owned copies; the loop below mutates the known set.
		let mut candidates: Vec<FileRecord> = Vec::new();
		for (_member, files) in state.members.connected_file_lists() {
			for remote in files.values() {
				let local_tombstone = state
					.known
					.get(&remote.rel_path)
					.map(|local| local.deleted)
					.unwrap_or(false);
				if remote.deleted || local_tombstone {
					candidates.push(remote.clone());
				}
			}
		}
		let mut removed: Vec<FileRecord> = Vec::new();
		let mut restored = 0usize;
		for remote in candidates {
			let friend = state.members.is_friend(remote.modified_by);
			let allowed = force
				|| if friend {
					self.profile.sync_deletion_friends
				} else {
					self.profile.sync_deletion_others
				};
			if !allowed {
				continue;
			}
			if state.filter.is_excluded(&remote.rel_path) {
				continue;
			}
			let local = state.known.get(&remote.rel_path).cloned();
			if remote.deleted {
				match local {
					None => {
						// First knowledge of this path is its deletion
						let tombstone = FileRecord {
							folder_id: self.settings.id.clone(),
							rel_path: remote.rel_path.clone(),
							version: remote.version,
							size: 0,
							modified_by: remote.modified_by,
							modified_ms: remote.modified_ms,
							deleted: true,
						};
						state.known.insert(tombstone.rel_path.clone(), tombstone.clone());
						removed.push(tombstone);
					}
					Some(local) => {
						if !remote.is_newer_than(&local) {
							continue;
						}
						if !local.deleted && !self.remove_from_disk(&local, &remote).await {
							continue;
						}
						let tombstone = local.adopted_tombstone(&remote);
						state.known.insert(tombstone.rel_path.clone(), tombstone.clone());
						removed.push(tombstone);
					}
				}
			} else if let Some(local) = local {
				if local.deleted && remote.is_newer_than(&local) {
					debug!("Member restored {}, dropping local tombstone", remote);
					state.known.remove(&remote.rel_path);
					restored += 1;
				}
			}
		}
		let removed_count = removed.len();
		if removed_count > 0 || restored > 0 {
			self.persist(&state).await;
			self.recalculate_stats(&mut state);
		}
		if removed_count > 0 {
			info!(
				"Folder '{}': {} files removed after remote deletion",
				self.settings.title(),
				removed_count
			);
			self.listeners.files_deleted(&self.settings.id, &removed);
			self.broadcaster
				.broadcast(&self.settings.id, FolderMessage::FilesDeleted { removed })
				.await;
		}
		removed_count
	}

	/// Archives and removes one live local file ahead of a remote deletion.
	/// Returns false when the removal failed and the record must stay live
	/// for a retry on the next pass.
	async fn remove_from_disk(&self, local: &FileRecord, remote: &FileRecord) -> bool {
		self.transfer.abort_active_download(remote).await;
		let disk = self.disk_path(&local.rel_path);
		match tokio::fs::metadata(&disk).await {
			Ok(_) => {}
			Err(err) if err.kind() == ErrorKind::NotFound => return true,
			Err(err) => {
				warn!("Cannot stat {} before removal: {}", disk.display(), err);
				return false;
			}
		}
		if let Err(err) = self.archiver.archive(local, &disk).await {
			warn!("Archiving of {} failed: {}", local, err);
		}
		match tokio::fs::remove_file(&disk).await {
			Ok(()) => {
				info!("Removed {} after remote deletion", local);
				true
			}
			// The archiver may have moved the file away already
			Err(err) if err.kind() == ErrorKind::NotFound => true,
			Err(err) => {
				warn!("Cannot remove {}: {}", disk.display(), err);
				false
			}
		}
	}

	/// Takes a file-list report from a remote member: stores the view,
	/// notifies listeners, pulls whatever the profile wants downloaded and
	/// applies remote deletions.
	pub async fn file_list_changed(&self, from_peer: MemberId, update: FileListUpdate) {
		let member = {
			let mut state = self.state.lock().await;
			let known_peer = match update {
				FileListUpdate::Full { records } => {
					state.members.replace_file_list(from_peer, records)
				}
				FileListUpdate::Delta { updated, removed } => {
					state.members.apply_changes(from_peer, &updated)
						&& state.members.apply_changes(from_peer, &removed)
				}
			};
			if !known_peer {
				return;
			}
			state.members.member(from_peer).cloned()
		};
		if let Some(member) = member {
			self.listeners.remote_contents_changed(&self.settings.id, &member);
		}
		if self.profile.auto_download() {
			self.request_missing_files(
				self.profile.auto_download_friends,
				self.profile.auto_download_others,
				true,
			)
			.await;
		}
		self.handle_remote_deleted_files(false).await;
	}

	/// Refreshes a single path against the disk, the cheap alternative to
	/// a full walk when a watcher names the file. Returns the updated
	/// record, or `None` when nothing changed.
	pub async fn scan_changed_file(&self, rel_path: &str) -> Option<FileRecord> {
		if scanner::is_temp_artifact(util::filename_of(rel_path)) || self.in_system_area(rel_path)
		{
			return None;
		}
		let mut state = self.state.lock().await;
		if state.filter.is_excluded(rel_path) {
			return None;
		}
		let prior = state.known.get(rel_path).cloned();
		let disk = self.disk_path(rel_path);
		let updated = match tokio::fs::metadata(&disk).await {
			Ok(meta) if meta.is_file() => {
				let size = meta.len();
				let modified_ms = match meta.modified() {
					Ok(t) => util::system_time_to_millis(t),
					Err(err) => {
						warn!("No modification time for {}: {}", disk.display(), err);
						return None;
					}
				};
				match &prior {
					Some(local) if local.deleted => {
						Some(local.bumped_from_disk(size, modified_ms, self.self_id))
					}
					Some(local) if !local.matches_disk(size, modified_ms) => {
						Some(local.bumped_from_disk(size, modified_ms, self.self_id))
					}
					Some(_) => None,
					None => Some(FileRecord::new_scanned(
						&self.settings.id,
						rel_path,
						size,
						modified_ms,
						self.self_id,
					)),
				}
			}
			// Directories carry no record of their own
			Ok(_) => None,
			Err(err) if err.kind() == ErrorKind::NotFound => match &prior {
				Some(local) if !local.deleted => {
					Some(local.tombstone(self.self_id, util::now_millis()))
				}
				_ => None,
			},
			Err(err) => {
				warn!("Cannot stat {}: {}", disk.display(), err);
				None
			}
		};
		let record = updated?;
		let record =
			if record.deleted { record } else { self.enrichers.apply(record, &disk) };
		state.known.insert(rel_path.to_string(), record.clone());
		debug!("Refreshed single path: {}", record);
		// Single-file merges report through the same channels as full scans
		let mut summary = ScanResult::default();
		match prior {
			None => summary.new_files.push(record.clone()),
			Some(prior) => {
				if record.deleted {
					summary.deleted_files.push(prior);
				} else if prior.deleted {
					summary.restored_files.push(record.clone());
				} else {
					summary.changed_files.push(record.clone());
				}
			}
		}
		summary.total_files = if record.deleted { 0 } else { 1 };
		if !record.deleted {
			let name_problems = problems::check_filename(util::filename_of(rel_path));
			if !name_problems.is_empty() {
				summary.problems.insert(rel_path.to_string(), name_problems);
				self.listeners.scan_problems(&self.settings.id, &summary.problems);
			}
		}
		self.persist(&state).await;
		self.listeners.files_changed(&self.settings.id, &summary);
		self.recalculate_stats(&mut state);
		self.broadcast_file_list(&state).await;
		Some(record)
	}

	/// Commits a completed download: stamps the transferred temp file with
	/// the remote date, archives any version already in place, moves the
	/// temp file onto the target path and adopts the remote record as the
	/// new local state. The temp file must live on the folder's filesystem
	/// so the final rename is atomic. Returns false when the commit failed;
	/// the temp file is then left for the transfer layer to retry.
	pub async fn scan_download_file(&self, remote: &FileRecord, temp_file: &Path) -> bool {
		let disk = self.disk_path(&remote.rel_path);
		if let Some(parent) = disk.parent() {
			if let Err(err) = tokio::fs::create_dir_all(parent).await {
				warn!("Cannot create parent directory of {}: {}", disk.display(), err);
				return false;
			}
		}
		// The disk keeps the remote date so the next scan sees the file
		// as in sync instead of locally changed
		let stamp = FileTime::from_unix_time(
			remote.modified_ms.div_euclid(1000),
			(remote.modified_ms.rem_euclid(1000) * 1_000_000) as u32,
		);
		if let Err(err) = filetime::set_file_mtime(temp_file, stamp) {
			warn!("Cannot set date of tempfile {}: {}", temp_file.display(), err);
			return false;
		}
		let mut state = self.state.lock().await;
		let prior = state.known.get(&remote.rel_path).cloned();
		if let Some(local) = prior.as_ref().filter(|l| !l.deleted) {
			if tokio::fs::metadata(&disk).await.is_ok() {
				if let Err(err) = self.archiver.archive(local, &disk).await {
					warn!("Unable to archive old version of {}: {}", local, err);
					return false;
				}
				if download_looks_conflicted(local, remote) {
					warn!("Conflict detected on {}, incoming {}", local, remote);
					self.listeners.conflict_detected(&self.settings.id, local, remote);
				}
			}
		}
		if let Err(err) = tokio::fs::rename(temp_file, &disk).await {
			warn!(
				"Cannot move tempfile {} onto {}: {}",
				temp_file.display(),
				disk.display(),
				err
			);
			return false;
		}
		let mut record = remote.clone();
		record.folder_id = self.settings.id.clone();
		let record = self.enrichers.apply(record, &disk);
		state.known.insert(record.rel_path.clone(), record.clone());
		info!("Download of {} completed", record);
		let mut summary = ScanResult::default();
		match &prior {
			None => summary.new_files.push(record.clone()),
			Some(p) if p.deleted => summary.restored_files.push(record.clone()),
			Some(_) => summary.changed_files.push(record.clone()),
		}
		summary.total_files = 1;
		self.persist(&state).await;
		self.listeners.files_changed(&self.settings.id, &summary);
		self.recalculate_stats(&mut state);
		self.broadcast_file_list(&state).await;
		true
	}

	/// Notes a filesystem-watcher report. The path is rescanned on the
	/// next maintenance pass once quiet for `DIRTY_SETTLE_MS`.
	pub async fn notify_path_dirty(&self, rel_path: &str) {
		let mut state = self.state.lock().await;
		state.dirty.insert(rel_path.to_string(), util::now_millis());
	}

	/// Rescans every dirty path whose settle window has passed. Returns
	/// how many paths were refreshed.
	pub async fn flush_dirty_paths(&self) -> usize {
		let now = util::now_millis();
		let ready = {
			let mut state = self.state.lock().await;
			let mut ready: Vec<String> = Vec::new();
			state.dirty.retain(|path, reported| {
				if now - *reported >= DIRTY_SETTLE_MS {
					ready.push(path.clone());
					false
				} else {
					true
				}
			});
			ready
		};
		for path in &ready {
			self.scan_changed_file(path).await;
		}
		ready.len()
	}

	/// One full maintenance pass: apply remote deletions, flush dirty
	/// paths, then a cadence-gated scan.
	pub async fn maintain(&self) {
		self.handle_remote_deleted_files(false).await;
		self.flush_dirty_paths().await;
		match self.scan_local_files(false).await {
			Ok(_) => {}
			Err(EngineError::Scan(ScanError::AlreadyRunning { .. })) => {
				debug!("Folder '{}' still scanning, skipping this pass", self.settings.title());
			}
			Err(err) => {
				warn!("Maintenance scan of folder '{}' failed: {}", self.settings.title(), err);
			}
		}
	}

	/// Builds the folder's directory tree from a point-in-time copy of the
	/// known set and every member view. The build itself runs outside the
	/// folder lock.
	pub async fn directory_tree(&self) -> DirectoryTree {
		let (known, views) = {
			let state = self.state.lock().await;
			let views: Vec<(MemberId, Vec<FileRecord>)> = state
				.members
				.members()
				.map(|member| {
					let files = state
						.members
						.files_of(member.id)
						.map(|files| files.values().cloned().collect())
						.unwrap_or_default();
					(member.id, files)
				})
				.collect();
			(state.known.clone(), views)
		};
		let mut tree = DirectoryTree::new(self.self_id);
		for record in known.into_values() {
			tree.add(self.self_id, record);
		}
		for (peer, records) in views {
			for record in records {
				tree.add(peer, record);
			}
		}
		tree
	}

	/// Last calculated statistics snapshot.
	pub async fn stats(&self) -> FolderStats {
		self.state.lock().await.stats
	}

	/// Snapshot of the known-file set, tombstones included.
	pub async fn known_files(&self) -> Vec<FileRecord> {
		self.state.lock().await.known.values().cloned().collect()
	}

	pub async fn ignore_patterns(&self) -> Vec<String> {
		self.state.lock().await.filter.patterns().to_vec()
	}

	/// Adds an ignore pattern and persists the pattern file.
	pub async fn add_ignore_pattern(&self, pattern: &str) -> Result<(), EngineError> {
		let mut state = self.state.lock().await;
		state.filter.add_pattern(pattern)?;
		state.filter.save(&self.settings.system_dir())?;
		Ok(())
	}

	pub async fn remove_ignore_pattern(&self, pattern: &str) -> Result<(), EngineError> {
		let mut state = self.state.lock().await;
		state.filter.remove_pattern(pattern)?;
		state.filter.save(&self.settings.system_dir())?;
		Ok(())
	}

	/// Writes the known-file set through the record store. Failures are
	/// logged; the in-memory set stays authoritative and the next write
	/// tries again.
	async fn persist(&self, state: &EngineState) {
		let records: Vec<FileRecord> = state.known.values().cloned().collect();
		if let Err(err) = self.store.store(&self.settings.id, &records).await {
			error!("Cannot persist database of folder '{}': {}", self.settings.title(), err);
		}
	}

	fn recalculate_stats(&self, state: &mut EngineState) {
		let incoming = self.collect_expected(state, true).len();
		state.stats = FolderStats::calculate(&state.known, incoming);
		self.listeners.statistics_calculated(&self.settings.id, &state.stats);
	}

	async fn broadcast_file_list(&self, state: &EngineState) {
		let records: Vec<FileRecord> = state.known.values().cloned().collect();
		self.broadcaster
			.broadcast(&self.settings.id, FolderMessage::FileList { records })
			.await;
	}

	/// Translates a slash-relative path into a disk path under the base.
	fn disk_path(&self, rel_path: &str) -> PathBuf {
		let mut path = self.settings.base.clone();
		for part in rel_path.split('/') {
			path.push(part);
		}
		path
	}

	fn in_system_area(&self, rel_path: &str) -> bool {
		let first = rel_path.split('/').next().unwrap_or(rel_path);
		first == self.settings.system_subdir || first == scanner::RECYCLE_DIR_NAME
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex as StdMutex;
	use tempfile::TempDir;

	use crate::error::StoreError;

	struct MemoryStore {
		seed: Vec<FileRecord>,
		stored: StdMutex<Vec<Vec<FileRecord>>>,
	}

	impl MemoryStore {
		fn new(seed: Vec<FileRecord>) -> MemoryStore {
			MemoryStore { seed, stored: StdMutex::new(Vec::new()) }
		}

		fn store_calls(&self) -> usize {
			self.stored.lock().unwrap().len()
		}

		fn last_stored(&self) -> Vec<FileRecord> {
			self.stored.lock().unwrap().last().cloned().unwrap_or_default()
		}
	}

	#[async_trait]
	impl RecordStore for MemoryStore {
		async fn load(&self, _folder_id: &str) -> Result<Vec<FileRecord>, StoreError> {
			Ok(self.seed.clone())
		}

		async fn store(
			&self,
			_folder_id: &str,
			records: &[FileRecord],
		) -> Result<(), StoreError> {
			self.stored.lock().unwrap().push(records.to_vec());
			Ok(())
		}
	}

	fn self_id() -> MemberId {
		uuid::Uuid::from_u128(1)
	}

	fn friend_id() -> MemberId {
		uuid::Uuid::from_u128(2)
	}

	fn other_id() -> MemberId {
		uuid::Uuid::from_u128(3)
	}

	fn remote_record(path: &str, version: u64, modifier: MemberId) -> FileRecord {
		FileRecord {
			folder_id: "f1".to_string(),
			rel_path: path.to_string(),
			version,
			size: 100,
			modified_by: modifier,
			modified_ms: 1_600_000_000_000,
			deleted: false,
		}
	}

	fn tombstone_record(path: &str, version: u64, modifier: MemberId) -> FileRecord {
		let mut record = remote_record(path, version, modifier);
		record.deleted = true;
		record.size = 0;
		record
	}

	async fn build_engine(
		dir: &TempDir,
		profile: &str,
		seed: Vec<FileRecord>,
	) -> (FolderEngine, Arc<MemoryStore>) {
		let settings = FolderSettings {
			id: "f1".to_string(),
			name: "Test".to_string(),
			base: dir.path().to_path_buf(),
			profile: profile.to_string(),
			system_subdir: ".foldr".to_string(),
		};
		let store = Arc::new(MemoryStore::new(seed));
		let collaborators = Collaborators::new(store.clone());
		let engine = FolderEngine::mount(settings, self_id(), collaborators).await.unwrap();
		(engine, store)
	}

	async fn join_connected(engine: &FolderEngine, id: MemberId, nick: &str, friend: bool) {
		engine.join_member(Member::new(id, nick, friend)).await;
		assert!(engine.set_connected(id, true).await);
	}

	#[tokio::test]
	async fn test_mount_loads_store_records() {
		let dir = tempfile::tempdir().unwrap();
		let seed = vec![remote_record("a.txt", 2, friend_id())];
		let (engine, _store) = build_engine(&dir, "manual", seed).await;
		assert_eq!(engine.known_files().await.len(), 1);
		assert_eq!(engine.stats().await.local_files, 1);
		assert!(!engine.is_scanning());
		assert_eq!(engine.folder_id(), "f1");
		assert_eq!(engine.title(), "Test");
	}

	#[tokio::test]
	async fn test_need_file_trust_gating() {
		let dir = tempfile::tempdir().unwrap();
		let (engine, _) = build_engine(&dir, "manual", Vec::new()).await;
		join_connected(&engine, friend_id(), "alice", true).await;
		join_connected(&engine, other_id(), "bob", false).await;

		let from_friend = remote_record("doc.txt", 1, friend_id());
		assert_eq!(
			engine.need_file(&from_friend, friend_id(), true, false).await,
			RemoteVerdict::Needed
		);
		assert_eq!(
			engine.need_file(&from_friend, friend_id(), false, true).await,
			RemoteVerdict::NotNeeded
		);

		let from_other = remote_record("doc.txt", 1, other_id());
		assert_eq!(
			engine.need_file(&from_other, other_id(), true, false).await,
			RemoteVerdict::NotNeeded
		);
		assert_eq!(
			engine.need_file(&from_other, other_id(), false, true).await,
			RemoteVerdict::Needed
		);

		let gone = tombstone_record("gone.txt", 4, friend_id());
		assert_eq!(
			engine.need_file(&gone, friend_id(), true, true).await,
			RemoteVerdict::NotNeeded
		);
	}

	#[tokio::test]
	async fn test_need_file_versions_and_adoption() {
		let dir = tempfile::tempdir().unwrap();
		let local = remote_record("doc.txt", 1, friend_id());
		let mut dead = tombstone_record("dead.txt", 2, friend_id());
		dead.modified_ms = 1_600_000_000_000;
		let (engine, _) = build_engine(&dir, "manual", vec![local, dead]).await;
		join_connected(&engine, friend_id(), "alice", true).await;

		// Same version, same date: nothing newer on offer
		let same = remote_record("doc.txt", 1, friend_id());
		assert_eq!(
			engine.need_file(&same, friend_id(), true, true).await,
			RemoteVerdict::NotNeeded
		);

		// Higher version, same size, date inside the comparison margin
		let mut shifted = remote_record("doc.txt", 2, friend_id());
		shifted.modified_ms += 1500;
		assert_eq!(
			engine.need_file(&shifted, friend_id(), true, true).await,
			RemoteVerdict::AdoptMetadata
		);

		// Higher version with different content has to be fetched
		let mut grown = remote_record("doc.txt", 2, friend_id());
		grown.size = 200;
		assert_eq!(
			engine.need_file(&grown, friend_id(), true, true).await,
			RemoteVerdict::Needed
		);

		// Older version stays unneeded
		let stale = remote_record("doc.txt", 0, friend_id());
		assert_eq!(
			engine.need_file(&stale, friend_id(), true, true).await,
			RemoteVerdict::NotNeeded
		);

		// A live remote above a local tombstone is a restoration download,
		// even when size and date happen to line up with the tombstone
		let mut back = remote_record("dead.txt", 3, friend_id());
		back.size = 0;
		assert_eq!(
			engine.need_file(&back, friend_id(), true, true).await,
			RemoteVerdict::Needed
		);
	}

	#[tokio::test]
	async fn test_need_file_respects_ignore_patterns() {
		let dir = tempfile::tempdir().unwrap();
		let (engine, _) = build_engine(&dir, "manual", Vec::new()).await;
		join_connected(&engine, friend_id(), "alice", true).await;
		engine.add_ignore_pattern("*.bak").await.unwrap();

		let ignored = remote_record("notes.bak", 1, friend_id());
		assert_eq!(
			engine.need_file(&ignored, friend_id(), true, true).await,
			RemoteVerdict::NotNeeded
		);
		let wanted = remote_record("notes.txt", 1, friend_id());
		assert_eq!(
			engine.need_file(&wanted, friend_id(), true, true).await,
			RemoteVerdict::Needed
		);
	}

	#[tokio::test]
	async fn test_expected_files_dedupe_and_filtering() {
		let dir = tempfile::tempdir().unwrap();
		let seed = vec![remote_record("doc.txt", 1, friend_id())];
		let (engine, _) = build_engine(&dir, "manual", seed).await;
		join_connected(&engine, friend_id(), "alice", true).await;
		join_connected(&engine, other_id(), "bob", false).await;

		engine
			.file_list_changed(
				friend_id(),
				FileListUpdate::Full {
					records: vec![
						remote_record("doc.txt", 3, friend_id()),
						tombstone_record("unknown.txt", 1, friend_id()),
						remote_record("new.txt", 0, friend_id()),
					],
				},
			)
			.await;
		engine
			.file_list_changed(
				other_id(),
				FileListUpdate::Full {
					records: vec![
						remote_record("doc.txt", 5, other_id()),
						remote_record("priv.txt", 0, other_id()),
					],
				},
			)
			.await;

		let all = engine.expected_files(true).await;
		assert_eq!(all.len(), 3);
		let doc = all.iter().find(|r| r.rel_path == "doc.txt").unwrap();
		assert_eq!(doc.version, 5);
		assert!(all.iter().any(|r| r.rel_path == "new.txt"));
		assert!(all.iter().any(|r| r.rel_path == "priv.txt"));
		assert!(!all.iter().any(|r| r.rel_path == "unknown.txt"));

		// Friend-only view drops the non-friend offers, so the older
		// friend-modified doc.txt comes back
		let friends = engine.expected_files(false).await;
		assert_eq!(friends.len(), 2);
		let doc = friends.iter().find(|r| r.rel_path == "doc.txt").unwrap();
		assert_eq!(doc.version, 3);

		// Disconnected members offer nothing
		engine.set_connected(other_id(), false).await;
		let connected_only = engine.expected_files(true).await;
		assert_eq!(connected_only.len(), 2);
	}

	#[tokio::test]
	async fn test_remote_deletion_removes_local_file() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("doc.txt"), b"hello").unwrap();
		let seed = vec![remote_record("doc.txt", 1, friend_id())];
		let (engine, store) = build_engine(&dir, "synchronize", seed).await;
		join_connected(&engine, friend_id(), "alice", true).await;

		engine
			.file_list_changed(
				friend_id(),
				FileListUpdate::Full {
					records: vec![
						tombstone_record("doc.txt", 2, friend_id()),
						tombstone_record("ghost.txt", 1, friend_id()),
					],
				},
			)
			.await;

		assert!(!dir.path().join("doc.txt").exists());
		let known = engine.known_files().await;
		let doc = known.iter().find(|r| r.rel_path == "doc.txt").unwrap();
		assert!(doc.deleted);
		assert_eq!(doc.version, 2);
		let ghost = known.iter().find(|r| r.rel_path == "ghost.txt").unwrap();
		assert!(ghost.deleted);
		assert!(store.store_calls() > 0);
		assert!(store.last_stored().iter().any(|r| r.rel_path == "ghost.txt"));
	}

	#[tokio::test]
	async fn test_deletion_gating_and_force() {
		let dir = tempfile::tempdir().unwrap();
		let seed = vec![remote_record("doc.txt", 1, friend_id())];
		let (engine, _) = build_engine(&dir, "manual", seed).await;
		join_connected(&engine, friend_id(), "alice", true).await;
		engine
			.file_list_changed(
				friend_id(),
				FileListUpdate::Full { records: vec![tombstone_record("doc.txt", 2, friend_id())] },
			)
			.await;

		// Manual profile does not propagate deletions on its own
		let known = engine.known_files().await;
		assert!(!known.iter().find(|r| r.rel_path == "doc.txt").unwrap().deleted);
		assert_eq!(engine.handle_remote_deleted_files(false).await, 0);

		assert_eq!(engine.handle_remote_deleted_files(true).await, 1);
		let known = engine.known_files().await;
		assert!(known.iter().find(|r| r.rel_path == "doc.txt").unwrap().deleted);
	}

	#[tokio::test]
	async fn test_remote_restoration_drops_tombstone() {
		let dir = tempfile::tempdir().unwrap();
		let seed = vec![tombstone_record("back.txt", 2, self_id())];
		let (engine, _) = build_engine(&dir, "synchronize", seed).await;
		join_connected(&engine, friend_id(), "alice", true).await;

		engine
			.file_list_changed(
				friend_id(),
				FileListUpdate::Full { records: vec![remote_record("back.txt", 3, friend_id())] },
			)
			.await;

		// The tombstone is gone, so the next pull treats the path as new
		assert!(engine.known_files().await.is_empty());
		let expected = engine.expected_files(true).await;
		assert_eq!(expected.len(), 1);
		assert_eq!(expected[0].rel_path, "back.txt");
	}

	#[tokio::test]
	async fn test_stale_remote_tombstone_is_ignored() {
		let dir = tempfile::tempdir().unwrap();
		let seed = vec![remote_record("doc.txt", 5, self_id())];
		let (engine, _) = build_engine(&dir, "synchronize", seed).await;
		join_connected(&engine, friend_id(), "alice", true).await;

		engine
			.file_list_changed(
				friend_id(),
				FileListUpdate::Full { records: vec![tombstone_record("doc.txt", 4, friend_id())] },
			)
			.await;

		let known = engine.known_files().await;
		assert!(!known.iter().find(|r| r.rel_path == "doc.txt").unwrap().deleted);
		assert_eq!(known[0].version, 5);
	}

	#[test]
	fn test_download_conflict_detection() {
		let local = remote_record("doc.txt", 1, self_id());
		let mut incoming = remote_record("doc.txt", 1, friend_id());

		// Same version, remote ahead by date: concurrent edits
		incoming.modified_ms = local.modified_ms + 10_000;
		assert!(download_looks_conflicted(&local, &incoming));

		// Local edited after the version the remote built on
		incoming.version = 3;
		incoming.modified_ms = local.modified_ms - 10_000;
		assert!(download_looks_conflicted(&local, &incoming));

		// Plain newer remote, dates in step
		incoming.modified_ms = local.modified_ms;
		assert!(!download_looks_conflicted(&local, &incoming));

		// Zero-size local never conflicts
		let mut empty = local.clone();
		empty.size = 0;
		incoming.modified_ms = local.modified_ms - 10_000;
		assert!(!download_looks_conflicted(&empty, &incoming));

		// Both at version zero is the initial exchange, not a conflict
		let mut fresh_local = remote_record("doc.txt", 0, self_id());
		fresh_local.modified_ms -= 10_000;
		let fresh_remote = remote_record("doc.txt", 0, friend_id());
		assert!(!download_looks_conflicted(&fresh_local, &fresh_remote));
	}

	#[tokio::test]
	async fn test_scan_download_file_stores_remote_version() {
		let dir = tempfile::tempdir().unwrap();
		let (engine, store) = build_engine(&dir, "manual", Vec::new()).await;

		let mut incoming = remote_record("pulled.txt", 4, friend_id());
		incoming.size = 5;
		let temp = dir.path().join("(incomplete) pulled.txt");
		std::fs::write(&temp, "bytes").unwrap();

		assert!(engine.scan_download_file(&incoming, &temp).await);
		assert!(dir.path().join("pulled.txt").exists());
		assert!(!temp.exists());
		let stored = store.last_stored();
		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0].version, 4);
		assert_eq!(stored[0].modified_by, friend_id());
		assert_eq!(stored[0].folder_id, "f1");
	}
}

// vim: ts=4
