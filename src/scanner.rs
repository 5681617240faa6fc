//! Bounded concurrent directory scanner.
//!
//! Walks a folder base, compares what is on disk against the known records
//! and classifies every file as new, changed, restored or unchanged; known
//! records with no file left on disk come back as deleted. Subdirectories of
//! the base are crawled by a small fixed pool of tasks so a scan gets some
//! I/O parallelism without thrashing spinning disks.
//!
//! A scan never throws its findings across the call boundary: device loss
//! and cooperative aborts are `ScanOutcome` variants, and a single
//! unreadable file is logged, skipped and reported in `unscannable`.

use futures::future::{join_all, BoxFuture};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::{Mutex, Semaphore};

use crate::error::ScanError;
use crate::filter::PathFilter;
use crate::logging::*;
use crate::problems::{self, FilenameProblem};
use crate::record::{FileRecord, MemberId};
use crate::scan_result::{ScanOutcome, ScanResult};
use crate::util;

/// Directory crawlers working one folder at a time. Three keeps a disk busy
/// without turning the walk into a seek storm.
pub const MAX_CRAWLERS: usize = 3;

/// Name prefix of partially downloaded files. Never scanned.
pub const TEMP_DOWNLOAD_PREFIX: &str = "(incomplete) ";

/// Name prefix of download bookkeeping files. Never scanned.
pub const DOWNLOAD_META_PREFIX: &str = "(downloadmeta) ";

/// Name prefix of pre-overwrite backup copies. Never scanned.
pub const COPY_BACKUP_PREFIX: &str = "(copy_temp) ";

/// Root-level directory holding locally deleted files. Never scanned.
pub const RECYCLE_DIR_NAME: &str = ".recycle";

/// True for working files the folder machinery itself leaves on disk.
pub fn is_temp_artifact(name: &str) -> bool {
	name.starts_with(TEMP_DOWNLOAD_PREFIX)
		|| name.starts_with(DOWNLOAD_META_PREFIX)
		|| name.starts_with(COPY_BACKUP_PREFIX)
}

/// Findings collected while the walk runs. Deleted files are not in here;
/// they are whatever is left of the `remaining` map afterwards.
#[derive(Default)]
struct Accum {
	new_files: Vec<FileRecord>,
	changed_files: Vec<FileRecord>,
	restored_files: Vec<FileRecord>,
	problems: BTreeMap<String, Vec<FilenameProblem>>,
	unscannable: Vec<String>,
	seen_paths: Vec<String>,
	total_files: usize,
}

/// State shared between the root walk and its crawler tasks.
struct ScanContext {
	folder_id: String,
	self_id: MemberId,
	filter: PathFilter,
	remaining: Mutex<BTreeMap<String, FileRecord>>,
	accum: Mutex<Accum>,
	abort: Arc<AtomicBool>,
	failure: AtomicBool,
}

/// One scanner per folder. A folder is scanned by at most one walk at a
/// time; a second `scan` call while one runs is a caller bug and fails
/// fast with `ScanError::AlreadyRunning` instead of queueing.
pub struct DirectoryScanner {
	folder_id: String,
	self_id: MemberId,
	system_subdir: String,
	active: AtomicBool,
	abort: Arc<AtomicBool>,
}

impl DirectoryScanner {
	pub fn new(folder_id: &str, system_subdir: &str, self_id: MemberId) -> DirectoryScanner {
		DirectoryScanner {
			folder_id: folder_id.to_string(),
			self_id,
			system_subdir: system_subdir.to_string(),
			active: AtomicBool::new(false),
			abort: Arc::new(AtomicBool::new(false)),
		}
	}

	/// True while a walk is in progress.
	pub fn is_scanning(&self) -> bool {
		self.active.load(Ordering::SeqCst)
	}

	/// Asks a running walk to stop at the next file boundary. The walk then
	/// ends with `ScanOutcome::Aborted` and its partial findings are thrown
	/// away. A no-op when no walk is running.
	pub fn request_abort(&self) {
		self.abort.store(true, Ordering::SeqCst);
	}

	/// Walks `base` against the `known` records and classifies the
	/// differences. `known` should be a snapshot taken under the caller's
	/// folder lock; the scanner consumes it as its working set.
	pub async fn scan(
		&self,
		base: &Path,
		known: BTreeMap<String, FileRecord>,
		filter: PathFilter,
	) -> Result<ScanOutcome, ScanError> {
		if self
			.active
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Err(ScanError::AlreadyRunning { folder: self.folder_id.clone() });
		}
		self.abort.store(false, Ordering::SeqCst);
		let outcome = self.scan_inner(base, known, filter).await;
		self.active.store(false, Ordering::SeqCst);
		Ok(outcome)
	}

	async fn scan_inner(
		&self,
		base: &Path,
		known: BTreeMap<String, FileRecord>,
		filter: PathFilter,
	) -> ScanOutcome {
		let started = Instant::now();
		debug!("Scanning folder '{}' at {}", self.folder_id, base.display());

		let ctx = Arc::new(ScanContext {
			folder_id: self.folder_id.clone(),
			self_id: self.self_id,
			filter,
			remaining: Mutex::new(known),
			accum: Mutex::new(Accum::default()),
			abort: self.abort.clone(),
			failure: AtomicBool::new(false),
		});

		self.walk_root(&ctx, base).await;

		if ctx.failure.load(Ordering::SeqCst) {
			warn!(
				"Scan of folder '{}' failed after {}ms, discarding partial findings",
				self.folder_id,
				started.elapsed().as_millis()
			);
			return ScanOutcome::HardwareFailure;
		}
		if ctx.abort.load(Ordering::SeqCst) {
			info!("Scan of folder '{}' aborted", self.folder_id);
			return ScanOutcome::Aborted;
		}

		let result = finalize(&ctx).await;
		info!(
			"Scanned folder '{}' in {}ms: {} files total, {} new, {} changed, {} deleted, {} restored",
			self.folder_id,
			started.elapsed().as_millis(),
			result.total_files,
			result.new_files.len(),
			result.changed_files.len(),
			result.deleted_files.len(),
			result.restored_files.len()
		);
		ScanOutcome::Scanned(result)
	}

	/// Scans root-level files inline and hands each root-level subdirectory
	/// to a crawler task, waiting on the semaphore when all crawlers are
	/// busy. Returns once every dispatched crawler has finished.
	async fn walk_root(&self, ctx: &Arc<ScanContext>, base: &Path) {
		let mut entries = match fs::read_dir(base).await {
			Ok(entries) => entries,
			Err(e) => {
				warn!("Cannot list folder base {}: {}", base.display(), e);
				ctx.failure.store(true, Ordering::SeqCst);
				return;
			}
		};

		let crawlers = Arc::new(Semaphore::new(MAX_CRAWLERS));
		let mut handles = Vec::new();

		loop {
			if ctx.failure.load(Ordering::SeqCst) || ctx.abort.load(Ordering::SeqCst) {
				break;
			}
			let entry = match entries.next_entry().await {
				Ok(Some(entry)) => entry,
				Ok(None) => break,
				Err(e) => {
					warn!("Cannot read folder base {}: {}", base.display(), e);
					ctx.failure.store(true, Ordering::SeqCst);
					break;
				}
			};
			let name = entry.file_name().to_string_lossy().into_owned();
			if is_temp_artifact(&name) || ctx.filter.is_excluded(&name) {
				continue;
			}
			let meta = match fs::metadata(entry.path()).await {
				Ok(meta) => meta,
				Err(e) => {
					warn!("Cannot examine {}: {}", entry.path().display(), e);
					ctx.accum.lock().await.unscannable.push(name);
					continue;
				}
			};
			if meta.is_dir() {
				if name == self.system_subdir || name == RECYCLE_DIR_NAME {
					continue;
				}
				let permit = match crawlers.clone().acquire_owned().await {
					Ok(permit) => permit,
					// the semaphore is never closed
					Err(_) => break,
				};
				let ctx = ctx.clone();
				let dir = entry.path();
				handles.push(tokio::spawn(async move {
					crawl_dir(ctx, dir, name).await;
					drop(permit);
				}));
			} else if meta.is_file() {
				scan_file(ctx, &name, &meta).await;
			} else {
				warn!("Neither file nor directory: {}", entry.path().display());
				ctx.accum.lock().await.unscannable.push(name);
			}
		}

		for joined in join_all(handles).await {
			if joined.is_err() {
				// a crashed crawler leaves the walk incomplete
				ctx.failure.store(true, Ordering::SeqCst);
			}
		}
	}
}

/// Recursively scans one subdirectory tree within a single crawler task.
fn crawl_dir(ctx: Arc<ScanContext>, dir: PathBuf, rel_dir: String) -> BoxFuture<'static, ()> {
	Box::pin(async move {
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) => {
				warn!("Cannot list directory {}: {}", dir.display(), e);
				ctx.failure.store(true, Ordering::SeqCst);
				return;
			}
		};
		loop {
			if ctx.failure.load(Ordering::SeqCst) || ctx.abort.load(Ordering::SeqCst) {
				return;
			}
			let entry = match entries.next_entry().await {
				Ok(Some(entry)) => entry,
				Ok(None) => break,
				Err(e) => {
					warn!("Cannot read directory {}: {}", dir.display(), e);
					ctx.failure.store(true, Ordering::SeqCst);
					return;
				}
			};
			let name = entry.file_name().to_string_lossy().into_owned();
			if is_temp_artifact(&name) {
				continue;
			}
			let rel_path = util::join_relative(&rel_dir, &name);
			if ctx.filter.is_excluded(&rel_path) {
				continue;
			}
			let meta = match fs::metadata(entry.path()).await {
				Ok(meta) => meta,
				Err(e) => {
					warn!("Cannot examine {}: {}", entry.path().display(), e);
					ctx.accum.lock().await.unscannable.push(rel_path);
					continue;
				}
			};
			if meta.is_dir() {
				crawl_dir(ctx.clone(), entry.path(), rel_path).await;
			} else if meta.is_file() {
				scan_file(&ctx, &rel_path, &meta).await;
			} else {
				warn!("Neither file nor directory: {}", entry.path().display());
				ctx.accum.lock().await.unscannable.push(rel_path);
			}
		}
	})
}

/// Classifies one on-disk file against the known records.
async fn scan_file(ctx: &ScanContext, rel_path: &str, meta: &Metadata) {
	let size = meta.len();
	let modified_ms = match meta.modified() {
		Ok(time) => util::system_time_to_millis(time),
		Err(e) => {
			warn!("No modification time for {}: {}", rel_path, e);
			ctx.accum.lock().await.unscannable.push(rel_path.to_string());
			return;
		}
	};

	let known = take_known(ctx, rel_path).await;

	let mut accum = ctx.accum.lock().await;
	accum.total_files += 1;
	accum.seen_paths.push(rel_path.to_string());

	let found = problems::check_filename(util::filename_of(rel_path));
	if !found.is_empty() {
		accum.problems.insert(rel_path.to_string(), found);
	}

	match known {
		Some(old) if old.deleted => {
			let restored = old.bumped_from_disk(size, modified_ms, ctx.self_id);
			info!("Restored detected: {}", restored);
			accum.restored_files.push(restored);
		}
		Some(old) => {
			if !old.matches_disk(size, modified_ms) {
				let changed = old.bumped_from_disk(size, modified_ms, ctx.self_id);
				info!("Change detected: {}", changed);
				accum.changed_files.push(changed);
			}
		}
		None => {
			let fresh =
				FileRecord::new_scanned(&ctx.folder_id, rel_path, size, modified_ms, ctx.self_id);
			debug!("New found: {}", fresh);
			accum.new_files.push(fresh);
		}
	}
}

/// Removes and returns the known record for `rel_path`. Falls back to a
/// case-insensitive search so a rename that only changes letter case is not
/// misread as a delete plus a new file.
async fn take_known(ctx: &ScanContext, rel_path: &str) -> Option<FileRecord> {
	let mut remaining = ctx.remaining.lock().await;
	if let Some(record) = remaining.remove(rel_path) {
		return Some(record);
	}
	let lower = rel_path.to_lowercase();
	let other_case = remaining.keys().find(|key| key.to_lowercase() == lower).cloned()?;
	debug!("Found '{}' on disk under different case: '{}'", other_case, rel_path);
	remaining.remove(&other_case)
}

/// Turns the shared walk state into a `ScanResult`.
async fn finalize(ctx: &Arc<ScanContext>) -> ScanResult {
	let mut remaining = {
		let mut guard = ctx.remaining.lock().await;
		std::mem::take(&mut *guard)
	};
	let accum = {
		let mut guard = ctx.accum.lock().await;
		std::mem::take(&mut *guard)
	};
	let Accum {
		new_files,
		changed_files,
		restored_files,
		mut problems,
		unscannable,
		seen_paths,
		total_files,
	} = accum;

	// Excluded paths are invisible to the scan, never "deleted"
	remaining.retain(|path, _| !ctx.filter.is_excluded(path));

	// A file we could not examine is not gone, and neither is anything
	// beneath an entry we could not examine
	if !unscannable.is_empty() {
		warn!("{} disk items unscannable in folder '{}'", unscannable.len(), ctx.folder_id);
		for missed in &unscannable {
			remaining.remove(missed);
			let prefix = format!("{}/", missed);
			remaining.retain(|path, _| !path.starts_with(&prefix));
		}
	}

	// Leftover tombstones are old news, not fresh deletions
	remaining.retain(|_, record| !record.deleted);

	let deleted_files: Vec<FileRecord> = remaining.into_values().collect();
	let moved_files = detect_moves(&deleted_files, &new_files);

	for path in problems::find_case_collisions(&seen_paths) {
		problems.entry(path).or_insert_with(Vec::new).push(FilenameProblem::DuplicateCaseCollision);
	}

	ScanResult {
		new_files,
		changed_files,
		deleted_files,
		restored_files,
		moved_files,
		problems,
		unscannable,
		total_files,
	}
}

/// Pairs every deleted record with every new file of identical size and
/// modification time. Exact equality on purpose: a copied file gets a fresh
/// timestamp, a moved one keeps it.
fn detect_moves(
	deleted: &[FileRecord],
	new_files: &[FileRecord],
) -> BTreeMap<String, Vec<String>> {
	let mut moved = BTreeMap::new();
	for old in deleted {
		let candidates: Vec<String> = new_files
			.iter()
			.filter(|fresh| fresh.size == old.size && fresh.modified_ms == old.modified_ms)
			.map(|fresh| fresh.rel_path.clone())
			.collect();
		if !candidates.is_empty() {
			debug!("Movement candidates for '{}': {:?}", old.rel_path, candidates);
			moved.insert(old.rel_path.clone(), candidates);
		}
	}
	moved
}

#[cfg(test)]
mod tests {
	use super::*;
	use filetime::{set_file_mtime, FileTime};
	use std::fs as stdfs;
	use tempfile::TempDir;

	fn peer(n: u128) -> MemberId {
		uuid::Uuid::from_u128(n)
	}

	fn scanner() -> DirectoryScanner {
		DirectoryScanner::new("f1", ".foldr", peer(1))
	}

	fn write_with_mtime(path: &Path, content: &[u8], unix_secs: i64) {
		if let Some(parent) = path.parent() {
			stdfs::create_dir_all(parent).unwrap();
		}
		stdfs::write(path, content).unwrap();
		set_file_mtime(path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
	}

	fn result_of(outcome: ScanOutcome) -> ScanResult {
		match outcome {
			ScanOutcome::Scanned(result) => result,
			other => panic!("expected a completed scan, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_scan_empty_folder() {
		let dir = TempDir::new().unwrap();
		let outcome =
			scanner().scan(dir.path(), BTreeMap::new(), PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);
		assert!(!result.has_changes());
		assert_eq!(result.total_files, 0);
	}

	#[tokio::test]
	async fn test_scan_finds_new_files() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("a.txt"), b"aaa", 1_600_000_000);
		write_with_mtime(&dir.path().join("sub/b.txt"), b"bb", 1_600_000_000);

		let outcome =
			scanner().scan(dir.path(), BTreeMap::new(), PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);

		assert_eq!(result.total_files, 2);
		let mut paths: Vec<&str> =
			result.new_files.iter().map(|r| r.rel_path.as_str()).collect();
		paths.sort_unstable();
		assert_eq!(paths, vec!["a.txt", "sub/b.txt"]);
		assert!(result.new_files.iter().all(|r| r.version == 0 && !r.deleted));
		assert_eq!(result.new_files.iter().find(|r| r.rel_path == "a.txt").unwrap().size, 3);
	}

	#[tokio::test]
	async fn test_scan_classifies_changed_deleted_restored() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("changed.txt"), b"new content", 1_600_001_000);
		write_with_mtime(&dir.path().join("same.txt"), b"same", 1_600_000_000);
		write_with_mtime(&dir.path().join("back.txt"), b"back", 1_600_002_000);

		let mut known = BTreeMap::new();
		known.insert(
			"changed.txt".to_string(),
			FileRecord::new_scanned("f1", "changed.txt", 3, 1_600_000_000_000, peer(2)),
		);
		known.insert(
			"same.txt".to_string(),
			FileRecord::new_scanned("f1", "same.txt", 4, 1_600_000_000_000, peer(2)),
		);
		known.insert(
			"gone.txt".to_string(),
			FileRecord::new_scanned("f1", "gone.txt", 9, 1_600_000_000_000, peer(2)),
		);
		let tombstone =
			FileRecord::new_scanned("f1", "back.txt", 4, 1_599_000_000_000, peer(2))
				.tombstone(peer(2), 1_599_500_000_000);
		known.insert("back.txt".to_string(), tombstone);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);

		assert_eq!(result.total_files, 3);
		assert_eq!(result.changed_files.len(), 1);
		let changed = &result.changed_files[0];
		assert_eq!(changed.rel_path, "changed.txt");
		assert_eq!(changed.version, 1);
		assert_eq!(changed.size, 11);
		assert_eq!(changed.modified_by, peer(1));

		assert_eq!(result.deleted_files.len(), 1);
		assert_eq!(result.deleted_files[0].rel_path, "gone.txt");
		// the scanner reports the old record; tombstoning is the merge's job
		assert!(!result.deleted_files[0].deleted);

		assert_eq!(result.restored_files.len(), 1);
		let restored = &result.restored_files[0];
		assert_eq!(restored.rel_path, "back.txt");
		assert!(!restored.deleted);
		assert_eq!(restored.version, 2);
		assert_eq!(restored.size, 4);
	}

	#[tokio::test]
	async fn test_unchanged_file_within_date_margin() {
		let dir = TempDir::new().unwrap();
		// two seconds off, still the same date as far as the scan cares
		write_with_mtime(&dir.path().join("a.txt"), b"abc", 1_600_000_002);

		let mut known = BTreeMap::new();
		known.insert(
			"a.txt".to_string(),
			FileRecord::new_scanned("f1", "a.txt", 3, 1_600_000_000_000, peer(2)),
		);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);
		assert!(!result.has_changes());
		assert_eq!(result.total_files, 1);
	}

	#[tokio::test]
	async fn test_scan_skips_system_recycle_and_temp_artifacts() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join(".foldr/db.json"), b"{}", 1_600_000_000);
		write_with_mtime(&dir.path().join(".recycle/old.txt"), b"x", 1_600_000_000);
		write_with_mtime(&dir.path().join("(incomplete) big.iso"), b"xx", 1_600_000_000);
		write_with_mtime(&dir.path().join("sub/(downloadmeta) big.iso"), b"m", 1_600_000_000);
		write_with_mtime(&dir.path().join("real.txt"), b"r", 1_600_000_000);

		let outcome =
			scanner().scan(dir.path(), BTreeMap::new(), PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);
		assert_eq!(result.total_files, 1);
		assert_eq!(result.new_files.len(), 1);
		assert_eq!(result.new_files[0].rel_path, "real.txt");
	}

	#[tokio::test]
	async fn test_excluded_paths_invisible() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("keep.txt"), b"k", 1_600_000_000);
		write_with_mtime(&dir.path().join("junk.tmp"), b"j", 1_600_000_000);
		write_with_mtime(&dir.path().join("build/out.bin"), b"o", 1_600_000_000);

		// a known record for an excluded path must not come back as deleted
		let mut known = BTreeMap::new();
		known.insert(
			"junk.tmp".to_string(),
			FileRecord::new_scanned("f1", "junk.tmp", 1, 1_600_000_000_000, peer(1)),
		);

		let filter =
			PathFilter::new(vec!["*.tmp".to_string(), "build/**".to_string()]).unwrap();
		let outcome = scanner().scan(dir.path(), known, filter).await.unwrap();
		let result = result_of(outcome);

		assert_eq!(result.total_files, 1);
		assert_eq!(result.new_files.len(), 1);
		assert_eq!(result.new_files[0].rel_path, "keep.txt");
		assert!(result.deleted_files.is_empty());
	}

	#[tokio::test]
	async fn test_missing_base_is_hardware_failure() {
		let dir = TempDir::new().unwrap();
		let gone = dir.path().join("vanished");
		let outcome = scanner().scan(&gone, BTreeMap::new(), PathFilter::empty()).await.unwrap();
		assert!(matches!(outcome, ScanOutcome::HardwareFailure));
	}

	#[tokio::test]
	async fn test_move_detection_exact_match_only() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("renamed.txt"), b"data", 1_600_000_000);
		write_with_mtime(&dir.path().join("copied.txt"), b"data", 1_600_000_123);

		let mut known = BTreeMap::new();
		known.insert(
			"old.txt".to_string(),
			FileRecord::new_scanned("f1", "old.txt", 4, 1_600_000_000_000, peer(1)),
		);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);

		assert_eq!(result.deleted_files.len(), 1);
		assert_eq!(result.new_files.len(), 2);
		// only the exact-timestamp twin qualifies, date margin does not apply
		assert_eq!(result.moved_files.len(), 1);
		assert_eq!(result.moved_files["old.txt"], vec!["renamed.txt".to_string()]);
	}

	#[tokio::test]
	async fn test_move_detection_reports_all_candidates() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("twin-a.bin"), b"12345", 1_600_000_000);
		write_with_mtime(&dir.path().join("twin-b.bin"), b"54321", 1_600_000_000);

		let mut known = BTreeMap::new();
		known.insert(
			"origin.bin".to_string(),
			FileRecord::new_scanned("f1", "origin.bin", 5, 1_600_000_000_000, peer(1)),
		);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);

		assert_eq!(
			result.moved_files["origin.bin"],
			vec!["twin-a.bin".to_string(), "twin-b.bin".to_string()]
		);
	}

	#[tokio::test]
	async fn test_tombstone_not_reported_deleted_again() {
		let dir = TempDir::new().unwrap();
		let mut known = BTreeMap::new();
		known.insert(
			"gone.txt".to_string(),
			FileRecord::new_scanned("f1", "gone.txt", 4, 1_600_000_000_000, peer(1))
				.tombstone(peer(1), 1_600_100_000_000),
		);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);
		assert!(result.deleted_files.is_empty());
		assert!(!result.has_changes());
	}

	#[tokio::test]
	async fn test_case_only_rename_is_not_delete_plus_new() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("report.txt"), b"body", 1_600_000_000);

		let mut known = BTreeMap::new();
		known.insert(
			"Report.txt".to_string(),
			FileRecord::new_scanned("f1", "Report.txt", 4, 1_600_000_000_000, peer(1)),
		);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);
		assert!(result.new_files.is_empty());
		assert!(result.deleted_files.is_empty());
		assert_eq!(result.total_files, 1);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_unscannable_entry_not_reported_deleted() {
		let dir = TempDir::new().unwrap();
		std::os::unix::fs::symlink("missing-target", dir.path().join("ghost")).unwrap();

		let mut known = BTreeMap::new();
		known.insert(
			"ghost".to_string(),
			FileRecord::new_scanned("f1", "ghost", 4, 1_600_000_000_000, peer(1)),
		);

		let outcome = scanner().scan(dir.path(), known, PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);
		assert_eq!(result.unscannable, vec!["ghost".to_string()]);
		assert!(result.deleted_files.is_empty());
	}

	#[tokio::test]
	async fn test_problem_detection_during_scan() {
		let dir = TempDir::new().unwrap();
		write_with_mtime(&dir.path().join("AUX.txt"), b"a", 1_600_000_000);
		write_with_mtime(&dir.path().join("Readme.md"), b"r", 1_600_000_000);
		write_with_mtime(&dir.path().join("readme.md"), b"r", 1_600_000_000);

		let outcome =
			scanner().scan(dir.path(), BTreeMap::new(), PathFilter::empty()).await.unwrap();
		let result = result_of(outcome);

		assert!(result.problems["AUX.txt"]
			.contains(&FilenameProblem::IsReservedWindowsWord));
		assert!(result.problems["Readme.md"]
			.contains(&FilenameProblem::DuplicateCaseCollision));
		assert!(result.problems["readme.md"]
			.contains(&FilenameProblem::DuplicateCaseCollision));
	}

	#[tokio::test]
	async fn test_second_scan_fails_fast() {
		let dir = TempDir::new().unwrap();
		for i in 0..20 {
			write_with_mtime(
				&dir.path().join(format!("dir{}/file.txt", i)),
				b"x",
				1_600_000_000,
			);
		}
		let scanner = scanner();
		let (first, second) = tokio::join!(
			scanner.scan(dir.path(), BTreeMap::new(), PathFilter::empty()),
			scanner.scan(dir.path(), BTreeMap::new(), PathFilter::empty()),
		);
		let outcomes = [first, second];
		assert_eq!(
			1,
			outcomes
				.iter()
				.filter(|o| matches!(o, Err(ScanError::AlreadyRunning { .. })))
				.count()
		);
		assert_eq!(
			1,
			outcomes
				.iter()
				.filter(|o| matches!(o, Ok(ScanOutcome::Scanned(_))))
				.count()
		);
	}
}

// vim: ts=4
