//! Folder repository and its maintenance scheduler.
//!
//! The repository holds every mounted `FolderEngine`. A single background
//! loop walks the folders in a stable order and runs one maintenance pass
//! on each, serially. Folder scans may parallelize internally; across
//! folders everything stays sequential.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::RepositoryConfig;
use crate::engine::{Collaborators, FolderEngine};
use crate::logging::*;
use crate::record::MemberId;
use crate::store::JsonRecordStore;

/// Delay before the first maintenance pass so listeners can attach.
pub const STARTUP_DELAY: Duration = Duration::from_secs(10);

/// Pause between two folders within one maintenance pass.
pub const INTER_FOLDER_PAUSE: Duration = Duration::from_millis(50);

/// How long the scheduler waits for a trigger before running on its own.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// All folders managed by this node.
pub struct FolderRepository {
	self_id: MemberId,
	folders: BTreeMap<String, Arc<FolderEngine>>,
}

impl FolderRepository {
	pub fn new(self_id: MemberId) -> FolderRepository {
		FolderRepository { self_id, folders: BTreeMap::new() }
	}

	/// Mounts every configured folder with a file-backed store under its
	/// system subdirectory. Folders that fail to mount are logged and
	/// skipped.
	pub async fn open(config: &RepositoryConfig, self_id: MemberId) -> FolderRepository {
		let mut repository = FolderRepository::new(self_id);
		for settings in &config.folders {
			let store = Arc::new(JsonRecordStore::new(settings.system_dir()));
			match FolderEngine::mount(settings.clone(), self_id, Collaborators::new(store)).await
			{
				Ok(engine) => {
					repository.add_folder(engine);
				}
				Err(err) => {
					error!("Cannot mount folder '{}': {}", settings.title(), err);
				}
			}
		}
		info!("Opened repository with {} folders", repository.len());
		repository
	}

	pub fn self_id(&self) -> MemberId {
		self.self_id
	}

	/// Takes ownership of a mounted engine. Listeners and enrichers must
	/// already be attached; from here on the engine is shared.
	pub fn add_folder(&mut self, engine: FolderEngine) -> Arc<FolderEngine> {
		let engine = Arc::new(engine);
		self.folders.insert(engine.folder_id().to_string(), engine.clone());
		engine
	}

	pub fn folder(&self, id: &str) -> Option<Arc<FolderEngine>> {
		self.folders.get(id).cloned()
	}

	/// Looks a folder up by id first, then by title.
	pub fn find(&self, key: &str) -> Option<Arc<FolderEngine>> {
		if let Some(engine) = self.folders.get(key) {
			return Some(engine.clone());
		}
		self.folders.values().find(|engine| engine.title() == key).cloned()
	}

	/// Every folder in maintenance order: title, then id as tie-break.
	pub fn folders(&self) -> Vec<Arc<FolderEngine>> {
		let mut engines: Vec<Arc<FolderEngine>> = self.folders.values().cloned().collect();
		engines.sort_by(|a, b| (a.title(), a.folder_id()).cmp(&(b.title(), b.folder_id())));
		engines
	}

	pub fn len(&self) -> usize {
		self.folders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.folders.is_empty()
	}

	/// One serial maintenance pass over all folders, pausing briefly
	/// between them.
	pub async fn maintain_all(&self) {
		for (i, engine) in self.folders().iter().enumerate() {
			if i > 0 {
				tokio::time::sleep(INTER_FOLDER_PAUSE).await;
			}
			engine.maintain().await;
		}
	}
}

struct SchedulerControl {
	suspended: AtomicBool,
	shutdown: AtomicBool,
	trigger: Notify,
}

/// Background maintenance loop over one repository.
///
/// The loop sleeps `STARTUP_DELAY` once, then alternates between a full
/// `maintain_all` pass and waiting for either an explicit trigger or the
/// idle timeout. While suspended it keeps waking but runs nothing.
pub struct RepositoryScheduler {
	repository: Arc<FolderRepository>,
	control: Arc<SchedulerControl>,
	task: JoinHandle<()>,
}

impl RepositoryScheduler {
	pub fn start(repository: Arc<FolderRepository>) -> RepositoryScheduler {
		let control = Arc::new(SchedulerControl {
			suspended: AtomicBool::new(false),
			shutdown: AtomicBool::new(false),
			trigger: Notify::new(),
		});
		let task = tokio::spawn(run_loop(repository.clone(), control.clone()));
		RepositoryScheduler { repository, control, task }
	}

	pub fn is_suspended(&self) -> bool {
		self.control.suspended.load(Ordering::SeqCst)
	}

	/// Suspends or resumes maintenance. Resuming wakes the loop at once.
	pub fn set_suspended(&self, suspended: bool) {
		self.control.suspended.store(suspended, Ordering::SeqCst);
		if !suspended {
			self.control.trigger.notify_one();
		}
	}

	/// Wakes the loop for an immediate pass, cutting any wait short.
	pub fn trigger(&self) {
		self.control.trigger.notify_one();
	}

	/// Stops the loop and waits for it to finish. In-progress scans are
	/// asked to abort so the current pass ends quickly.
	pub async fn shutdown(self) {
		self.control.shutdown.store(true, Ordering::SeqCst);
		for engine in self.repository.folders() {
			engine.request_scan_abort();
		}
		self.control.trigger.notify_one();
		if let Err(err) = self.task.await {
			warn!("Maintenance loop ended abnormally: {}", err);
		}
	}
}

async fn run_loop(repository: Arc<FolderRepository>, control: Arc<SchedulerControl>) {
	debug!("Maintenance loop waiting {:?} before the first pass", STARTUP_DELAY);
	tokio::select! {
		_ = tokio::time::sleep(STARTUP_DELAY) => {}
		_ = control.trigger.notified() => {}
	}
	loop {
		if control.shutdown.load(Ordering::SeqCst) {
			break;
		}
		if control.suspended.load(Ordering::SeqCst) {
			debug!("Maintenance suspended, skipping pass");
		} else {
			repository.maintain_all().await;
		}
		tokio::select! {
			_ = tokio::time::sleep(IDLE_TIMEOUT) => {}
			_ = control.trigger.notified() => {}
		}
	}
	debug!("Maintenance loop ended");
}


// vim: ts=4
