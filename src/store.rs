//! Known-file snapshot persistence.
//!
//! The engine persists its authoritative record set after every mutation
//! batch through `RecordStore`. The JSON file implementation keeps a primary
//! snapshot and a backup copy in the folder's system subdirectory; the backup
//! is only refreshed after the primary write succeeded, so at least one
//! readable snapshot survives a crash mid-write.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::logging::*;
use crate::record::FileRecord;

/// Primary snapshot filename inside the system subdirectory
pub const DB_FILENAME: &str = "db.json";
/// Backup snapshot filename
pub const DB_BACKUP_FILENAME: &str = "db.json.bak";
/// In-progress write, renamed into place once complete
const DB_WRITING_SUFFIX: &str = ".writing";

/// Persistence seam for one folder's known-file set.
#[async_trait]
pub trait RecordStore: Send + Sync {
	/// Loads the persisted snapshot. An absent snapshot is an empty folder,
	/// not an error.
	async fn load(&self, folder_id: &str) -> Result<Vec<FileRecord>, StoreError>;

	/// Persists the complete record set, replacing any previous snapshot.
	async fn store(&self, folder_id: &str, records: &[FileRecord]) -> Result<(), StoreError>;
}

/// File-backed store writing JSON snapshots into one directory.
pub struct JsonRecordStore {
	dir: PathBuf,
}

impl JsonRecordStore {
	/// `dir` is the folder's system subdirectory; it is created on first
	/// store if missing.
	pub fn new(dir: PathBuf) -> JsonRecordStore {
		JsonRecordStore { dir }
	}

	pub fn db_path(&self) -> PathBuf {
		self.dir.join(DB_FILENAME)
	}

	pub fn backup_path(&self) -> PathBuf {
		self.dir.join(DB_BACKUP_FILENAME)
	}

	/// Reads one snapshot file. `Ok(None)` means the file does not exist.
	async fn read_snapshot(&self, path: &Path) -> Result<Option<Vec<FileRecord>>, StoreError> {
		let contents = match tokio::fs::read_to_string(path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(StoreError::Io { path: path.display().to_string(), source: e })
			}
		};

		serde_json::from_str(&contents).map(Some).map_err(|e| StoreError::Format {
			path: path.display().to_string(),
			message: e.to_string(),
		})
	}
}

#[async_trait]
impl RecordStore for JsonRecordStore {
	async fn load(&self, folder_id: &str) -> Result<Vec<FileRecord>, StoreError> {
		let primary = self.db_path();
		let primary_err = match self.read_snapshot(&primary).await {
			Ok(Some(records)) => {
				debug!("Loaded {} records for folder '{}'", records.len(), folder_id);
				return Ok(records);
			}
			Ok(None) => None,
			Err(e) => {
				warn!("Snapshot for folder '{}' unreadable, trying backup: {}", folder_id, e);
				Some(e)
			}
		};

		match self.read_snapshot(&self.backup_path()).await {
			Ok(Some(records)) => {
				info!(
					"Loaded {} records for folder '{}' from backup snapshot",
					records.len(),
					folder_id
				);
				Ok(records)
			}
			Ok(None) => match primary_err {
				// the primary exists but is broken and there is no backup
				Some(e) => Err(e),
				None => {
					debug!("No snapshot for folder '{}', starting empty", folder_id);
					Ok(Vec::new())
				}
			},
			Err(backup_err) => Err(primary_err.unwrap_or(backup_err)),
		}
	}

	async fn store(&self, folder_id: &str, records: &[FileRecord]) -> Result<(), StoreError> {
		if !self.dir.exists() {
			tokio::fs::create_dir_all(&self.dir).await.map_err(|e| StoreError::Io {
				path: self.dir.display().to_string(),
				source: e,
			})?;
		}

		let primary = self.db_path();
		let json = serde_json::to_string(records).map_err(|e| StoreError::Format {
			path: primary.display().to_string(),
			message: e.to_string(),
		})?;

		// Write to a temp file and rename, so a crash mid-write never
		// leaves a truncated primary.
		let writing = self.dir.join(format!("{}{}", DB_FILENAME, DB_WRITING_SUFFIX));
		tokio::fs::write(&writing, &json).await.map_err(|e| StoreError::Io {
			path: writing.display().to_string(),
			source: e,
		})?;
		tokio::fs::rename(&writing, &primary).await.map_err(|e| StoreError::Io {
			path: primary.display().to_string(),
			source: e,
		})?;

		// The backup is refreshed only after the primary write succeeded.
		// Losing the copy is not fatal; the primary is already durable.
		if let Err(e) = tokio::fs::copy(&primary, self.backup_path()).await {
			warn!("Failed to refresh backup snapshot for folder '{}': {}", folder_id, e);
		}

		debug!("Stored {} records for folder '{}'", records.len(), folder_id);
		Ok(())
	}
}


// vim: ts=4
