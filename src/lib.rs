//! # foldr - Peer-to-Peer Folder Reconciliation
//!
//! foldr keeps a local folder in step with the versioned file records
//! announced by other members of the same shared folder. Every file carries
//! a logical version number next to its modification date, so conflicting
//! edits are ordered by who bumped the version, not by whose clock runs
//! ahead.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use foldr::config::{FolderSettings, RepositoryConfig};
//! use foldr::repository::FolderRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RepositoryConfig::load("folders.toml".as_ref())?;
//!     let repository = FolderRepository::open(&config, uuid::Uuid::new_v4()).await;
//!     repository.maintain_all().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Mounting a Single Folder
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use foldr::config::FolderSettings;
//! use foldr::engine::{Collaborators, FolderEngine};
//! use foldr::store::JsonRecordStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = FolderSettings {
//!         id: "docs".to_string(),
//!         base: "./docs".into(),
//!         ..FolderSettings::default()
//!     };
//!     let store = Arc::new(JsonRecordStore::new(settings.system_dir()));
//!     let engine =
//!         FolderEngine::mount(settings, uuid::Uuid::new_v4(), Collaborators::new(store)).await?;
//!     engine.scan_local_files(true).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod events;
pub mod filter;
pub mod holder;
pub mod logging;
pub mod members;
pub mod messages;
pub mod problems;
pub mod profile;
pub mod record;
pub mod repository;
pub mod scan_result;
pub mod scanner;
pub mod stats;
pub mod store;
pub mod tree;
pub mod util;

// Re-export commonly used types and functions
pub use config::{FolderSettings, RepositoryConfig};
pub use engine::{Collaborators, FolderEngine, RemoteVerdict};
pub use error::{ConfigError, EngineError, ProfileError, ScanError, StoreError};
pub use profile::SyncProfile;
pub use record::{FileRecord, MemberId};
pub use repository::{FolderRepository, RepositoryScheduler};

// vim: ts=4
