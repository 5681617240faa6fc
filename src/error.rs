//! Error types for folder reconciliation

use std::error::Error;
use std::fmt;
use std::io;

/// Scanner-level errors.
///
/// Whole-scan failure modes (device loss, cooperative abort) are not
/// errors; they are reported as `ScanOutcome` variants so callers can
/// distinguish "nothing changed" from "could not determine".
#[derive(Debug)]
pub enum ScanError {
	/// A scan is already running for this folder. Concurrent scans of the
	/// same folder are a contract violation and must fail fast instead of
	/// queueing behind one another.
	AlreadyRunning { folder: String },
}

impl fmt::Display for ScanError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScanError::AlreadyRunning { folder } => {
				write!(f, "Scan already running for folder '{}'", folder)
			}
		}
	}
}

impl Error for ScanError {}

/// Persistence errors for the known-file snapshot
#[derive(Debug)]
pub enum StoreError {
	/// Failed to read or write a snapshot file
	Io { path: String, source: io::Error },

	/// Snapshot content could not be encoded or decoded
	Format { path: String, message: String },
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::Io { path, source } => {
				write!(f, "Snapshot I/O error at {}: {}", path, source)
			}
			StoreError::Format { path, message } => {
				write!(f, "Snapshot format error at {}: {}", path, message)
			}
		}
	}
}

impl Error for StoreError {}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Failed to read the configuration file
	Io { path: String, source: io::Error },

	/// Configuration file did not parse
	Parse { path: String, message: String },

	/// Configuration value is unusable
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Io { path, source } => {
				write!(f, "Cannot read config {}: {}", path, source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Cannot parse config {}: {}", path, message)
			}
			ConfigError::Invalid { message } => write!(f, "Invalid config: {}", message),
		}
	}
}

impl Error for ConfigError {}

/// Sync-profile field-list parsing errors
#[derive(Debug)]
pub enum ProfileError {
	/// Field list text was not parseable
	Parse { field_list: String, message: String },
}

impl fmt::Display for ProfileError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProfileError::Parse { field_list, message } => {
				write!(f, "Cannot parse profile '{}': {}", field_list, message)
			}
		}
	}
}

impl Error for ProfileError {}

/// Engine-level errors for reconciliation operations
#[derive(Debug)]
pub enum EngineError {
	/// Scanner refused or failed
	Scan(ScanError),

	/// Snapshot persistence failed
	Store(StoreError),

	/// Folder settings are unusable
	Config(ConfigError),
}

impl fmt::Display for EngineError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EngineError::Scan(e) => write!(f, "Scan error: {}", e),
			EngineError::Store(e) => write!(f, "Store error: {}", e),
			EngineError::Config(e) => write!(f, "Config error: {}", e),
		}
	}
}

impl Error for EngineError {}

impl From<ScanError> for EngineError {
	fn from(e: ScanError) -> Self {
		EngineError::Scan(e)
	}
}

impl From<StoreError> for EngineError {
	fn from(e: StoreError) -> Self {
		EngineError::Store(e)
	}
}

impl From<ConfigError> for EngineError {
	fn from(e: ConfigError) -> Self {
		EngineError::Config(e)
	}
}

// vim: ts=4
