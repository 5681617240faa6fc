//! Folder and repository settings.
//!
//! Settings are plain serde structs loaded from a single config file, JSON5
//! (lenient, comments allowed) or TOML picked by file extension. Every field
//! has a default so partial configs stay valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::profile::SyncProfile;
use crate::record::MemberId;

/// Default name of the reserved per-folder state subdirectory.
pub const SYSTEM_SUBDIR_DEFAULT: &str = ".foldr";

/// Configuration of one shared folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FolderSettings {
	/// Stable folder identity, shared by every member of the folder
	pub id: String,

	/// Human-readable name; falls back to the id when empty
	pub name: String,

	/// Local base directory of the folder
	pub base: PathBuf,

	/// Sync profile, as a canonical profile name or a full field list
	pub profile: String,

	/// Name of the system subdirectory holding the database snapshot and
	/// ignore patterns. Never scanned.
	pub system_subdir: String,
}

impl Default for FolderSettings {
	fn default() -> Self {
		FolderSettings {
			id: String::new(),
			name: String::new(),
			base: PathBuf::from("."),
			profile: "manual".to_string(),
			system_subdir: SYSTEM_SUBDIR_DEFAULT.to_string(),
		}
	}
}

impl FolderSettings {
	/// The folder's system subdirectory on disk.
	pub fn system_dir(&self) -> PathBuf {
		self.base.join(&self.system_subdir)
	}

	/// Display name: the configured name, or the id when none is set.
	pub fn title(&self) -> &str {
		if self.name.is_empty() {
			&self.id
		} else {
			&self.name
		}
	}

	/// The parsed sync profile.
	pub fn sync_profile(&self) -> Result<SyncProfile, ConfigError> {
		SyncProfile::parse(&self.profile)
			.map_err(|e| ConfigError::Invalid { message: e.to_string() })
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.id.is_empty() {
			return Err(ConfigError::Invalid { message: "folder id must not be empty".to_string() });
		}
		if self.system_subdir.is_empty() || self.system_subdir.contains('/') {
			return Err(ConfigError::Invalid {
				message: format!(
					"folder '{}': system subdirectory must be a plain directory name",
					self.id
				),
			});
		}
		self.sync_profile()?;
		Ok(())
	}
}

/// Top-level configuration: every folder this node takes part in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryConfig {
	/// Stable identity of this node. Version bumps made here carry it as
	/// the modifier, so it should survive restarts; a random one is used
	/// when unset.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub node_id: Option<MemberId>,

	pub folders: Vec<FolderSettings>,
}

impl RepositoryConfig {
	/// Loads a config file, picking the parser by extension (`.toml` is
	/// TOML, everything else is treated as JSON5).
	pub fn load(path: &Path) -> Result<RepositoryConfig, ConfigError> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })?;

		let config: RepositoryConfig = if has_extension(path, "toml") {
			toml::from_str(&text).map_err(|e| ConfigError::Parse {
				path: path.display().to_string(),
				message: e.to_string(),
			})?
		} else {
			json5::from_str(&text).map_err(|e| ConfigError::Parse {
				path: path.display().to_string(),
				message: e.to_string(),
			})?
		};

		config.validate()?;
		Ok(config)
	}

	pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
		let text = if has_extension(path, "toml") {
			toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
				message: format!("cannot encode config: {}", e),
			})?
		} else {
			// plain JSON is valid JSON5
			serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
				message: format!("cannot encode config: {}", e),
			})?
		};
		std::fs::write(path, text)
			.map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		for folder in &self.folders {
			folder.validate()?;
		}
		for (i, folder) in self.folders.iter().enumerate() {
			if self.folders[..i].iter().any(|f| f.id == folder.id) {
				return Err(ConfigError::Invalid {
					message: format!("duplicate folder id '{}'", folder.id),
				});
			}
		}
		Ok(())
	}
}

fn has_extension(path: &Path, ext: &str) -> bool {
	path.extension().map(|e| e.eq_ignore_ascii_case(ext)).unwrap_or(false)
}


// vim: ts=4
