//! Ignore-pattern filter for folder-relative paths.
//!
//! Each folder carries an `ignore.patterns` file in its system subdirectory;
//! one glob per line, `#` starts a comment. Excluded paths are invisible to
//! the scanner (neither scanned nor reported missing) and are never offered
//! for download. Matching is case-insensitive, mirroring how the patterns
//! behave on the platforms that need them most.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::logging::*;

/// File inside the folder's system subdirectory holding user patterns.
pub const PATTERNS_FILENAME: &str = "ignore.patterns";

/// Shell cruft nobody wants replicated, excluded regardless of user patterns.
const ALWAYS_EXCLUDED: &[&str] = &["**/.DS_Store", "**/Thumbs.db", "**/desktop.ini"];

/// Compiled ignore patterns for one folder.
#[derive(Clone)]
pub struct PathFilter {
	patterns: Vec<String>,
	compiled: GlobSet,
	always: GlobSet,
}

impl PathFilter {
	/// A filter with only the built-in exclusions.
	pub fn empty() -> PathFilter {
		// The built-in patterns are static and known valid
		PathFilter::new(Vec::new()).unwrap_or_else(|_| PathFilter {
			patterns: Vec::new(),
			compiled: GlobSet::empty(),
			always: GlobSet::empty(),
		})
	}

	pub fn new(patterns: Vec<String>) -> Result<PathFilter, ConfigError> {
		let compiled = build_glob_set(&patterns)?;
		let always =
			build_glob_set(&ALWAYS_EXCLUDED.iter().map(|s| s.to_string()).collect::<Vec<_>>())?;
		Ok(PathFilter { patterns, compiled, always })
	}

	/// Loads patterns from `ignore.patterns` under `system_dir`. A missing
	/// file yields the built-in filter; an unreadable one is an error.
	pub fn load(system_dir: &Path) -> Result<PathFilter, ConfigError> {
		let path = system_dir.join(PATTERNS_FILENAME);
		if !path.exists() {
			return PathFilter::new(Vec::new());
		}
		let text = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
			path: path.display().to_string(),
			source: e,
		})?;
		let patterns: Vec<String> = text
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty() && !line.starts_with('#'))
			.map(str::to_string)
			.collect();
		debug!("Loaded {} ignore patterns from {}", patterns.len(), path.display());
		PathFilter::new(patterns)
	}

	/// Writes the current user patterns back to `system_dir`, creating the
	/// directory when missing.
	pub fn save(&self, system_dir: &Path) -> Result<(), ConfigError> {
		if !system_dir.exists() {
			fs::create_dir_all(system_dir).map_err(|e| ConfigError::Io {
				path: system_dir.display().to_string(),
				source: e,
			})?;
		}
		let path = system_dir.join(PATTERNS_FILENAME);
		let mut text = String::new();
		for pattern in &self.patterns {
			text.push_str(pattern);
			text.push('\n');
		}
		fs::write(&path, text)
			.map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })
	}

	/// Adds a pattern and recompiles. Duplicate patterns are ignored.
	pub fn add_pattern(&mut self, pattern: &str) -> Result<(), ConfigError> {
		if self.patterns.iter().any(|p| p == pattern) {
			return Ok(());
		}
		let mut patterns = self.patterns.clone();
		patterns.push(pattern.to_string());
		self.compiled = build_glob_set(&patterns)?;
		self.patterns = patterns;
		Ok(())
	}

	/// Removes a pattern and recompiles. Unknown patterns are a no-op.
	pub fn remove_pattern(&mut self, pattern: &str) -> Result<(), ConfigError> {
		let before = self.patterns.len();
		let patterns: Vec<String> =
			self.patterns.iter().filter(|p| p.as_str() != pattern).cloned().collect();
		if patterns.len() == before {
			return Ok(());
		}
		self.compiled = build_glob_set(&patterns)?;
		self.patterns = patterns;
		Ok(())
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	/// True when a folder-relative path should be invisible to the engine.
	pub fn is_excluded(&self, rel_path: &str) -> bool {
		let path = Path::new(rel_path);
		self.always.is_match(path) || self.compiled.is_match(path)
	}
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ConfigError> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = GlobBuilder::new(pattern)
			.case_insensitive(true)
			.build()
			.map_err(|e| ConfigError::Invalid { message: format!("{}: {}", pattern, e) })?;
		builder.add(glob);
	}
	builder
		.build()
		.map_err(|e| ConfigError::Invalid { message: format!("pattern set: {}", e) })
}


// vim: ts=4
