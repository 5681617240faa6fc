//! Filename portability checks.
//!
//! Folders synchronize across operating systems, so names legal on the
//! scanning platform can still be unusable on a peer. Detection is advisory:
//! problems are reported alongside the scan result and never stop a file
//! from being tracked.

use std::collections::BTreeMap;
use std::fmt;

/// Filenames Windows reserves for devices, matched case-insensitively with
/// the extension stripped ("AUX.txt" is still reserved).
const RESERVED_WINDOWS_WORDS: &[&str] = &[
	"con", "prn", "aux", "clock$", "nul", "com0", "com1", "com2", "com3", "com4", "com5", "com6",
	"com7", "com8", "com9", "lpt0", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7",
	"lpt8", "lpt9",
];

const MAX_FILENAME_LENGTH: usize = 255;

const ILLEGAL_WINDOWS_CHARS: &[char] =
	&['\\', '/', '?', '*', '<', '"', ':', '>', '+', '[', ']'];

/// One portability problem with a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameProblem {
	/// Name longer than 255 characters
	ToLong,
	/// Contains characters Windows cannot store
	ContainsIllegalWindowsChars,
	/// Contains characters macOS cannot store
	ContainsIllegalMacosChars,
	/// Contains characters Linux cannot store
	ContainsIllegalLinuxChars,
	/// Ends with '.' or space, which Windows strips
	EndsWithIllegalChar,
	/// Matches a reserved Windows device name
	IsReservedWindowsWord,
	/// Differs from another scanned path only by letter case
	DuplicateCaseCollision,
}

impl fmt::Display for FilenameProblem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			FilenameProblem::ToLong => "filename longer than 255 characters",
			FilenameProblem::ContainsIllegalWindowsChars => {
				"contains characters illegal on Windows"
			}
			FilenameProblem::ContainsIllegalMacosChars => "contains characters illegal on macOS",
			FilenameProblem::ContainsIllegalLinuxChars => "contains characters illegal on Linux",
			FilenameProblem::EndsWithIllegalChar => "ends with '.' or space",
			FilenameProblem::IsReservedWindowsWord => "reserved Windows device name",
			FilenameProblem::DuplicateCaseCollision => {
				"collides with another file differing only by case"
			}
		};
		f.write_str(text)
	}
}

/// Checks one filename (the last path segment) for portability problems.
/// Case collisions need the whole scan and are handled separately.
pub fn check_filename(filename: &str) -> Vec<FilenameProblem> {
	let mut problems = Vec::new();
	if is_to_long(filename) {
		problems.push(FilenameProblem::ToLong);
	}
	if contains_illegal_windows_chars(filename) {
		problems.push(FilenameProblem::ContainsIllegalWindowsChars);
	}
	if contains_illegal_macos_chars(filename) {
		problems.push(FilenameProblem::ContainsIllegalMacosChars);
	}
	if contains_illegal_linux_chars(filename) {
		problems.push(FilenameProblem::ContainsIllegalLinuxChars);
	}
	if ends_with_illegal_char(filename) {
		problems.push(FilenameProblem::EndsWithIllegalChar);
	}
	if is_reserved_windows_word(filename) {
		problems.push(FilenameProblem::IsReservedWindowsWord);
	}
	problems
}

pub fn is_to_long(filename: &str) -> bool {
	filename.chars().count() > MAX_FILENAME_LENGTH
}

pub fn contains_illegal_windows_chars(filename: &str) -> bool {
	filename.chars().any(|c| (c as u32) < 32 || ILLEGAL_WINDOWS_CHARS.contains(&c))
}

pub fn contains_illegal_macos_chars(filename: &str) -> bool {
	filename.contains('/') || filename.contains(':')
}

pub fn contains_illegal_linux_chars(filename: &str) -> bool {
	filename.contains('/')
}

pub fn ends_with_illegal_char(filename: &str) -> bool {
	filename.ends_with('.') || filename.ends_with(' ')
}

pub fn is_reserved_windows_word(filename: &str) -> bool {
	let stripped = match filename.rfind('.') {
		Some(idx) => &filename[..idx],
		None => filename,
	};
	let lower = stripped.to_lowercase();
	RESERVED_WINDOWS_WORDS.contains(&lower.as_str())
}

/// Groups scanned paths that differ only by letter case. Every member of a
/// colliding group is reported, since any of them could be "the" file on a
/// case-insensitive filesystem.
pub fn find_case_collisions(rel_paths: &[String]) -> Vec<String> {
	let mut by_lower: BTreeMap<String, Vec<&String>> = BTreeMap::new();
	for path in rel_paths {
		by_lower.entry(path.to_lowercase()).or_default().push(path);
	}
	let mut collisions = Vec::new();
	for group in by_lower.values() {
		if group.len() > 1 {
			for path in group {
				collisions.push((*path).clone());
			}
		}
	}
	collisions
}


// vim: ts=4
