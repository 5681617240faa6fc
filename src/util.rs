//! Small time and path helpers shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

/// Margin applied when comparing filesystem timestamps. Some filesystems
/// round modification times to two-second resolution, so two stamps within
/// this margin describe the same write.
pub const FILE_DATE_MARGIN_MS: i64 = 2000;

/// Converts a filesystem timestamp to unix milliseconds.
/// Times before the epoch clamp to the (negative) millisecond offset.
pub fn system_time_to_millis(t: SystemTime) -> i64 {
	match t.duration_since(UNIX_EPOCH) {
		Ok(d) => d.as_millis() as i64,
		Err(e) => -(e.duration().as_millis() as i64),
	}
}

/// Current time in unix milliseconds.
pub fn now_millis() -> i64 {
	system_time_to_millis(SystemTime::now())
}

/// True if the two file times are the same within the cross-platform margin.
pub fn equals_file_date(a_ms: i64, b_ms: i64) -> bool {
	if a_ms == b_ms {
		return true;
	}
	(a_ms - b_ms).abs() <= FILE_DATE_MARGIN_MS
}

/// True if `a_ms` is newer than `b_ms` beyond the cross-platform margin.
pub fn is_newer_file_date(a_ms: i64, b_ms: i64) -> bool {
	if a_ms == b_ms {
		return false;
	}
	a_ms - b_ms > FILE_DATE_MARGIN_MS
}

/// Joins a directory prefix and a file name into a folder-relative path.
/// Relative paths always use '/' regardless of platform.
pub fn join_relative(dir: &str, name: &str) -> String {
	if dir.is_empty() {
		name.to_string()
	} else {
		format!("{}/{}", dir, name)
	}
}

/// The final path segment of a folder-relative path.
pub fn filename_of(rel_path: &str) -> &str {
	match rel_path.rfind('/') {
		Some(idx) => &rel_path[idx + 1..],
		None => rel_path,
	}
}

/// The directory prefix of a folder-relative path, empty for root entries.
pub fn parent_of(rel_path: &str) -> &str {
	match rel_path.rfind('/') {
		Some(idx) => &rel_path[..idx],
		None => "",
	}
}
