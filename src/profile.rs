//! Synchronization policy profiles.
//!
//! A `SyncProfile` bundles the four propagation flags (auto-download and
//! deletion-sync, each split by friend / other trust class) with a scan
//! schedule. Profiles are plain values compared structurally; a handful of
//! canonical ones cover the usual setups and anything else is a custom
//! configuration.
//!
//! Profiles persist as a comma-separated field list in the order
//! `autoDownloadFriends,autoDownloadOthers,syncDeleteFriends,
//! syncDeleteOthers,interval,dailyHour,dailyDay,unit`. Parsing is tolerant:
//! missing trailing fields take their defaults, so field lists written by
//! older versions keep loading. A bare canonical name is accepted too.

use chrono::{Datelike, Local, TimeZone, Timelike, Weekday};
use std::fmt;

use crate::error::ProfileError;

/// Hour of day a daily schedule runs at when none is configured.
pub const DAILY_HOUR_DEFAULT: u32 = 12;

/// Unit of a periodic scan interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
	Seconds,
	Minutes,
	Hours,
}

impl TimeUnit {
	fn token(self) -> &'static str {
		match self {
			TimeUnit::Seconds => "s",
			TimeUnit::Minutes => "m",
			TimeUnit::Hours => "h",
		}
	}

	fn seconds(self, interval: u32) -> i64 {
		let interval = i64::from(interval);
		match self {
			TimeUnit::Seconds => interval,
			TimeUnit::Minutes => interval * 60,
			TimeUnit::Hours => interval * 3600,
		}
	}
}

/// Day rule of a daily schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyDay {
	Every,
	Weekdays,
	Weekend,
	On(Weekday),
}

impl DailyDay {
	fn token(self) -> String {
		match self {
			DailyDay::Every => "every".to_string(),
			DailyDay::Weekdays => "weekdays".to_string(),
			DailyDay::Weekend => "weekend".to_string(),
			DailyDay::On(day) => day.to_string().to_lowercase(),
		}
	}

	fn matches(self, day: Weekday) -> bool {
		let weekend = day == Weekday::Sat || day == Weekday::Sun;
		match self {
			DailyDay::Every => true,
			DailyDay::Weekdays => !weekend,
			DailyDay::Weekend => weekend,
			DailyDay::On(wanted) => day == wanted,
		}
	}
}

/// When automatic scans are allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
	/// Only forced scans run
	Manual,

	/// Scan whenever at least `interval` of `unit` passed since the last scan
	Periodic { interval: u32, unit: TimeUnit },

	/// Scan once per matching day, after `hour` local time
	Daily { hour: u32, day: DailyDay },
}

impl Schedule {
	/// Whether an automatic scan is due. A folder that has never been
	/// scanned is always due unless the schedule is manual. Daily schedules
	/// run at most once per calendar day.
	pub fn is_due(&self, last_scan_ms: Option<i64>, now_ms: i64) -> bool {
		match *self {
			Schedule::Manual => false,
			Schedule::Periodic { interval, unit } => match last_scan_ms {
				None => true,
				Some(last) => (now_ms - last) / 1000 >= unit.seconds(interval),
			},
			Schedule::Daily { hour, day } => {
				let last = match last_scan_ms {
					None => return true,
					Some(last) => last,
				};
				let now = match Local.timestamp_millis_opt(now_ms).earliest() {
					Some(now) => now,
					None => return false,
				};
				let last = match Local.timestamp_millis_opt(last).earliest() {
					Some(last) => last,
					None => return true,
				};
				if last.year() == now.year() && last.ordinal() == now.ordinal() {
					// already scanned today
					return false;
				}
				now.hour() >= hour && day.matches(now.weekday())
			}
		}
	}
}

/// Immutable synchronization policy for one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProfile {
	/// Download newer versions from friends without asking
	pub auto_download_friends: bool,

	/// Download newer versions from non-friends without asking
	pub auto_download_others: bool,

	/// Propagate deletions announced by friends
	pub sync_deletion_friends: bool,

	/// Propagate deletions announced by non-friends
	pub sync_deletion_others: bool,

	pub schedule: Schedule,
}

impl SyncProfile {
	/// Nothing happens without the user asking for it.
	pub fn manual() -> SyncProfile {
		SyncProfile {
			auto_download_friends: false,
			auto_download_others: false,
			sync_deletion_friends: false,
			sync_deletion_others: false,
			schedule: Schedule::Manual,
		}
	}

	/// Full mirror: everything propagates, scans every minute.
	pub fn synchronize() -> SyncProfile {
		SyncProfile {
			auto_download_friends: true,
			auto_download_others: true,
			sync_deletion_friends: true,
			sync_deletion_others: true,
			schedule: Schedule::Periodic { interval: 1, unit: TimeUnit::Minutes },
		}
	}

	/// Offers local changes aggressively, takes nothing from peers.
	pub fn backup_source() -> SyncProfile {
		SyncProfile {
			auto_download_friends: false,
			auto_download_others: false,
			sync_deletion_friends: false,
			sync_deletion_others: false,
			schedule: Schedule::Periodic { interval: 1, unit: TimeUnit::Minutes },
		}
	}

	/// Takes everything from peers, scans its own disk rarely.
	pub fn backup_target() -> SyncProfile {
		SyncProfile {
			auto_download_friends: true,
			auto_download_others: true,
			sync_deletion_friends: true,
			sync_deletion_others: true,
			schedule: Schedule::Periodic { interval: 1, unit: TimeUnit::Hours },
		}
	}

	/// Deletions propagate between collaborators, downloads stay manual.
	pub fn project_work() -> SyncProfile {
		SyncProfile {
			auto_download_friends: false,
			auto_download_others: false,
			sync_deletion_friends: true,
			sync_deletion_others: true,
			schedule: Schedule::Manual,
		}
	}

	/// Preview-only membership, same configuration as `manual`.
	pub fn no_sync() -> SyncProfile {
		SyncProfile::manual()
	}

	/// Canonical profiles in resolution order.
	pub fn canonical() -> [(&'static str, SyncProfile); 6] {
		[
			("manual", SyncProfile::manual()),
			("synchronize", SyncProfile::synchronize()),
			("backup-source", SyncProfile::backup_source()),
			("backup-target", SyncProfile::backup_target()),
			("project-work", SyncProfile::project_work()),
			("no-sync", SyncProfile::no_sync()),
		]
	}

	/// The canonical name of this profile, if its configuration matches one.
	/// `no-sync` shares the `manual` configuration and resolves to `manual`.
	pub fn canonical_name(&self) -> Option<&'static str> {
		SyncProfile::canonical()
			.iter()
			.find(|(_, profile)| profile == self)
			.map(|(name, _)| *name)
	}

	pub fn auto_download(&self) -> bool {
		self.auto_download_friends || self.auto_download_others
	}

	pub fn sync_deletion(&self) -> bool {
		self.sync_deletion_friends || self.sync_deletion_others
	}

	/// Serializes this profile into its comma-separated field list.
	pub fn field_list(&self) -> String {
		let (interval, daily_hour, daily_day, unit) = match self.schedule {
			Schedule::Manual => (0, DAILY_HOUR_DEFAULT, DailyDay::Every, "m".to_string()),
			Schedule::Periodic { interval, unit } => {
				(interval, DAILY_HOUR_DEFAULT, DailyDay::Every, unit.token().to_string())
			}
			Schedule::Daily { hour, day } => (1, hour, day, "d".to_string()),
		};
		format!(
			"{},{},{},{},{},{},{},{}",
			self.auto_download_friends,
			self.auto_download_others,
			self.sync_deletion_friends,
			self.sync_deletion_others,
			interval,
			daily_hour,
			daily_day.token(),
			unit
		)
	}

	/// Parses a canonical profile name or a field list. Missing trailing
	/// fields take their defaults; malformed numbers or unknown tokens are
	/// errors.
	pub fn parse(text: &str) -> Result<SyncProfile, ProfileError> {
		let trimmed = text.trim();
		if !trimmed.contains(',') {
			let name = if trimmed == "mirror" { "synchronize" } else { trimmed };
			if let Some((_, profile)) =
				SyncProfile::canonical().iter().find(|(canonical, _)| *canonical == name)
			{
				return Ok(*profile);
			}
		}

		let mut fields = trimmed.split(',').map(str::trim);
		let mut next_bool = || fields.next().map(|t| t.eq_ignore_ascii_case("true"));

		let auto_download_friends = next_bool().unwrap_or(false);
		let auto_download_others = next_bool().unwrap_or(false);
		let sync_deletion_friends = next_bool().unwrap_or(false);
		let sync_deletion_others = next_bool().unwrap_or(false);

		let interval = parse_number(trimmed, fields.next(), 0)?;
		let daily_hour = parse_number(trimmed, fields.next(), DAILY_HOUR_DEFAULT)?;
		let daily_day = parse_daily_day(trimmed, fields.next())?;
		let unit_token = fields.next().unwrap_or("m");

		let schedule = match unit_token {
			"d" | "D" => Schedule::Daily { hour: daily_hour, day: daily_day },
			_ if interval == 0 => Schedule::Manual,
			_ => Schedule::Periodic { interval, unit: parse_unit(trimmed, unit_token)? },
		};

		Ok(SyncProfile {
			auto_download_friends,
			auto_download_others,
			sync_deletion_friends,
			sync_deletion_others,
			schedule,
		})
	}
}

impl Default for SyncProfile {
	fn default() -> Self {
		SyncProfile::manual()
	}
}

impl fmt::Display for SyncProfile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.canonical_name() {
			Some(name) => write!(f, "{}", name),
			None => write!(f, "custom({})", self.field_list()),
		}
	}
}

fn parse_number(field_list: &str, token: Option<&str>, default: u32) -> Result<u32, ProfileError> {
	match token {
		None | Some("") => Ok(default),
		Some(token) => token.parse().map_err(|_| ProfileError::Parse {
			field_list: field_list.to_string(),
			message: format!("not a number: '{}'", token),
		}),
	}
}

fn parse_daily_day(field_list: &str, token: Option<&str>) -> Result<DailyDay, ProfileError> {
	let token = match token {
		None | Some("") => return Ok(DailyDay::Every),
		Some(token) => token,
	};
	match token.to_ascii_lowercase().as_str() {
		"every" => Ok(DailyDay::Every),
		"weekdays" => Ok(DailyDay::Weekdays),
		"weekend" => Ok(DailyDay::Weekend),
		other => match other.parse::<Weekday>() {
			Ok(day) => Ok(DailyDay::On(day)),
			Err(_) => Err(ProfileError::Parse {
				field_list: field_list.to_string(),
				message: format!("unknown day rule: '{}'", token),
			}),
		},
	}
}

fn parse_unit(field_list: &str, token: &str) -> Result<TimeUnit, ProfileError> {
	match token.to_ascii_lowercase().as_str() {
		"s" => Ok(TimeUnit::Seconds),
		"m" => Ok(TimeUnit::Minutes),
		"h" => Ok(TimeUnit::Hours),
		other => Err(ProfileError::Parse {
			field_list: field_list.to_string(),
			message: format!("unknown time unit: '{}'", other),
		}),
	}
}


// vim: ts=4
