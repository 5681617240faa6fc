use clap::{Arg, Command};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use foldr::config::{RepositoryConfig, SYSTEM_SUBDIR_DEFAULT};
use foldr::filter::PathFilter;
use foldr::record::MemberId;
use foldr::repository::{FolderRepository, RepositoryScheduler};
use foldr::scan_result::ScanOutcome;
use foldr::scanner::DirectoryScanner;
use foldr::store::{JsonRecordStore, RecordStore};

fn config_arg() -> Arg {
	Arg::new("config")
		.short('c')
		.long("config")
		.value_name("FILE")
		.default_value("folders.toml")
		.help("Repository configuration file")
}

fn node_id(config: &RepositoryConfig) -> MemberId {
	config.node_id.unwrap_or_else(uuid::Uuid::new_v4)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	foldr::logging::init_tracing();

	let matches = Command::new("foldr")
		.version("0.1.0")
		.about("Peer-to-peer folder reconciliation")
		.subcommand_required(true)
		.subcommand(
			Command::new("scan")
				.about("Scan folders and update their databases")
				.arg(config_arg())
				.arg(
					Arg::new("folder")
						.value_name("FOLDER")
						.help("Folder id or name; all folders when omitted"),
				),
		)
		.subcommand(
			Command::new("dump")
				.about("Dump the stored file records of a folder")
				.arg(Arg::new("dir").required(true).value_name("DIR")),
		)
		.subcommand(
			Command::new("check")
				.about("Check a directory tree for problematic filenames")
				.arg(Arg::new("dir").required(true).value_name("DIR")),
		)
		.subcommand(
			Command::new("run")
				.about("Maintain all configured folders until interrupted")
				.arg(config_arg()),
		)
		.get_matches();

	if let Some(sub) = matches.subcommand_matches("scan") {
		let path = sub.get_one::<String>("config").ok_or("scan: config file required")?;
		let config = RepositoryConfig::load(Path::new(path))?;
		let repository = FolderRepository::open(&config, node_id(&config)).await;
		let engines = match sub.get_one::<String>("folder") {
			Some(key) => {
				vec![repository.find(key).ok_or_else(|| format!("No folder named '{}'", key))?]
			}
			None => repository.folders(),
		};
		if engines.is_empty() {
			return Err("No folders configured".into());
		}
		for engine in engines {
			engine.scan_local_files(true).await?;
			println!("{}: {}", engine.title(), engine.stats().await);
		}
	} else if let Some(sub) = matches.subcommand_matches("dump") {
		let dir = sub.get_one::<String>("dir").ok_or("dump: directory argument required")?;
		let store = JsonRecordStore::new(PathBuf::from(dir).join(SYSTEM_SUBDIR_DEFAULT));
		let records = store.load(dir).await?;
		for record in &records {
			println!("{}", record);
		}
		eprintln!("{} records", records.len());
	} else if let Some(sub) = matches.subcommand_matches("check") {
		let dir = sub.get_one::<String>("dir").ok_or("check: directory argument required")?;
		let scanner = DirectoryScanner::new("check", SYSTEM_SUBDIR_DEFAULT, uuid::Uuid::new_v4());
		let outcome = scanner.scan(Path::new(dir), BTreeMap::new(), PathFilter::empty()).await?;
		let result = match outcome {
			ScanOutcome::Scanned(result) => result,
			ScanOutcome::Aborted => return Err("Scan aborted".into()),
			ScanOutcome::HardwareFailure => {
				return Err(format!("Cannot read directory {}", dir).into())
			}
		};
		for (path, problems) in &result.problems {
			for problem in problems {
				println!("{}: {}", path, problem);
			}
		}
		if result.problems.is_empty() {
			eprintln!("No filename problems in {} files", result.total_files);
		} else {
			return Err(format!("{} files with problematic names", result.problems.len()).into());
		}
	} else if let Some(sub) = matches.subcommand_matches("run") {
		let path = sub.get_one::<String>("config").ok_or("run: config file required")?;
		let config = RepositoryConfig::load(Path::new(path))?;
		let repository = Arc::new(FolderRepository::open(&config, node_id(&config)).await);
		if repository.is_empty() {
			return Err("No folders configured".into());
		}
		let scheduler = RepositoryScheduler::start(repository.clone());
		scheduler.trigger();
		tokio::signal::ctrl_c().await?;
		eprintln!("Interrupted, shutting down");
		scheduler.shutdown().await;
	}

	Ok(())
}

// vim: ts=4
