//! Sync command handler.
//!
//! Drives the whole run: resolve settings, load the sizing table, then for
//! each row find the service directory under the configured roots and patch
//! every manifest directly inside it. Manifests are rewritten only when a
//! patch actually changed them.

use std::{
	fs,
	io::Write,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Args;
use k8s::Sizing;
use tracing::{debug, warn};

use crate::{
	config::{RessyncConfig, Settings},
	discover,
	sheet::{self, SheetRow},
};

#[derive(Args)]
pub struct SyncArgs {
	/// Path to the sizing table (overrides the configured one)
	pub table: Option<String>,

	/// Root directory containing one subdirectory per service. Repeatable;
	/// the first root containing a matching subdirectory wins.
	#[arg(short = 'r', long = "root")]
	pub roots: Vec<String>,

	/// Config file to use instead of searching for .ressync.yaml upwards
	#[arg(long)]
	pub config: Option<String>,

	/// Log level (possible values: error, warn, info, debug, trace)
	#[arg(long, default_value = "info")]
	pub log_level: String,
}

/// Tallies collected over one run, reported in the closing summary.
#[derive(Debug, Default)]
struct SyncResult {
	rows_applied: usize,
	files_updated: Vec<PathBuf>,
	missing_services: Vec<String>,
	files_skipped: usize,
}

/// Run the sync command.
pub fn run<W: Write>(args: SyncArgs, mut writer: W) -> Result<()> {
	let file_config = match &args.config {
		Some(path) => Some(RessyncConfig::load_from_file(Path::new(path))?),
		None => RessyncConfig::load_from_directory(Path::new("."))?,
	};
	let settings = Settings::resolve(args.table.as_deref(), &args.roots, file_config.as_ref());

	let rows = sheet::load_rows(&settings.table)?;
	writeln!(
		writer,
		"syncing {} services from {}",
		rows.len(),
		settings.table.display()
	)?;

	let result = apply_rows(&rows, &settings.roots, &mut writer)?;

	writeln!(
		writer,
		"{} of {} services applied, {} files updated",
		result.rows_applied,
		rows.len(),
		result.files_updated.len()
	)?;
	if !result.missing_services.is_empty() {
		writeln!(
			writer,
			"{} services had no manifest directory",
			result.missing_services.len()
		)?;
	}
	if result.files_skipped > 0 {
		writeln!(writer, "{} files skipped due to errors", result.files_skipped)?;
	}

	Ok(())
}

fn apply_rows<W: Write>(
	rows: &[SheetRow],
	roots: &[PathBuf],
	writer: &mut W,
) -> Result<SyncResult> {
	let mut result = SyncResult::default();

	for row in rows {
		writeln!(
			writer,
			"{}: cpu={} memory={} storage={}",
			row.service,
			display_or_dash(row.sizing.cpu.as_deref()),
			display_or_dash(row.sizing.memory.as_deref()),
			display_or_dash(row.sizing.storage.as_deref())
		)?;

		let Some(dir) = discover::find_service_dir(roots, &row.service) else {
			warn!(service = %row.service, "no service directory under any root");
			writeln!(writer, "  ✗ no directory found for '{}'", row.service)?;
			result.missing_services.push(row.service.clone());
			continue;
		};

		let files = discover::manifest_files(&dir);
		if files.is_empty() {
			writeln!(writer, "  ✗ no manifests in {}", dir.display())?;
			continue;
		}

		for path in files {
			match patch_file(&path, &row.sizing) {
				Ok(true) => {
					writeln!(writer, "  updated {}", path.display())?;
					result.files_updated.push(path);
				}
				Ok(false) => {
					debug!(path = %path.display(), "no changes needed");
				}
				Err(error) => {
					warn!(path = %path.display(), error = %error, "skipping manifest");
					writeln!(writer, "  ✗ skipping {}: {:#}", path.display(), error)?;
					result.files_skipped += 1;
				}
			}
		}
		result.rows_applied += 1;
	}

	Ok(result)
}

/// Patch a single manifest file in place. Returns whether it was rewritten.
fn patch_file(path: &Path, sizing: &Sizing) -> Result<bool> {
	let content = fs::read_to_string(path).context("failed to read manifest")?;

	let Some(updated) = k8s::patch_file_content(&content, sizing)? else {
		return Ok(false);
	};

	fs::write(path, updated).context("failed to write manifest")?;
	Ok(true)
}

fn display_or_dash(value: Option<&str>) -> &str {
	value.unwrap_or("-")
}
