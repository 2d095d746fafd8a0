//! Configuration file support for ressync
//!
//! Supports `.ressync.yaml` files that can be placed anywhere in the directory
//! hierarchy. ressync searches from the working directory upward to the
//! filesystem root; CLI flags always win over file values.

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

/// The name of the config file ressync looks for
pub const CONFIG_FILE_NAME: &str = ".ressync.yaml";

/// Sizing table path used when neither a CLI argument nor a config file
/// names one
pub const DEFAULT_TABLE: &str = "resources.csv";

/// Root configuration structure for .ressync.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RessyncConfig {
	/// Path to the sizing table
	#[serde(default)]
	pub table: Option<String>,

	/// Service root directories, probed in order for each service
	#[serde(default)]
	pub roots: Vec<String>,
}

impl RessyncConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		if let Some(config_path) = find_config_file(start_dir) {
			let config = Self::load_from_file(&config_path)?;
			Ok(Some(config))
		} else {
			Ok(None)
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: RessyncConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}
}

/// Effective settings once CLI flags, the config file, and defaults are
/// merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
	pub table: PathBuf,
	pub roots: Vec<PathBuf>,
}

impl Settings {
	/// CLI values win over file values; defaults fill the rest. Roots
	/// default to the working directory when nothing names them.
	pub fn resolve(
		cli_table: Option<&str>,
		cli_roots: &[String],
		file: Option<&RessyncConfig>,
	) -> Self {
		let table = cli_table
			.map(str::to_string)
			.or_else(|| file.and_then(|config| config.table.clone()))
			.unwrap_or_else(|| DEFAULT_TABLE.to_string());

		let roots = if !cli_roots.is_empty() {
			cli_roots.iter().map(PathBuf::from).collect()
		} else {
			match file.filter(|config| !config.roots.is_empty()) {
				Some(config) => config.roots.iter().map(PathBuf::from).collect(),
				None => vec![PathBuf::from(".")],
			}
		};

		Self {
			table: PathBuf::from(table),
			roots,
		}
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let mut current = start_dir.to_path_buf();

	// Canonicalize if possible to handle relative paths
	if let Ok(canonical) = current.canonicalize() {
		current = canonical;
	}

	loop {
		let config_path = current.join(CONFIG_FILE_NAME);
		if config_path.exists() {
			return Some(config_path);
		}

		// Move up to parent directory
		if let Some(parent) = current.parent() {
			if parent == current {
				// Reached root
				break;
			}
			current = parent.to_path_buf();
		} else {
			break;
		}
	}

	None
}
