//! discover - Resolve service directories and their manifest files
//!
//! A sheet row names a service whose directory is expected directly under
//! one of the configured roots. Roots are probed in configuration order and
//! the first match wins. Manifest candidates are the `.yaml`/`.yml` files
//! directly inside that directory; subdirectories are not searched.

use std::path::{Path, PathBuf};

use tracing::trace;
use walkdir::WalkDir;

/// Resolve the directory for a service by probing each root in order.
pub fn find_service_dir(roots: &[PathBuf], service: &str) -> Option<PathBuf> {
	for root in roots {
		let candidate = root.join(service);
		trace!("probing {}", candidate.display());
		if candidate.is_dir() {
			return Some(candidate);
		}
	}
	None
}

/// List manifest candidates in `dir`, in file name order.
pub fn manifest_files(dir: &Path) -> Vec<PathBuf> {
	WalkDir::new(dir)
		.min_depth(1)
		.max_depth(1)
		.sort_by_file_name()
		.into_iter()
		.filter_map(|entry| entry.ok())
		.filter(|entry| entry.file_type().is_file())
		.map(walkdir::DirEntry::into_path)
		.filter(|path| {
			path.extension()
				.is_some_and(|ext| ext == "yaml" || ext == "yml")
		})
		.collect()
}
