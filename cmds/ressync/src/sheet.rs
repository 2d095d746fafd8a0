//! Sizing sheet ingestion.
//!
//! The sheet is a CSV export with one row per service. Header matching is
//! case-insensitive and accepts the RAM/Memory synonym; a UTF-8 BOM on the
//! first header (the usual spreadsheet export artifact) is ignored. Rows
//! without a service name, and rows where no value survives normalization,
//! are dropped at this stage.

use std::path::Path;

use anyhow::{bail, Context, Result};
use k8s::Sizing;
use tracing::debug;

/// Recognized header spellings, compared case-insensitively.
const SERVICE_HEADERS: &[&str] = &["service name"];
const CPU_HEADERS: &[&str] = &["cpu"];
const MEMORY_HEADERS: &[&str] = &["ram", "memory"];
const STORAGE_HEADERS: &[&str] = &["storage"];

/// One applicable sheet row: a service and its normalized sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
	pub service: String,
	pub sizing: Sizing,
}

/// Column positions resolved from the header record.
#[derive(Debug, Clone, Copy)]
struct Columns {
	service: usize,
	cpu: Option<usize>,
	memory: Option<usize>,
	storage: Option<usize>,
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<Columns> {
	let find = |names: &[&str]| {
		headers.iter().position(|header| {
			let header = header.trim_start_matches('\u{feff}').trim();
			names.iter().any(|name| header.eq_ignore_ascii_case(name))
		})
	};

	let Some(service) = find(SERVICE_HEADERS) else {
		bail!("sizing table has no 'Service Name' column");
	};

	Ok(Columns {
		service,
		cpu: find(CPU_HEADERS),
		memory: find(MEMORY_HEADERS),
		storage: find(STORAGE_HEADERS),
	})
}

/// Read the sizing table, returning the rows worth applying.
pub fn load_rows(path: &Path) -> Result<Vec<SheetRow>> {
	let mut reader = csv::ReaderBuilder::new()
		.flexible(true)
		.from_path(path)
		.with_context(|| format!("failed to open sizing table: {}", path.display()))?;

	let headers = reader
		.headers()
		.with_context(|| format!("failed to read sizing table: {}", path.display()))?;
	let columns = resolve_columns(headers)?;

	let mut rows = Vec::new();
	for record in reader.records() {
		let record = record
			.with_context(|| format!("failed to read sizing table: {}", path.display()))?;
		let field = |column: Option<usize>| column.and_then(|idx| record.get(idx)).unwrap_or("");

		let service = record.get(columns.service).unwrap_or("").trim();
		if service.is_empty() {
			continue;
		}

		let sizing = Sizing::from_raw(
			field(columns.cpu),
			field(columns.memory),
			field(columns.storage),
		);
		if sizing.is_empty() {
			debug!(service = %service, "row has no values to apply, skipping");
			continue;
		}

		rows.push(SheetRow {
			service: service.to_string(),
			sizing,
		});
	}

	Ok(rows)
}
