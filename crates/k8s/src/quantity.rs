//! Resource quantity normalization.
//!
//! Sizing sheets carry bare numbers ("100" cpu, "256" ram, "5" storage)
//! where Kubernetes expects unit-suffixed quantities. Values that already
//! carry a unit, or anything else non-numeric, pass through untouched.

/// Resource classes a sizing sheet can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
	Cpu,
	Memory,
	Storage,
}

impl ResourceKind {
	/// Unit appended to bare numeric values: millicores for cpu, mebibytes
	/// for memory, gibibytes for storage.
	pub fn default_unit(self) -> &'static str {
		match self {
			Self::Cpu => "m",
			Self::Memory => "Mi",
			Self::Storage => "Gi",
		}
	}
}

/// Normalize a raw sheet cell into a Kubernetes quantity.
///
/// Empty and whitespace-only cells mean "not requested" and yield `None`.
/// Bare digit strings get the kind's default unit appended; anything else
/// is assumed to already be a valid quantity and passes through as-is.
pub fn normalize(raw: &str, kind: ResourceKind) -> Option<String> {
	let value = raw.trim();
	if value.is_empty() {
		return None;
	}
	if value.bytes().all(|b| b.is_ascii_digit()) {
		return Some(format!("{value}{}", kind.default_unit()));
	}
	Some(value.to_string())
}

/// Desired resource values for one service, after normalization.
///
/// A field is `None` when the sheet did not request that resource; the
/// patcher leaves the corresponding manifest fields alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sizing {
	pub cpu: Option<String>,
	pub memory: Option<String>,
	pub storage: Option<String>,
}

impl Sizing {
	/// Build a sizing from raw sheet cells.
	pub fn from_raw(cpu: &str, memory: &str, storage: &str) -> Self {
		Self {
			cpu: normalize(cpu, ResourceKind::Cpu),
			memory: normalize(memory, ResourceKind::Memory),
			storage: normalize(storage, ResourceKind::Storage),
		}
	}

	/// True when no resource was requested at all.
	pub fn is_empty(&self) -> bool {
		self.cpu.is_none() && self.memory.is_none() && self.storage.is_none()
	}
}
