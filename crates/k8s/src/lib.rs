//! Shared Kubernetes manifest utilities: resource quantity normalization
//! and in-place patching of manifest documents.

pub mod manifest;
pub mod quantity;

pub use manifest::{patch_documents, patch_file_content, ManifestError, ManifestKind};
pub use quantity::{normalize, ResourceKind, Sizing};
