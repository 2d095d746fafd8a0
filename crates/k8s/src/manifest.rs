//! Kubernetes manifest patching.
//!
//! Documents are kept as raw [`serde_yaml::Value`] trees so that fields the
//! patcher does not know about round-trip untouched. Patching dispatches on
//! the document `kind`: pod-template workloads get container requests and
//! limits, StatefulSets additionally get volume claim template storage, and
//! standalone PersistentVolumeClaims get their storage request. Documents of
//! any other kind are left alone.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::quantity::Sizing;

/// Workload kinds whose pod template containers are patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
	Deployment,
	StatefulSet,
	DaemonSet,
}

/// Classification of a manifest document by its `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
	Workload(WorkloadKind),
	PersistentVolumeClaim,
	/// Anything else, including documents without a `kind`.
	Other,
}

impl ManifestKind {
	/// Classify a document. The match is exact and case-sensitive, the way
	/// the API server spells kinds.
	pub fn of(doc: &Value) -> Self {
		match doc.get("kind").and_then(Value::as_str) {
			Some("Deployment") => Self::Workload(WorkloadKind::Deployment),
			Some("StatefulSet") => Self::Workload(WorkloadKind::StatefulSet),
			Some("DaemonSet") => Self::Workload(WorkloadKind::DaemonSet),
			Some("PersistentVolumeClaim") => Self::PersistentVolumeClaim,
			_ => Self::Other,
		}
	}
}

/// Errors raised when loading or rendering manifest files.
#[derive(Debug, Error)]
pub enum ManifestError {
	#[error("invalid YAML: {0}")]
	Parse(#[source] serde_yaml::Error),
	#[error("failed to render YAML: {0}")]
	Render(#[source] serde_yaml::Error),
}

/// Parse file content into its document sequence.
///
/// Multi-document files are supported. Empty documents come back as
/// [`Value::Null`] and keep their position in the sequence.
pub fn parse_documents(content: &str) -> Result<Vec<Value>, ManifestError> {
	let mut documents = Vec::new();
	for doc in serde_yaml::Deserializer::from_str(content) {
		documents.push(Value::deserialize(doc).map_err(ManifestError::Parse)?);
	}
	Ok(documents)
}

/// Render a document sequence back to YAML, documents separated by `---`.
///
/// Output is block style with mapping keys in insertion order. Comments and
/// anchors from the source are not preserved, which is why callers must only
/// rewrite files that were actually modified.
pub fn render_documents(documents: &[Value]) -> Result<String, ManifestError> {
	let mut rendered = Vec::with_capacity(documents.len());
	for doc in documents {
		rendered.push(serde_yaml::to_string(doc).map_err(ManifestError::Render)?);
	}
	Ok(rendered.join("---\n"))
}

/// Parse, patch, and re-render a file's content.
///
/// Returns `Ok(None)` when no document was modified and the file must be
/// left as it is on disk.
pub fn patch_file_content(content: &str, sizing: &Sizing) -> Result<Option<String>, ManifestError> {
	let mut documents = parse_documents(content)?;
	if !patch_documents(&mut documents, sizing) {
		return Ok(None);
	}
	Ok(Some(render_documents(&documents)?))
}

/// Patch every document in place. Returns true when the file should be
/// rewritten.
pub fn patch_documents(documents: &mut [Value], sizing: &Sizing) -> bool {
	let mut modified = false;
	for doc in documents.iter_mut() {
		if doc.is_null() {
			continue;
		}
		modified |= patch_document(doc, sizing);
	}
	modified
}

/// Patch a single document according to its kind.
///
/// Workload documents report modified whenever at least one container was
/// visited, even if every value already matched: requests and limits are
/// forced, and the rewrite signals that the file was brought in line.
/// PVC patching is idempotent and reports modified only on an actual change.
pub fn patch_document(doc: &mut Value, sizing: &Sizing) -> bool {
	match ManifestKind::of(doc) {
		ManifestKind::Workload(kind) => patch_workload(doc, kind, sizing),
		ManifestKind::PersistentVolumeClaim => patch_claim(doc, sizing),
		ManifestKind::Other => false,
	}
}

/// Navigation failures anywhere below abandon the rest of this document but
/// keep the modified state accumulated so far; sibling documents are not
/// affected.
fn patch_workload(doc: &mut Value, kind: WorkloadKind, sizing: &Sizing) -> bool {
	let mut modified = false;

	let Some(containers) = doc
		.get_mut("spec")
		.and_then(|spec| spec.get_mut("template"))
		.and_then(|template| template.get_mut("spec"))
		.and_then(|pod_spec| pod_spec.get_mut("containers"))
		.and_then(Value::as_sequence_mut)
	else {
		return false;
	};

	for container in containers.iter_mut() {
		let Some(container) = container.as_mapping_mut() else {
			return modified;
		};
		let Some(resources) = ensure_mapping(container, "resources") else {
			return modified;
		};
		if ensure_mapping(resources, "requests").is_none()
			|| ensure_mapping(resources, "limits").is_none()
		{
			return modified;
		}

		if let Some(cpu) = &sizing.cpu {
			set_request_and_limit(resources, "cpu", cpu);
		}
		if let Some(memory) = &sizing.memory {
			set_request_and_limit(resources, "memory", memory);
		}

		// An empty containers list never reaches this point, so such
		// documents stay unmodified.
		modified = true;
	}

	if kind == WorkloadKind::StatefulSet {
		if let Some(storage) = &sizing.storage {
			patch_volume_claims(doc, storage, &mut modified);
		}
	}

	modified
}

fn patch_volume_claims(doc: &mut Value, storage: &str, modified: &mut bool) {
	let Some(templates) = doc
		.get_mut("spec")
		.and_then(|spec| spec.get_mut("volumeClaimTemplates"))
		.and_then(Value::as_sequence_mut)
	else {
		return;
	};

	for template in templates.iter_mut() {
		let Some(template_spec) = template.get_mut("spec").and_then(Value::as_mapping_mut) else {
			return;
		};
		let Some(resources) = ensure_mapping(template_spec, "resources") else {
			return;
		};
		let Some(requests) = ensure_mapping(resources, "requests") else {
			return;
		};
		requests.insert(Value::from("storage"), Value::from(storage));
		*modified = true;
	}
}

fn patch_claim(doc: &mut Value, sizing: &Sizing) -> bool {
	let Some(storage) = &sizing.storage else {
		return false;
	};
	let Some(root) = doc.as_mapping_mut() else {
		return false;
	};

	// The request path is created before the equality check, so a claim
	// missing the whole resources block still receives one.
	let Some(spec) = ensure_mapping(root, "spec") else {
		return false;
	};
	let Some(resources) = ensure_mapping(spec, "resources") else {
		return false;
	};
	let Some(requests) = ensure_mapping(resources, "requests") else {
		return false;
	};

	let key = Value::from("storage");
	let target = Value::from(storage.as_str());
	if requests.get(&key) == Some(&target) {
		return false;
	}
	requests.insert(key, target);
	true
}

/// Fetch `key` as a child mapping, inserting an empty one when the key is
/// absent. `None` when an existing value under `key` is not a mapping.
fn ensure_mapping<'a>(map: &'a mut Mapping, key: &str) -> Option<&'a mut Mapping> {
	let key = Value::from(key);
	if map.get(&key).is_none() {
		map.insert(key.clone(), Value::Mapping(Mapping::new()));
	}
	map.get_mut(&key).and_then(Value::as_mapping_mut)
}

fn set_request_and_limit(resources: &mut Mapping, field: &str, quantity: &str) {
	for section in ["requests", "limits"] {
		if let Some(section) = ensure_mapping(resources, section) {
			section.insert(Value::from(field), Value::from(quantity));
		}
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;

	use super::*;

	fn sizing(cpu: Option<&str>, memory: Option<&str>, storage: Option<&str>) -> Sizing {
		Sizing {
			cpu: cpu.map(str::to_string),
			memory: memory.map(str::to_string),
			storage: storage.map(str::to_string),
		}
	}

	fn parse(content: &str) -> Vec<Value> {
		parse_documents(content).unwrap()
	}

	fn lookup<'a>(doc: &'a Value, path: &str) -> &'a Value {
		let mut value = doc;
		for key in path.split('.') {
			value = value
				.get(key)
				.unwrap_or_else(|| panic!("missing key {key} in {path}"));
		}
		value
	}

	fn first_container(doc: &Value) -> &Value {
		lookup(doc, "spec.template.spec.containers")
			.as_sequence()
			.unwrap()
			.first()
			.unwrap()
	}

	const DEPLOYMENT: &str = indoc! {"
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: api
        spec:
          replicas: 2
          template:
            spec:
              containers:
              - name: api
                image: api:v1
    "};

	const STATEFULSET: &str = indoc! {"
        apiVersion: apps/v1
        kind: StatefulSet
        metadata:
          name: db
        spec:
          template:
            spec:
              containers:
              - name: db
                image: db:v1
          volumeClaimTemplates:
          - metadata:
              name: data
            spec:
              accessModes:
              - ReadWriteOnce
    "};

	const PVC: &str = indoc! {"
        apiVersion: v1
        kind: PersistentVolumeClaim
        metadata:
          name: data
        spec:
          resources:
            requests:
              storage: 5Gi
    "};

	#[test]
	fn classify_by_kind() {
		let docs = parse(DEPLOYMENT);
		assert_eq!(
			ManifestKind::of(&docs[0]),
			ManifestKind::Workload(WorkloadKind::Deployment)
		);
		let docs = parse(PVC);
		assert_eq!(
			ManifestKind::of(&docs[0]),
			ManifestKind::PersistentVolumeClaim
		);
		let docs = parse("kind: Service\nmetadata:\n  name: api\n");
		assert_eq!(ManifestKind::of(&docs[0]), ManifestKind::Other);
		assert_eq!(ManifestKind::of(&Value::Null), ManifestKind::Other);
	}

	#[test]
	fn deployment_sets_requests_and_limits() {
		let mut docs = parse(DEPLOYMENT);
		let modified = patch_documents(&mut docs, &sizing(Some("100m"), Some("256Mi"), None));

		assert!(modified);
		let resources = lookup(first_container(&docs[0]), "resources");
		assert_eq!(lookup(resources, "requests.cpu").as_str(), Some("100m"));
		assert_eq!(lookup(resources, "limits.cpu").as_str(), Some("100m"));
		assert_eq!(lookup(resources, "requests.memory").as_str(), Some("256Mi"));
		assert_eq!(lookup(resources, "limits.memory").as_str(), Some("256Mi"));
	}

	#[test]
	fn deployment_reports_modified_even_when_values_match() {
		let mut docs = parse(DEPLOYMENT);
		let wanted = sizing(Some("100m"), Some("256Mi"), None);
		assert!(patch_documents(&mut docs, &wanted));
		// Second pass writes identical values and still reports modified.
		assert!(patch_documents(&mut docs, &wanted));
	}

	#[test]
	fn cpu_only_sizing_leaves_memory_alone() {
		let mut docs = parse(DEPLOYMENT);
		assert!(patch_documents(&mut docs, &sizing(Some("100m"), None, None)));

		let resources = lookup(first_container(&docs[0]), "resources");
		assert_eq!(lookup(resources, "requests.cpu").as_str(), Some("100m"));
		assert!(lookup(resources, "requests").get("memory").is_none());
		// The ensure step still created both sections.
		assert!(resources.get("limits").is_some());
	}

	#[test]
	fn sizing_without_values_still_marks_workload_modified() {
		// Only the resources/requests/limits maps are ensured, yet the
		// document counts as modified because a container was visited.
		let mut docs = parse(DEPLOYMENT);
		assert!(patch_documents(&mut docs, &sizing(None, None, Some("5Gi"))));
		let resources = lookup(first_container(&docs[0]), "resources");
		assert!(resources.get("requests").is_some());
		assert!(resources.get("limits").is_some());
	}

	#[test]
	fn multiple_containers_all_patched() {
		let content = indoc! {"
            kind: Deployment
            spec:
              template:
                spec:
                  containers:
                  - name: app
                  - name: sidecar
        "};
		let mut docs = parse(content);
		assert!(patch_documents(&mut docs, &sizing(Some("50m"), None, None)));

		let containers = lookup(&docs[0], "spec.template.spec.containers")
			.as_sequence()
			.unwrap();
		for container in containers {
			assert_eq!(
				lookup(container, "resources.requests.cpu").as_str(),
				Some("50m")
			);
		}
	}

	#[test]
	fn empty_containers_list_is_not_modified() {
		let content = indoc! {"
            kind: Deployment
            spec:
              template:
                spec:
                  containers: []
        "};
		let mut docs = parse(content);
		assert!(!patch_documents(&mut docs, &sizing(Some("100m"), None, None)));
	}

	#[test]
	fn workload_missing_containers_is_skipped() {
		let content = indoc! {"
            kind: Deployment
            metadata:
              name: api
            spec:
              replicas: 1
        "};
		let mut docs = parse(content);
		let before = docs.clone();
		assert!(!patch_documents(&mut docs, &sizing(Some("100m"), None, None)));
		assert_eq!(docs, before);
	}

	#[test]
	fn wrong_typed_resources_aborts_document() {
		let content = indoc! {"
            kind: Deployment
            spec:
              template:
                spec:
                  containers:
                  - name: app
                    resources: high
        "};
		let mut docs = parse(content);
		assert!(!patch_documents(&mut docs, &sizing(Some("100m"), None, None)));
		assert_eq!(
			lookup(first_container(&docs[0]), "resources").as_str(),
			Some("high")
		);
	}

	#[test]
	fn statefulset_patches_containers_and_volume_claims() {
		let mut docs = parse(STATEFULSET);
		assert!(patch_documents(
			&mut docs,
			&sizing(Some("200m"), Some("512Mi"), Some("10Gi"))
		));

		let resources = lookup(first_container(&docs[0]), "resources");
		assert_eq!(lookup(resources, "requests.cpu").as_str(), Some("200m"));

		let templates = lookup(&docs[0], "spec.volumeClaimTemplates")
			.as_sequence()
			.unwrap();
		assert_eq!(
			lookup(&templates[0], "spec.resources.requests.storage").as_str(),
			Some("10Gi")
		);
	}

	#[test]
	fn statefulset_patches_every_volume_claim_template() {
		let content = indoc! {"
            kind: StatefulSet
            spec:
              template:
                spec:
                  containers:
                  - name: db
              volumeClaimTemplates:
              - metadata:
                  name: data
                spec: {}
              - metadata:
                  name: wal
                spec: {}
        "};
		let mut docs = parse(content);
		assert!(patch_documents(&mut docs, &sizing(None, None, Some("10Gi"))));

		let templates = lookup(&docs[0], "spec.volumeClaimTemplates")
			.as_sequence()
			.unwrap();
		assert_eq!(templates.len(), 2);
		for template in templates {
			assert_eq!(
				lookup(template, "spec.resources.requests.storage").as_str(),
				Some("10Gi")
			);
		}
	}

	#[test]
	fn statefulset_without_storage_leaves_templates_alone() {
		let mut docs = parse(STATEFULSET);
		assert!(patch_documents(&mut docs, &sizing(Some("200m"), None, None)));

		let templates = lookup(&docs[0], "spec.volumeClaimTemplates")
			.as_sequence()
			.unwrap();
		assert!(lookup(&templates[0], "spec").get("resources").is_none());
	}

	#[test]
	fn statefulset_without_templates_accepts_storage() {
		let content = indoc! {"
            kind: StatefulSet
            spec:
              template:
                spec:
                  containers:
                  - name: db
        "};
		let mut docs = parse(content);
		// No volumeClaimTemplates key: the containers pass alone counts.
		assert!(patch_documents(&mut docs, &sizing(None, None, Some("10Gi"))));
	}

	#[test]
	fn malformed_template_keeps_container_changes() {
		let content = indoc! {"
            kind: StatefulSet
            spec:
              template:
                spec:
                  containers:
                  - name: db
              volumeClaimTemplates:
              - metadata:
                  name: data
        "};
		let mut docs = parse(content);
		// The template has no spec; the containers pass already marked the
		// document modified and that is preserved.
		assert!(patch_documents(
			&mut docs,
			&sizing(Some("100m"), None, Some("10Gi"))
		));
		let templates = lookup(&docs[0], "spec.volumeClaimTemplates")
			.as_sequence()
			.unwrap();
		assert!(templates[0].get("spec").is_none());
	}

	#[test]
	fn pvc_updates_storage() {
		let mut docs = parse(PVC);
		assert!(patch_documents(&mut docs, &sizing(None, None, Some("20Gi"))));
		assert_eq!(
			lookup(&docs[0], "spec.resources.requests.storage").as_str(),
			Some("20Gi")
		);
	}

	#[test]
	fn pvc_with_matching_storage_is_unmodified() {
		let mut docs = parse(PVC);
		assert!(!patch_documents(&mut docs, &sizing(None, None, Some("5Gi"))));
	}

	#[test]
	fn pvc_with_missing_request_path_gets_one() {
		let content = indoc! {"
            kind: PersistentVolumeClaim
            metadata:
              name: data
        "};
		let mut docs = parse(content);
		assert!(patch_documents(&mut docs, &sizing(None, None, Some("5Gi"))));
		assert_eq!(
			lookup(&docs[0], "spec.resources.requests.storage").as_str(),
			Some("5Gi")
		);
	}

	#[test]
	fn pvc_without_requested_storage_is_untouched() {
		let mut docs = parse(PVC);
		let before = docs.clone();
		assert!(!patch_documents(
			&mut docs,
			&sizing(Some("100m"), Some("1Gi"), None)
		));
		assert_eq!(docs, before);
	}

	#[test]
	fn other_kinds_and_null_documents_are_untouched() {
		let content = indoc! {"
            kind: Service
            spec:
              ports:
              - port: 80
            ---
            ---
            apiVersion: v1
            kind: ConfigMap
            data:
              key: value
        "};
		let mut docs = parse(content);
		assert_eq!(docs.len(), 3);
		let before = docs.clone();
		assert!(!patch_documents(
			&mut docs,
			&sizing(Some("100m"), None, Some("5Gi"))
		));
		assert_eq!(docs, before);
	}

	#[test]
	fn skipped_document_does_not_block_siblings() {
		let content = indoc! {"
            kind: Deployment
            metadata:
              name: broken
            ---
            kind: PersistentVolumeClaim
            spec:
              resources:
                requests:
                  storage: 1Gi
        "};
		let mut docs = parse(content);
		assert!(patch_documents(
			&mut docs,
			&sizing(Some("100m"), None, Some("2Gi"))
		));
		assert_eq!(
			lookup(&docs[1], "spec.resources.requests.storage").as_str(),
			Some("2Gi")
		);
	}

	#[test]
	fn patch_file_content_returns_none_when_unchanged() {
		let result = patch_file_content(PVC, &sizing(None, None, Some("5Gi"))).unwrap();
		assert!(result.is_none());

		// A file of non-target kinds only is never rewritten either.
		let result = patch_file_content(
			"kind: Service\nspec:\n  ports:\n  - port: 80\n",
			&sizing(Some("100m"), Some("1Gi"), Some("5Gi")),
		)
		.unwrap();
		assert!(result.is_none());
	}

	#[test]
	fn patch_file_content_preserves_document_order() {
		let content = indoc! {"
            kind: Service
            metadata:
              name: api
            ---
            kind: Deployment
            spec:
              template:
                spec:
                  containers:
                  - name: api
        "};
		let rendered = patch_file_content(content, &sizing(Some("100m"), None, None))
			.unwrap()
			.expect("deployment should be modified");

		let docs = parse(&rendered);
		assert_eq!(docs.len(), 2);
		assert_eq!(lookup(&docs[0], "kind").as_str(), Some("Service"));
		assert_eq!(
			lookup(first_container(&docs[1]), "resources.requests.cpu").as_str(),
			Some("100m")
		);
		assert!(rendered.contains("---\n"));
		assert!(rendered.contains("cpu: 100m"));
	}

	#[test]
	fn parse_failure_is_reported() {
		let result = parse_documents("kind: [unbalanced");
		assert!(matches!(result, Err(ManifestError::Parse(_))));
	}
}
