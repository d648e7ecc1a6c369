//! Offline catalog document: one published step template per catalog entry,
//! each stamped with a stable identifier from the identity registry.

use std::time::{SystemTime, UNIX_EPOCH};

use rpa_core::StepIdentityRegistry;
use serde::Serialize;
use uuid::Uuid;

use super::catalog::OperationCatalog;
use super::session::SharedSession;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Seconds since the Unix epoch.
    pub generated_at: u64,
    pub steps: Vec<DocumentStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStep {
    pub uuid: Uuid,
    /// Catalog path: `category/subcategory/operation` or `category/operation`.
    pub cmd: String,
    pub version: u32,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub operation: String,
    pub summary: String,
    pub required_params: Vec<String>,
}

/// Builds the document for `catalog` in registration order.
///
/// Handlers are instantiated against a throwaway session only to read their
/// declared required parameters; nothing is executed.
#[must_use]
pub fn generate_document(catalog: &OperationCatalog, registry: &StepIdentityRegistry) -> CatalogDocument {
    let scratch = SharedSession::new();
    let steps = catalog
        .entries()
        .map(|(key, entry)| {
            let cmd = match &key.subcategory {
                Some(sub) => format!("{}/{sub}/{}", key.category, key.operation),
                None => format!("{}/{}", key.category, key.operation),
            };
            let required_params = entry
                .instantiate(scratch.clone())
                .required_params()
                .iter()
                .map(|p| (*p).to_string())
                .collect();
            DocumentStep {
                uuid: registry.get(&cmd, entry.version()),
                cmd,
                version: entry.version(),
                category: key.category,
                subcategory: key.subcategory,
                operation: key.operation,
                summary: entry.summary().to_string(),
                required_params,
            }
        })
        .collect();

    let generated_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    CatalogDocument { generated_at, steps }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rpa_core::{OperationResult, Params};
    use serde_json::json;

    use super::*;
    use crate::engine::catalog::{CatalogBuilder, OperationEntry};
    use crate::engine::handler::{OperationError, OperationHandler};

    struct NeedsKey;

    #[async_trait]
    impl OperationHandler for NeedsKey {
        async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
            Ok(OperationResult::success(Params::new()))
        }

        fn required_params(&self) -> &'static [&'static str] {
            &["storage_key"]
        }
    }

    fn catalog(version: u32) -> OperationCatalog {
        CatalogBuilder::new()
            .nested("wait_control", "wait", "seconds", OperationEntry::new(|_| NeedsKey).with_summary("Pause"))
            .operation("memory", "store", OperationEntry::new(|_| NeedsKey).with_version(version))
            .build()
            .unwrap()
    }

    #[test]
    fn document_lists_entries_in_catalog_order() {
        let registry = StepIdentityRegistry::new();
        let doc = generate_document(&catalog(1), &registry);

        let cmds: Vec<_> = doc.steps.iter().map(|s| s.cmd.as_str()).collect();
        assert_eq!(cmds, vec!["wait_control/wait/seconds", "memory/store"]);
        assert_eq!(doc.steps[0].summary, "Pause");
        assert_eq!(doc.steps[0].required_params, vec!["storage_key"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn identifiers_track_versions() {
        let registry = StepIdentityRegistry::new();
        let first = generate_document(&catalog(1), &registry);
        let again = generate_document(&catalog(1), &registry);
        let bumped = generate_document(&catalog(2), &registry);

        assert_eq!(first.steps[1].uuid, again.steps[1].uuid);
        assert_ne!(first.steps[1].uuid, bumped.steps[1].uuid);
        assert_eq!(first.steps[0].uuid, bumped.steps[0].uuid);
    }

    #[test]
    fn serialized_shape_uses_camel_case() {
        let registry = StepIdentityRegistry::new();
        let value = serde_json::to_value(generate_document(&catalog(1), &registry)).unwrap();
        assert!(value.get("generatedAt").is_some());
        let store = &value["steps"][1];
        assert_eq!(store["requiredParams"], json!(["storage_key"]));
        assert!(store.get("subcategory").is_none());
        assert_eq!(value["steps"][0]["subcategory"], json!("wait"));
    }
}
