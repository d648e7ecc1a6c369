//! Operation catalog: a two-level, insertion-ordered table of handler
//! constructors addressed by `(category, subcategory?, operation)`.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use indexmap::IndexMap;
use rpa_core::{OperationKey, OperationResult, Params};
use tracing::debug;

use super::handler::{HandlerFactory, OperationError, OperationHandler};
use super::panic_message;
use super::session::SharedSession;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A registered handler constructor plus the metadata published in generated
/// catalog documents.
#[derive(Clone)]
pub struct OperationEntry {
    factory: HandlerFactory,
    version: u32,
    summary: String,
}

impl OperationEntry {
    /// Wraps a constructor. Version defaults to 1 and the summary to empty.
    pub fn new<H, F>(factory: F) -> Self
    where
        H: OperationHandler + 'static,
        F: Fn(SharedSession) -> H + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(move |session| Box::new(factory(session)) as Box<dyn OperationHandler>),
            version: 1,
            summary: String::new(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Constructs a fresh handler bound to `session`.
    #[must_use]
    pub fn instantiate(&self, session: SharedSession) -> Box<dyn OperationHandler> {
        (self.factory)(session)
    }
}

impl fmt::Debug for OperationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationEntry")
            .field("version", &self.version)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// Value stored under a key of a category map.
#[derive(Debug, Clone)]
pub enum OperationDescriptor {
    /// Directly addressable operation.
    Leaf(OperationEntry),
    /// Subcategory holding its own operations.
    Group(IndexMap<String, OperationEntry>),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("operation `{path}` is registered twice")]
    DuplicateOperation { path: String },
    #[error("`{category}/{key}` is registered both as an operation and as a subcategory")]
    ShapeConflict { category: String, key: String },
    #[error("catalog names must not be empty (got `{path}`)")]
    EmptyName { path: String },
    #[error("catalog construction failed: {0}")]
    BuildFailed(String),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates registrations. The first conflict is remembered and reported
/// by [`CatalogBuilder::build`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    categories: IndexMap<String, IndexMap<String, OperationDescriptor>>,
    error: Option<CatalogError>,
}

impl CatalogBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a direct operation: `category/operation`.
    #[must_use]
    pub fn operation(mut self, category: &str, operation: &str, entry: OperationEntry) -> Self {
        if self.error.is_some() {
            return self;
        }
        let path = format!("{category}/{operation}");
        if category.is_empty() || operation.is_empty() {
            self.error = Some(CatalogError::EmptyName { path });
            return self;
        }
        let entries = self.categories.entry(category.to_string()).or_default();
        match entries.get(operation) {
            Some(OperationDescriptor::Leaf(_)) => {
                self.error = Some(CatalogError::DuplicateOperation { path });
            }
            Some(OperationDescriptor::Group(_)) => {
                self.error = Some(CatalogError::ShapeConflict {
                    category: category.to_string(),
                    key: operation.to_string(),
                });
            }
            None => {
                entries.insert(operation.to_string(), OperationDescriptor::Leaf(entry));
            }
        }
        self
    }

    /// Registers a nested operation: `category/subcategory/operation`.
    #[must_use]
    pub fn nested(
        mut self,
        category: &str,
        subcategory: &str,
        operation: &str,
        entry: OperationEntry,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let path = format!("{category}/{subcategory}/{operation}");
        if category.is_empty() || subcategory.is_empty() || operation.is_empty() {
            self.error = Some(CatalogError::EmptyName { path });
            return self;
        }
        let entries = self.categories.entry(category.to_string()).or_default();
        let group = entries
            .entry(subcategory.to_string())
            .or_insert_with(|| OperationDescriptor::Group(IndexMap::new()));
        match group {
            OperationDescriptor::Leaf(_) => {
                self.error = Some(CatalogError::ShapeConflict {
                    category: category.to_string(),
                    key: subcategory.to_string(),
                });
            }
            OperationDescriptor::Group(ops) => {
                if ops.contains_key(operation) {
                    self.error = Some(CatalogError::DuplicateOperation { path });
                } else {
                    ops.insert(operation.to_string(), entry);
                }
            }
        }
        self
    }

    /// Finishes the catalog.
    ///
    /// # Errors
    ///
    /// Returns the first registration conflict recorded by the builder.
    pub fn build(self) -> Result<OperationCatalog, CatalogError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(OperationCatalog {
                categories: self.categories,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable operation table. Shared behind `Arc` once built.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    categories: IndexMap<String, IndexMap<String, OperationDescriptor>>,
}

impl OperationCatalog {
    /// Finds the entry for a catalog address.
    ///
    /// A nested match under `subcategory` wins; a leaf stored under
    /// `subcategory` only matches when it is named like `operation`. Either
    /// way a direct entry named `operation` is the fallback. An empty
    /// subcategory counts as absent.
    #[must_use]
    pub fn resolve(
        &self,
        category: &str,
        subcategory: Option<&str>,
        operation: &str,
    ) -> Option<&OperationEntry> {
        let entries = self.categories.get(category)?;

        if let Some(sub) = subcategory.filter(|s| !s.is_empty()) {
            match entries.get(sub) {
                Some(OperationDescriptor::Group(ops)) => {
                    if let Some(entry) = ops.get(operation) {
                        return Some(entry);
                    }
                }
                Some(OperationDescriptor::Leaf(entry)) if sub == operation => return Some(entry),
                _ => {}
            }
        }

        match entries.get(operation) {
            Some(OperationDescriptor::Leaf(entry)) => Some(entry),
            _ => None,
        }
    }

    /// Per category, the addressable paths in registration order:
    /// `subcategory/operation` for nested entries, `operation` for direct ones.
    #[must_use]
    pub fn list_available(&self) -> IndexMap<String, Vec<String>> {
        self.categories
            .iter()
            .map(|(category, entries)| {
                let mut paths = Vec::new();
                for (key, descriptor) in entries {
                    match descriptor {
                        OperationDescriptor::Leaf(_) => paths.push(key.clone()),
                        OperationDescriptor::Group(ops) => {
                            paths.extend(ops.keys().map(|op| format!("{key}/{op}")));
                        }
                    }
                }
                (category.clone(), paths)
            })
            .collect()
    }

    /// Every registered entry with its key, in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (OperationKey, &OperationEntry)> + '_ {
        self.categories.iter().flat_map(|(category, entries)| {
            entries.iter().flat_map(move |(key, descriptor)| {
                let items: Vec<(OperationKey, &OperationEntry)> = match descriptor {
                    OperationDescriptor::Leaf(entry) => {
                        vec![(OperationKey::new(category.as_str(), None, key.as_str()), entry)]
                    }
                    OperationDescriptor::Group(ops) => ops
                        .iter()
                        .map(|(op, entry)| {
                            (
                                OperationKey::new(category.as_str(), Some(key.as_str()), op.as_str()),
                                entry,
                            )
                        })
                        .collect(),
                };
                items
            })
        })
    }

    /// Number of addressable operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Resolves `key`, constructs a fresh handler and runs it.
    ///
    /// An unknown address is a logical failure, not a fault.
    ///
    /// # Errors
    ///
    /// Returns the handler's own error, or `OperationError::Panicked` if
    /// constructing or running the handler panicked.
    pub async fn execute(
        &self,
        key: &OperationKey,
        params: &Params,
        session: &SharedSession,
    ) -> Result<OperationResult, OperationError> {
        let Some(entry) = self.resolve(&key.category, key.subcategory.as_deref(), &key.operation)
        else {
            debug!(operation = %key, "operation not found");
            return Ok(OperationResult::failure(format!("Operation not found: {key}")));
        };

        let handler = std::panic::catch_unwind(AssertUnwindSafe(|| entry.instantiate(session.clone())))
            .map_err(|payload| OperationError::Panicked {
                message: panic_message(payload.as_ref()),
            })?;

        debug!(operation = %key, "executing operation");
        match AssertUnwindSafe(handler.execute(params)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Err(OperationError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rpa_core::OperationStatus;
    use serde_json::json;

    use super::*;
    use crate::engine::testing::{params, Echo, Fault, Panic, Tagged};

    fn tagged(tag: &'static str) -> OperationEntry {
        OperationEntry::new(move |_| Tagged(tag))
    }

    async fn tag_of(catalog: &OperationCatalog, sub: Option<&str>, op: &str) -> Option<String> {
        let key = OperationKey::new("cat", sub, op);
        let result = catalog
            .execute(&key, &Params::new(), &SharedSession::new())
            .await
            .unwrap();
        result.data.get("tag").and_then(|v| v.as_str()).map(str::to_string)
    }

    #[tokio::test]
    async fn nested_match_wins_over_direct_entry() {
        let catalog = CatalogBuilder::new()
            .operation("cat", "op", tagged("direct"))
            .nested("cat", "sub", "op", tagged("nested"))
            .build()
            .unwrap();

        assert_eq!(tag_of(&catalog, Some("sub"), "op").await.as_deref(), Some("nested"));
    }

    #[tokio::test]
    async fn falls_back_to_direct_entry_when_nested_lookup_misses() {
        let catalog = CatalogBuilder::new()
            .operation("cat", "op", tagged("direct"))
            .nested("cat", "sub", "other", tagged("nested"))
            .build()
            .unwrap();

        assert_eq!(tag_of(&catalog, Some("sub"), "op").await.as_deref(), Some("direct"));
        assert_eq!(tag_of(&catalog, Some("missing"), "op").await.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn without_subcategory_only_direct_entries_match() {
        let catalog = CatalogBuilder::new()
            .nested("cat", "sub", "op", tagged("nested"))
            .operation("cat", "solo", tagged("direct"))
            .build()
            .unwrap();

        assert_eq!(tag_of(&catalog, None, "solo").await.as_deref(), Some("direct"));
        assert!(catalog.resolve("cat", None, "op").is_none());
        assert!(catalog.resolve("cat", Some(""), "op").is_none());
    }

    #[test]
    fn leaf_under_subcategory_matches_only_its_own_name() {
        let catalog = CatalogBuilder::new()
            .operation("cat", "snap", tagged("snap"))
            .build()
            .unwrap();

        assert!(catalog.resolve("cat", Some("snap"), "snap").is_some());
        assert!(catalog.resolve("cat", Some("snap"), "other").is_none());
    }

    #[test]
    fn unknown_category_is_not_found() {
        let catalog = CatalogBuilder::new()
            .operation("cat", "op", tagged("x"))
            .build()
            .unwrap();
        assert!(catalog.resolve("dog", None, "op").is_none());
    }

    #[tokio::test]
    async fn execute_unknown_is_logical_failure() {
        let catalog = CatalogBuilder::new().build().unwrap();
        let key = OperationKey::new("excel", None, "open");
        let result = catalog
            .execute(&key, &Params::new(), &SharedSession::new())
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("Operation not found: excel/None/open"));

        let key = OperationKey::new("excel", Some("book"), "open");
        let result = catalog
            .execute(&key, &Params::new(), &SharedSession::new())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Operation not found: excel/book/open"));
    }

    #[tokio::test]
    async fn execute_passes_params_through() {
        let catalog = CatalogBuilder::new()
            .operation("cat", "echo", OperationEntry::new(|_| Echo))
            .build()
            .unwrap();
        let key = OperationKey::new("cat", None, "echo");
        let result = catalog
            .execute(&key, &params(json!({"x": 1})), &SharedSession::new())
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Success);
        assert_eq!(result.data["x"], json!(1));
    }

    #[tokio::test]
    async fn handler_fault_and_panic_surface_as_errors() {
        let catalog = CatalogBuilder::new()
            .operation("cat", "fault", OperationEntry::new(|_| Fault))
            .operation("cat", "panic", OperationEntry::new(|_| Panic))
            .build()
            .unwrap();
        let session = SharedSession::new();

        let err = catalog
            .execute(&OperationKey::new("cat", None, "fault"), &Params::new(), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Fault(_)));
        assert_eq!(err.to_string(), "boom");

        let err = catalog
            .execute(&OperationKey::new("cat", None, "panic"), &Params::new(), &session)
            .await
            .unwrap_err();
        match err {
            OperationError::Panicked { message } => assert_eq!(message, "handler exploded"),
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_constructor_is_caught() {
        let catalog = CatalogBuilder::new()
            .operation(
                "cat",
                "broken",
                OperationEntry::new(|_| -> Echo { panic!("no window handle") }),
            )
            .build()
            .unwrap();
        let err = catalog
            .execute(&OperationKey::new("cat", None, "broken"), &Params::new(), &SharedSession::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Panicked { .. }));
    }

    #[test]
    fn list_available_preserves_registration_order() {
        let catalog = CatalogBuilder::new()
            .nested("wait_control", "wait", "seconds", tagged("a"))
            .nested("wait_control", "wait", "milliseconds", tagged("b"))
            .operation("wait_control", "raise_error", tagged("c"))
            .operation("memory", "store", tagged("d"))
            .operation("memory", "get", tagged("e"))
            .build()
            .unwrap();

        let listed = catalog.list_available();
        let categories: Vec<_> = listed.keys().cloned().collect();
        assert_eq!(categories, vec!["wait_control", "memory"]);
        assert_eq!(
            listed["wait_control"],
            vec!["wait/seconds", "wait/milliseconds", "raise_error"]
        );
        assert_eq!(listed["memory"], vec!["store", "get"]);
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn entries_yield_keys_in_order() {
        let catalog = CatalogBuilder::new()
            .nested("a", "g", "x", tagged("1").with_version(3).with_summary("first"))
            .operation("a", "y", tagged("2"))
            .build()
            .unwrap();

        let entries: Vec<_> = catalog.entries().collect();
        assert_eq!(entries[0].0, OperationKey::new("a", Some("g"), "x"));
        assert_eq!(entries[0].1.version(), 3);
        assert_eq!(entries[0].1.summary(), "first");
        assert_eq!(entries[1].0, OperationKey::new("a", None, "y"));
        assert_eq!(entries[1].1.version(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = CatalogBuilder::new()
            .operation("memory", "store", tagged("a"))
            .operation("memory", "store", tagged("b"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateOperation {
                path: "memory/store".into()
            }
        );

        let err = CatalogBuilder::new()
            .nested("w", "wait", "seconds", tagged("a"))
            .nested("w", "wait", "seconds", tagged("b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateOperation { .. }));
    }

    #[test]
    fn leaf_and_group_under_one_key_conflict() {
        let err = CatalogBuilder::new()
            .operation("w", "wait", tagged("a"))
            .nested("w", "wait", "seconds", tagged("b"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::ShapeConflict {
                category: "w".into(),
                key: "wait".into()
            }
        );

        let err = CatalogBuilder::new()
            .nested("w", "wait", "seconds", tagged("b"))
            .operation("w", "wait", tagged("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::ShapeConflict { .. }));
    }

    #[test]
    fn empty_names_are_rejected() {
        let err = CatalogBuilder::new()
            .operation("", "store", tagged("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::EmptyName { .. }));
    }
}
