use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter object passed to an operation handler.
pub type Params = Map<String, Value>;

/// Identifies one catalog leaf: `(category, subcategory?, operation)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subcategory: Option<String>,
    pub operation: String,
}

impl OperationKey {
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        subcategory: Option<&str>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.map(str::to_string),
            operation: operation.into(),
        }
    }
}

/// Renders as `category/subcategory/operation`, with `None` standing in for an
/// absent subcategory. This is the form used in "not found" messages.
impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.category,
            self.subcategory.as_deref().unwrap_or("None"),
            self.operation
        )
    }
}

/// Outcome reported by a handler that ran to completion.
///
/// `Warning` counts as success for control-flow purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Failure,
    Warning,
}

/// Structured result returned by every operation handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    #[serde(default)]
    pub data: Params,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl OperationResult {
    /// Successful result carrying `data`.
    #[must_use]
    pub fn success(data: Params) -> Self {
        Self {
            status: OperationStatus::Success,
            data,
            error: None,
        }
    }

    /// Logical failure: the handler ran but the action did not succeed.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::failure_with(Params::new(), error)
    }

    #[must_use]
    pub fn failure_with(data: Params, error: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failure,
            data,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn warning(data: Params, message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Warning,
            data,
            error: Some(message.into()),
        }
    }

    /// Returns `true` for `Success` and `Warning`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status != OperationStatus::Failure
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
