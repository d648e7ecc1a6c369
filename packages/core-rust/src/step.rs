//! Workflow step documents and per-step results.
//!
//! A `Step` is authored by the host and consumed exactly once by the workflow
//! runner. A `StepResult` is produced for every submitted step, in order, with
//! `index` equal to the step's position in the submitted list.

use serde::{Deserialize, Serialize};

use crate::types::{OperationKey, OperationResult, Params};

/// One unit of work in a submitted workflow.
///
/// `category` and `operation` default to empty strings so a malformed step
/// resolves to "not found" instead of rejecting the whole workflow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub params: Params,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl Step {
    /// The step's id, or `step-{index}` when the host supplied none.
    #[must_use]
    pub fn resolved_id(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("step-{index}"),
        }
    }

    /// Catalog key addressed by this step.
    #[must_use]
    pub fn key(&self) -> OperationKey {
        OperationKey {
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            operation: self.operation.clone(),
        }
    }
}

/// Terminal state of one step in a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The handler returned, whatever its inner status.
    Completed,
    /// A fault escaped the handler; the workflow stopped here.
    Error,
    /// Never executed because an earlier step faulted.
    Skipped,
}

/// Result entry for one submitted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<OperationResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub traceback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub index: usize,
}

impl StepResult {
    #[must_use]
    pub fn completed(id: String, index: usize, result: OperationResult) -> Self {
        Self {
            id,
            status: StepStatus::Completed,
            result: Some(result),
            error: None,
            traceback: None,
            reason: None,
            index,
        }
    }

    #[must_use]
    pub fn error(id: String, index: usize, error: String, traceback: String) -> Self {
        Self {
            id,
            status: StepStatus::Error,
            result: None,
            error: Some(error),
            traceback: Some(traceback),
            reason: None,
            index,
        }
    }

    /// A step that was never run because `failed_id` faulted before it.
    #[must_use]
    pub fn skipped(id: String, index: usize, failed_id: &str) -> Self {
        Self {
            id,
            status: StepStatus::Skipped,
            result: None,
            error: None,
            traceback: None,
            reason: Some(format!("Skipped due to error in step {failed_id}")),
            index,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
