//! The execution contract every catalog leaf implements.

use std::sync::Arc;

use async_trait::async_trait;
use rpa_core::{OperationResult, Params};
use serde_json::Value;

use super::session::SharedSession;

/// A single catalog leaf.
///
/// A fresh handler is constructed with the shared session for every call.
/// Returning `Ok` means the handler ran to completion, even if the requested
/// action did not succeed (`status: failure`). Returning `Err` is an uncaught
/// fault that the calling layer converts into a protocol error or a workflow
/// `error` entry.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Runs the operation with the caller-supplied parameters.
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError>;

    /// Parameter names this handler expects to be present and non-null.
    /// Advisory only: handlers call [`validate_params`] themselves.
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Constructs a handler bound to the shared session.
pub type HandlerFactory = Arc<dyn Fn(SharedSession) -> Box<dyn OperationHandler> + Send + Sync>;

/// Faults escaping a handler.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("{0}")]
    Fault(#[from] anyhow::Error),
    #[error("operation panicked: {message}")]
    Panicked { message: String },
    /// The handler asked for the whole process to end. Never turned into a
    /// step result or a Response.
    #[error("process termination requested with exit code {exit_code}")]
    Terminate { exit_code: i32 },
}

impl OperationError {
    /// Convenience constructor for a fault with a plain message.
    pub fn fault(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Fault(anyhow::anyhow!(message))
    }

    /// Diagnostic detail reported alongside the error message: the full cause
    /// chain for faults, the payload for panics.
    #[must_use]
    pub fn traceback(&self) -> String {
        match self {
            Self::Fault(err) => format!("{err:?}"),
            Self::Panicked { message } => format!("panic: {message}"),
            Self::Terminate { .. } => self.to_string(),
        }
    }
}

/// Names from `required` that are absent or `null` in `params`.
#[must_use]
pub fn missing_params<'a>(params: &Params, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|key| params.get(*key).map_or(true, Value::is_null))
        .collect()
}

/// Checks that every required parameter is present and non-null.
///
/// Returns the `failure` result a handler should hand back, or `None` when all
/// parameters are present.
#[must_use]
pub fn validate_params(params: &Params, required: &[&str]) -> Option<OperationResult> {
    let missing = missing_params(params, required);
    if missing.is_empty() {
        None
    } else {
        Some(OperationResult::failure(format!(
            "Missing required parameters: {}",
            missing.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
