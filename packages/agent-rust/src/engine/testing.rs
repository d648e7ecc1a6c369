//! Handlers used by unit tests across the crate.

use std::time::Duration;

use async_trait::async_trait;
use rpa_core::{OperationResult, Params};
use serde_json::{json, Value};

use super::catalog::{CatalogBuilder, OperationCatalog, OperationEntry};
use super::handler::{OperationError, OperationHandler};

pub(crate) fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("params must be an object, got {other}"),
    }
}

/// Succeeds and echoes its parameters back as data.
pub(crate) struct Echo;

#[async_trait]
impl OperationHandler for Echo {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        Ok(OperationResult::success(params.clone()))
    }
}

/// Succeeds with `{"tag": <tag>}`.
pub(crate) struct Tagged(pub &'static str);

#[async_trait]
impl OperationHandler for Tagged {
    async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
        Ok(OperationResult::success(params(json!({"tag": self.0}))))
    }
}

/// Returns a logical failure.
pub(crate) struct Fail;

#[async_trait]
impl OperationHandler for Fail {
    async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
        Ok(OperationResult::failure("element not found"))
    }
}

/// Returns an uncaught fault.
pub(crate) struct Fault;

#[async_trait]
impl OperationHandler for Fault {
    async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
        Err(OperationError::fault("boom"))
    }
}

/// Panics while executing.
pub(crate) struct Panic;

#[async_trait]
impl OperationHandler for Panic {
    async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
        panic!("handler exploded")
    }
}

/// Requests process termination.
pub(crate) struct Exit(pub i32);

#[async_trait]
impl OperationHandler for Exit {
    async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
        Err(OperationError::Terminate { exit_code: self.0 })
    }
}

/// Sleeps for `ms` parameter milliseconds, then succeeds.
pub(crate) struct Sleep;

#[async_trait]
impl OperationHandler for Sleep {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(OperationResult::success(params.clone()))
    }
}

/// Sleeps for `ms` parameter milliseconds, then requests termination with
/// exit code 3.
pub(crate) struct DelayedExit;

#[async_trait]
impl OperationHandler for DelayedExit {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Err(OperationError::Terminate { exit_code: 3 })
    }
}

/// Catalog with one direct `test/<name>` entry per handler above, plus a
/// nested `test/group/echo`.
pub(crate) fn test_catalog() -> OperationCatalog {
    CatalogBuilder::new()
        .operation("test", "echo", OperationEntry::new(|_| Echo))
        .operation("test", "fail", OperationEntry::new(|_| Fail))
        .operation("test", "fault", OperationEntry::new(|_| Fault))
        .operation("test", "panic", OperationEntry::new(|_| Panic))
        .operation("test", "exit", OperationEntry::new(|_| Exit(3)))
        .operation("test", "sleep", OperationEntry::new(|_| Sleep))
        .operation("test", "delayed_exit", OperationEntry::new(|_| DelayedExit))
        .nested("test", "group", "echo", OperationEntry::new(|_| Echo))
        .build()
        .unwrap()
}
