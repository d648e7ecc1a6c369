//! `memory` category: handlers reading and writing the shared session.
//!
//! Keys are free-form and unscoped. `increment` and `append` are plain
//! read-then-write sequences, so concurrent requests touching the same key can
//! lose updates.

use async_trait::async_trait;
use rpa_core::{OperationResult, Params};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{data, display_value, string_param};
use crate::engine::{validate_params, OperationError, OperationHandler, SharedSession};

/// Integer or floating point value, kept apart so integer arithmetic stays
/// exact.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    /// Numbers pass through, booleans count as 0/1, and strings parse as a
    /// float when they contain a `.` and as an integer otherwise.
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::Bool(b) => Some(Self::Int(i64::from(*b))),
            Value::String(s) => {
                let s = s.trim();
                if s.contains('.') {
                    s.parse().ok().map(Self::Float)
                } else {
                    s.parse().ok().map(Self::Int)
                }
            }
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map_or_else(|| Self::Float(self.as_f64() + other.as_f64()), Self::Int),
            _ => Self::Float(self.as_f64() + other.as_f64()),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
        }
    }
}

fn storage_key(params: &Params) -> String {
    string_param(params, "storage_key", "")
}

/// `store {storage_key*, value*, value_type = string|number|boolean}`
pub struct StoreValue {
    session: SharedSession,
}

impl StoreValue {
    const REQUIRED: &'static [&'static str] = &["storage_key", "value"];

    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for StoreValue {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        if let Some(failure) = validate_params(params, Self::REQUIRED) {
            return Ok(failure);
        }
        let key = storage_key(params);
        let raw = params.get("value").cloned().unwrap_or(Value::Null);
        let value_type = string_param(params, "value_type", "string");

        let value = match value_type.as_str() {
            "number" => match Numeric::parse(&raw) {
                Some(n) => n.to_json(),
                None => {
                    return Ok(OperationResult::failure(format!(
                        "Cannot convert '{}' to number",
                        display_value(&raw)
                    )))
                }
            },
            "boolean" => {
                let text = display_value(&raw).to_lowercase();
                Value::Bool(matches!(text.as_str(), "true" | "1" | "yes"))
            }
            _ => raw,
        };

        info!(key = %key, value_type = %value_type, "storing session value");
        self.session.set(key.clone(), value.clone());

        Ok(OperationResult::success(data([
            ("storage_key", json!(key)),
            ("value", value),
            ("value_type", json!(value_type)),
        ])))
    }

    fn required_params(&self) -> &'static [&'static str] {
        Self::REQUIRED
    }
}

/// `get {storage_key*, default_value}`: a missing key without a default is a
/// warning, not a failure.
pub struct GetValue {
    session: SharedSession,
}

impl GetValue {
    const REQUIRED: &'static [&'static str] = &["storage_key"];

    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for GetValue {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        if let Some(failure) = validate_params(params, Self::REQUIRED) {
            return Ok(failure);
        }
        let key = storage_key(params);
        let value = self
            .session
            .get(&key)
            .filter(|v| !v.is_null())
            .or_else(|| params.get("default_value").filter(|v| !v.is_null()).cloned());

        match value {
            Some(value) => {
                debug!(key = %key, "read session value");
                Ok(OperationResult::success(data([
                    ("storage_key", json!(key)),
                    ("value", value),
                ])))
            }
            None => Ok(OperationResult::warning(
                data([("storage_key", json!(key))]),
                format!("No value found for key: {key}"),
            )),
        }
    }

    fn required_params(&self) -> &'static [&'static str] {
        Self::REQUIRED
    }
}

/// `clear {storage_key, clear_all}`
pub struct ClearValue {
    session: SharedSession,
}

impl ClearValue {
    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for ClearValue {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let clear_all = params.get("clear_all").and_then(Value::as_bool).unwrap_or(false);

        if clear_all {
            let removed = self.session.len();
            self.session.clear();
            info!(removed, "cleared all session values");
            return Ok(OperationResult::success(data([
                ("storage_key", json!("all")),
                ("clear_all", json!(true)),
            ])));
        }

        if let Some(failure) = validate_params(params, &["storage_key"]) {
            return Ok(failure);
        }
        let key = storage_key(params);
        if self.session.remove(&key).is_none() {
            return Ok(OperationResult::warning(
                data([("storage_key", json!(key))]),
                format!("No value found for key: {key}"),
            ));
        }

        info!(key = %key, "cleared session value");
        Ok(OperationResult::success(data([
            ("storage_key", json!(key)),
            ("clear_all", json!(false)),
        ])))
    }
}

/// `list`: every session entry and the entry count.
pub struct ListValues {
    session: SharedSession,
}

impl ListValues {
    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for ListValues {
    async fn execute(&self, _params: &Params) -> Result<OperationResult, OperationError> {
        let values = self.session.snapshot();
        Ok(OperationResult::success(data([
            ("count", json!(values.len())),
            ("values", Value::Object(values)),
        ])))
    }
}

/// `increment {storage_key*, increment_by = 1}`
///
/// A missing or non-numeric current value counts as 0.
pub struct IncrementValue {
    session: SharedSession,
}

impl IncrementValue {
    const REQUIRED: &'static [&'static str] = &["storage_key"];

    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for IncrementValue {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        if let Some(failure) = validate_params(params, Self::REQUIRED) {
            return Ok(failure);
        }
        let key = storage_key(params);
        let increment = match params.get("increment_by") {
            None | Some(Value::Null) => Numeric::Int(1),
            Some(raw) => match Numeric::parse(raw).filter(|_| !raw.is_boolean()) {
                Some(n) => n,
                None => {
                    return Ok(OperationResult::failure(format!(
                        "Failed to increment value: increment_by must be a number, got {raw}"
                    )))
                }
            },
        };

        let current = self
            .session
            .get(&key)
            .and_then(|v| Numeric::parse(&v))
            .unwrap_or(Numeric::Int(0));
        let updated = current.add(increment);
        self.session.set(key.clone(), updated.to_json());
        info!(key = %key, old = ?current, new = ?updated, "incremented session value");

        Ok(OperationResult::success(data([
            ("storage_key", json!(key)),
            ("old_value", current.to_json()),
            ("new_value", updated.to_json()),
            ("increment_by", increment.to_json()),
        ])))
    }

    fn required_params(&self) -> &'static [&'static str] {
        Self::REQUIRED
    }
}

/// `append {storage_key*, value*}`: a non-list current value is replaced by a
/// fresh list.
pub struct AppendValue {
    session: SharedSession,
}

impl AppendValue {
    const REQUIRED: &'static [&'static str] = &["storage_key", "value"];

    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for AppendValue {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        if let Some(failure) = validate_params(params, Self::REQUIRED) {
            return Ok(failure);
        }
        let key = storage_key(params);
        let value = params.get("value").cloned().unwrap_or(Value::Null);

        let mut list = match self.session.get(&key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        list.push(value.clone());
        let size = list.len();
        self.session.set(key.clone(), Value::Array(list));
        debug!(key = %key, size, "appended to session list");

        Ok(OperationResult::success(data([
            ("storage_key", json!(key)),
            ("value", value),
            ("list_size", json!(size)),
        ])))
    }

    fn required_params(&self) -> &'static [&'static str] {
        Self::REQUIRED
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
