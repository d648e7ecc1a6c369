//! Built-in operations shipped with the agent.
//!
//! Additional handler families (UI automation, spreadsheets, browsers) plug in
//! through the same [`CatalogBuilder`] calls.

pub mod memory;
pub mod wait;

use std::time::Duration;

use rpa_core::Params;
use serde_json::Value;

use crate::engine::{CatalogBuilder, CatalogError, OperationCatalog, OperationEntry};

/// Category names used by the built-in catalog.
pub mod categories {
    pub const WAIT_CONTROL: &str = "wait_control";
    pub const MEMORY: &str = "memory";
}

/// Registers every built-in operation on `builder`.
#[must_use]
pub fn register_builtins(builder: CatalogBuilder) -> CatalogBuilder {
    use categories::{MEMORY, WAIT_CONTROL};

    builder
        .nested(
            WAIT_CONTROL,
            "wait",
            "seconds",
            OperationEntry::new(|_| wait::WaitSeconds).with_summary("Wait for a number of seconds"),
        )
        .nested(
            WAIT_CONTROL,
            "wait",
            "milliseconds",
            OperationEntry::new(|_| wait::WaitMilliseconds)
                .with_summary("Wait for a number of milliseconds"),
        )
        .nested(
            WAIT_CONTROL,
            "wait",
            "random",
            OperationEntry::new(|_| wait::RandomWait)
                .with_summary("Wait for a random duration within bounds"),
        )
        .nested(
            WAIT_CONTROL,
            "wait",
            "condition",
            OperationEntry::new(wait::WaitForCondition::new)
                .with_summary("Wait until a session value satisfies a condition"),
        )
        .operation(
            WAIT_CONTROL,
            "raise_error",
            OperationEntry::new(|_| wait::RaiseError).with_summary("Report a user-defined failure"),
        )
        .operation(
            WAIT_CONTROL,
            "force_exit",
            OperationEntry::new(|_| wait::ForceExit).with_summary("Terminate the agent process"),
        )
        .operation(
            MEMORY,
            "store",
            OperationEntry::new(memory::StoreValue::new).with_summary("Store a value in the session"),
        )
        .operation(
            MEMORY,
            "get",
            OperationEntry::new(memory::GetValue::new).with_summary("Read a value from the session"),
        )
        .operation(
            MEMORY,
            "clear",
            OperationEntry::new(memory::ClearValue::new)
                .with_summary("Remove one session value or all of them"),
        )
        .operation(
            MEMORY,
            "list",
            OperationEntry::new(memory::ListValues::new).with_summary("List every session value"),
        )
        .operation(
            MEMORY,
            "increment",
            OperationEntry::new(memory::IncrementValue::new)
                .with_summary("Add to a numeric session value"),
        )
        .operation(
            MEMORY,
            "append",
            OperationEntry::new(memory::AppendValue::new)
                .with_summary("Append to a list stored in the session"),
        )
}

/// The catalog the agent binary serves.
///
/// # Errors
///
/// Returns `CatalogError` if two built-ins collide.
pub fn builtin_catalog() -> Result<OperationCatalog, CatalogError> {
    register_builtins(CatalogBuilder::new()).build()
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

/// Reads a numeric parameter. Absent or `null` yields `default`; numeric
/// strings are accepted since step documents often carry them.
pub(crate) fn number_param(params: &Params, key: &str, default: f64) -> Result<f64, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("parameter `{key}` is not a finite number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("parameter `{key}` must be a number, got '{s}'")),
        Some(other) => Err(format!("parameter `{key}` must be a number, got {other}")),
    }
}

/// Converts seconds into a sleep duration, rejecting negative and non-finite
/// values.
pub(crate) fn duration_from_secs(secs: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid duration: {secs} seconds"))
}

/// Textual form used when comparing or converting loosely typed values:
/// strings render without quotes, everything else as JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads a string parameter, falling back to `default` when absent or null.
pub(crate) fn string_param(params: &Params, key: &str, default: &str) -> String {
    match params.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(value) => display_value(value),
    }
}

/// Builds a result data object from `(key, value)` pairs.
pub(crate) fn data<const N: usize>(pairs: [(&str, Value); N]) -> Params {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::testing::params;

    #[test]
    fn builtin_catalog_lists_expected_paths() {
        let catalog = builtin_catalog().unwrap();
        let listed = catalog.list_available();
        assert_eq!(
            listed[categories::WAIT_CONTROL],
            vec![
                "wait/seconds",
                "wait/milliseconds",
                "wait/random",
                "wait/condition",
                "raise_error",
                "force_exit"
            ]
        );
        assert_eq!(
            listed[categories::MEMORY],
            vec!["store", "get", "clear", "list", "increment", "append"]
        );
    }

    #[test]
    fn number_param_accepts_numbers_and_numeric_strings() {
        let p = params(json!({"a": 2, "b": "1.5", "c": null, "d": "soon", "e": [1]}));
        assert_eq!(number_param(&p, "a", 0.0), Ok(2.0));
        assert_eq!(number_param(&p, "b", 0.0), Ok(1.5));
        assert_eq!(number_param(&p, "c", 7.0), Ok(7.0));
        assert_eq!(number_param(&p, "missing", 7.0), Ok(7.0));
        assert!(number_param(&p, "d", 0.0).is_err());
        assert!(number_param(&p, "e", 0.0).is_err());
    }

    #[test]
    fn durations_reject_negative_and_nan() {
        assert_eq!(duration_from_secs(0.25), Ok(Duration::from_millis(250)));
        assert!(duration_from_secs(-1.0).is_err());
        assert!(duration_from_secs(f64::NAN).is_err());
    }

    #[test]
    fn display_value_strips_string_quotes() {
        assert_eq!(display_value(&json!("done")), "done");
        assert_eq!(display_value(&json!(3)), "3");
        assert_eq!(display_value(&json!(true)), "true");
        assert_eq!(display_value(&Value::Null), "null");
    }
}
