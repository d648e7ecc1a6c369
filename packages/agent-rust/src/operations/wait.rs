//! `wait_control` category: timed waits, condition polling, user-raised errors
//! and forced termination.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rpa_core::{OperationResult, Params};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{data, display_value, duration_from_secs, number_param, string_param};
use crate::engine::{validate_params, OperationError, OperationHandler, SharedSession};

/// Lower bound on the condition polling interval.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

fn wait_failure(detail: &str) -> OperationResult {
    OperationResult::failure(format!("Failed to wait: {detail}"))
}

/// `wait/seconds {wait_seconds = 1}`
pub struct WaitSeconds;

#[async_trait]
impl OperationHandler for WaitSeconds {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let delay = match number_param(params, "wait_seconds", 1.0).and_then(duration_from_secs) {
            Ok(delay) => delay,
            Err(e) => return Ok(wait_failure(&e)),
        };
        info!(seconds = delay.as_secs_f64(), "waiting");
        tokio::time::sleep(delay).await;

        let echoed = params.get("wait_seconds").cloned().unwrap_or_else(|| json!(1));
        Ok(OperationResult::success(data([("wait_seconds", echoed)])))
    }
}

/// `wait/milliseconds {wait_milliseconds = 100}`
pub struct WaitMilliseconds;

#[async_trait]
impl OperationHandler for WaitMilliseconds {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let delay = match number_param(params, "wait_milliseconds", 100.0)
            .and_then(|ms| duration_from_secs(ms / 1000.0))
        {
            Ok(delay) => delay,
            Err(e) => return Ok(wait_failure(&e)),
        };
        info!(milliseconds = delay.as_millis(), "waiting");
        tokio::time::sleep(delay).await;

        let echoed = params
            .get("wait_milliseconds")
            .cloned()
            .unwrap_or_else(|| json!(100));
        Ok(OperationResult::success(data([("wait_milliseconds", echoed)])))
    }
}

/// `wait/random {min_seconds = 1, max_seconds = 5}`
///
/// Bounds given in the wrong order are swapped.
pub struct RandomWait;

#[async_trait]
impl OperationHandler for RandomWait {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let bounds = number_param(params, "min_seconds", 1.0).and_then(|min| {
            let max = number_param(params, "max_seconds", 5.0)?;
            duration_from_secs(min)?;
            duration_from_secs(max)?;
            Ok(if min <= max { (min, max) } else { (max, min) })
        });
        let (min, max) = match bounds {
            Ok(bounds) => bounds,
            Err(e) => return Ok(wait_failure(&e)),
        };

        let actual = {
            let mut rng = rand::rng();
            rng.random_range(min..=max)
        };
        let delay = match duration_from_secs(actual) {
            Ok(delay) => delay,
            Err(e) => return Ok(wait_failure(&e)),
        };
        info!(seconds = actual, min, max, "waiting for a random duration");
        tokio::time::sleep(delay).await;

        Ok(OperationResult::success(data([
            ("min_seconds", json!(min)),
            ("max_seconds", json!(max)),
            ("actual_wait", json!(actual)),
        ])))
    }
}

// ---------------------------------------------------------------------------
// Condition polling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    Equals,
    NotEquals,
    Greater,
    Less,
}

impl Condition {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "greater" => Some(Self::Greater),
            "less" => Some(Self::Less),
            _ => None,
        }
    }

    /// Equality compares textual forms; ordering compares numerically and is
    /// never met when either side is not a number.
    fn is_met(self, current: &Value, expected: &Value) -> bool {
        match self {
            Self::Equals => display_value(current) == display_value(expected),
            Self::NotEquals => display_value(current) != display_value(expected),
            Self::Greater => matches!((as_number(current), as_number(expected)), (Some(a), Some(b)) if a > b),
            Self::Less => matches!((as_number(current), as_number(expected)), (Some(a), Some(b)) if a < b),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `wait/condition`: polls a session key until it satisfies a comparison.
pub struct WaitForCondition {
    session: SharedSession,
}

impl WaitForCondition {
    const REQUIRED: &'static [&'static str] = &["condition_key", "condition_value"];

    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationHandler for WaitForCondition {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        if let Some(failure) = validate_params(params, Self::REQUIRED) {
            return Ok(failure);
        }
        let key = string_param(params, "condition_key", "");
        let expected = params.get("condition_value").cloned().unwrap_or(Value::Null);
        let condition_name = string_param(params, "condition_type", "equals");
        let Some(condition) = Condition::parse(&condition_name) else {
            return Ok(OperationResult::failure(format!(
                "Unknown condition type: {condition_name}"
            )));
        };

        let limits = number_param(params, "timeout_seconds", 60.0).and_then(|timeout| {
            let interval = number_param(params, "check_interval", 1.0)?;
            Ok((timeout, duration_from_secs(timeout)?, duration_from_secs(interval)?))
        });
        let (timeout_secs, timeout, interval) = match limits {
            Ok(limits) => limits,
            Err(e) => {
                return Ok(OperationResult::failure(format!(
                    "Failed to wait for condition: {e}"
                )))
            }
        };
        let interval = interval.max(MIN_CHECK_INTERVAL);

        info!(key = %key, condition = %condition_name, expected = %expected, "waiting for condition");
        let started = tokio::time::Instant::now();
        loop {
            let current = self.session.get(&key).unwrap_or(Value::Null);

            if condition.is_met(&current, &expected) {
                let elapsed = started.elapsed().as_secs_f64();
                info!(key = %key, elapsed, "condition met");
                return Ok(OperationResult::success(data([
                    ("condition_key", json!(key)),
                    ("condition_value", expected),
                    ("current_value", current),
                    ("elapsed_seconds", json!(elapsed)),
                ])));
            }

            if started.elapsed() > timeout {
                return Ok(OperationResult::failure_with(
                    data([
                        ("condition_key", json!(key)),
                        ("condition_value", expected),
                        ("current_value", current),
                    ]),
                    format!("Timeout waiting for condition after {timeout_secs} seconds"),
                ));
            }

            tokio::time::sleep(interval).await;
        }
    }

    fn required_params(&self) -> &'static [&'static str] {
        Self::REQUIRED
    }
}

// ---------------------------------------------------------------------------
// Errors and termination
// ---------------------------------------------------------------------------

/// `raise_error {error_message, error_code}`: always a logical failure.
pub struct RaiseError;

#[async_trait]
impl OperationHandler for RaiseError {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let message = string_param(params, "error_message", "User defined error");
        let code = string_param(params, "error_code", "USER_ERROR");
        warn!(code = %code, message = %message, "user-defined error raised");

        Ok(OperationResult::failure_with(
            data([
                ("error_code", json!(code)),
                ("error_message", json!(message)),
            ]),
            message,
        ))
    }
}

/// `force_exit {exit_code = 0}`: asks the host process to end.
pub struct ForceExit;

#[async_trait]
impl OperationHandler for ForceExit {
    async fn execute(&self, params: &Params) -> Result<OperationResult, OperationError> {
        let exit_code = match params.get("exit_code") {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|code| i32::try_from(code).ok())
                .ok_or_else(|| format!("exit code {n} is out of range")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i32>()
                .map_err(|_| format!("exit code must be an integer, got '{s}'")),
            Some(other) => Err(format!("exit code must be an integer, got {other}")),
        };

        match exit_code {
            Ok(exit_code) => {
                warn!(exit_code, "force exit requested");
                Err(OperationError::Terminate { exit_code })
            }
            Err(e) => Ok(OperationResult::failure(format!("Failed to force exit: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
