//! Sequential workflow execution with fault isolation.

use std::sync::Arc;

use rpa_core::{Step, StepResult};
use tracing::{info_span, warn, Instrument};

use super::catalog::OperationCatalog;
use super::handler::OperationError;
use super::session::SharedSession;

/// Reasons a workflow run ends without producing results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("step `{step_id}` requested process termination with exit code {exit_code}")]
    Terminated { step_id: String, exit_code: i32 },
}

/// Runs a list of steps, in order, against one catalog and session.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    catalog: Arc<OperationCatalog>,
    session: SharedSession,
}

impl WorkflowRunner {
    #[must_use]
    pub fn new(catalog: Arc<OperationCatalog>, session: SharedSession) -> Self {
        Self { catalog, session }
    }

    /// Executes `steps` strictly sequentially.
    ///
    /// Always yields exactly one result per step, with `index` equal to the
    /// step's position. A logical failure does not stop the run; the first
    /// uncaught fault does, and every later step is reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Terminated` if a step asked for the process to
    /// end. No results are produced in that case.
    pub async fn run(&self, steps: &[Step]) -> Result<Vec<StepResult>, WorkflowError> {
        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let id = step.resolved_id(index);
            let key = step.key();
            let span = info_span!("step", id = %id, index, operation = %key);

            let outcome = self
                .catalog
                .execute(&key, &step.params, &self.session)
                .instrument(span)
                .await;

            match outcome {
                Ok(result) => results.push(StepResult::completed(id, index, result)),
                Err(OperationError::Terminate { exit_code }) => {
                    return Err(WorkflowError::Terminated {
                        step_id: id,
                        exit_code,
                    });
                }
                Err(err) => {
                    warn!(step = %id, index, error = %err, "workflow step faulted, skipping the rest");
                    let traceback = err.traceback();
                    results.push(StepResult::error(id.clone(), index, err.to_string(), traceback));
                    for (later, skipped) in steps.iter().enumerate().skip(index + 1) {
                        results.push(StepResult::skipped(skipped.resolved_id(later), later, &id));
                    }
                    break;
                }
            }
        }

        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rpa_core::{OperationStatus, StepStatus};
    use serde_json::json;

    use super::*;
    use crate::engine::testing::{params, test_catalog};

    fn step(id: Option<&str>, operation: &str) -> Step {
        Step {
            id: id.map(str::to_string),
            category: "test".into(),
            operation: operation.into(),
            ..Step::default()
        }
    }

    fn runner() -> WorkflowRunner {
        WorkflowRunner::new(Arc::new(test_catalog()), SharedSession::new())
    }

    #[tokio::test]
    async fn fault_halts_and_skips_remaining_steps() {
        let steps = vec![
            step(Some("s1"), "echo"),
            step(Some("s2"), "echo"),
            step(Some("s3"), "fault"),
            step(Some("s4"), "echo"),
            step(Some("s5"), "echo"),
        ];
        let results = runner().run(&steps).await.unwrap();

        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Error,
                StepStatus::Skipped,
                StepStatus::Skipped,
            ]
        );
        assert_eq!(results[2].error.as_deref(), Some("boom"));
        assert!(results[2].traceback.as_deref().unwrap().contains("boom"));
        for skipped in &results[3..] {
            assert_eq!(skipped.reason.as_deref(), Some("Skipped due to error in step s3"));
            assert!(skipped.result.is_none());
        }
        assert_eq!(results[4].id, "s5");
    }

    #[tokio::test]
    async fn panicking_step_counts_as_fault() {
        let steps = vec![step(None, "panic"), step(None, "echo")];
        let results = runner().run(&steps).await.unwrap();
        assert_eq!(results[0].status, StepStatus::Error);
        assert!(results[0].error.as_deref().unwrap().contains("handler exploded"));
        assert_eq!(results[1].status, StepStatus::Skipped);
        assert_eq!(
            results[1].reason.as_deref(),
            Some("Skipped due to error in step step-0")
        );
    }

    #[tokio::test]
    async fn logical_failure_does_not_halt() {
        let steps = vec![step(None, "echo"), step(None, "fail"), step(None, "echo")];
        let results = runner().run(&steps).await.unwrap();
        assert!(results.iter().all(|r| r.status == StepStatus::Completed));
        assert_eq!(
            results[1].result.as_ref().unwrap().status,
            OperationStatus::Failure
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_completed_with_inner_failure() {
        let steps = vec![step(None, "no_such_operation")];
        let results = runner().run(&steps).await.unwrap();
        assert_eq!(results[0].status, StepStatus::Completed);
        assert_eq!(
            results[0].result.as_ref().unwrap().error.as_deref(),
            Some("Operation not found: test/None/no_such_operation")
        );
    }

    #[tokio::test]
    async fn missing_ids_default_to_index() {
        let steps = vec![step(None, "echo"), step(Some("named"), "echo"), step(None, "fault"), step(None, "echo")];
        let results = runner().run(&steps).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["step-0", "named", "step-2", "step-3"]);
    }

    #[tokio::test]
    async fn nested_steps_receive_their_params() {
        let mut s = step(None, "echo");
        s.subcategory = Some("group".into());
        s.params = params(json!({"cell": "A1"}));
        let results = runner().run(&[s]).await.unwrap();
        assert_eq!(results[0].result.as_ref().unwrap().data["cell"], json!("A1"));
    }

    #[tokio::test]
    async fn terminate_propagates_without_results() {
        let steps = vec![step(Some("a"), "echo"), step(Some("bye"), "exit"), step(None, "echo")];
        let err = runner().run(&steps).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::Terminated {
                step_id: "bye".into(),
                exit_code: 3
            }
        );
    }

    #[tokio::test]
    async fn empty_workflow_yields_no_results() {
        assert!(runner().run(&[]).await.unwrap().is_empty());
    }

    fn arb_operation() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("echo"), Just("fail"), Just("fault"), Just("missing")]
    }

    proptest! {
        #[test]
        fn one_result_per_step_in_order(ops in proptest::collection::vec(arb_operation(), 0..20)) {
            let steps: Vec<Step> = ops.iter().map(|op| step(None, op)).collect();
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let results = rt.block_on(runner().run(&steps)).unwrap();

            prop_assert_eq!(results.len(), steps.len());
            for (i, result) in results.iter().enumerate() {
                prop_assert_eq!(result.index, i);
                prop_assert_eq!(&result.id, &format!("step-{i}"));
            }
            let first_fault = ops.iter().position(|op| *op == "fault");
            if let Some(f) = first_fault {
                prop_assert!(results[f + 1..].iter().all(|r| r.status == StepStatus::Skipped));
            } else {
                prop_assert!(results.iter().all(|r| r.status == StepStatus::Completed));
            }
        }
    }
}
