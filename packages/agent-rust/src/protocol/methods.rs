//! Request methods served by the agent and the state they share.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use rpa_core::{
    method_names, notification_names, OperationKey, OperationResult, Params, RpcError, RpcRequest,
    Step,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tower::service_fn;
use tracing::{debug, info, warn};

use super::outbound::Outbound;
use super::router::{MethodError, MethodRouter};
use crate::engine::{
    CatalogError, OperationCatalog, OperationError, SharedSession, WorkflowError, WorkflowRunner,
};

/// Execution mode honoured by `executeOperations`. Any other requested mode
/// is logged and run sequentially.
pub const SEQUENTIAL_MODE: &str = "sequential";

/// Builds the operation catalog on demand.
pub type CatalogFactory = Arc<dyn Fn() -> Result<OperationCatalog, CatalogError> + Send + Sync>;

// ---------------------------------------------------------------------------
// LazyCatalog
// ---------------------------------------------------------------------------

/// Catalog built on first use, off the async workers. A failed build is not
/// cached; the next request tries again.
pub struct LazyCatalog {
    cell: OnceCell<Arc<OperationCatalog>>,
    factory: CatalogFactory,
}

impl LazyCatalog {
    #[must_use]
    pub fn new(factory: CatalogFactory) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
        }
    }

    /// # Errors
    ///
    /// Returns the factory's error, or `CatalogError::BuildFailed` if it
    /// panicked.
    pub async fn get(&self) -> Result<Arc<OperationCatalog>, CatalogError> {
        self.cell
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.factory);
                let catalog = tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(|e| CatalogError::BuildFailed(e.to_string()))??;
                info!(operations = catalog.len(), "operation catalog built");
                Ok::<_, CatalogError>(Arc::new(catalog))
            })
            .await
            .cloned()
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.cell.initialized()
    }
}

// ---------------------------------------------------------------------------
// AgentContext
// ---------------------------------------------------------------------------

/// State shared by every request task.
pub struct AgentContext {
    pub catalog: LazyCatalog,
    pub session: SharedSession,
    pub outbound: Outbound,
    pub templates_path: PathBuf,
}

/// Registers every method on a new router.
#[must_use]
pub fn build_router(ctx: &Arc<AgentContext>) -> MethodRouter {
    let mut router = MethodRouter::new();
    route(&mut router, method_names::PING, ctx, ping);
    route(&mut router, method_names::EXECUTE, ctx, execute);
    route(&mut router, method_names::LIST_OPERATIONS, ctx, list_operations);
    route(&mut router, method_names::GET_OPERATION_TEMPLATES, ctx, get_operation_templates);
    route(&mut router, method_names::EXECUTE_OPERATIONS, ctx, execute_operations);
    router
}

fn route<F, Fut>(router: &mut MethodRouter, method: &'static str, ctx: &Arc<AgentContext>, handler: F)
where
    F: Fn(Arc<AgentContext>, Value) -> Fut + Copy + Send + 'static,
    Fut: Future<Output = Result<Value, MethodError>> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    router.register(
        method,
        service_fn(move |request: RpcRequest| handler(Arc::clone(&ctx), request.params)),
    );
}

/// Missing `params` is treated as an empty object.
fn params_object(params: Value) -> Value {
    if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    }
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

async fn ping(_ctx: Arc<AgentContext>, _params: Value) -> Result<Value, MethodError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    Ok(json!({"pong": true, "timestamp": timestamp}))
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteParams {
    #[serde(default)]
    category: String,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    operation: String,
    #[serde(default)]
    params: Params,
}

async fn run_single(ctx: &AgentContext, params: Value) -> Result<OperationResult, OperationError> {
    let request: ExecuteParams =
        serde_json::from_value(params_object(params)).context("invalid execute params")?;
    let catalog = ctx.catalog.get().await.context("loading operation catalog")?;
    let key = OperationKey::new(request.category, request.subcategory.as_deref(), request.operation);
    catalog.execute(&key, &request.params, &ctx.session).await
}

async fn execute(ctx: Arc<AgentContext>, params: Value) -> Result<Value, MethodError> {
    let operation = params.get("operation").cloned().unwrap_or(Value::Null);
    ctx.outbound
        .notify(notification_names::TASK_STARTED, json!({"operation": operation.clone()}))
        .await;

    match run_single(&ctx, params).await {
        Ok(result) => {
            let result = serde_json::to_value(&result).map_err(RpcError::internal)?;
            ctx.outbound
                .notify(notification_names::TASK_COMPLETED, json!({"result": result}))
                .await;
            Ok(result)
        }
        Err(OperationError::Terminate { exit_code }) => Err(MethodError::Terminate { exit_code }),
        Err(err) => {
            warn!(operation = %operation, error = %err, "operation faulted");
            ctx.outbound
                .notify(
                    notification_names::TASK_FAILED,
                    json!({"error": {"error": err.to_string(), "traceback": err.traceback()}}),
                )
                .await;
            Err(RpcError::execution_failed(format!("Execution failed: {err}")).into())
        }
    }
}

async fn list_operations(ctx: Arc<AgentContext>, _params: Value) -> Result<Value, MethodError> {
    let catalog = ctx.catalog.get().await.map_err(RpcError::internal)?;
    Ok(json!({"operations": catalog.list_available()}))
}

async fn get_operation_templates(ctx: Arc<AgentContext>, _params: Value) -> Result<Value, MethodError> {
    let load = async {
        let text = tokio::fs::read_to_string(&ctx.templates_path)
            .await
            .with_context(|| format!("reading {}", ctx.templates_path.display()))?;
        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("parsing {}", ctx.templates_path.display()))
    };
    match load.await {
        Ok(templates) => {
            debug!(path = %ctx.templates_path.display(), "served operation templates");
            Ok(templates)
        }
        Err(e) => {
            warn!(error = ?e, "failed to load operation templates");
            Err(RpcError::execution_failed(format!("Failed to load operation templates: {e:#}")).into())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowParams {
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default)]
    mode: Option<String>,
}

async fn execute_operations(ctx: Arc<AgentContext>, params: Value) -> Result<Value, MethodError> {
    let request: WorkflowParams = serde_json::from_value(params_object(params))
        .map_err(|e| RpcError::internal(format!("invalid executeOperations params: {e}")))?;
    let mode = request.mode.unwrap_or_else(|| SEQUENTIAL_MODE.to_string());
    let count = request.steps.len();

    ctx.outbound
        .notify(
            notification_names::WORKFLOW_STARTED,
            json!({"steps": count, "mode": mode}),
        )
        .await;
    if mode != SEQUENTIAL_MODE {
        warn!(mode = %mode, "requested execution mode is not supported, running steps sequentially");
    }

    let catalog = match ctx.catalog.get().await {
        Ok(catalog) => catalog,
        Err(e) => {
            ctx.outbound
                .notify(
                    notification_names::WORKFLOW_FAILED,
                    json!({"error": {"error": e.to_string(), "traceback": format!("{e:?}")}}),
                )
                .await;
            return Err(RpcError::execution_failed(format!("Workflow execution failed: {e}")).into());
        }
    };

    let runner = WorkflowRunner::new(catalog, ctx.session.clone());
    match runner.run(&request.steps).await {
        Ok(results) => {
            let executed = results.len();
            let results = serde_json::to_value(&results).map_err(RpcError::internal)?;
            info!(steps = executed, "workflow finished");
            ctx.outbound
                .notify(
                    notification_names::WORKFLOW_COMPLETED,
                    json!({"results": results}),
                )
                .await;
            Ok(json!({"success": true, "results": results, "stepsExecuted": executed}))
        }
        Err(WorkflowError::Terminated { step_id, exit_code }) => {
            info!(step = %step_id, exit_code, "workflow requested termination");
            Err(MethodError::Terminate { exit_code })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counting_factory(builds: &Arc<AtomicU32>, fail: bool) -> CatalogFactory {
        let builds = Arc::clone(builds);
        Arc::new(move || {
            builds.fetch_add(1, Ordering::Relaxed);
            if fail {
                Err(CatalogError::BuildFailed("registry unavailable".into()))
            } else {
                Ok(crate::engine::testing::test_catalog())
            }
        })
    }

    #[tokio::test]
    async fn lazy_catalog_builds_once() {
        let builds = Arc::new(AtomicU32::new(0));
        let lazy = LazyCatalog::new(counting_factory(&builds, false));
        assert!(!lazy.is_built());

        let first = lazy.get().await.unwrap();
        let second = lazy.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(lazy.is_built());
        assert_eq!(builds.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn lazy_catalog_retries_after_failure() {
        let builds = Arc::new(AtomicU32::new(0));
        let lazy = LazyCatalog::new(counting_factory(&builds, true));
        assert!(lazy.get().await.is_err());
        assert!(lazy.get().await.is_err());
        assert!(!lazy.is_built());
        assert_eq!(builds.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn null_params_become_empty_object() {
        assert_eq!(params_object(Value::Null), json!({}));
        assert_eq!(params_object(json!({"a": 1})), json!({"a": 1}));
    }
}
