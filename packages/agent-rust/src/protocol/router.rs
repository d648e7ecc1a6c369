//! Method routing: dispatches an `RpcRequest` to the service registered for
//! its `method`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rpa_core::{RpcError, RpcRequest};
use serde_json::Value;
use tower::Service;

/// Outcomes of a dispatched request other than a result value.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    /// Sent back to the host as an Error Response.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// A handler asked for the process to end. No Response is sent.
    #[error("process termination requested with exit code {exit_code}")]
    Terminate { exit_code: i32 },
}

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value, MethodError>> + Send>>;

type BoxedService =
    Box<dyn Service<RpcRequest, Response = Value, Error = MethodError, Future = BoxedFuture> + Send>;

// ---------------------------------------------------------------------------
// MethodRouter
// ---------------------------------------------------------------------------

/// Routes requests by method name. Unregistered methods fail with
/// `Method not found`.
pub struct MethodRouter {
    services: HashMap<&'static str, BoxedService>,
}

impl MethodRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Registers `service` for `method`, replacing any earlier registration.
    pub fn register<S>(&mut self, method: &'static str, service: S)
    where
        S: Service<RpcRequest, Response = Value, Error = MethodError> + Send + 'static,
        S::Future: Send + 'static,
    {
        self.services.insert(method, Box::new(ServiceWrapper(service)));
    }

    /// Registered method names, unordered.
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.services.keys().copied()
    }
}

impl Default for MethodRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<RpcRequest> for MethodRouter {
    type Response = Value;
    type Error = MethodError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        for svc in self.services.values_mut() {
            match svc.poll_ready(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RpcRequest) -> Self::Future {
        match self.services.get_mut(request.method.as_str()) {
            Some(svc) => svc.call(request),
            None => Box::pin(async move {
                Err(MethodError::Rpc(RpcError::method_not_found(&request.method)))
            }),
        }
    }
}

struct ServiceWrapper<S>(S);

impl<S> Service<RpcRequest> for ServiceWrapper<S>
where
    S: Service<RpcRequest, Response = Value, Error = MethodError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = MethodError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.poll_ready(cx)
    }

    fn call(&mut self, request: RpcRequest) -> Self::Future {
        Box::pin(self.0.call(request))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
