//! The control-protocol server: reads requests line by line from the host,
//! dispatches each on its own task, and writes Responses and Notifications
//! through the single outbound writer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use rpa_core::{notification_names, RpcError, RpcRequest, RpcResponse};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::framing::{InboundCodec, InboundLine};
use super::lifecycle::Lifecycle;
use super::methods::{build_router, AgentContext, CatalogFactory, LazyCatalog};
use super::outbound::{spawn_writer, Outbound};
use super::router::{MethodError, MethodRouter};
use crate::config::AgentConfig;
use crate::engine::{panic_message, CatalogError, OperationCatalog, SharedSession};

/// Why `serve` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The host closed the input stream.
    Eof,
    /// A handler requested process termination.
    Terminated { exit_code: i32 },
}

pub struct AgentServer {
    config: AgentConfig,
    catalog_factory: CatalogFactory,
    session: SharedSession,
    lifecycle: Arc<Lifecycle>,
}

impl AgentServer {
    /// Creates a server whose catalog is built by `factory` on first use.
    pub fn new<F>(config: AgentConfig, factory: F) -> Self
    where
        F: Fn() -> Result<OperationCatalog, CatalogError> + Send + Sync + 'static,
    {
        Self {
            config,
            catalog_factory: Arc::new(factory),
            session: SharedSession::new(),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Uses `session` instead of a fresh one.
    #[must_use]
    pub fn with_session(mut self, session: SharedSession) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Runs the read loop until the input closes or a handler requests
    /// termination.
    ///
    /// `agent.ready` is written before anything is read and before the catalog
    /// is built. On EOF, in-flight requests get up to `drain_timeout` to
    /// finish; their output is flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading from `reader` fails at the I/O level.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> anyhow::Result<ServeOutcome>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, _writer_task) = spawn_writer(writer, self.config.outbound_channel_capacity);

        outbound
            .notify(notification_names::AGENT_READY, json!({"status": "ready"}))
            .await;
        self.lifecycle.set_ready();
        info!("agent ready");

        let ctx = Arc::new(AgentContext {
            catalog: LazyCatalog::new(Arc::clone(&self.catalog_factory)),
            session: self.session.clone(),
            outbound: outbound.clone(),
            templates_path: self.config.templates_path.clone(),
        });
        let mut router = build_router(&ctx);
        drop(ctx);
        debug!(methods = ?router.methods().collect::<Vec<_>>(), "request methods registered");

        let mut lines = FramedRead::new(reader, InboundCodec::new(self.config.max_line_length));
        let mut terminate = self.lifecycle.termination_receiver();

        let read_result = loop {
            tokio::select! {
                biased;
                changed = terminate.changed() => {
                    let requested = *terminate.borrow();
                    match (changed, requested) {
                        (_, Some(exit_code)) => break Ok(ServeOutcome::Terminated { exit_code }),
                        (Err(_), None) => break Ok(ServeOutcome::Eof),
                        (Ok(()), None) => {}
                    }
                }
                next = lines.next() => match next {
                    None => break Ok(ServeOutcome::Eof),
                    Some(Ok(InboundLine::Line(line))) => {
                        self.dispatch(&line, &mut router, &outbound).await;
                    }
                    Some(Ok(InboundLine::Undecodable(reason))) => {
                        warn!(reason = %reason, "dropping undecodable input line");
                        outbound
                            .notify(notification_names::AGENT_ERROR, json!({"error": reason}))
                            .await;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "failed to read from host");
                        outbound
                            .notify(notification_names::AGENT_ERROR, json!({"error": e.to_string()}))
                            .await;
                        break Err(anyhow::Error::new(e).context("reading host input"));
                    }
                }
            }
        };

        self.lifecycle.begin_draining();
        drop(router);
        let read_result = match read_result {
            Ok(ServeOutcome::Eof) => Ok(self.drain(&mut terminate).await),
            other => other,
        };
        if outbound.flush().await.is_err() {
            warn!("outbound writer closed before final flush");
        }

        match &read_result {
            Ok(outcome) => info!(?outcome, "agent stopped"),
            Err(e) => error!(error = ?e, "agent stopped after input failure"),
        }
        read_result
    }

    /// Lets in-flight requests finish after EOF. A termination requested by one
    /// of them ends the drain early and wins over `Eof`.
    async fn drain(&self, terminate: &mut watch::Receiver<Option<i32>>) -> ServeOutcome {
        let timeout = self.config.drain_timeout;
        tokio::select! {
            drained = self.lifecycle.wait_for_drain(timeout) => {
                if !drained {
                    warn!(
                        in_flight = self.lifecycle.in_flight_count(),
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "drain timed out with requests still running"
                    );
                }
            }
            _ = terminate.changed() => {}
        }
        match self.lifecycle.termination_requested() {
            Some(exit_code) => ServeOutcome::Terminated { exit_code },
            None => ServeOutcome::Eof,
        }
    }

    /// Decodes one line and spawns its request task.
    async fn dispatch(&self, line: &str, router: &mut MethodRouter, outbound: &Outbound) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let request = match RpcRequest::from_line(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = ?e, "rejecting malformed request");
                outbound
                    .respond(RpcResponse::error(Value::Null, e.into_rpc_error()))
                    .await;
                return;
            }
        };

        let id = request.response_id();
        let span = info_span!("request", method = %request.method, id = %id);
        let future = match router.ready().await {
            Ok(router) => router.call(request),
            Err(e) => {
                outbound
                    .respond(RpcResponse::error(id, RpcError::internal(e)))
                    .await;
                return;
            }
        };

        let guard = self.lifecycle.in_flight_guard();
        let lifecycle = Arc::clone(&self.lifecycle);
        let outbound = outbound.clone();
        tokio::spawn(
            async move {
                let _guard = guard;
                let response = match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(result)) => RpcResponse::result(id, result),
                    Ok(Err(MethodError::Rpc(err))) => {
                        debug!(code = err.code, message = %err.message, "request failed");
                        RpcResponse::error(id, err)
                    }
                    Ok(Err(MethodError::Terminate { exit_code })) => {
                        warn!(exit_code, "termination requested");
                        lifecycle.request_termination(exit_code);
                        return;
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(panic = %message, "request task panicked");
                        RpcResponse::error(id, RpcError::internal(message))
                    }
                };
                outbound.respond(response).await;
            }
            .instrument(span),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
