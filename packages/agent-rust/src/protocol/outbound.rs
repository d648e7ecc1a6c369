//! Single writer for the host-facing byte stream.
//!
//! Every Response and Notification is queued on a bounded channel and
//! written by one task, so lines from concurrent requests never interleave.

use futures_util::SinkExt;
use rpa_core::{OutgoingMessage, RpcNotification, RpcResponse};
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, warn};

/// Item consumed by the writer task.
#[derive(Debug)]
enum WriterCommand {
    Message(OutgoingMessage),
    /// Acknowledged once everything queued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// The writer task has exited; nothing more can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("outbound writer is closed")]
pub struct Disconnected;

/// Cloneable sending half of the outbound channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<WriterCommand>,
}

impl Outbound {
    /// Queues a message, waiting while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the writer task has exited.
    pub async fn send(&self, message: impl Into<OutgoingMessage>) -> Result<(), Disconnected> {
        self.tx
            .send(WriterCommand::Message(message.into()))
            .await
            .map_err(|_| Disconnected)
    }

    /// Queues a Notification, logging instead of failing if the writer is gone.
    pub async fn notify(&self, method: &str, params: Value) {
        if self.send(RpcNotification::new(method, params)).await.is_err() {
            warn!(method, "dropping notification, writer closed");
        }
    }

    /// Queues a Response, logging instead of failing if the writer is gone.
    pub async fn respond(&self, response: RpcResponse) {
        let id = response.id.clone();
        if self.send(response).await.is_err() {
            warn!(id = %id, "dropping response, writer closed");
        }
    }

    /// Waits until every message queued before this call has been written
    /// and flushed.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the writer exited first.
    pub async fn flush(&self) -> Result<(), Disconnected> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(ack_tx))
            .await
            .map_err(|_| Disconnected)?;
        ack_rx.await.map_err(|_| Disconnected)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawns the writer task over `writer`.
///
/// The task ends once every `Outbound` clone is dropped and the queue is
/// empty. Serialization and write failures are logged and the task moves on
/// to the next message.
pub fn spawn_writer<W>(writer: W, capacity: usize) -> (Outbound, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        while let Some(command) = rx.recv().await {
            match command {
                WriterCommand::Message(message) => {
                    let line = match serde_json::to_string(&message) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize outbound message");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(line).await {
                        warn!(error = %e, "failed to write outbound message");
                    }
                }
                WriterCommand::Flush(ack) => {
                    if let Err(e) = SinkExt::<String>::flush(&mut sink).await {
                        warn!(error = %e, "failed to flush outbound stream");
                    }
                    let _ = ack.send(());
                }
            }
        }
        debug!("outbound writer finished");
    });
    (Outbound { tx }, handle)
}
