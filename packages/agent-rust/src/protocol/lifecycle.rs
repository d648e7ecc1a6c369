//! Agent lifecycle: state transitions, in-flight request tracking, and the
//! termination signal raised by a handler.
//!
//! State lives in an `ArcSwap` so any task can read it without locking. The
//! in-flight count and the termination request are both `watch` channels, so
//! the server loop can await "count reached zero" or "termination requested"
//! instead of polling.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::info;

/// Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Constructed, `agent.ready` not yet sent.
    Starting,
    /// Reading and dispatching requests.
    Ready,
    /// Input closed or termination requested; no new requests are read.
    Draining,
    /// Every in-flight request has finished.
    Stopped,
}

/// Shared by the server loop and every request task.
#[derive(Debug)]
pub struct Lifecycle {
    state: ArcSwap<AgentState>,
    in_flight: Arc<watch::Sender<u64>>,
    terminate: watch::Sender<Option<i32>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        let (terminate, _) = watch::channel(None);
        Self {
            state: ArcSwap::from_pointee(AgentState::Starting),
            in_flight: Arc::new(in_flight),
            terminate,
        }
    }

    #[must_use]
    pub fn state(&self) -> AgentState {
        **self.state.load()
    }

    fn transition(&self, next: AgentState) {
        let previous = *self.state.swap(Arc::new(next));
        if previous != next {
            info!(from = ?previous, to = ?next, "agent state changed");
        }
    }

    pub fn set_ready(&self) {
        self.transition(AgentState::Ready);
    }

    /// Stops intake. Requests already dispatched keep running.
    pub fn begin_draining(&self) {
        self.transition(AgentState::Draining);
    }

    /// Records a termination request. The first request wins; later exit codes
    /// are ignored.
    pub fn request_termination(&self, exit_code: i32) {
        self.terminate.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit_code);
            true
        });
    }

    /// Exit code of the pending termination request, if any.
    #[must_use]
    pub fn termination_requested(&self) -> Option<i32> {
        *self.terminate.borrow()
    }

    /// Receiver notified when a termination request is recorded.
    #[must_use]
    pub fn termination_receiver(&self) -> watch::Receiver<Option<i32>> {
        self.terminate.subscribe()
    }

    /// Marks one dispatched request as running.
    ///
    /// The count drops when the guard does, so a request task that panics or
    /// returns early still releases its slot. Move the guard into the spawned
    /// task, not the dispatching loop.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.send_modify(|count| *count += 1);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        *self.in_flight.borrow()
    }

    /// Waits until no request is in flight, for at most `timeout`.
    ///
    /// Moves to `Stopped` and returns `true` once the count reaches zero.
    /// Returns `false` and leaves the state untouched if the deadline passes
    /// first; the stragglers keep running and their output may be lost.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut count = self.in_flight.subscribe();
        let drained = matches!(
            tokio::time::timeout(timeout, count.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        );
        if drained {
            self.transition(AgentState::Stopped);
        }
        drained
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII slot in the in-flight count; see [`Lifecycle::in_flight_guard`].
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<watch::Sender<u64>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|count| *count = count.saturating_sub(1));
    }
}
