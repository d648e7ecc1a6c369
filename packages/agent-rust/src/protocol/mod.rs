//! Line-delimited control protocol: framing, the outbound writer, request
//! methods, lifecycle tracking and the server loop.

pub mod framing;
pub mod lifecycle;
pub mod methods;
pub mod outbound;
pub mod router;
pub mod server;

pub use framing::{InboundCodec, InboundLine};
pub use lifecycle::{AgentState, InFlightGuard, Lifecycle};
pub use methods::{build_router, AgentContext, CatalogFactory, LazyCatalog, SEQUENTIAL_MODE};
pub use outbound::{spawn_writer, Disconnected, Outbound};
pub use router::{MethodError, MethodRouter};
pub use server::{AgentServer, ServeOutcome};
