//! RPA agent: a catalog of automation operations driven by a host process
//! over a line-delimited JSON-RPC channel on stdin/stdout.

pub mod config;
pub mod engine;
pub mod logging;
pub mod operations;
pub mod protocol;

pub use config::{AgentConfig, ConfigError, LogConfig, LogFormat};
pub use protocol::{AgentServer, ServeOutcome};
