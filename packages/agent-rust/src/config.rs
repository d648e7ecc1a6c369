//! Agent configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// File name of the template document served by `getOperationTemplates`.
pub const TEMPLATES_FILE_NAME: &str = "rpa_operations.json";

/// Top-level configuration for the agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Template document returned verbatim by `getOperationTemplates`.
    pub templates_path: PathBuf,
    /// Bounded channel capacity between request tasks and the writer task.
    pub outbound_channel_capacity: usize,
    /// Longest inbound line accepted, in bytes. Longer lines are discarded
    /// and reported with `agent.error`.
    pub max_line_length: usize,
    /// How long in-flight requests may keep running after input closes.
    pub drain_timeout: Duration,
    pub log: LogConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            templates_path: default_templates_path(),
            outbound_channel_capacity: 256,
            max_line_length: 16 * 1024 * 1024, // 16 MiB
            drain_timeout: Duration::from_secs(5),
            log: LogConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Checks values that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::ZeroLineLength);
        }
        self.log.validate()
    }
}

/// `rpa_operations.json` next to the running executable, or in the working
/// directory if the executable path is unavailable.
#[must_use]
pub fn default_templates_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(TEMPLATES_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(TEMPLATES_FILE_NAME))
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output settings. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `rpa_agent=debug,warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidLogLevel` if `level` is not a valid
    /// filter directive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidLogLevel {
                level: self.level.clone(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnknownLogFormat {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("outbound channel capacity must be greater than zero")]
    ZeroChannelCapacity,
    #[error("maximum line length must be greater than zero")]
    ZeroLineLength,
    #[error("invalid log level `{level}`: {reason}")]
    InvalidLogLevel { level: String, reason: String },
    #[error("unknown log format `{value}` (expected `text` or `json`)")]
    UnknownLogFormat { value: String },
}
