use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rpa_agent::config::{AgentConfig, LogConfig, LogFormat};
use rpa_agent::engine::generate_document;
use rpa_agent::operations::builtin_catalog;
use rpa_agent::{logging, AgentServer, ServeOutcome};
use rpa_core::StepIdentityRegistry;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rpa-agent")]
#[command(about = "Runs RPA operations for a host process over stdin/stdout")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Operation template document served by `getOperationTemplates`
    #[arg(long, env = "RPA_AGENT_TEMPLATES", global = true)]
    templates: Option<PathBuf>,

    /// Log filter directive; `RUST_LOG` takes precedence
    #[arg(long, env = "RPA_AGENT_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Log output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// How long in-flight requests may run after the host closes stdin
    #[arg(long, global = true)]
    drain_timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control protocol on stdin/stdout (default)
    Serve,

    /// Print the catalog document for the built-in operations
    Catalog {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl GlobalArgs {
    fn into_config(self) -> anyhow::Result<AgentConfig> {
        let mut config = AgentConfig {
            log: LogConfig {
                level: self.log_level,
                format: self.log_format,
            },
            ..AgentConfig::default()
        };
        if let Some(path) = self.templates {
            config.templates_path = path;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.drain_timeout = Duration::from_millis(ms);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.global.into_config()?;
    logging::init(&config.log)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let outcome = runtime.block_on(serve(config))?;
            if let ServeOutcome::Terminated { exit_code } = outcome {
                drop(runtime);
                std::process::exit(exit_code);
            }
            Ok(())
        }
        Command::Catalog { output } => write_catalog(output),
    }
}

async fn serve(config: AgentConfig) -> anyhow::Result<ServeOutcome> {
    info!(
        templates = %config.templates_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "starting rpa-agent"
    );
    let server = AgentServer::new(config, builtin_catalog);
    tokio::select! {
        outcome = server.serve(tokio::io::stdin(), tokio::io::stdout()) => outcome,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            warn!("interrupted, shutting down");
            Ok(ServeOutcome::Eof)
        }
    }
}

fn write_catalog(output: Option<PathBuf>) -> anyhow::Result<()> {
    let catalog = builtin_catalog().context("building operation catalog")?;
    let document = generate_document(&catalog, &StepIdentityRegistry::new());
    let json = serde_json::to_string_pretty(&document)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json + "\n")
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), steps = document.steps.len(), "catalog document written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
