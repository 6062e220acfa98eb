mod config;
mod graph;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ServerConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Transaction status workflow engine.
#[derive(Parser)]
#[command(name = "txflow", version, about = "Transaction status workflow engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server over an in-memory store
    Serve {
        /// Port to listen on (overrides config file and TXFLOW_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Key required on /admin routes (overrides TXFLOW_ADMIN_KEY)
        #[arg(long)]
        admin_key: Option<String>,
    },

    /// Print the default workflow graph and any consistency issues
    Graph,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("error: failed to initialise logging: {}", e);
        process::exit(1);
    }

    match cli.command {
        Commands::Serve {
            port,
            config,
            admin_key,
        } => {
            let config = match resolve_config(config, port, admin_key) {
                Ok(c) => c,
                Err(msg) => {
                    eprintln!("error: {}", msg);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Graph => graph::cmd_graph(cli.output),
    }
}

/// Logs go to stderr so `--output json` stays machine-readable.
fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("txflow=info".parse()?),
        )
        .init();
    Ok(())
}

/// File, then environment, then flags.
fn resolve_config(
    path: Option<PathBuf>,
    port: Option<u16>,
    admin_key: Option<String>,
) -> Result<ServerConfig, String> {
    let mut config = ServerConfig::load(path.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(key) = admin_key.filter(|k| !k.is_empty()) {
        config.admin_api_key = Some(key);
    }
    Ok(config)
}
