//! CLI surface (SPEC_FULL.md's supplemental ambient surface): flags for
//! transport selection and config path, plus shell-completion generation.
//! Grounded on the teacher's `cli::commands` (`clap::Parser`/`Subcommand`,
//! a thin `run()` entry point `main.rs` awaits) — contextd's command set is
//! much smaller since the core is a single long-running daemon, not a
//! multi-surface assistant.

use crate::config::{self, Config, TransportKind};
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "contextd")]
#[command(about = "Developer-context daemon: session knowledge and context-folding branches")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Transport to serve the JSON-RPC protocol over.
    #[arg(long, value_enum, global = true)]
    transport: Option<CliTransport>,

    /// Path to a TOML config file. Defaults to `~/.contextd/config.toml`,
    /// falling back to built-in defaults if that doesn't exist either.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address the HTTP transport binds to (only used with `--transport http`).
    #[arg(long, global = true)]
    http_addr: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliTransport {
    Stdio,
    Http,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default when no subcommand is given).
    Serve,
    /// Print current effective configuration as TOML.
    Config,
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse argv and run the requested subcommand. `main.rs`'s whole job is to
/// install tracing and await this.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&cli.config, cli.transport, cli.http_addr).await,
        Commands::Config => print_config(&cli.config),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn resolve_config(config_path: &Option<PathBuf>) -> Result<Config> {
    config::load_config(config_path.as_deref())
}

fn print_config(config_path: &Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

async fn serve(
    config_path: &Option<PathBuf>,
    transport_override: Option<CliTransport>,
    http_addr_override: Option<String>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(transport) = transport_override {
        config.transport = match transport {
            CliTransport::Stdio => TransportKind::Stdio,
            CliTransport::Http => TransportKind::Http,
        };
    }
    if let Some(addr) = http_addr_override {
        config.http.addr = addr;
    }
    config.validate()?;

    // A failed install here means a recorder is already installed in this
    // process (tests, or a double-init) — `/metrics` then reports 503
    // rather than the daemon refusing to start over an ambient concern.
    let metrics_handle = crate::metrics::install_recorder().ok();

    let store = std::sync::Arc::new(crate::storage::local::LocalVectorStore::new());
    let embedder = std::sync::Arc::new(crate::storage::local::LocalEmbeddingProvider);
    let (dispatcher, branches) = crate::build_dispatcher(&config, store, embedder).await?;

    let shutdown_branches = branches.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_branches.shutdown().await;
            std::process::exit(0);
        }
    });

    match config.transport {
        TransportKind::Stdio => {
            info!("contextd serving JSON-RPC over stdio");
            crate::transport::stdio::run(&dispatcher).await?;
        }
        TransportKind::Http => {
            let addr: SocketAddr = config.http.addr.parse()?;
            let router = crate::transport::http::build_router(
                std::sync::Arc::new(dispatcher),
                branches,
                metrics_handle,
            );
            crate::transport::http::serve(addr, router).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_implicit_default_subcommand() {
        let cli = Cli::parse_from(["contextd"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn transport_flag_parses() {
        let cli = Cli::parse_from(["contextd", "--transport", "http"]);
        assert!(matches!(cli.transport, Some(CliTransport::Http)));
    }
}
