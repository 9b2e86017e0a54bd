//! remofs server
//!
//! Serves one directory tree to remote clients over TCP.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use server::config::Config;
use server::Server;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// remofs server - sandboxed remote file service.
#[derive(Parser, Debug)]
#[command(name = "remofs-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start serving the export root
    Serve {
        /// Address to listen on, overrides the config file
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Directory to export, overrides the config file
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();

    if let Commands::Serve { bind, root } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(root) = root {
            config.export.root = root.clone();
        }
    }

    config.validate()?;

    let _log_guard = init_tracing(
        &config.logging.level.to_lowercase(),
        cli.verbose,
        config.logging.file.as_deref(),
    )?;
    if let Some(path) = &cli.config {
        tracing::info!("Using config file: {:?}", path);
    }

    match cli.command {
        Commands::Serve { .. } => run_server(&config).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Run the server until SIGTERM or SIGINT.
async fn run_server(config: &Config) -> anyhow::Result<()> {
    tracing::info!("remofs server starting...");

    let server = Server::from_config(config).await?;
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve(shutdown.clone()));

    wait_for_shutdown_signal().await?;
    tracing::info!("Shutting down...");
    shutdown.cancel();

    handle.await.context("Server task failed")??;
    Ok(())
}

/// Set up logging to stdout and, optionally, a log file.
///
/// The returned guard must be held for the life of the process so buffered
/// file output is flushed.
fn init_tracing(
    level: &str,
    verbose: bool,
    file: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let Some(path) = file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Ok(Some(guard))
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["remofs-server", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { bind, root } => {
                assert!(bind.is_none());
                assert!(root.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "remofs-server",
            "-v",
            "--config",
            "/etc/remofs.toml",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--root",
            "/srv/share",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/remofs.toml")));
        match cli.command {
            Commands::Serve { bind, root } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
                assert_eq!(root, Some(PathBuf::from("/srv/share")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["remofs-server", "config", "-c", "x.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["remofs-server"]).is_err());
    }
}
