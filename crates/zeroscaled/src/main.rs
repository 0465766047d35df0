//! zeroscaled — the zeroscale daemon.
//!
//! Watches StatefulSets carrying the `zeroscale/idleTimeout` annotation
//! and scales each to zero once the resources it watches have been quiet
//! for the configured timeout, back to one on the next change.
//!
//! # Usage
//!
//! ```text
//! zeroscaled run --config /etc/zeroscale/zeroscaled.toml --namespace data
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zeroscale_autoscale::{Reconciler, RegistrationStore};
use zeroscale_core::DaemonConfig;
use zeroscale_kube::{KubeActivitySource, KubeWorkloadClient, WorkloadController};

const DEFAULT_LOG_FILTER: &str = "info,zeroscaled=debug,zeroscale=debug";

#[derive(Parser)]
#[command(name = "zeroscaled", about = "zeroscale daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller until interrupted.
    Run {
        /// Path to a TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only manage StatefulSets in this namespace.
        #[arg(long)]
        namespace: Option<String>,

        /// Emit JSON log lines.
        #[arg(long)]
        log_json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            namespace,
            log_json,
        } => {
            let file = match config {
                Some(path) => DaemonConfig::from_file(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?,
                None => DaemonConfig::default(),
            };
            let config = apply_overrides(file, namespace, log_json);
            init_tracing(&config)?;
            run(config).await
        }
    }
}

/// CLI flags take precedence over the config file.
fn apply_overrides(
    mut config: DaemonConfig,
    namespace: Option<String>,
    log_json: bool,
) -> DaemonConfig {
    if namespace.is_some() {
        config.controller.namespace = namespace;
    }
    config.logging.json |= log_json;
    config
}

fn init_tracing(config: &DaemonConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = config.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
            EnvFilter::try_new(directives)
                .with_context(|| format!("invalid log filter {directives:?}"))?
        }
    };

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("zeroscale daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let client = kube::Client::try_default()
        .await
        .context("failed to build kubernetes client")?;
    info!("kubernetes client initialized");

    let store = RegistrationStore::new(
        Arc::new(KubeWorkloadClient::new(client.clone())),
        Arc::new(KubeActivitySource::new(client.clone())),
    );
    let controller = WorkloadController::new(
        client,
        config.controller.namespace.clone(),
        Reconciler::new(store),
    );

    // ── Run until Ctrl-C ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut controller_handle = tokio::spawn(controller.run(shutdown_rx));

    let exited_early = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to install CTRL+C handler")?;
            false
        }
        result = &mut controller_handle => {
            result?;
            true
        }
    };

    if exited_early {
        warn!("workload controller exited on its own");
    } else {
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
        controller_handle.await?;
    }

    info!("zeroscale daemon stopped");
    Ok(())
}
