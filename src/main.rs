//! # Argo Attach Controller
//!
//! A Kubernetes controller that attaches clusters and namespaces to Argo CD.
//!
//! ## Overview
//!
//! The controller watches two custom resources across all namespaces:
//!
//! 1. **`ArgoCluster`** - Publishes a cluster, reached through its admin
//!    kubeconfig, as an Argo CD cluster secret
//! 2. **`ArgoNamespace`** - Publishes a single namespace of the local cluster,
//!    authenticated with a service account token
//!
//! Each resource is guarded by a finalizer so the Argo CD secret and any
//! generated identity are removed before the resource disappears.
//!
//! ## Usage
//!
//! ```bash
//! argo-attach-controller --workers 4 --blocked-ns kube-system --blocked-ns default
//! ```

use anyhow::{Context, Result};
use argo_attach_controller::config::ControllerConfig;
use argo_attach_controller::observability;
use argo_attach_controller::runtime::initialization;
use argo_attach_controller::server::{start_server, ServerState};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Argo Attach Controller
///
/// Flags override the corresponding environment variables.
#[derive(Parser, Debug)]
#[command(name = "argo-attach-controller", version, about, long_about = None)]
struct Args {
    /// Full resync period in seconds (0 disables resync)
    #[arg(long)]
    resync_period: Option<u64>,

    /// Namespace an ArgoCluster may not target; repeatable
    #[arg(long = "blocked-ns")]
    blocked_ns: Vec<String>,

    /// Number of workers draining the queue
    #[arg(long)]
    workers: Option<usize>,

    /// Port of the metrics and probe server
    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(secs) = self.resync_period {
            config.resync_period_secs = secs;
        }
        if !self.blocked_ns.is_empty() {
            config.blocked_namespaces = self.blocked_ns;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
    }
}

/// Handlers for the signals that stop the controller
///
/// Kubernetes sends SIGTERM on pod deletion; SIGINT covers local runs.
struct ShutdownSignals {
    terminate: Option<Signal>,
}

impl ShutdownSignals {
    /// Install the SIGTERM handler now, so a signal arriving before
    /// `recv` is polled still triggers a clean shutdown
    fn register() -> Self {
        let terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => Some(terminate),
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                None
            }
        };
        Self { terminate }
    }

    /// Wait for the first shutdown signal and return its name
    async fn recv(mut self) -> &'static str {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        };
        let terminate = async {
            match self.terminate.as_mut() {
                Some(terminate) => {
                    terminate.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = interrupt => "SIGINT",
            () = terminate => "SIGTERM",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argo_attach_controller=info".into()),
        )
        .init();

    // Must happen before the Kubernetes client opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    info!(
        build_datetime = env!("BUILD_DATETIME"),
        build_git_hash = env!("BUILD_GIT_HASH"),
        "Starting Argo Attach Controller"
    );

    let shutdown = ShutdownSignals::register();

    let mut config = ControllerConfig::from_env();
    Args::parse().apply(&mut config);

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let initialization::InitializationResult {
        runtime,
        change_source,
    } = initialization::initialize(client, &config);

    let sync = change_source.initial_sync();
    server_state.attach_sync(Arc::clone(&sync));

    let cancel = CancellationToken::new();
    let workers = tokio::spawn(Arc::clone(&runtime).run(cancel.clone(), config.workers));
    let watches = tokio::spawn(change_source.run(cancel.clone(), runtime.enqueuer()));

    let ready_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = sync.wait() => info!("All managed kinds listed, controller ready"),
            () = ready_cancel.cancelled() => {}
        }
    });

    let received = shutdown.recv().await;
    info!(signal = received, "Shutdown signal received");

    server_state.mark_draining();
    cancel.cancel();

    if let Err(e) = watches.await {
        error!("Change source task failed: {}", e);
    }
    workers.await.context("Worker pool task failed")?;

    info!("Controller stopped");
    Ok(())
}
