//! Clairvoyance host
//!
//! Starts the embedded PocketBase, waits for it to be ready, then serves the
//! `/pb` proxy, the ontology API and the front-end on one port. A backend that
//! fails for good takes the host down with it.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clairvoyance_core::{OntologyStore, ProcessState};
use clairvoyance_server::config::AppConfig;
use clairvoyance_server::retry::{RetryPolicy, retry};
use clairvoyance_server::web::{self, AppState, RouterOptions};
use clairvoyance_server::{BackendClient, Bootstrapper, Supervisor};

/// The initial start is tried twice before the host gives up
const START_POLICY: RetryPolicy = RetryPolicy::fixed(2, Duration::from_secs(1));

/// Clairvoyance host server
#[derive(Parser)]
#[command(name = "clairvoyance-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Supervises PocketBase and serves the Clairvoyance app")]
struct Args {
    /// Port to listen on (overrides CLAIRVOYANCE_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Use an already running backend instead of spawning one
    #[arg(long)]
    no_spawn: bool,

    /// Serve the built front-end from this directory
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Clairvoyance host v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_spawn {
        config.backend.spawn = false;
    }
    if args.static_dir.is_some() {
        config.static_dir = args.static_dir;
    }
    info!(mode = ?config.mode, backend = %config.backend.base_url, "Configuration loaded");

    let store = OntologyStore::open(&config.ontology_db)
        .with_context(|| format!("opening ontology store at {}", config.ontology_db.display()))?;
    info!(path = %config.ontology_db.display(), "Ontology store ready");

    let supervisor = if config.backend.spawn {
        let supervisor = Supervisor::new(config.supervisor_config());
        retry(&START_POLICY, |_| supervisor.start(), |_| true)
            .await
            .map_err(|e| anyhow::anyhow!("embedded backend did not start: {}", e))?;
        Some(supervisor)
    } else {
        info!("Backend spawning disabled, using {}", config.backend.base_url);
        None
    };

    let backend = BackendClient::new(&config.backend.base_url)?;
    let bootstrap = Arc::new(Bootstrapper::new(backend.clone(), config.admin.clone()));

    // Kick the bootstrap off now; requests that need it wait on the same run
    {
        let bootstrap = bootstrap.clone();
        tokio::spawn(async move {
            if !bootstrap.ensure_initialized().await {
                warn!("Continuing without a bootstrapped backend");
            }
        });
    }

    let state = AppState::new(Arc::new(store), supervisor.clone(), backend, bootstrap);
    let app = web::build_router(state, &RouterOptions::from(&config));

    let host: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("invalid listen host '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);

    let backend_failed = supervisor.clone().map(|supervisor| async move {
        let mut status = supervisor.subscribe();
        loop {
            if status.borrow_and_update().state == ProcessState::Failed {
                return;
            }
            if status.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    });

    let shutdown = async move {
        let backend_failed = async {
            match backend_failed {
                Some(failed) => failed.await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = web::shutdown_signal() => {}
            _ = backend_failed => error!("Embedded backend failed permanently, shutting down"),
        }
    };

    let served = web::serve(app, addr, shutdown).await;

    let mut failed = false;
    if let Some(supervisor) = &supervisor {
        failed = supervisor.status().state == ProcessState::Failed;
        supervisor.stop().await;
    }

    served.with_context(|| format!("serving on {}", addr))?;
    if failed {
        anyhow::bail!("embedded backend failed");
    }

    info!("Clairvoyance host stopped");
    Ok(())
}
