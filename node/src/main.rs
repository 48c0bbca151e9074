// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Harbor Node
//!
//! Entry point for the `harbor-node` binary. Parses CLI arguments, loads
//! settings, initializes logging and metrics, opens the ledger store, and
//! serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     start the node
//! - `config`  print the effective settings
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use harbor_protocol::service::ServiceParts;
use harbor_protocol::storage::{LedgerDb, LedgerStore, MemoryStore};
use harbor_protocol::ProtocolService;

use cli::{Commands, HarborNodeCli};
use metrics::NodeMetrics;
use settings::{NodeSettings, StorageBackend};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HarborNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Config(args) => print_config(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Applies CLI flags on top of loaded settings.
fn resolve_settings(args: &cli::RunArgs) -> Result<NodeSettings> {
    let mut settings = NodeSettings::load(args.config.as_deref())?;

    if let Some(dir) = &args.data_dir {
        settings.storage.backend = StorageBackend::Sled;
        settings.storage.path = dir.clone();
    }
    if let Some(port) = args.port {
        settings.http.port = port;
    }
    if let Some(port) = args.metrics_port {
        settings.metrics.port = port;
    }
    if let Some(format) = args.log_format {
        settings.log.format = format;
    }

    settings.validate()?;
    Ok(settings)
}

/// Opens the configured ledger store. Returns it with a label for `/status`.
fn open_store(settings: &NodeSettings) -> Result<(Arc<dyn LedgerStore>, String)> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; the ledger is lost on exit");
            Ok((Arc::new(MemoryStore::new()), "memory".to_string()))
        }
        StorageBackend::Sled => {
            let path = settings.storage.path.join("ledger");
            std::fs::create_dir_all(&path).with_context(|| {
                format!("failed to create database directory: {}", path.display())
            })?;
            let db = LedgerDb::open(&path)
                .with_context(|| format!("failed to open database at {}", path.display()))?;
            tracing::info!(path = %path.display(), "database opened");
            Ok((Arc::new(db), format!("sled:{}", path.display())))
        }
    }
}

/// Starts the node: API server, optional standalone metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let settings = resolve_settings(&args)?;
    logging::init_logging(&settings.log.level, settings.log.format);

    tracing::info!(
        http_port = settings.http.port,
        metrics_port = settings.metrics.port,
        storage = ?settings.storage.backend,
        "starting harbor-node"
    );

    // --- Persistent storage ---
    let (store, storage_label) = open_store(&settings)?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    let known_wallets = store.wallet_count().context("failed to count wallets")?;
    node_metrics.wallets.set(i64::try_from(known_wallets).unwrap_or(i64::MAX));

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(settings.http.event_buffer);

    // --- Protocol service ---
    let mut parts = ServiceParts::new(store);
    parts.events = api::event_sink(&node_metrics, &event_tx);
    let service = ProtocolService::with_parts(settings.core.clone(), parts)
        .context("invalid core config")?;

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            harbor_protocol::config::PROTOCOL_VERSION,
        ),
        storage: storage_label,
        started_at: chrono::Utc::now(),
        service: Arc::new(service),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = settings.http_addr()?;
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_server = if settings.metrics.standalone {
        let metrics_router = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics::metrics_handler))
            .with_state(Arc::clone(&node_metrics));
        let metrics_addr = settings.metrics_addr()?;
        let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
        tracing::info!("Metrics server listening on {}", metrics_addr);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_router).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    if let Some(handle) = metrics_server {
        handle.abort();
    }
    tracing::info!("harbor-node stopped");
    Ok(())
}

/// Prints the effective settings as JSON to stdout.
fn print_config(args: cli::ConfigArgs) -> Result<()> {
    let settings = NodeSettings::load(args.config.as_deref())?;
    println!("{}", settings.render()?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("harbor-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", harbor_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the corresponding branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
