// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SHROUD Authority Node
//!
//! Entry point for the `shroud-node` binary. Parses CLI arguments,
//! initialises logging and metrics, loads the Authority key, and serves the
//! HTTP surfaces.
//!
//! - `init`     — create the data directory and the Authority key
//! - `serve`    — public API, loopback admin API, metrics
//! - `simulate` — five-student reference run, in-process
//! - `version`  — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod report;
mod simulate;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;

use shroud_protocol::{Authority, Identity};

use cli::{Commands, ShroudNodeCli};
use metrics::NodeMetrics;

/// File name of the Authority's secret key inside the data directory.
const KEY_FILE: &str = "authority.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShroudNodeCli::parse();
    let format = cli.log_format.into();

    match cli.command {
        Commands::Init(args) => {
            logging::init_logging("shroud_node=info", format);
            init_node(args)
        }
        Commands::Serve(args) => {
            logging::init_logging(
                "shroud_node=info,shroud_protocol=info,tower_http=debug",
                format,
            );
            serve(args).await
        }
        Commands::Simulate(args) => {
            logging::init_logging("shroud_node=warn,shroud_protocol=warn", format);
            let authority = Authority::generate();
            let outcome = simulate::run(&authority)?;
            simulate::present(&outcome, args.report.as_deref())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Creates the data directory and writes a fresh Authority key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to replace it",
            key_path.display()
        );
    }

    let identity = Identity::generate();
    write_key(&key_path, &identity)?;
    let public_key = identity.public_key();

    tracing::info!(
        fingerprint = %public_key.fingerprint(),
        key_path = %key_path.display(),
        "authority key generated"
    );

    println!("Authority initialised.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Key file       : {}", key_path.display());
    println!("  Public key     : {}", public_key);
    Ok(())
}

fn write_key(path: &Path, identity: &Identity) -> Result<()> {
    std::fs::write(path, identity.to_secret_hex())
        .with_context(|| format!("failed to write authority key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Loads the Authority key from `data_dir`, generating one on first start.
fn load_or_create_identity(data_dir: &Path) -> Result<(Identity, PathBuf)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    let key_path = data_dir.join(KEY_FILE);

    if key_path.exists() {
        let text = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read {}", key_path.display()))?;
        let identity = Identity::from_secret_hex(text.trim())
            .with_context(|| format!("invalid authority key in {}", key_path.display()))?;
        Ok((identity, key_path))
    } else {
        let identity = Identity::generate();
        write_key(&key_path, &identity)?;
        tracing::warn!(
            key_path = %key_path.display(),
            "no authority key found, generated a new one"
        );
        Ok((identity, key_path))
    }
}

/// Serves the public API, the loopback admin API, and metrics until a
/// shutdown signal arrives.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    let (identity, key_path) = load_or_create_identity(&args.data_dir)?;
    let config = args.authority_config();
    let authority = Arc::new(Authority::new(identity, config));

    tracing::info!(
        api_port = args.api_port,
        admin_port = args.admin_port,
        metrics_port = args.metrics_port,
        key_path = %key_path.display(),
        public_key = %authority.public_key(),
        "starting shroud-node"
    );

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            shroud_protocol::config::PROTOCOL_VERSION,
        ),
        authority,
        metrics: Arc::clone(&node_metrics),
    };

    // --- Public API ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Admin API (loopback only) ---
    let admin_router = api::create_admin_router(app_state);
    let admin_addr = format!("127.0.0.1:{}", args.admin_port);
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr)
        .await
        .with_context(|| format!("failed to bind admin listener on {}", admin_addr))?;
    tracing::info!("Admin server listening on {}", admin_addr);

    // --- Metrics ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(admin_listener, admin_router) => {
            if let Err(e) = res {
                tracing::error!("Admin server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("shroud-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("shroud-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", shroud_protocol::config::PROTOCOL_VERSION);
    println!(
        "suite       {} / {} / {}",
        shroud_protocol::config::SIGNING_ALGORITHM,
        shroud_protocol::config::KEY_EXCHANGE_ALGORITHM,
        shroud_protocol::config::SYMMETRIC_ALGORITHM,
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that branch never resolves and the
/// other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
