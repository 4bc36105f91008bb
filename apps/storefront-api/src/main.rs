//! # Storefront API Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Startup Sequence                                 │
//! │                                                                         │
//! │  1. Initialize tracing (RUST_LOG overrides the default filter)          │
//! │  2. Load Settings (defaults → storefront.toml → STOREFRONT__* env)      │
//! │  3. Open SQLite pool + run migrations                                   │
//! │  4. Build router, bind, serve until Ctrl+C / SIGTERM                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use storefront_api::{router, AppState, Settings};
use storefront_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting storefront API");

    let settings = Settings::load().context("loading configuration")?;
    info!(
        bind_addr = %settings.bind_addr,
        database = %settings.database_path,
        "Configuration loaded"
    );

    let db = Database::new(settings.db_config())
        .await
        .context("opening database")?;

    let state = Arc::new(AppState::new(db.clone(), &settings));
    let app = router(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG=debug` for everything, `RUST_LOG=storefront_db=trace` for one
/// crate. Default: info, debug for our crates.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,storefront_api=debug,storefront_db=debug,tower_http=debug,sqlx=warn")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
