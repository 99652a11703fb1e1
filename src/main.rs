//! stockroom server
//!
//! Serves the admin API over Axum. Storage is a Sled database under
//! `--data-dir`; tokens are signed with `--jwt-secret`.
//!
//! Usage:
//!   cargo run --bin seed_data                         # optional sample data
//!   cargo run --bin stockroom -- --jwt-secret dev     # start server on :11111

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use stockroom::auth::IdentityProvider;
use stockroom::bootstrap::ensure_superadmin;
use stockroom::config::Config;
use stockroom::rest::{create_router, AppState};
use stockroom::scanner::ScannerSupervisor;
use stockroom::storage::Storage;
use stockroom::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let _log_guard = telemetry::init(config.log_format, config.log_dir.as_deref());

    let storage = Storage::open(&config.data_dir)
        .with_context(|| format!("opening data dir {}", config.data_dir))?;
    let identity = IdentityProvider::new(
        storage.clone(),
        config.jwt_secret.as_bytes(),
        config.token_ttl_secs,
        config.bcrypt_cost,
    );

    if let (Some(email), Some(password)) = (&config.bootstrap_email, &config.bootstrap_password) {
        match ensure_superadmin(&identity, &storage, email, password)? {
            Some(uid) => info!(%uid, %email, "bootstrap superadmin created"),
            None => info!(%email, "bootstrap superadmin already present"),
        }
    }

    let scanner = ScannerSupervisor::new(config.scanner_argv());
    let state = Arc::new(AppState::new(storage.clone(), identity, scanner));
    let app = create_router(state.clone());

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, data_dir = %config.data_dir, "stockroom API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    if state.scanner.is_running().await {
        if let Err(e) = state.scanner.stop().await {
            warn!(error = %e, "failed to stop scanner on shutdown");
        }
    }
    storage.flush().await?;
    Ok(())
}
