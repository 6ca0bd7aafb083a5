// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sketchspace Authentication Service
//!
//! Serves sign-in, sign-out and registration for the Sketchspace image
//! board, with sign-in attempts throttled per caller address through a
//! file-backed token bucket store.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honoured):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `THROTTLE_STORE_PATH`: Bucket file (default: cache/.throttle.json)
//! - `MAX_LOGIN_TIME`: Session lifetime in seconds (default: 3600)
//! - `SESSION_COOKIE`: Session cookie name (default: SS_SESSION)
//! - `SIGN_IN_RATE` / `SIGN_IN_INTERVAL` / `SIGN_IN_BURST`: Sign-in quota
//!   (default: 500 per 86400 seconds, burst 75)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sketchspace_auth::{
    auth::AuthenticationService,
    clock::{Clock, SystemClock},
    config::Config,
    handlers::{router, AppState},
    limiter::RateLimiter,
    store::FileBucketStore,
    users::MemoryUserDirectory,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        throttle_store = %config.throttle_store_path.display(),
        max_login_time_secs = config.session.max_login_time_secs,
        sign_in_rate = config.throttle.sign_in.rate,
        sign_in_interval_secs = config.throttle.sign_in.interval_secs,
        sign_in_burst = config.throttle.sign_in.burst_factor,
        "Starting Sketchspace authentication service"
    );

    // Create application state
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(FileBucketStore::new(
        config.throttle_store_path.clone(),
        clock.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(store, clock.clone()));
    let users = Arc::new(MemoryUserDirectory::new());
    let auth = AuthenticationService::new(&config, limiter, users, clock)?;

    let state = Arc::new(AppState {
        auth,
        config: config.clone(),
    });

    // Spawn session sweep task
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_state.config.session.sweep_interval());
        loop {
            interval.tick().await;
            sweep_state.auth.sweep_sessions();
        }
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
