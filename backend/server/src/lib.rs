//! Documentation of a meme caption voting platform.
//!
//! Users sign in with Google through a hosted auth provider, swipe or vote on captions, and
//! watch a live leaderboard.
//!
//!
//!
//! # Request flow
//! - Every request passes the [session gate](gate) first
//! - The gate resolves the user from the session cookies, refreshing them if they expired
//! - Anonymous requests to anything outside the public allow-list are sent to `/login`
//! - Signed-in users hitting `/login` are sent home
//! - Cookies rewritten by the gate ride on whatever response is finally returned
//!
//!
//!
//! # Routes
//!
//! | Route | Access | Handler |
//! |-------|--------|---------|
//! | `GET /health` | public | liveness |
//! | `GET /login` | public | starts the OAuth flow |
//! | `GET /auth/callback` | public | finishes the OAuth flow |
//! | `GET /votes` | public | leaderboard |
//! | `GET /votes/live` | public | live leaderboard over a websocket |
//! | `GET /` | signed in | current user |
//! | `GET /captions` | signed in | caption feed |
//! | `POST /captions/vote` | signed in | cast a vote, awaited |
//! | `POST /captions/swipe` | signed in | cast a vote, fire-and-forget |
//! | `GET /auth/signout` | signed in | sign out |
//! | `GET /admin` | admin domain | caption table |
//! | `POST /admin/captions` | admin domain | create caption |
//! | `DELETE /admin/captions/{id}` | admin domain | delete caption |
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! The ledger is an append-only list, so a vote is a single `RPUSH` and tallies are always derived
//! by folding the whole list. Caption deletion leaves orphaned votes behind; they simply stop
//! showing up.
//!
//! ## Live leaderboard
//! Each websocket viewer keeps its own projection. The default strategy refetches the ledger on
//! any change, coalescing bursts, since a lossy patch feed would silently drift.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against the in-memory ledger with debug logs.
//! ```sh
//! LEDGER_BACKEND=memory RUST_LOG=server=debug,ledger=debug cargo run --bin server
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod gotrue;
pub mod identity;
pub mod live;
pub mod notify;
pub mod routes;
pub mod state;
pub mod utils;
pub mod votes;

#[cfg(test)]
mod testutil;

use config::Config;
use gate::session_gate;
use live::live_handler;
use routes::{
    admin_handler, callback_handler, captions_handler, create_caption_handler,
    delete_caption_handler, health_handler, home_handler, leaderboard_handler, login_handler,
    signout_handler, swipe_handler, vote_handler,
};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/signout", get(signout_handler))
        .route("/captions", get(captions_handler))
        .route("/captions/vote", post(vote_handler))
        .route("/captions/swipe", post(swipe_handler))
        .route("/votes", get(leaderboard_handler))
        .route("/votes/live", get(live_handler))
        .route("/admin", get(admin_handler))
        .route("/admin/captions", post(create_caption_handler))
        .route("/admin/captions/{id}", delete(delete_caption_handler))
        .layer(from_fn_with_state(state.clone(), session_gate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let config = Config::load()?;
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
