//! HTTP frontend.
//!
//! Translates JSON requests into repository calls and repository results
//! back into JSON; all business rules live in `store` and `auth::flows`.

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::errors::ServiceResult;

/// Create the API router with all routes.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::health::healthcheck))
        .route("/auth/signup", post(routes::auth::signup))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me).put(routes::auth::update_me))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route(
            "/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password))
        .route("/auth/oauth/sync", post(routes::auth::oauth_sync))
        .route(
            "/threads",
            post(routes::threads::create_thread).get(routes::threads::list_threads),
        )
        .route("/threads/{thread_id}", get(routes::threads::get_thread))
        .route(
            "/threads/{thread_id}/metadata",
            patch(routes::threads::update_thread_metadata),
        )
        .route(
            "/threads/{thread_id}/messages",
            post(routes::threads::append_message),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>, addr: SocketAddr) -> ServiceResult<()> {
    run_server_with_shutdown(state, addr, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server stops accepting new connections when `shutdown_signal`
/// completes; in-flight requests run to completion.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown_signal: F,
) -> ServiceResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP frontend listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
