//! server
//!
//! HTTP surface under `/api/v1`.
//!
//! # Endpoints
//!
//! | Method | Path                         | Class    |
//! |--------|------------------------------|----------|
//! | GET    | `/status`                    | read     |
//! | GET    | `/diff`                      | read     |
//! | GET    | `/branches`                  | read     |
//! | GET    | `/sync`                      | read/net |
//! | POST   | `/stage`, `/unstage`         | mutation |
//! | POST   | `/commit`                    | mutation |
//! | POST   | `/discard`, `/ignore`        | mutation |
//! | POST   | `/branches/create`           | mutation |
//! | POST   | `/branches/switch`           | mutation |
//! | POST   | `/branches/publish`          | network  |
//! | POST   | `/push`, `/pull`             | network  |
//! | GET    | `/approved-changes`          | read     |
//! | POST   | `/approved-changes/preview`  | read     |
//! | GET    | `/audit`                     | read     |
//! | GET    | `/health`                    | read     |
//!
//! Operation outcomes, including validation failures and policy warnings,
//! are returned with status 200 in the response body. Non-200 responses are
//! reserved for malformed requests (400), unknown routes (404) and failed
//! reads (500).

pub mod error;
pub mod handlers;
pub mod state;

use std::future::Future;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::{AppState, OperationClass};

/// Prefix for every route.
pub const API_PREFIX: &str = "/api/v1";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/diff", get(handlers::diff))
        .route("/stage", post(handlers::stage))
        .route("/unstage", post(handlers::unstage))
        .route("/commit", post(handlers::commit))
        .route("/discard", post(handlers::discard))
        .route("/ignore", post(handlers::ignore))
        .route("/branches", get(handlers::branches))
        .route("/branches/create", post(handlers::create_branch))
        .route("/branches/switch", post(handlers::switch_branch))
        .route("/branches/publish", post(handlers::publish_branch))
        .route("/sync", get(handlers::sync_status))
        .route("/push", post(handlers::push))
        .route("/pull", post(handlers::pull))
        .route("/approved-changes", get(handlers::approved_changes))
        .route(
            "/approved-changes/preview",
            post(handlers::approved_changes_preview),
        )
        .route("/audit", get(handlers::audit_log));

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the underlying I/O error if the accept loop fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
