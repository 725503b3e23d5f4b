//! HTTP application wiring (Axum router + service wiring).
//!
//! - `controller.rs`: user operations the routes delegate to
//! - `services.rs`: infrastructure wiring (user store selection)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Router, extract::Request, routing::get};
use tower_http::trace::TraceLayer;

use roster_auth::JwtValidator;

use crate::middleware::AuthState;

pub mod controller;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use controller::UserController;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(controller: Arc<UserController>) -> Router {
    let jwt: Arc<dyn JwtValidator> = controller.tokens();
    let auth = AuthState {
        jwt,
        store: controller.store(),
    };

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/auth", routes::auth::router().with_state(Arc::clone(&controller)))
        .nest("/api/users", routes::users::router(controller, auth))
        .layer(TraceLayer::new_for_http().make_span_with(http_span))
}

/// Span for an HTTP request. Only the path is recorded: the query string may
/// carry an `access_token`.
fn http_span(req: &Request) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        version = ?req.version(),
    )
}
