//! Routes
//!
//! The endpoint router and the production middleware order.

use crate::error::{ApiError, ErrorReporter, RequestSummary};
use crate::limiter::Limiter;
use crate::middleware::{Pipeline, RateLimitInterceptor, RecoverPanic, RequestLogger, compose};
use crate::utils::network::TrustedProxies;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub env: String,
    pub version: &'static str,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Endpoint router. Unknown paths and methods answer with JSON errors.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

/// Wraps [`routes`] in the production middleware order.
pub fn pipeline(state: AppState, limiter: Arc<dyn Limiter>, trusted: TrustedProxies) -> Pipeline {
    let reporter = Arc::clone(&state.reporter);
    wrap(routes(state), reporter, limiter, trusted)
}

/// Wraps any endpoint in the production middleware order: logging outermost
/// so it records every response including recovered panics, then panic
/// recovery, then rate limiting.
pub fn wrap(
    endpoint: Router,
    reporter: Arc<dyn ErrorReporter>,
    limiter: Arc<dyn Limiter>,
    trusted: TrustedProxies,
) -> Pipeline {
    compose(
        endpoint,
        vec![
            Arc::new(RequestLogger),
            Arc::new(RecoverPanic::new(Arc::clone(&reporter))),
            Arc::new(RateLimitInterceptor::new(limiter, trusted, reporter)),
        ],
    )
}

async fn healthcheck(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.env,
            "version": state.version,
        }
    }))
    .into_response()
}

async fn not_found(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    state
        .reporter
        .report(&RequestSummary { method, uri }, ApiError::NotFound)
}

async fn method_not_allowed(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let err = ApiError::MethodNotAllowed(method.clone());
    state.reporter.report(&RequestSummary { method, uri }, err)
}
