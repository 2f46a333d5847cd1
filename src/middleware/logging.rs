//! Logging middleware
//!
//! Provides request logging functionality.

use crate::middleware::{Interceptor, Next};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use log::{info, warn};
use std::time::Instant;

/// Logs one line per request with its status and latency.
pub struct RequestLogger;

#[async_trait]
impl Interceptor for RequestLogger {
    fn name(&self) -> &str {
        "request-logger"
    }

    async fn intercept(&self, req: Request<Body>, next: Next<'_>) -> Response {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let started = Instant::now();

        let response = next.run(req).await;

        let status = response.status();
        let elapsed = started.elapsed();
        if status.is_server_error() {
            warn!("{} {} -> {} in {:?}", method, uri, status.as_u16(), elapsed);
        } else {
            info!("{} {} -> {} in {:?}", method, uri, status.as_u16(), elapsed);
        }

        response
    }
}
