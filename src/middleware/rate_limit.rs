//! Rate limiting middleware
//!
//! Admits or rejects each request based on its client's token bucket.

use crate::error::{ApiError, ErrorReporter, RequestSummary};
use crate::limiter::Limiter;
use crate::middleware::{Interceptor, Next};
use crate::utils::network::{TrustedProxies, client_ip};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use log::debug;
use std::sync::Arc;

/// Rejects requests from clients that have exhausted their bucket with
/// `429 Too Many Requests`.
///
/// When the limiter is disabled requests pass straight through, without
/// resolving the client address. If the address cannot be resolved the
/// request is rejected as a server error rather than let through unlimited.
pub struct RateLimitInterceptor {
    limiter: Arc<dyn Limiter>,
    trusted_proxies: TrustedProxies,
    reporter: Arc<dyn ErrorReporter>,
}

impl RateLimitInterceptor {
    pub fn new(
        limiter: Arc<dyn Limiter>,
        trusted_proxies: TrustedProxies,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            limiter,
            trusted_proxies,
            reporter,
        }
    }
}

#[async_trait]
impl Interceptor for RateLimitInterceptor {
    fn name(&self) -> &str {
        "rate-limit"
    }

    async fn intercept(&self, req: Request<Body>, next: Next<'_>) -> Response {
        if !self.limiter.is_enabled() {
            return next.run(req).await;
        }

        let ip = match client_ip(&req, &self.trusted_proxies) {
            Ok(ip) => ip.to_string(),
            Err(e) => return self.reporter.report(&RequestSummary::from(&req), e),
        };

        if !self.limiter.allow(&ip) {
            debug!("Rate limit exceeded for {} ({} {})", ip, req.method(), req.uri());
            return self
                .reporter
                .report(&RequestSummary::from(&req), ApiError::RateLimitExceeded);
        }

        next.run(req).await
    }
}
