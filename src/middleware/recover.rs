//! Panic recovery middleware

use crate::error::{ApiError, ErrorReporter, RequestSummary};
use crate::middleware::{Interceptor, Next};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONNECTION, HeaderValue};
use axum::http::Request;
use axum::response::Response;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Turns a panic anywhere further down the chain into a 500 response and
/// closes the connection.
pub struct RecoverPanic {
    reporter: Arc<dyn ErrorReporter>,
}

impl RecoverPanic {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl Interceptor for RecoverPanic {
    fn name(&self) -> &str {
        "recover-panic"
    }

    async fn intercept(&self, req: Request<Body>, next: Next<'_>) -> Response {
        let summary = RequestSummary::from(&req);

        match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                let mut response = self
                    .reporter
                    .report(&summary, ApiError::Panic(panic_message(payload.as_ref())));
                response
                    .headers_mut()
                    .insert(CONNECTION, HeaderValue::from_static("close"));
                response
            }
        }
    }
}
