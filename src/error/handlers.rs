//! Error handlers
//!
//! Converts [`ApiError`]s into JSON error responses. Middleware and handlers
//! never build error bodies themselves; they go through an [`ErrorReporter`].

use crate::error::types::ApiError;
use axum::Json;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;

/// Message returned in place of any server-side failure detail
const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// The parts of a request an error report needs, captured before the
/// request itself is handed down the chain.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: Method,
    pub uri: Uri,
}

impl<B> From<&Request<B>> for RequestSummary {
    fn from(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
        }
    }
}

/// Builds the response for a failed request
pub trait ErrorReporter: Send + Sync {
    fn report(&self, req: &RequestSummary, err: ApiError) -> Response;
}

/// Map an error to its HTTP status
pub fn error_status(err: &ApiError) -> StatusCode {
    match err {
        ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ApiError::NotFound => StatusCode::NOT_FOUND,
        ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        ApiError::ClientAddress(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Writes `{"error": "<message>"}` bodies. Server errors are logged with the
/// request method and URI and answered with a generic message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorReporter;

impl ErrorReporter for JsonErrorReporter {
    fn report(&self, req: &RequestSummary, err: ApiError) -> Response {
        let status = error_status(&err);

        let message = if err.is_server_error() {
            error!("{} (method={}, uri={})", err, req.method, req.uri);
            SERVER_ERROR_MESSAGE.to_string()
        } else {
            err.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
