//! Error handling
//!
//! Defines error types and the reporting seam that turns them into responses.

pub mod handlers;
pub mod types;

pub use handlers::{ErrorReporter, JsonErrorReporter, RequestSummary, error_status};
pub use types::*;
