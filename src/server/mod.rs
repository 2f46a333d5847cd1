//! Server core functionality
//!
//! This module contains the HTTP server, its routes, and the middleware
//! pipeline assembled around them.

pub mod core;
pub mod routes;

pub use self::core::Server;
pub use routes::{AppState, pipeline, routes, wrap};
