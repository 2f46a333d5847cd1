//! Marquee API server
//!
//! JSON API backend core: per-client token bucket rate limiting and the
//! middleware pipeline that enforces it.

pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod server;
pub mod utils;

pub use server::Server;
