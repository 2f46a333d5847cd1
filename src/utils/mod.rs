//! Utility functions
//!
//! Provides logging setup and network helpers.

pub mod logging;
pub mod network;
