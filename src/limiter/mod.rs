//! Per-client rate limiting
//!
//! Token buckets keyed by client identifier, a registry guarding them, and
//! the background maintenance that keeps the registry bounded.

pub mod bucket;
pub mod maintenance;
pub mod registry;

pub use bucket::TokenBucket;
pub use maintenance::{MaintenanceHandle, MaintenanceScheduler, MaintenanceState};
pub use registry::{ClientRegistry, ClientSnapshot, RebuildStats};

use crate::config::LimiterConfig;
use std::sync::Arc;

/// Admission decision source used by the rate limit middleware.
pub trait Limiter: Send + Sync {
    /// Returns `true` if a request from `client` may proceed.
    fn allow(&self, client: &str) -> bool;

    fn is_enabled(&self) -> bool;
}

/// Rate limiter built once at startup from [`LimiterConfig`].
///
/// When limiting is disabled no registry is allocated and every check admits.
#[derive(Clone)]
pub struct RateLimiter {
    registry: Option<Arc<ClientRegistry>>,
    config: LimiterConfig,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        let registry = config.enabled.then(|| {
            Arc::new(ClientRegistry::new(
                config.requests_per_second,
                config.burst,
            ))
        });

        Self {
            registry,
            config: config.clone(),
        }
    }

    /// The client registry, if limiting is enabled.
    pub fn registry(&self) -> Option<&Arc<ClientRegistry>> {
        self.registry.as_ref()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.registry.as_ref().map_or(0, |registry| registry.len())
    }

    /// Maintenance routines for the registry, in the Idle state. `None` when
    /// limiting is disabled, since there is nothing to maintain.
    pub fn maintenance(&self) -> Option<MaintenanceScheduler> {
        self.registry.as_ref().map(|registry| {
            MaintenanceScheduler::new(
                Arc::clone(registry),
                self.config.cleanup_interval(),
                self.config.idle_timeout(),
                self.config.rebuild_interval(),
            )
        })
    }
}

impl Limiter for RateLimiter {
    fn allow(&self, client: &str) -> bool {
        match &self.registry {
            Some(registry) => registry.allow(client),
            None => true,
        }
    }

    fn is_enabled(&self) -> bool {
        self.registry.is_some()
    }
}
