//! Token bucket
//!
//! Single-client admission primitive. Permits refill continuously at a fixed
//! rate and are capped at the burst capacity.

use tokio::time::Instant;

/// Slack allowed when comparing a refilled permit count against one whole
/// permit. `Duration` keeps nanosecond precision only, so waiting exactly
/// `1/rps` seconds can land a hair below 1.0.
const PERMIT_EPSILON: f64 = 1e-6;

/// Replenishing budget of permits for one client.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    permits: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket, so the whole burst is available immediately.
    pub fn new(burst: u32, requests_per_second: f64, now: Instant) -> Self {
        let capacity = f64::from(burst);
        Self {
            capacity,
            refill_rate: requests_per_second,
            permits: capacity,
            last_refill: now,
        }
    }

    /// Refills lazily for the time elapsed since the last check, then takes
    /// one permit if available.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.permits + PERMIT_EPSILON >= 1.0 {
            self.permits = (self.permits - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let refilled = self.permits + elapsed.as_secs_f64() * self.refill_rate;
        self.permits = refilled.min(self.capacity);
        self.last_refill = now;
    }

    /// Permits currently held, as of the last check.
    pub fn permits(&self) -> f64 {
        self.permits
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
