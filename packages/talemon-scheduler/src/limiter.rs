//! Per-domain rate limiter: a standalone object with inputs `(domain, now)`
//! and output admit/reject (§9 design note). Storage is process-local
//! today; swapping in a shared store to scale the scheduler horizontally
//! would only touch this file.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

use talemon_core::RateLimitConfig;

/// Token-bucket admission keyed by `page.domain`. Built as `requests` tokens
/// replenishing evenly over `window_secs`, with burst capacity `requests` —
/// so a domain that has been idle can still burst up to its full window
/// budget, matching "N requests per domain per window" from §6.
pub struct DomainLimiter {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl DomainLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let requests = NonZeroU32::new(config.requests.max(1)).unwrap();
        let period = Duration::from_secs(config.window_secs.max(1)) / requests.get();
        let quota = Quota::with_period(period.max(Duration::from_millis(1)))
            .expect("non-zero period")
            .allow_burst(requests);
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// `true` if `domain` is under budget right now; consumes one token on
    /// admission. Candidates rejected here stay `PENDING` and are
    /// reconsidered on the next tick — never an error.
    pub fn admit(&self, domain: &str) -> bool {
        self.limiter.check_key(&domain.to_string()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_burst_then_rejects() {
        let limiter = DomainLimiter::new(&RateLimitConfig {
            requests: 2,
            window_secs: 60,
        });
        assert!(limiter.admit("example.com"));
        assert!(limiter.admit("example.com"));
        assert!(!limiter.admit("example.com"));
    }

    #[test]
    fn domains_are_tracked_independently() {
        let limiter = DomainLimiter::new(&RateLimitConfig {
            requests: 1,
            window_secs: 60,
        });
        assert!(limiter.admit("a.com"));
        assert!(limiter.admit("b.com"));
        assert!(!limiter.admit("a.com"));
    }
}
