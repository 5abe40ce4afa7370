//! Token-bucket rate limiting per identity and procedure class, plus a
//! global bucket.
//!
//! Sheds load before provider adapters saturate. Each identity holds one
//! bucket per [`RateClass`], so catalog reads cannot starve (or be
//! starved by) generation traffic. Buckets refill continuously; an
//! exhausted bucket reports how long until one call's worth of tokens is
//! back.

use std::time::Instant;

use dashmap::DashMap;
use relay_config::RateLimitsSection;
use std::sync::Mutex;

/// Procedure cost class.
///
/// Expensive procedures reach an upstream provider (`ai.generateText`,
/// key validation); everything else is standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    /// Catalog reads, key management, workspace and billing queries.
    Standard,
    /// Procedures that spend upstream provider capacity.
    Expensive,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self, now: Instant) -> Result<(), u64> {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            let wait = deficit / self.refill_per_sec.max(f64::MIN_POSITIVE);
            Err(wait.ceil() as u64)
        }
    }
}

/// The gateway's local rate limiter.
pub struct RateLimiter {
    settings: RateLimitsSection,
    per_identity: DashMap<(String, RateClass), Bucket>,
    global: Mutex<Bucket>,
}

impl RateLimiter {
    /// Build from the `[rate_limits]` config section.
    #[must_use]
    pub fn new(settings: RateLimitsSection) -> Self {
        let global_rate = f64::from(settings.global_per_minute) / 60.0;
        // The global bucket tolerates ~10s of full-rate burst.
        let global = Bucket::new((global_rate * 10.0).max(1.0), global_rate);
        Self {
            settings,
            per_identity: DashMap::new(),
            global: Mutex::new(global),
        }
    }

    /// Take one call's worth of tokens for `identity` in `class`.
    ///
    /// # Errors
    ///
    /// Returns the suggested retry delay in seconds when either the
    /// identity bucket or the global bucket is exhausted.
    pub fn check(&self, identity: &str, class: RateClass) -> Result<(), u64> {
        let now = Instant::now();

        {
            let mut global = self.global.lock().expect("rate limiter lock poisoned");
            global.try_take(now)?;
        }

        let (per_minute, burst) = match class {
            RateClass::Standard => (
                self.settings.per_identity_per_minute,
                self.settings.burst,
            ),
            RateClass::Expensive => (
                self.settings.expensive_per_minute,
                self.settings.expensive_burst,
            ),
        };
        let rate = f64::from(per_minute) / 60.0;
        let capacity = f64::from(burst).max(1.0);
        let mut bucket = self
            .per_identity
            .entry((identity.to_string(), class))
            .or_insert_with(|| Bucket::new(capacity, rate));
        bucket.try_take(now)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.per_identity.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitsSection {
            per_identity_per_minute: per_minute,
            burst,
            expensive_per_minute: 60,
            expensive_burst: 2,
            global_per_minute: 100_000,
        })
    }

    #[test]
    fn test_burst_then_exhaustion() {
        let limiter = limiter(60, 3);
        assert!(limiter.check("u1", RateClass::Standard).is_ok());
        assert!(limiter.check("u1", RateClass::Standard).is_ok());
        assert!(limiter.check("u1", RateClass::Standard).is_ok());

        let retry = limiter.check("u1", RateClass::Standard).unwrap_err();
        assert!(retry >= 1);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(60, 1);
        assert!(limiter.check("u1", RateClass::Standard).is_ok());
        assert!(limiter.check("u1", RateClass::Standard).is_err());
        assert!(limiter.check("u2", RateClass::Standard).is_ok());
    }

    #[test]
    fn test_classes_have_separate_buckets() {
        let limiter = limiter(600, 10);
        // Exhaust the expensive bucket (burst 2).
        assert!(limiter.check("u1", RateClass::Expensive).is_ok());
        assert!(limiter.check("u1", RateClass::Expensive).is_ok());
        assert!(limiter.check("u1", RateClass::Expensive).is_err());

        // Standard calls for the same identity still pass.
        assert!(limiter.check("u1", RateClass::Standard).is_ok());
    }

    #[test]
    fn test_global_bucket_caps_everyone() {
        let limiter = RateLimiter::new(RateLimitsSection {
            per_identity_per_minute: 10_000,
            burst: 10_000,
            expensive_per_minute: 10_000,
            expensive_burst: 10_000,
            global_per_minute: 6,
        });
        // Global capacity: 6/min → 0.1/s → 1 token of burst.
        assert!(limiter.check("a", RateClass::Standard).is_ok());
        assert!(limiter.check("b", RateClass::Standard).is_err());
    }
}
