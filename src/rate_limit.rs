// rate_limit.rs
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Named admission policy for one class of requests.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

/// Poll creation: 20 requests per 60 seconds per source.
pub const RATE_LIMIT_CREATE_POLL: RateLimitPolicy = RateLimitPolicy {
    name: "create",
    max_requests: 20,
    window: Duration::from_secs(60),
};

/// Voting: 30 requests per 60 seconds per source.
pub const RATE_LIMIT_VOTE: RateLimitPolicy = RateLimitPolicy {
    name: "vote",
    max_requests: 30,
    window: Duration::from_secs(60),
};

/// Reads: 100 requests per 60 seconds per source.
pub const RATE_LIMIT_READ: RateLimitPolicy = RateLimitPolicy {
    name: "read",
    max_requests: 100,
    window: Duration::from_secs(60),
};

/// Timestamps older than this are dropped by the background sweep and the
/// bucket is removed once empty.
const BUCKET_MAX_IDLE: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_seconds: Option<u64>,
}

/// Sliding-window limiter over an injectable in-process bucket store.
///
/// Each bucket holds the recent request timestamps for one
/// `{policy}:{source}` key. Trim, check and append happen under one lock
/// acquisition so concurrent requests from the same source cannot
/// undercount. State is process-local: a restart resets all limits, and a
/// multi-instance deployment would need this store externalized.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn admit(&self, key: &str, policy: &RateLimitPolicy) -> Decision {
        self.admit_at(key, policy, Instant::now())
    }

    fn admit_at(&self, key: &str, policy: &RateLimitPolicy, now: Instant) -> Decision {
        let mut buckets = self.buckets.lock().expect("rate limit store poisoned");
        let timestamps = buckets.entry(key.to_string()).or_default();

        timestamps.retain(|t| now.duration_since(*t) < policy.window);

        if timestamps.len() >= policy.max_requests as usize {
            // Oldest survivor is the first to leave the window.
            let oldest = timestamps[0];
            let until_free = (oldest + policy.window).duration_since(now);

            return Decision {
                allowed: false,
                remaining: 0,
                retry_after_seconds: Some(ceil_seconds(until_free)),
            };
        }

        timestamps.push(now);

        Decision {
            allowed: true,
            remaining: policy.max_requests - timestamps.len() as u32,
            retry_after_seconds: None,
        }
    }

    /// Drops stale timestamps and empty buckets. Run from a periodic task,
    /// off the request path, to bound memory.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let mut buckets = self.buckets.lock().expect("rate limit store poisoned");
        buckets.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < BUCKET_MAX_IDLE);
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().expect("rate limit store poisoned").len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn ceil_seconds(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RateLimitPolicy = RateLimitPolicy {
        name: "test",
        max_requests: 3,
        window: Duration::from_secs(60),
    };

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for expected_remaining in (0..3).rev() {
            let d = limiter.admit_at("test:1.2.3.4", &POLICY, now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let d = limiter.admit_at("test:1.2.3.4", &POLICY, now);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.retry_after_seconds, Some(60));
    }

    #[test]
    fn window_slides_and_admits_again_after_retry_after() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.admit_at("test:k", &POLICY, start);
        limiter.admit_at("test:k", &POLICY, start + Duration::from_secs(10));
        limiter.admit_at("test:k", &POLICY, start + Duration::from_secs(20));

        let d = limiter.admit_at("test:k", &POLICY, start + Duration::from_secs(30));
        assert!(!d.allowed);
        // The oldest timestamp exits the window at start + 60s, 30s from now.
        assert_eq!(d.retry_after_seconds, Some(30));

        // Strictly after the advertised delay, admission resumes.
        let d = limiter.admit_at(
            "test:k",
            &POLICY,
            start + Duration::from_secs(60) + Duration::from_millis(1),
        );
        assert!(d.allowed);
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.admit_at("test:k", &POLICY, start);
        }

        let d = limiter.admit_at("test:k", &POLICY, start + Duration::from_millis(59_500));
        assert_eq!(d.retry_after_seconds, Some(1));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.admit_at("vote:a", &POLICY, now).allowed);
        }
        assert!(!limiter.admit_at("vote:a", &POLICY, now).allowed);
        assert!(limiter.admit_at("vote:b", &POLICY, now).allowed);
    }

    #[test]
    fn sweep_drops_idle_buckets() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.admit_at("read:a", &POLICY, start);
        limiter.admit_at("read:b", &POLICY, start + Duration::from_secs(115));
        assert_eq!(limiter.bucket_count(), 2);

        limiter.sweep_at(start + Duration::from_secs(121));
        assert_eq!(limiter.bucket_count(), 1);

        limiter.sweep_at(start + Duration::from_secs(300));
        assert_eq!(limiter.bucket_count(), 0);
    }
}
