use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

// ============== Authorization ==============

pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}

// ============== Batch allowance ==============

/// Outcome of asking whether a user may start another publishing batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// `retry_after` is `None` when the allowance never refills.
    Limited { retry_after: Option<Duration> },
}

/// How many batches a user could start right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchAllowance {
    pub remaining: u32,
    pub max: u32,
}

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Per-user token bucket counting batches, not topics: a numbered list of
/// ten topics costs one token.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_batches: u32,
    refill_per_sec: f64,
    buckets: HashMap<UserId, Bucket>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_batches: u32, window: Duration) -> Self {
        let window_secs = window.as_secs_f64().max(1e-9);
        Self {
            enabled,
            max_batches,
            refill_per_sec: max_batches as f64 / window_secs,
            buckets: HashMap::new(),
        }
    }

    pub fn admit_batch(&mut self, user_id: UserId) -> Admission {
        self.admit_batch_at(user_id, Instant::now())
    }

    pub fn admit_batch_at(&mut self, user_id: UserId, now: Instant) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }

        let max = self.max_batches as f64;
        let bucket = self.buckets.entry(user_id).or_insert_with(|| Bucket {
            tokens: max,
            last_update: now,
        });

        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(max);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Admission::Allowed;
        }

        // A zero-capacity bucket never refills.
        if self.refill_per_sec <= 0.0 {
            return Admission::Limited { retry_after: None };
        }
        let secs = (1.0 - bucket.tokens) / self.refill_per_sec;
        Admission::Limited {
            retry_after: Some(Duration::from_secs_f64(secs.max(0.0))),
        }
    }

    /// Remaining batches as of the last admission; refill since then is not counted.
    pub fn allowance(&self, user_id: UserId) -> BatchAllowance {
        let remaining = self
            .buckets
            .get(&user_id)
            .map(|b| b.tokens.floor().max(0.0) as u32)
            .unwrap_or(self.max_batches);
        BatchAllowance {
            remaining,
            max: self.max_batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(a: Admission) -> Option<Duration> {
        match a {
            Admission::Limited { retry_after } => retry_after,
            Admission::Allowed => panic!("expected the batch to be limited"),
        }
    }

    #[test]
    fn authorization_requires_listed_user() {
        assert!(is_authorized(Some(UserId(42)), &[1, 42]));
        assert!(!is_authorized(Some(UserId(7)), &[1, 42]));
        assert!(!is_authorized(None, &[1, 42]));
        assert!(!is_authorized(Some(UserId(42)), &[]));
    }

    #[test]
    fn batches_refill_over_the_window() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        let u = UserId(1);

        assert_eq!(rl.admit_batch_at(u, start), Admission::Allowed);
        assert_eq!(rl.admit_batch_at(u, start), Admission::Allowed);
        let retry = limited(rl.admit_batch_at(u, start));
        assert!(retry.unwrap() > Duration::from_secs(4));

        // 2 batches per 10s refills one batch in 5s.
        assert_eq!(
            rl.admit_batch_at(u, start + Duration::from_secs(5)),
            Admission::Allowed
        );
    }

    #[test]
    fn allowance_is_per_user_and_limiting_can_be_disabled() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 3, Duration::from_secs(60));
        assert_eq!(rl.allowance(UserId(1)), BatchAllowance { remaining: 3, max: 3 });
        assert_eq!(rl.admit_batch_at(UserId(1), start), Admission::Allowed);
        assert_eq!(rl.admit_batch_at(UserId(1), start), Admission::Allowed);
        assert_eq!(rl.allowance(UserId(1)), BatchAllowance { remaining: 1, max: 3 });
        assert_eq!(rl.allowance(UserId(2)).remaining, 3);

        let mut off = RateLimiter::new(false, 1, Duration::from_secs(60));
        for _ in 0..5 {
            assert_eq!(off.admit_batch_at(UserId(1), start), Admission::Allowed);
        }
    }

    #[test]
    fn zero_capacity_limiter_denies_without_retry_hint() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 0, Duration::from_secs(3600));
        assert_eq!(limited(rl.admit_batch_at(UserId(1), start)), None);
        assert_eq!(
            limited(rl.admit_batch_at(UserId(1), start + Duration::from_secs(7200))),
            None
        );
        assert_eq!(rl.allowance(UserId(1)), BatchAllowance { remaining: 0, max: 0 });
    }
}
