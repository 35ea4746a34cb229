//! Sliding-window rate limiter, keyed by action name.
//!
//! Grounded on the `secure_ai_agent_gateway` rate limiter found in the
//! example pack: a map of name → timestamp list, pruned on every check.
//! This version additionally enforces a 24h hard retention cap per bucket
//! so a bucket that is checked rarely still can't grow without bound.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const MAX_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    fn duration(self) -> Duration {
        match self {
            RateUnit::Second => Duration::from_secs(1),
            RateUnit::Minute => Duration::from_secs(60),
            RateUnit::Hour => Duration::from_secs(60 * 60),
            RateUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl std::fmt::Display for RateUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RateUnit::Second => "second",
            RateUnit::Minute => "minute",
            RateUnit::Hour => "hour",
            RateUnit::Day => "day",
        };
        write!(f, "{}", s)
    }
}

/// Parsed form of a `"N/unit"` rate-limit string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u32,
    pub unit: RateUnit,
}

impl RateLimit {
    /// Parse `"N/unit"`. Returns `None` on anything malformed — callers must
    /// then ignore the rule for rate-limit purposes (it may still match for
    /// action purposes).
    pub fn parse(spec: &str) -> Option<Self> {
        let (count_str, unit_str) = spec.split_once('/')?;
        let count: u32 = count_str.trim().parse().ok()?;
        let unit = match unit_str.trim() {
            "second" => RateUnit::Second,
            "minute" => RateUnit::Minute,
            "hour" => RateUnit::Hour,
            "day" => RateUnit::Day,
            _ => return None,
        };
        Some(Self { count, unit })
    }
}

impl std::fmt::Display for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.count, self.unit)
    }
}

/// Per-action-name sliding window of call timestamps.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: HashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    /// Would the next call for `name` reach or exceed `limit`? Does not
    /// record a call — callers check first, then separately `record`.
    pub fn would_exceed(&mut self, name: &str, limit: RateLimit) -> bool {
        let now = Instant::now();
        let bucket = self.prune(name, now);
        let window_start = now.checked_sub(limit.unit.duration());
        let in_window = match window_start {
            Some(start) => bucket.iter().filter(|&&t| t >= start).count(),
            None => bucket.len(),
        };
        in_window as u32 >= limit.count
    }

    /// Number of calls for `name` currently inside `limit`'s window, without
    /// recording a call.
    pub fn count_in_window(&mut self, name: &str, limit: RateLimit) -> u32 {
        let now = Instant::now();
        let bucket = self.prune(name, now);
        let window_start = now.checked_sub(limit.unit.duration());
        match window_start {
            Some(start) => bucket.iter().filter(|&&t| t >= start).count() as u32,
            None => bucket.len() as u32,
        }
    }

    /// Record a call for `name` at `now`.
    pub fn record(&mut self, name: &str) {
        let now = Instant::now();
        self.prune(name, now);
        self.buckets.entry(name.to_string()).or_default().push(now);
    }

    fn prune(&mut self, name: &str, now: Instant) -> &mut Vec<Instant> {
        let bucket = self.buckets.entry(name.to_string()).or_default();
        let retention_start = now.checked_sub(MAX_RETENTION);
        if let Some(start) = retention_start {
            bucket.retain(|&t| t >= start);
        }
        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_limit() {
        let r = RateLimit::parse("2/minute").unwrap();
        assert_eq!(r.count, 2);
        assert_eq!(r.unit, RateUnit::Minute);
    }

    #[test]
    fn test_parse_malformed_returns_none() {
        assert!(RateLimit::parse("nonsense").is_none());
        assert!(RateLimit::parse("2/fortnight").is_none());
    }

    #[test]
    fn test_sliding_window_blocks_after_n() {
        let mut limiter = RateLimiter::new();
        let limit = RateLimit::parse("2/minute").unwrap();

        assert!(!limiter.would_exceed("git", limit));
        limiter.record("git");
        assert!(!limiter.would_exceed("git", limit));
        limiter.record("git");
        assert!(limiter.would_exceed("git", limit));
    }

    #[test]
    fn test_independent_buckets_per_name() {
        let mut limiter = RateLimiter::new();
        let limit = RateLimit::parse("1/minute").unwrap();
        limiter.record("git");
        assert!(limiter.would_exceed("git", limit));
        assert!(!limiter.would_exceed("ls", limit));
    }
}
