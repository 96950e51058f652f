use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-key token-bucket-like state (`spec.md` §3 `RateLimitState`). The shape
/// is owned by this engine; stores persist it opaquely.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Tokens available as of `updated_at`.
    pub tokens: f64,
    pub updated_at: DateTime<Utc>,
}

impl RateLimitState {
    /// A fresh key starts with a full bucket.
    pub fn full(config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self { tokens: (config.limit + config.burst) as f64, updated_at: now }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: u64,
    pub window_seconds: u64,
    pub burst: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// Pure decision function: within a window of `config.window_seconds`, a key
/// may consume up to `limit + burst` units via continuous refill; once
/// exhausted, `allowed = false` until the next token is available
/// (`spec.md` §4.3). Identical `(state, config, now)` always produces
/// identical output and new state.
pub fn check(
    state: Option<RateLimitState>,
    config: &RateLimitConfig,
    now: DateTime<Utc>,
) -> (RateLimitDecision, RateLimitState) {
    let capacity = (config.limit + config.burst) as f64;
    let refill_rate = config.limit as f64 / config.window_seconds.max(1) as f64;

    let state = state.unwrap_or_else(|| RateLimitState::full(config, now));
    let elapsed = (now - state.updated_at).num_milliseconds().max(0) as f64 / 1000.0;
    let refilled = (state.tokens + elapsed * refill_rate).min(capacity);

    if refilled >= 1.0 {
        let remaining_tokens = refilled - 1.0;
        let new_state = RateLimitState { tokens: remaining_tokens, updated_at: now };
        let decision = RateLimitDecision {
            allowed: true,
            remaining: remaining_tokens.floor() as u64,
            reset_at: reset_time(remaining_tokens, capacity, refill_rate, now),
        };
        (decision, new_state)
    } else {
        let new_state = RateLimitState { tokens: refilled, updated_at: now };
        let seconds_to_next_token = ((1.0 - refilled) / refill_rate.max(f64::MIN_POSITIVE)).ceil();
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: now + chrono::Duration::seconds(seconds_to_next_token as i64),
        };
        (decision, new_state)
    }
}

fn reset_time(remaining: f64, capacity: f64, refill_rate: f64, now: DateTime<Utc>) -> DateTime<Utc> {
    if remaining >= capacity || refill_rate <= 0.0 {
        now
    } else {
        let seconds = ((capacity - remaining) / refill_rate).ceil();
        now + chrono::Duration::seconds(seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn identical_inputs_produce_identical_outputs() {
        let config = RateLimitConfig { limit: 2, window_seconds: 60, burst: 2 };
        let now = t("2026-01-01T00:00:00Z");
        let (d1, s1) = check(None, &config, now);
        let (d2, s2) = check(None, &config, now);
        assert_eq!(d1, d2);
        assert_eq!(s1.tokens, s2.tokens);
    }

    #[test]
    fn fifth_call_within_window_is_denied_for_limit_two_burst_two() {
        let config = RateLimitConfig { limit: 2, window_seconds: 60, burst: 2 };
        let now = t("2026-01-01T00:00:00Z");
        let mut state = None;
        let mut last = None;
        for _ in 0..4 {
            let (decision, new_state) = check(state, &config, now);
            assert!(decision.allowed);
            state = Some(new_state);
            last = Some(decision);
        }
        let (decision5, _) = check(state, &config, now);
        assert!(!decision5.allowed);
        assert_eq!(decision5.remaining, 0);
        assert!(decision5.reset_at > now);
        assert!(last.unwrap().allowed);
    }

    #[test]
    fn tokens_refill_over_time() {
        let config = RateLimitConfig { limit: 60, window_seconds: 60, burst: 0 };
        let now = t("2026-01-01T00:00:00Z");

        // Drain the bucket completely via sequential calls.
        let mut state = None;
        for _ in 0..60 {
            let (_, s) = check(state, &config, now);
            state = Some(s);
        }
        let (denied, _) = check(state, &config, now);
        assert!(!denied.allowed);

        // One second later, one token (1/sec refill) should be available.
        let (allowed_later, _) = check(state, &config, now + chrono::Duration::seconds(1));
        assert!(allowed_later.allowed);
    }

    #[test]
    fn no_state_starts_with_full_bucket() {
        let config = RateLimitConfig { limit: 10, window_seconds: 60, burst: 5 };
        let now = t("2026-01-01T00:00:00Z");
        let (decision, _) = check(None, &config, now);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 14);
    }
}
