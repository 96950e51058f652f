use chrono::{DateTime, Utc};

/// Supplies the current time; fakeable for deterministic tests.
///
/// Grounded on `spec.md` §2's "Clock abstraction" leaf component — the orchestrator
/// and the quota/rate-limit engines never call `Utc::now()` directly so that tests
/// can pin `now` and assert exact period boundaries and token-bucket refills.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests; never advances unless explicitly set.
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: std::sync::Arc::new(std::sync::Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().unwrap() = at;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.at.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_does_not_advance_on_its_own() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);
        assert_eq!(clock.now(), t0);
    }

    #[test]
    fn fixed_clock_advances_by_requested_duration() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock::new(t0);
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(clock.now(), t0 + chrono::Duration::seconds(60));
    }
}
