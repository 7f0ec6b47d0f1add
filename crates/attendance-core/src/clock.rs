use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of "now" for every expiry check in the crate.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to walk across the
/// 30-minute and 30-day boundaries deterministically.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// # Panics
    ///
    /// If `ms` is outside the range `chrono` can represent.
    pub fn at_millis(ms: i64) -> Self {
        match Utc.timestamp_millis_opt(ms).single() {
            Some(start) => Self::new(start),
            None => panic!("ManualClock start {ms} ms is out of range"),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Parse a persisted millisecond timestamp. Garbage reads as absent.
pub fn parse_millis(raw: Option<String>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at_millis(1_700_000_000_000);
        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now_millis(), 1_700_000_000_000 + 30 * 60 * 1000);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn manual_clock_rejects_unrepresentable_start() {
        ManualClock::at_millis(i64::MAX);
    }

    #[test]
    fn parse_millis_rejects_garbage() {
        assert_eq!(parse_millis(Some("123".to_string())), Some(123));
        assert_eq!(parse_millis(Some("abc".to_string())), None);
        assert_eq!(parse_millis(None), None);
    }
}
