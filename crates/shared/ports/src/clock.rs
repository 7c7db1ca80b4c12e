use chrono::Utc;
use userstream_core::Timestamp;

/// Port for time abstraction
///
/// This allows the system to use different time sources:
/// - Real system time for production
/// - Fixed time for deterministic tests
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}

/// Real system clock for production use
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

/// Clock frozen at a single instant
pub struct FixedClock(Timestamp);

impl FixedClock {
    pub fn new(at: Timestamp) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }

    fn name(&self) -> &str {
        "FixedClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::thread;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let time1 = clock.now();
        thread::sleep(std::time::Duration::from_millis(10));
        let time2 = clock.now();

        assert!(time2 > time1);
        assert!(time2 - time1 >= Duration::milliseconds(9));
    }

    #[test]
    fn test_fixed_clock() {
        let at = Utc.timestamp_millis_opt(1_000).single().unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.name(), "FixedClock");
    }
}
