//! Reconnect backoff

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which failure family the current backoff run is counting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackoffMode {
    #[default]
    None,
    /// No HTTP response; linear growth
    Network,
    /// HTTP error status; exponential growth
    Protocol,
}

impl fmt::Display for BackoffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackoffMode::None => "none",
            BackoffMode::Network => "network",
            BackoffMode::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

/// Backoff constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Added to the network wait on every network failure
    pub network_step: Duration,
    /// Network wait at which reconnecting stops
    pub network_cap: Duration,
    /// First protocol wait; doubled on each further protocol failure
    pub protocol_initial: Duration,
    /// Protocol wait at which reconnecting stops
    pub protocol_cap: Duration,
    /// Consecutive hard errors (and graceful closes) tolerated
    pub hard_error_limit: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            network_step: Duration::from_millis(250),
            network_cap: Duration::from_millis(16_000),
            protocol_initial: Duration::from_millis(5_000),
            protocol_cap: Duration::from_millis(320_000),
            hard_error_limit: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn with_network(mut self, step: Duration, cap: Duration) -> Self {
        self.network_step = step;
        self.network_cap = cap;
        self
    }

    pub fn with_protocol(mut self, initial: Duration, cap: Duration) -> Self {
        self.protocol_initial = initial;
        self.protocol_cap = cap;
        self
    }

    pub fn with_hard_error_limit(mut self, limit: u32) -> Self {
        self.hard_error_limit = limit;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Reconnect after this delay
    Retry(Duration),
    /// The wait reached its cap
    GiveUp { wait: Duration },
}

/// Current backoff run of one connection
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    mode: BackoffMode,
    wait: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Backoff {
            policy,
            mode: BackoffMode::None,
            wait: Duration::ZERO,
        }
    }

    pub fn mode(&self) -> BackoffMode {
        self.mode
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// 250 ms, 500 ms, 750 ms, ...
    pub fn network_failure(&mut self) -> BackoffDecision {
        if self.mode != BackoffMode::Network {
            self.mode = BackoffMode::Network;
            self.wait = Duration::ZERO;
        }
        self.wait += self.policy.network_step;
        self.decide(self.policy.network_cap)
    }

    /// 5 s, 10 s, 20 s, ...
    pub fn protocol_failure(&mut self) -> BackoffDecision {
        if self.mode != BackoffMode::Protocol {
            self.mode = BackoffMode::Protocol;
            self.wait = self.policy.protocol_initial;
        } else {
            self.wait = self.wait.saturating_mul(2);
        }
        self.decide(self.policy.protocol_cap)
    }

    pub fn reset(&mut self) {
        self.mode = BackoffMode::None;
        self.wait = Duration::ZERO;
    }

    fn decide(&self, cap: Duration) -> BackoffDecision {
        if self.wait >= cap {
            BackoffDecision::GiveUp { wait: self.wait }
        } else {
            BackoffDecision::Retry(self.wait)
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retries(mut next: impl FnMut() -> BackoffDecision) -> (Vec<u64>, Duration) {
        let mut waits = Vec::new();
        loop {
            match next() {
                BackoffDecision::Retry(wait) => waits.push(wait.as_millis() as u64),
                BackoffDecision::GiveUp { wait } => return (waits, wait),
            }
        }
    }

    #[test]
    fn test_network_backoff_is_linear() {
        let mut backoff = Backoff::default();
        let (waits, final_wait) = retries(|| backoff.network_failure());

        assert_eq!(waits.first(), Some(&250));
        assert!(waits.windows(2).all(|w| w[1] - w[0] == 250));
        assert_eq!(waits.last(), Some(&15_750));
        assert_eq!(final_wait, Duration::from_millis(16_000));
    }

    #[test]
    fn test_protocol_backoff_doubles() {
        let mut backoff = Backoff::default();
        let (waits, final_wait) = retries(|| backoff.protocol_failure());

        assert_eq!(waits, vec![5_000, 10_000, 20_000, 40_000, 80_000, 160_000]);
        assert!(waits.iter().all(|&w| w < 320_000));
        assert_eq!(final_wait, Duration::from_millis(320_000));
    }

    #[test]
    fn test_mode_switch_restarts_sequence() {
        let mut backoff = Backoff::default();
        backoff.network_failure();
        backoff.network_failure();
        assert_eq!(backoff.wait(), Duration::from_millis(500));

        assert_eq!(
            backoff.protocol_failure(),
            BackoffDecision::Retry(Duration::from_millis(5_000))
        );
        assert_eq!(backoff.mode(), BackoffMode::Protocol);

        backoff.reset();
        assert_eq!(backoff.mode(), BackoffMode::None);
        assert_eq!(
            backoff.network_failure(),
            BackoffDecision::Retry(Duration::from_millis(250))
        );
    }
}
