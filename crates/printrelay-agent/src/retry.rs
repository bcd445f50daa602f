// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reconnect backoff for backend sessions.
//
// Sessions retry forever. The delay is fixed unless the configured ceiling
// is above the base delay, in which case it doubles per consecutive failure
// (plus a little jitter) up to the ceiling. A successful connect resets it.

use std::time::Duration;

use tracing::debug;

use printrelay_core::config::AgentConfig;

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    /// The same delay before every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            base_delay: config.reconnect_delay(),
            max_delay: config.max_reconnect_delay(),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.max_delay <= self.base_delay
    }

    /// Delay before reconnect number `failures` (0 = first failure) for the
    /// session identified by `seed`.
    ///
    /// delay = min(base * 2^failures + jitter(seed), max_delay)
    pub fn delay_for(&self, failures: u32, seed: u64) -> Duration {
        if self.is_fixed() {
            return self.base_delay;
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << failures.min(10));
        let total_ms = exp_ms.saturating_add(jitter(base_ms, failures, seed));
        Duration::from_millis(total_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Per-session backoff state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
    seed: u64,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self::seeded(policy, 0)
    }

    /// Backoff whose jitter is derived from `seed`; see [`session_seed`].
    pub fn seeded(policy: ReconnectPolicy, seed: u64) -> Self {
        Self {
            policy,
            failures: 0,
            seed,
        }
    }

    /// Delay after a failed or dropped connection; escalates the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.failures, self.seed);
        self.failures = self.failures.saturating_add(1);
        debug!(failures = self.failures, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        delay
    }

    /// Delay after a server-directed disconnect. Never escalated.
    pub fn base_delay(&self) -> Duration {
        self.policy.base_delay
    }

    /// Call after every successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Jitter seed for the session keyed by `key` (the printer address).
/// FNV-1a, so the value is stable across runs.
pub fn session_seed(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Deterministic spread in [0, base/4). Sessions with different seeds that
/// drop together do not reconnect in lockstep.
fn jitter(base_ms: u64, failures: u32, seed: u64) -> u64 {
    let hash = (seed ^ (failures as u64 + 1)).wrapping_mul(6364136223846793005);
    (hash >> 33) % (base_ms / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_five_seconds() {
        let mut b = Backoff::new(ReconnectPolicy::default());
        for _ in 0..10 {
            assert_eq!(b.next_delay(), Duration::from_secs(5));
        }
        assert_eq!(b.failures(), 10);
    }

    #[test]
    fn exponential_grows_and_caps() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };
        let d0 = policy.delay_for(0, 0);
        let d1 = policy.delay_for(1, 0);
        let d2 = policy.delay_for(2, 0);
        assert!(d0 >= Duration::from_secs(1));
        assert!(d1 > d0);
        assert!(d2 > d1);
        assert_eq!(policy.delay_for(20, 0), Duration::from_secs(30));
    }

    #[test]
    fn sessions_with_different_addresses_spread_out() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };
        let a = session_seed("10.0.0.1");
        let b = session_seed("10.0.0.2");
        assert_ne!(a, b);
        assert_eq!(a, session_seed("10.0.0.1"));

        let same_every_time = (0..4).all(|n| policy.delay_for(n, a) == policy.delay_for(n, b));
        assert!(!same_every_time);
        for n in 0..4 {
            let floor = Duration::from_secs(1 << n);
            let d = policy.delay_for(n, a);
            assert!(d >= floor && d < floor + Duration::from_millis(250));
        }
    }

    #[test]
    fn reset_returns_to_base() {
        let mut b = Backoff::new(ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        });
        b.next_delay();
        b.next_delay();
        let escalated = b.next_delay();
        b.reset();
        assert!(b.next_delay() < escalated);
        assert_eq!(b.base_delay(), Duration::from_millis(100));
    }

    #[test]
    fn config_with_equal_delays_is_fixed() {
        let config = AgentConfig::default();
        assert!(ReconnectPolicy::from_config(&config).is_fixed());

        let config = AgentConfig {
            max_reconnect_delay_secs: 60,
            ..AgentConfig::default()
        };
        assert!(!ReconnectPolicy::from_config(&config).is_fixed());
    }
}
