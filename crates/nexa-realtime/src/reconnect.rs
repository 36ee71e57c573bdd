//! Reconnection controller.
//!
//! Counts consecutive failed sessions and computes the backoff delay for the
//! next attempt: `base * 2^(attempt-1)`, capped at `max_delay_ms` when the cap
//! is non-zero. After `max_attempts` attempts the controller is exhausted.

use std::time::Duration;

/// Backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub base_delay_ms: u64,
    /// Upper bound on any delay (0 = uncapped).
    pub max_delay_ms: u64,
    /// Maximum consecutive attempts (0 = unbounded).
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Clamp the exponent so the shift cannot overflow.
        let exponent = attempt.saturating_sub(1).min(63);
        let mut delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        if self.max_delay_ms > 0 {
            delay = delay.min(self.max_delay_ms);
        }
        Duration::from_millis(delay)
    }

    /// Whether attempt `attempt` (1-based) is within the bound.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

/// Attempt counter driven by the connection loop.
#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Record a successful open.
    ///
    /// Returns the number of attempts it took if this open was a recovery.
    pub fn on_connected(&mut self) -> Option<u32> {
        let attempts = std::mem::take(&mut self.attempts);
        (attempts > 0).then_some(attempts)
    }

    /// Record an unclean close and schedule the next attempt.
    ///
    /// Returns `None` once the bound is exhausted.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        let attempt = self.attempts.saturating_add(1);
        if !self.policy.allows(attempt) {
            return None;
        }
        self.attempts = attempt;
        Some((attempt, self.policy.delay_for(attempt)))
    }

    /// Attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, max_delay: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: base,
            max_delay_ms: max_delay,
            max_attempts,
        }
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let p = policy(1000, 0, 0);
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        assert_eq!(p.delay_for(4), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy(1000, 30_000, 0);
        assert_eq!(p.delay_for(5), Duration::from_millis(16_000));
        assert_eq!(p.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(p.delay_for(50), Duration::from_millis(30_000));
    }

    #[test]
    fn test_uncapped_delay_saturates() {
        let p = policy(1000, 0, 0);
        assert_eq!(p.delay_for(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_bounded_attempts() {
        let mut c = ReconnectController::new(policy(100, 0, 3));
        assert_eq!(c.next_attempt(), Some((1, Duration::from_millis(100))));
        assert_eq!(c.next_attempt(), Some((2, Duration::from_millis(200))));
        assert_eq!(c.next_attempt(), Some((3, Duration::from_millis(400))));
        assert_eq!(c.next_attempt(), None);
        assert_eq!(c.attempts(), 3);
    }

    #[test]
    fn test_unbounded_attempts() {
        let mut c = ReconnectController::new(policy(1, 10, 0));
        for n in 1..=100 {
            assert_eq!(c.next_attempt().map(|(a, _)| a), Some(n));
        }
    }

    #[test]
    fn test_connect_resets_counter() {
        let mut c = ReconnectController::new(policy(100, 0, 3));
        assert_eq!(c.on_connected(), None);

        c.next_attempt();
        c.next_attempt();
        assert_eq!(c.on_connected(), Some(2));
        assert_eq!(c.attempts(), 0);

        // Fresh budget after recovery.
        assert_eq!(c.next_attempt(), Some((1, Duration::from_millis(100))));
    }
}
