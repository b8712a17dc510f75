//! Reconnect backoff policy
//!
//! Exponential backoff with an optional jitter, applied between reconnect
//! attempts while the owning session is Active. Exhausting the budget turns
//! the disconnect into a `LinkError::Fault`.

use std::time::Duration;

/// Backoff configuration for link reconnection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts before reporting a fault
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub base_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub multiplier: f64,
    /// Whether to randomize delays by ±10%
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before the given 1-based attempt, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let capped = Duration::from_millis(millis as u64).min(self.max_delay);

        if self.jitter {
            let factor = 1.0 + (rand::random::<f64>() - 0.5) * 0.2;
            Duration::from_millis((capped.as_millis() as f64 * factor) as u64).min(self.max_delay)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_exponentially_to_cap() {
        let policy = ReconnectPolicy {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(4000));
        // capped from here on
        assert_eq!(policy.delay_for(8), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..=5 {
            let base = ReconnectPolicy {
                jitter: false,
                ..policy.clone()
            }
            .delay_for(attempt);
            for _ in 0..20 {
                let jittered = policy.delay_for(attempt);
                assert!(jittered <= policy.max_delay);
                assert!(jittered.as_millis() as f64 >= base.as_millis() as f64 * 0.85);
            }
        }
    }
}
