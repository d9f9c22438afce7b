//! Reconnect delay schedule for push subscriptions.

use rand::Rng;
use std::time::Duration;

/// Doubling delay with symmetric jitter and a cap on consecutive attempts.
///
/// `next_delay` returns `None` once `max_attempts` consecutive failures have
/// been scheduled; callers treat that as resource exhaustion.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    ceiling: Duration,
    jitter: f64,
    max_attempts: u32,
    attempt: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 0.1, 10)
    }
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, ceiling: Duration, jitter: f64, max_attempts: u32) -> Self {
        Self {
            initial,
            ceiling,
            jitter: jitter.clamp(0.0, 1.0),
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next reconnect, or `None` when the cap is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }

        let doubled = self.initial.saturating_mul(2u32.saturating_pow(self.attempt));
        let base = doubled.min(self.ceiling).as_secs_f64();
        let spread = base * self.jitter;
        let offset = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        self.attempt += 1;
        Some(Duration::from_secs_f64((base + offset).max(0.0)))
    }

    /// Forget past failures (after a connection stayed up)
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_ceiling() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(5), 0.0, 10);

        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn test_cap_exhausts() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(10), Duration::from_secs(1), 0.0, 2);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(10), Duration::from_secs(60), 0.2, 3);
        let secs = backoff.next_delay().unwrap().as_secs_f64();
        assert!((8.0..=12.0).contains(&secs), "delay was {}", secs);
    }
}
