//! Growing delay between connection attempts

use std::time::Duration;

const GROWTH: f64 = 1.5;

/// Delay that grows ×1.5 per attempt up to a cap
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        let base = base.min(cap);
        Self {
            base,
            cap,
            current: base,
            attempts: 0,
        }
    }

    /// Delay to wait now; the following one grows
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempts += 1;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * GROWTH).min(self.cap.as_secs_f64()),
        );
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_and_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        let delays: Vec<f64> = (0..7).map(|_| backoff.next_delay().as_secs_f64()).collect();
        assert_eq!(delays[0], 5.0);
        assert_eq!(delays[1], 7.5);
        assert_eq!(delays[2], 11.25);
        assert!(delays.iter().all(|d| *d <= 30.0));
        assert_eq!(delays[6], 30.0);
        assert_eq!(backoff.attempts(), 7);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
