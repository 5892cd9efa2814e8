use crate::error::LogError;
use governor::{DefaultDirectRateLimiter, Quota};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

/// Token bucket consulted by the write engine before a job may occupy
/// queue capacity.
///
/// Tokens refill continuously at `rate` per second (fractional rates are
/// allowed, e.g. `0.5` for one token every two seconds) up to `burst`.
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
    rate: f64,
    burst: u32,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Result<Self, LogError> {
        let invalid = || LogError::InvalidRateLimit { rate, burst };

        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid());
        }
        let burst_nz = NonZeroU32::new(burst).ok_or_else(invalid)?;
        let period = Duration::try_from_secs_f64(1.0 / rate).map_err(|_| invalid())?;
        let quota = Quota::with_period(period).ok_or_else(invalid)?.allow_burst(burst_nz);

        Ok(RateLimiter {
            inner: DefaultDirectRateLimiter::direct(quota),
            rate,
            burst,
        })
    }

    /// Take `n` tokens if they are all available right now.
    ///
    /// Never waits. Asking for more than `burst` tokens always fails;
    /// asking for zero always succeeds.
    pub fn try_acquire(&self, n: u32) -> bool {
        match NonZeroU32::new(n) {
            None => true,
            Some(n) => matches!(self.inner.check_n(n), Ok(Ok(_))),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_burst_then_rejects() {
        let limiter = RateLimiter::new(0.001, 3).unwrap();
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
        assert!(!limiter.try_acquire(1));
        assert!(limiter.try_acquire(0));
    }

    #[test]
    fn request_above_burst_never_succeeds() {
        let limiter = RateLimiter::new(1000.0, 2).unwrap();
        assert!(!limiter.try_acquire(3));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(50.0, 1).unwrap();
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.try_acquire(1));
    }

    #[test]
    fn rejects_invalid_settings() {
        for (rate, burst) in [(0.0, 1), (-1.0, 1), (f64::NAN, 1), (10.0, 0), (1e-300, 1)] {
            assert!(matches!(
                RateLimiter::new(rate, burst),
                Err(LogError::InvalidRateLimit { .. })
            ));
        }
    }
}
