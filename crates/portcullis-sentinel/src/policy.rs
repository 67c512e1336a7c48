//! Maintenance scheduling policy
//!
//! Decides how long the scheduler waits before the next sweep, based on how
//! the previous one went.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one maintenance run. Lives only long enough to pick the next delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRun {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// Orphaned policies removed during the run
    #[serde(default)]
    pub deleted: usize,
}

impl MaintenanceRun {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Adaptive cadence for the maintenance loop
///
/// - first sweep: uniform in `[0, initial_max_delay]`
/// - after a slow or failed sweep: uniform in `[0, backoff_max_delay]`
/// - after a healthy sweep: exactly `steady_interval`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Upper bound for the randomized first delay
    ///
    /// **Default:** 3600 (1 hour)
    pub initial_max_delay_secs: u64,

    /// Delay after a healthy sweep
    ///
    /// **Default:** 3600 (1 hour)
    pub steady_interval_secs: u64,

    /// Upper bound for the randomized delay after a slow or failed sweep
    ///
    /// **Default:** 300 (5 minutes)
    pub backoff_max_delay_secs: u64,

    /// Sweeps slower than this count as remote-service stress
    ///
    /// **Default:** 5000
    pub latency_threshold_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_max_delay_secs: 3600,
            steady_interval_secs: 3600,
            backoff_max_delay_secs: 300,
            latency_threshold_ms: 5000,
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.steady_interval_secs == 0 {
            return Err("steady_interval_secs must be greater than 0".to_string());
        }

        if self.latency_threshold_ms == 0 {
            return Err("latency_threshold_ms must be greater than 0".to_string());
        }

        if self.backoff_max_delay_secs > self.steady_interval_secs {
            return Err("backoff_max_delay_secs must not exceed steady_interval_secs".to_string());
        }

        Ok(())
    }

    pub fn steady_interval(&self) -> Duration {
        Duration::from_secs(self.steady_interval_secs)
    }

    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }

    /// Whether a run should push the scheduler into back-off
    pub fn is_degraded(&self, run: &MaintenanceRun) -> bool {
        !run.success || run.duration() > self.latency_threshold()
    }

    pub fn initial_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        jitter(rng, Duration::from_secs(self.initial_max_delay_secs))
    }

    pub fn next_delay<R: Rng>(&self, run: &MaintenanceRun, rng: &mut R) -> Duration {
        if self.is_degraded(run) {
            jitter(rng, Duration::from_secs(self.backoff_max_delay_secs))
        } else {
            self.steady_interval()
        }
    }
}

/// Uniform delay in `[0, max]` at millisecond granularity
fn jitter<R: Rng>(rng: &mut R, max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rng.random_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run(duration_ms: u64, success: bool) -> MaintenanceRun {
        MaintenanceRun {
            started_at: Utc::now(),
            duration_ms,
            success,
            deleted: 0,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.steady_interval(), Duration::from_secs(3600));
        assert_eq!(policy.latency_threshold(), Duration::from_millis(5000));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_slow_sweep_backs_off_with_jitter() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let delay = policy.next_delay(&run(6000, true), &mut rng);
            assert!(delay <= Duration::from_millis(300_000));
        }
    }

    #[test]
    fn test_failed_sweep_backs_off() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(11);

        let delay = policy.next_delay(&run(10, false), &mut rng);
        assert!(delay <= Duration::from_secs(300));
    }

    #[test]
    fn test_healthy_sweep_uses_steady_cadence() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(3);

        let delay = policy.next_delay(&run(50, true), &mut rng);
        assert_eq!(delay, Duration::from_millis(3_600_000));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let policy = BackoffPolicy::default();
        assert!(!policy.is_degraded(&run(5000, true)));
        assert!(policy.is_degraded(&run(5001, true)));
    }

    #[test]
    fn test_initial_delay_spreads_over_an_hour() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        let delays: Vec<Duration> = (0..100).map(|_| policy.initial_delay(&mut rng)).collect();
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(3600)));
        // Seeded draws are not all identical
        assert!(delays.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_validation_failures() {
        let mut policy = BackoffPolicy::default();

        policy.steady_interval_secs = 0;
        assert!(policy.validate().is_err());
        policy.steady_interval_secs = 3600;

        policy.backoff_max_delay_secs = 7200;
        assert!(policy.validate().is_err());
        policy.backoff_max_delay_secs = 300;

        policy.latency_threshold_ms = 0;
        assert!(policy.validate().is_err());
    }
}
