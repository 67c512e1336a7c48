//! Maintenance scheduler
//!
//! A two-state machine driven by a single task:
//!
//! ```text
//!            timer fires
//!   ┌──────┐ ───────────> ┌─────────┐
//!   │ Idle │              │ Running │
//!   └──────┘ <─────────── └─────────┘
//!       sweep done, next delay armed
//! ```
//!
//! The next timer is armed only after the current sweep finishes, so sweeps
//! never overlap.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::policy::{BackoffPolicy, MaintenanceRun};

/// Work performed on each timer fire. Must not fail; failures are reported
/// through `MaintenanceRun::success`.
#[async_trait]
pub trait MaintenanceTask: Send + Sync {
    async fn run_once(&self) -> MaintenanceRun;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the armed delay to elapse
    Idle { delay: Duration },
    /// Sweep in progress
    Running,
}

pub struct MaintenanceScheduler {
    task: Arc<dyn MaintenanceTask>,
    policy: BackoffPolicy,
    rng: StdRng,
    state: SchedulerState,
    last_run: Option<MaintenanceRun>,
}

impl MaintenanceScheduler {
    /// Create a scheduler whose first delay is drawn from OS entropy
    pub fn new(task: Arc<dyn MaintenanceTask>, policy: BackoffPolicy) -> Self {
        Self::with_rng(task, policy, StdRng::from_os_rng())
    }

    /// Create a scheduler with an explicit random source
    pub fn with_rng(task: Arc<dyn MaintenanceTask>, policy: BackoffPolicy, mut rng: StdRng) -> Self {
        let delay = policy.initial_delay(&mut rng);
        Self {
            task,
            policy,
            rng,
            state: SchedulerState::Idle { delay },
            last_run: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn last_run(&self) -> Option<&MaintenanceRun> {
        self.last_run.as_ref()
    }

    /// Idle -> Running -> Idle: run one sweep and arm the next delay.
    ///
    /// Does not sleep; `run` does the waiting.
    pub async fn fire(&mut self) -> Duration {
        self.state = SchedulerState::Running;

        let run = self.task.run_once().await;
        let delay = self.policy.next_delay(&run, &mut self.rng);

        if self.policy.is_degraded(&run) {
            warn!(
                "Maintenance degraded (success={}, {}ms); retrying within {:?}",
                run.success, run.duration_ms, delay
            );
        } else {
            info!(
                "Maintenance completed in {}ms ({} deleted); next run in {:?}",
                run.duration_ms, run.deleted, delay
            );
        }

        self.last_run = Some(run);
        self.state = SchedulerState::Idle { delay };
        delay
    }

    /// Main loop - runs for the lifetime of the process
    ///
    /// ```no_run
    /// # use portcullis_sentinel::{BackoffPolicy, GarbageCollector, MaintenanceScheduler};
    /// # use portcullis_connect::MockAccessApi;
    /// # use std::sync::Arc;
    /// let gc = Arc::new(GarbageCollector::new(Arc::new(MockAccessApi::new())));
    /// let scheduler = MaintenanceScheduler::new(gc, BackoffPolicy::default());
    ///
    /// tokio::spawn(scheduler.run());
    /// ```
    pub async fn run(mut self) {
        info!(
            "Maintenance scheduler active | first run in {:?} | steady interval {:?}",
            self.pending_delay(),
            self.policy.steady_interval()
        );

        loop {
            tokio::time::sleep(self.pending_delay()).await;
            self.fire().await;
        }
    }

    fn pending_delay(&self) -> Duration {
        match self.state {
            SchedulerState::Idle { delay } => delay,
            SchedulerState::Running => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted (duration_ms, success) outcomes
    struct ScriptedTask {
        outcomes: Mutex<Vec<(u64, bool)>>,
        runs: AtomicUsize,
    }

    impl ScriptedTask {
        fn new(mut outcomes: Vec<(u64, bool)>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MaintenanceTask for ScriptedTask {
        async fn run_once(&self) -> MaintenanceRun {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let (duration_ms, success) = self.outcomes.lock().unwrap().pop().unwrap_or((0, true));
            MaintenanceRun {
                started_at: Utc::now(),
                duration_ms,
                success,
                deleted: 0,
            }
        }
    }

    fn scheduler(task: Arc<ScriptedTask>) -> MaintenanceScheduler {
        MaintenanceScheduler::with_rng(task, BackoffPolicy::default(), StdRng::seed_from_u64(1))
    }

    #[tokio::test]
    async fn test_starts_idle_within_first_hour() {
        let scheduler = scheduler(ScriptedTask::new(vec![]));

        match scheduler.state() {
            SchedulerState::Idle { delay } => assert!(delay <= Duration::from_secs(3600)),
            SchedulerState::Running => panic!("scheduler must start idle"),
        }
        assert!(scheduler.last_run().is_none());
    }

    #[tokio::test]
    async fn test_fire_transitions_through_backoff_and_recovery() {
        let task = ScriptedTask::new(vec![(6000, true), (20, false), (50, true)]);
        let mut scheduler = scheduler(task.clone());

        let slow = scheduler.fire().await;
        assert!(slow <= Duration::from_millis(300_000));
        assert_eq!(scheduler.state(), SchedulerState::Idle { delay: slow });

        let failed = scheduler.fire().await;
        assert!(failed <= Duration::from_millis(300_000));
        assert!(!scheduler.last_run().unwrap().success);

        let healthy = scheduler.fire().await;
        assert_eq!(healthy, Duration::from_millis(3_600_000));
        assert_eq!(task.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_waits_for_armed_delay() {
        let task = ScriptedTask::new(vec![]);
        let scheduler = scheduler(task.clone());
        let SchedulerState::Idle { delay: first } = scheduler.state() else {
            panic!("scheduler must start idle");
        };

        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(first + Duration::from_millis(1)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        // Healthy runs settle on the steady hourly cadence
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);

        handle.abort();
    }
}
