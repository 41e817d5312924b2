//! In-process rotation scheduler
//!
//! Keeps registered jobs in memory, computes each job's next run from its
//! period or cron schedule, and drives a [`RotationHandler`] from a polling
//! loop. Used by the CLI host and by tests; a production host would plug its
//! own [`RotationScheduler`] into the backend instead.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::params::parse_schedule;
use super::scheduler::{
    JobId, RotationHandler, RotationInfo, RotationInfoRequest, RotationJobConfigureRequest,
    RotationJobDeregisterRequest, RotationScheduler, SchedulerError,
};

/// Default polling interval of [`InMemoryScheduler::run`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A job as the scheduler holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredJob {
    pub job_id: JobId,
    pub name: String,
    pub mount_point: String,
    pub req_path: String,
    pub rotation_schedule: String,
    pub rotation_window: Duration,
    pub rotation_period: Duration,
    /// Next time the job fires
    pub next_run: DateTime<Utc>,
}

impl RegisteredJob {
    fn from_request(
        req: RotationJobConfigureRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        let mut job = Self {
            job_id: JobId::new(),
            name: req.name,
            mount_point: req.mount_point,
            req_path: req.req_path,
            rotation_schedule: req.rotation_schedule,
            rotation_window: req.rotation_window,
            rotation_period: req.rotation_period,
            next_run: now,
        };
        job.next_run = job.next_run_after(now)?;
        Ok(job)
    }

    /// First run strictly after `after`; a period takes precedence over a schedule
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        if !self.rotation_period.is_zero() {
            let period = chrono::Duration::from_std(self.rotation_period).map_err(|e| {
                SchedulerError::InvalidTiming {
                    path: self.req_path.clone(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(after + period);
        }

        let schedule = parse_schedule(&self.rotation_schedule).map_err(|reason| {
            SchedulerError::InvalidTiming {
                path: self.req_path.clone(),
                reason,
            }
        })?;
        schedule
            .after(&after)
            .next()
            .ok_or_else(|| SchedulerError::InvalidTiming {
                path: self.req_path.clone(),
                reason: "schedule has no future occurrence".into(),
            })
    }

    /// The attempt due at `next_run` is still inside its window at `now`
    fn within_window(&self, now: DateTime<Utc>) -> bool {
        if self.rotation_window.is_zero() {
            return true;
        }
        match chrono::Duration::from_std(self.rotation_window) {
            Ok(window) => now <= self.next_run + window,
            Err(_) => true,
        }
    }
}

/// Scheduler holding jobs in memory
///
/// Registering a path that already has a job replaces it. Deregistering an
/// unknown path succeeds.
#[derive(Debug)]
pub struct InMemoryScheduler {
    jobs: Mutex<BTreeMap<String, RegisteredJob>>,
    failure: Mutex<Option<String>>,
    registrations: AtomicUsize,
    deregistrations: AtomicUsize,
    poll_interval: Duration,
}

impl Default for InMemoryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Scheduler whose [`run`](Self::run) loop polls every `poll_interval`
    /// (at least once per millisecond)
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            jobs: Mutex::new(BTreeMap::new()),
            failure: Mutex::new(None),
            registrations: AtomicUsize::new(0),
            deregistrations: AtomicUsize::new(0),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Make every subsequent call fail with `reason`
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    /// Stop failing calls
    pub fn heal(&self) {
        *self.failure.lock() = None;
    }

    /// Register calls received, including failed ones
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Deregister calls received, including failed ones
    pub fn deregistrations(&self) -> usize {
        self.deregistrations.load(Ordering::SeqCst)
    }

    /// Job registered for `req_path`
    pub fn job(&self, req_path: &str) -> Option<RegisteredJob> {
        self.jobs.lock().get(req_path).cloned()
    }

    /// All registered jobs, ordered by path
    pub fn jobs(&self) -> Vec<RegisteredJob> {
        self.jobs.lock().values().cloned().collect()
    }

    /// Make the job for `req_path` due immediately
    ///
    /// Returns `false` when nothing is registered for the path.
    pub fn trigger(&self, req_path: &str) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(req_path) {
            Some(job) => {
                job.next_run = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Paths whose next run is at or before `now`
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<String> {
        self.jobs
            .lock()
            .values()
            .filter(|job| job.next_run <= now)
            .map(|job| job.req_path.clone())
            .collect()
    }

    /// Fire every job due at `now` and re-arm it
    ///
    /// Attempts that fell outside their window are skipped. Handler failures
    /// are logged; the job stays registered and fires again at its next run.
    /// Returns the paths the handler was invoked for.
    pub async fn fire_due(
        &self,
        now: DateTime<Utc>,
        handler: &dyn RotationHandler,
    ) -> Vec<String> {
        let due: Vec<RegisteredJob> = self
            .jobs
            .lock()
            .values()
            .filter(|job| job.next_run <= now)
            .cloned()
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for job in due {
            if job.within_window(now) {
                match handler.handle_rotation(&job.req_path).await {
                    Ok(()) => tracing::info!(
                        path = %job.req_path,
                        job = %job.name,
                        "scheduled rotation completed"
                    ),
                    Err(e) => tracing::error!(
                        path = %job.req_path,
                        job = %job.name,
                        error = %e,
                        "scheduled rotation failed"
                    ),
                }
                fired.push(job.req_path.clone());
            } else {
                tracing::warn!(
                    path = %job.req_path,
                    due = %job.next_run,
                    "rotation window elapsed, skipping attempt"
                );
            }
            self.rearm(&job, now);
        }
        fired
    }

    fn rearm(&self, fired: &RegisteredJob, now: DateTime<Utc>) {
        let mut jobs = self.jobs.lock();
        // The job may have been replaced or dropped while the handler ran.
        let Some(job) = jobs.get_mut(&fired.req_path) else {
            return;
        };
        if job.job_id != fired.job_id {
            return;
        }
        match job.next_run_after(now) {
            Ok(next_run) => job.next_run = next_run,
            Err(e) => {
                tracing::error!(
                    path = %fired.req_path,
                    error = %e,
                    "dropping job that cannot be re-armed"
                );
                jobs.remove(&fired.req_path);
            }
        }
    }

    /// Poll for due jobs until `shutdown` is cancelled
    pub async fn run(&self, handler: Arc<dyn RotationHandler>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.fire_due(Utc::now(), handler.as_ref()).await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("rotation scheduler shutting down");
                    return;
                }
            }
        }
    }

    fn check_failure(&self, path: &str) -> Result<(), SchedulerError> {
        match self.failure.lock().as_ref() {
            Some(reason) => Err(SchedulerError::Rejected {
                path: path.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RotationScheduler for InMemoryScheduler {
    async fn register_rotation_job(
        &self,
        req: RotationJobConfigureRequest,
    ) -> Result<JobId, SchedulerError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&req.req_path)?;

        let job = RegisteredJob::from_request(req, Utc::now())?;
        let job_id = job.job_id;
        tracing::debug!(path = %job.req_path, next_run = %job.next_run, "job scheduled");
        self.jobs.lock().insert(job.req_path.clone(), job);
        Ok(job_id)
    }

    async fn deregister_rotation_job(
        &self,
        req: RotationJobDeregisterRequest,
    ) -> Result<(), SchedulerError> {
        self.deregistrations.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&req.req_path)?;

        self.jobs.lock().remove(&req.req_path);
        Ok(())
    }

    async fn rotation_info(
        &self,
        req: RotationInfoRequest,
    ) -> Result<RotationInfo, SchedulerError> {
        self.check_failure(&req.req_path)?;

        self.jobs
            .lock()
            .get(&req.req_path)
            .map(|job| RotationInfo {
                next_rotation: job.next_run,
            })
            .ok_or(SchedulerError::JobNotFound { path: req.req_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, BackendResult};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl RotationHandler for Recorder {
        async fn handle_rotation(&self, req_path: &str) -> BackendResult<()> {
            self.seen.lock().push(req_path.to_string());
            if self.fail {
                return Err(BackendError::UnknownPath {
                    path: req_path.to_string(),
                });
            }
            Ok(())
        }
    }

    fn request(path: &str, schedule: &str, period: u64) -> RotationJobConfigureRequest {
        RotationJobConfigureRequest {
            name: "job".into(),
            mount_point: "testing-secrets/".into(),
            req_path: path.into(),
            rotation_schedule: schedule.into(),
            rotation_window: Duration::ZERO,
            rotation_period: Duration::from_secs(period),
        }
    }

    #[tokio::test]
    async fn period_sets_next_run() {
        let scheduler = InMemoryScheduler::new();
        let before = Utc::now();

        scheduler
            .register_rotation_job(request("config", "", 3600))
            .await
            .unwrap();

        let info = scheduler
            .rotation_info(RotationInfoRequest {
                req_path: "config".into(),
            })
            .await
            .unwrap();
        assert!(info.next_rotation >= before + chrono::Duration::seconds(3600));
        assert!(info.next_rotation <= Utc::now() + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn cron_schedule_sets_next_run() {
        let scheduler = InMemoryScheduler::new();
        scheduler
            .register_rotation_job(request("static-role/db1", "0 * * * *", 0))
            .await
            .unwrap();

        let job = scheduler.job("static-role/db1").unwrap();
        assert!(job.next_run > Utc::now());
        assert_eq!(job.next_run.timestamp() % 3600, 0);
    }

    #[tokio::test]
    async fn reregistration_replaces_job() {
        let scheduler = InMemoryScheduler::new();
        let first = scheduler
            .register_rotation_job(request("config", "", 60))
            .await
            .unwrap();
        let second = scheduler
            .register_rotation_job(request("config", "", 120))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.jobs().len(), 1);
        assert_eq!(
            scheduler.job("config").unwrap().rotation_period,
            Duration::from_secs(120)
        );
        assert_eq!(scheduler.registrations(), 2);
    }

    #[tokio::test]
    async fn deregistering_unknown_path_succeeds() {
        let scheduler = InMemoryScheduler::new();
        scheduler
            .deregister_rotation_job(RotationJobDeregisterRequest {
                mount_point: "testing-secrets/".into(),
                req_path: "static-role/ghost".into(),
            })
            .await
            .unwrap();
        assert_eq!(scheduler.deregistrations(), 1);
    }

    #[tokio::test]
    async fn injected_failure_rejects_and_heals() {
        let scheduler = InMemoryScheduler::new();
        scheduler.fail_with("sealed");

        let err = scheduler
            .register_rotation_job(request("config", "", 60))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Rejected {
                path: "config".into(),
                reason: "sealed".into()
            }
        );
        assert!(scheduler.job("config").is_none());

        scheduler.heal();
        scheduler
            .register_rotation_job(request("config", "", 60))
            .await
            .unwrap();
        assert!(scheduler.job("config").is_some());
    }

    #[tokio::test]
    async fn fire_due_invokes_handler_and_rearms() {
        let scheduler = InMemoryScheduler::new();
        scheduler
            .register_rotation_job(request("static-role/db1", "", 60))
            .await
            .unwrap();
        let armed = scheduler.job("static-role/db1").unwrap().next_run;
        let handler = Recorder::default();

        let early = armed - chrono::Duration::seconds(1);
        assert!(scheduler.due_jobs(early).is_empty());
        assert!(scheduler.fire_due(early, &handler).await.is_empty());
        assert_eq!(scheduler.due_jobs(armed), vec!["static-role/db1".to_string()]);

        let fired = scheduler.fire_due(armed, &handler).await;
        assert_eq!(fired, vec!["static-role/db1".to_string()]);
        assert_eq!(*handler.seen.lock(), vec!["static-role/db1".to_string()]);
        assert_eq!(
            scheduler.job("static-role/db1").unwrap().next_run,
            armed + chrono::Duration::seconds(60)
        );
    }

    #[tokio::test]
    async fn failing_handler_keeps_job() {
        let scheduler = InMemoryScheduler::new();
        scheduler
            .register_rotation_job(request("config", "", 60))
            .await
            .unwrap();
        let armed = scheduler.job("config").unwrap().next_run;
        let handler = Recorder {
            fail: true,
            ..Recorder::default()
        };

        scheduler.fire_due(armed, &handler).await;

        assert!(scheduler.job("config").is_some());
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn elapsed_window_skips_attempt() {
        let scheduler = InMemoryScheduler::new();
        let mut req = request("config", "", 60);
        req.rotation_window = Duration::from_secs(10);
        scheduler.register_rotation_job(req).await.unwrap();
        let armed = scheduler.job("config").unwrap().next_run;
        let handler = Recorder::default();

        let late = armed + chrono::Duration::seconds(30);
        let fired = scheduler.fire_due(late, &handler).await;

        assert!(fired.is_empty());
        assert!(handler.seen.lock().is_empty());
        assert_eq!(
            scheduler.job("config").unwrap().next_run,
            late + chrono::Duration::seconds(60)
        );
    }

    #[tokio::test]
    async fn run_loop_fires_triggered_job_until_cancelled() {
        let scheduler = Arc::new(InMemoryScheduler::with_poll_interval(Duration::from_millis(10)));
        scheduler
            .register_rotation_job(request("config", "", 3600))
            .await
            .unwrap();
        assert!(scheduler.trigger("config"));

        let handler = Arc::new(Recorder::default());
        let shutdown = CancellationToken::new();
        let task = {
            let scheduler = scheduler.clone();
            let handler: Arc<dyn RotationHandler> = handler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(handler, shutdown).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.seen.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(*handler.seen.lock(), vec!["config".to_string()]);
    }

    #[test]
    fn trigger_unknown_path_is_false() {
        let scheduler = InMemoryScheduler::new();
        assert!(!scheduler.trigger("config"));
    }
}
