//! Rotation scheduler gateway
//!
//! The external scheduler owns timing: the backend only tells it which
//! records want automated rotation (register), which no longer do
//! (deregister), and asks it when a record is next due. The scheduler calls
//! back through [`RotationHandler`] when a job fires.
//!
//! [`RotationGateway`] turns a record's parameter transition into at most one
//! scheduler call. Nothing here persists "currently registered" state; the
//! previous stored parameters stand in for it and the scheduler is expected
//! to treat repeated registrations of the same path as a replacement.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::params::{RotationParams, RotationTransition};
use crate::error::BackendResult;

/// Handle returned by a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationJobConfigureRequest {
    /// Job name (root vs static-role job)
    pub name: String,
    /// Mount point of this backend
    pub mount_point: String,
    /// Trigger path handed back on each rotation
    pub req_path: String,
    pub rotation_schedule: String,
    pub rotation_window: Duration,
    pub rotation_period: Duration,
}

/// Deregistration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationJobDeregisterRequest {
    pub mount_point: String,
    pub req_path: String,
}

/// Rotation-information lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationInfoRequest {
    pub req_path: String,
}

/// What the scheduler knows about a registered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationInfo {
    /// When the scheduler next expects to rotate the record
    pub next_rotation: DateTime<Utc>,
}

/// Scheduler-side failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The scheduler refused the request
    #[error("scheduler rejected request for '{path}': {reason}")]
    Rejected { path: String, reason: String },

    /// No job is registered for the path
    #[error("no rotation job registered for '{path}'")]
    JobNotFound { path: String },

    /// The job's timing cannot produce a next run
    #[error("cannot schedule '{path}': {reason}")]
    InvalidTiming { path: String, reason: String },
}

/// The external scheduler
#[async_trait]
pub trait RotationScheduler: Send + Sync {
    /// Register (or replace) the job for `req.req_path`
    async fn register_rotation_job(
        &self,
        req: RotationJobConfigureRequest,
    ) -> Result<JobId, SchedulerError>;

    /// Drop the job for `req.req_path`
    async fn deregister_rotation_job(
        &self,
        req: RotationJobDeregisterRequest,
    ) -> Result<(), SchedulerError>;

    /// Next expected rotation of a registered path
    async fn rotation_info(&self, req: RotationInfoRequest) -> Result<RotationInfo, SchedulerError>;
}

/// Receives "rotate now" invocations from a scheduler
#[async_trait]
pub trait RotationHandler: Send + Sync {
    /// Rotate the record addressed by `req_path`
    async fn handle_rotation(&self, req_path: &str) -> BackendResult<()>;
}

/// Result of [`RotationGateway::sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Registered(JobId),
    Deregistered,
    Unchanged,
}

/// A register or deregister call failed
///
/// The message is what the caller sees in the error response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("error registering rotation job: {0}")]
    Register(SchedulerError),

    #[error("error de-registering rotation job: {0}")]
    Deregister(SchedulerError),
}

/// Translates parameter transitions into scheduler calls
#[derive(Clone)]
pub struct RotationGateway {
    scheduler: Arc<dyn RotationScheduler>,
    mount_point: String,
}

impl fmt::Debug for RotationGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationGateway")
            .field("mount_point", &self.mount_point)
            .finish_non_exhaustive()
    }
}

impl RotationGateway {
    /// Gateway for a backend mounted at `mount_point`
    pub fn new(scheduler: Arc<dyn RotationScheduler>, mount_point: impl Into<String>) -> Self {
        Self {
            scheduler,
            mount_point: mount_point.into(),
        }
    }

    /// Mount point sent with every request
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Issue the single call (if any) that moves the scheduler from
    /// `previous` to `next` for the record at `req_path`
    pub async fn sync(
        &self,
        job_name: &str,
        req_path: &str,
        previous: &RotationParams,
        next: &RotationParams,
    ) -> Result<GatewayOutcome, SyncError> {
        match next.transition_from(previous) {
            RotationTransition::Deregister => {
                self.scheduler
                    .deregister_rotation_job(RotationJobDeregisterRequest {
                        mount_point: self.mount_point.clone(),
                        req_path: req_path.to_string(),
                    })
                    .await
                    .map_err(SyncError::Deregister)?;
                tracing::info!(path = req_path, "deregistered rotation job");
                Ok(GatewayOutcome::Deregistered)
            }
            RotationTransition::Register => {
                let job_id = self.register(job_name, req_path, next).await?;
                Ok(GatewayOutcome::Registered(job_id))
            }
            RotationTransition::Unchanged => Ok(GatewayOutcome::Unchanged),
        }
    }

    /// Register `params` for `req_path` unconditionally
    ///
    /// Used by hosts re-announcing stored records after a restart.
    pub async fn register(
        &self,
        job_name: &str,
        req_path: &str,
        params: &RotationParams,
    ) -> Result<JobId, SyncError> {
        let job_id = self
            .scheduler
            .register_rotation_job(RotationJobConfigureRequest {
                name: job_name.to_string(),
                mount_point: self.mount_point.clone(),
                req_path: req_path.to_string(),
                rotation_schedule: params.rotation_schedule.clone(),
                rotation_window: params.rotation_window,
                rotation_period: params.rotation_period,
            })
            .await
            .map_err(SyncError::Register)?;
        tracing::info!(path = req_path, job = job_name, %job_id, "registered rotation job");
        Ok(job_id)
    }

    /// When the scheduler next expects to rotate `req_path`
    pub async fn next_rotation(&self, req_path: &str) -> Result<DateTime<Utc>, SchedulerError> {
        let info = self
            .scheduler
            .rotation_info(RotationInfoRequest {
                req_path: req_path.to_string(),
            })
            .await?;
        Ok(info.next_rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::InMemoryScheduler;

    fn periodic(secs: u64) -> RotationParams {
        RotationParams {
            rotation_period: Duration::from_secs(secs),
            ..RotationParams::default()
        }
    }

    fn gateway() -> (Arc<InMemoryScheduler>, RotationGateway) {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let gateway = RotationGateway::new(scheduler.clone(), "testing-secrets/");
        (scheduler, gateway)
    }

    #[tokio::test]
    async fn unrelated_update_makes_no_call() {
        let (scheduler, gateway) = gateway();

        let outcome = gateway
            .sync("job", "config", &periodic(60), &periodic(60))
            .await
            .unwrap();

        assert_eq!(outcome, GatewayOutcome::Unchanged);
        assert_eq!(scheduler.registrations(), 0);
        assert_eq!(scheduler.deregistrations(), 0);
    }

    #[tokio::test]
    async fn activation_registers_with_mount_point() {
        let (scheduler, gateway) = gateway();

        let outcome = gateway
            .sync("job", "static-role/db1", &RotationParams::default(), &periodic(60))
            .await
            .unwrap();

        assert!(matches!(outcome, GatewayOutcome::Registered(_)));
        let job = scheduler.job("static-role/db1").unwrap();
        assert_eq!(job.name, "job");
        assert_eq!(job.mount_point, "testing-secrets/");
        assert_eq!(job.rotation_period, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn deactivation_deregisters() {
        let (scheduler, gateway) = gateway();
        gateway
            .sync("job", "config", &RotationParams::default(), &periodic(60))
            .await
            .unwrap();

        let outcome = gateway
            .sync("job", "config", &periodic(60), &RotationParams::default())
            .await
            .unwrap();

        assert_eq!(outcome, GatewayOutcome::Deregistered);
        assert!(scheduler.job("config").is_none());
    }

    #[tokio::test]
    async fn scheduler_failure_is_reported_as_sync_error() {
        let (scheduler, gateway) = gateway();
        scheduler.fail_with("scheduler sealed");

        let err = gateway
            .sync("job", "config", &RotationParams::default(), &periodic(60))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Register(_)));
        assert!(err.to_string().starts_with("error registering rotation job: "));
        assert!(err.to_string().contains("scheduler sealed"));
    }

    #[tokio::test]
    async fn next_rotation_of_unknown_path_fails() {
        let (_scheduler, gateway) = gateway();
        let err = gateway.next_rotation("static-role/ghost").await.unwrap_err();
        assert_eq!(
            err,
            SchedulerError::JobNotFound {
                path: "static-role/ghost".into()
            }
        );
    }
}
