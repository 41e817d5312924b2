//! # testing-secrets backend
//!
//! Credential lifecycle of the testing-secrets plugin: a root credential and
//! named static roles, their automated-rotation registration with an external
//! scheduler, the rotation engine the scheduler calls back into, and an
//! initialization counter with an artificial failure threshold.
//!
//! ## Components
//!
//! - [`ConfigStore`] / [`StaticRoleStore`]: records with zero-value defaults
//! - [`RotationGateway`]: one register or deregister call per write, derived
//!   from the stored parameters before and after it
//! - [`RotationEngine`]: resolves a trigger path and rotates the password
//! - [`InitializationCounter`]: persisted initialize count and `low_check`
//! - [`Backend`]: implements [`SecretsBackend`], the interface a host drives
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use testing_secrets_backend::{Backend, InMemoryScheduler, RoleUpdate, SecretsBackend};
//! use testing_secrets_storage::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Backend::builder()
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .scheduler(Arc::new(InMemoryScheduler::new()))
//!     .build()?;
//!
//! let update = RoleUpdate {
//!     username: Some("svc".into()),
//!     password: Some("p0".into()),
//!     ..RoleUpdate::default()
//! };
//! backend.on_role_write("db1", update).await?;
//! backend.on_rotate("static-role/db1").await?;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod backend;
pub mod consts;
mod error;
mod initialize;
mod response;
pub mod rotation;
mod settings;
pub mod store;

pub use backend::{Backend, BackendBuilder, EXPIRE_TIME_FORMAT, SecretsBackend};
pub use error::{BackendError, BackendResult};
pub use initialize::InitializationCounter;
pub use response::Response;
pub use rotation::{
    CredentialApplier, DelayedApplier, InMemoryScheduler, JobId, RotationEngine, RotationGateway,
    RotationHandler, RotationParams, RotationParamsUpdate, RotationScheduler, RotationTarget,
    SchedulerError, SyncError,
};
pub use settings::{BackendSettings, MAX_ROTATION_WAIT};
pub use store::{
    ConfigStore, ConfigUpdate, RoleName, RoleUpdate, RootCredential, StaticRole, StaticRoleStore,
};
