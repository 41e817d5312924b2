//! Automated rotation: parameters, scheduler gateway and the rotation engine

pub mod engine;
pub mod memory;
pub mod params;
pub mod scheduler;

pub use engine::{
    CredentialApplier, DelayedApplier, RotationEngine, RotationTarget, generate_distinct_password,
    generate_password,
};
pub use memory::{DEFAULT_POLL_INTERVAL, InMemoryScheduler, RegisteredJob};
pub use params::{
    DurationInput, RotationParams, RotationParamsUpdate, RotationTransition, parse_schedule,
};
pub use scheduler::{
    GatewayOutcome, JobId, RotationGateway, RotationHandler, RotationInfo, RotationInfoRequest,
    RotationJobConfigureRequest, RotationJobDeregisterRequest, RotationScheduler, SchedulerError,
    SyncError,
};
