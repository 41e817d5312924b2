//! Storage keys, path prefixes and job names

/// Backend version reported to the host
pub const VERSION: &str = "0.0.1";

/// Path and storage key of the root credential
pub const PATH_CONFIG: &str = "config";
/// Path prefix and storage namespace of static roles
pub const PATH_STATIC_ROLE: &str = "static-role";
/// Path prefix of the read-only static credential view
pub const PATH_STATIC_CRED: &str = "static-cred";

/// Storage key of the initialization counter
pub const INITIALIZE_CHECK_ENTRY: &str = "check";

/// Scheduler job name for the root credential
pub const ROOT_ROTATION_JOB_NAME: &str = "testing-secrets-root-creds";
/// Scheduler job name for static roles
pub const STATIC_ROTATION_JOB_NAME: &str = "testing-secrets-static-creds";

/// Help text reported to the host
pub const BACKEND_HELP: &str =
    "This is an example secret backend that stores a root credential and static roles and rotates their passwords.";

/// Storage key (and trigger path) of the static role `name`
pub fn static_role_path(name: &str) -> String {
    format!("{PATH_STATIC_ROLE}/{name}")
}
