//! Rotation engine
//!
//! Handles a "rotate now" invocation: read the root credential, work out which
//! record the trigger path addresses, generate a new password, push it
//! downstream and persist the record. There is no locking across those steps;
//! two invocations for the same record race and the last write wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::consts::{PATH_CONFIG, PATH_STATIC_ROLE};
use crate::error::{BackendError, BackendResult};
use crate::store::{ConfigStore, RoleName, RootCredential, StaticRoleStore};

/// Record a trigger path addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationTarget {
    /// The root credential (`config`)
    Root,
    /// A static role (`static-role/<name>`)
    StaticRole(RoleName),
}

impl RotationTarget {
    /// Classify a trigger path by its first segment
    ///
    /// Everything after `static-role/` is the role name, so nested names such
    /// as `static-role/team/db1` resolve to `team/db1`.
    pub fn classify(req_path: &str) -> BackendResult<Self> {
        let path = req_path.trim_start_matches('/');
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match head {
            PATH_STATIC_ROLE => RoleName::parse(rest.unwrap_or_default()).map(Self::StaticRole),
            PATH_CONFIG => Ok(Self::Root),
            _ => Err(BackendError::UnknownPath {
                path: req_path.to_string(),
            }),
        }
    }
}

impl fmt::Display for RotationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str(PATH_CONFIG),
            Self::StaticRole(name) => write!(f, "{PATH_STATIC_ROLE}/{name}"),
        }
    }
}

/// Pushes a new password to the system that actually uses it
#[async_trait]
pub trait CredentialApplier: Send + Sync {
    async fn apply(
        &self,
        target: &RotationTarget,
        username: &str,
        new_password: &str,
    ) -> BackendResult<()>;
}

/// Applier that only waits, standing in for a slow downstream API call
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayedApplier {
    wait: Duration,
}

impl DelayedApplier {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }
}

#[async_trait]
impl CredentialApplier for DelayedApplier {
    async fn apply(
        &self,
        target: &RotationTarget,
        _username: &str,
        _new_password: &str,
    ) -> BackendResult<()> {
        if !self.wait.is_zero() {
            tracing::debug!(%target, wait = ?self.wait, "applying new password downstream");
            tokio::time::sleep(self.wait).await;
        }
        Ok(())
    }
}

/// Base-36 rendering of a random `u64`
///
/// Printable and short; not meant as a cryptographically strong secret.
pub fn generate_password() -> String {
    to_base36(rand::rng().random::<u64>())
}

/// A fresh password guaranteed to differ from `current`
pub fn generate_distinct_password(current: &str) -> String {
    loop {
        let candidate = generate_password();
        if candidate != current {
            return candidate;
        }
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Runs rotations against the config and role stores
#[derive(Clone)]
pub struct RotationEngine {
    config: ConfigStore,
    roles: StaticRoleStore,
    applier: Arc<dyn CredentialApplier>,
}

impl fmt::Debug for RotationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationEngine").finish_non_exhaustive()
    }
}

impl RotationEngine {
    pub fn new(
        config: ConfigStore,
        roles: StaticRoleStore,
        applier: Arc<dyn CredentialApplier>,
    ) -> Self {
        Self {
            config,
            roles,
            applier,
        }
    }

    /// Rotate the record addressed by `req_path`
    ///
    /// The root credential is read first and a failure there aborts the
    /// invocation. Unknown paths fail before anything is written. If the
    /// downstream apply fails the stored record keeps its old password.
    pub async fn rotate(&self, req_path: &str) -> BackendResult<RotationTarget> {
        tracing::info!(path = req_path, "rotation requested");

        let root = self.config.get().await?;
        let target = RotationTarget::classify(req_path)?;
        tracing::debug!(%target, root_username = %root.username, "rotating with root credential");

        match &target {
            RotationTarget::Root => self.rotate_root(&target, root).await?,
            RotationTarget::StaticRole(name) => self.rotate_role(&target, name).await?,
        }

        tracing::info!(%target, "credential rotated");
        Ok(target)
    }

    async fn rotate_root(
        &self,
        target: &RotationTarget,
        mut root: RootCredential,
    ) -> BackendResult<()> {
        let password = generate_distinct_password(&root.password);
        self.applier.apply(target, &root.username, &password).await?;

        root.password = password;
        self.config.put(&root).await
    }

    async fn rotate_role(&self, target: &RotationTarget, name: &RoleName) -> BackendResult<()> {
        let mut role = self.roles.get(name).await?;
        let password = generate_distinct_password(&role.password);
        self.applier.apply(target, &role.username, &password).await?;

        role.password = password;
        self.roles.put(name, &role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticRole;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use testing_secrets_storage::{FaultyStorage, MemoryStorage, Op, Storage, StorageError};

    struct RejectingApplier;

    #[async_trait]
    impl CredentialApplier for RejectingApplier {
        async fn apply(&self, target: &RotationTarget, _: &str, _: &str) -> BackendResult<()> {
            Err(BackendError::Apply {
                target: target.to_string(),
                reason: "downstream unavailable".into(),
            })
        }
    }

    fn engine_over(
        storage: Arc<dyn Storage>,
        applier: Arc<dyn CredentialApplier>,
    ) -> RotationEngine {
        RotationEngine::new(
            ConfigStore::new(storage.clone()),
            StaticRoleStore::new(storage),
            applier,
        )
    }

    fn role_name(raw: &str) -> RoleName {
        RoleName::parse(raw).unwrap()
    }

    #[rstest]
    #[case("config", RotationTarget::Root)]
    #[case("config/extra", RotationTarget::Root)]
    #[case("static-role/alice", RotationTarget::StaticRole(role_name("alice")))]
    #[case("static-role/team/db1", RotationTarget::StaticRole(role_name("team/db1")))]
    fn classifies_known_paths(#[case] path: &str, #[case] expected: RotationTarget) {
        assert_eq!(RotationTarget::classify(path).unwrap(), expected);
    }

    #[rstest]
    #[case("foo/bar")]
    #[case("configuration")]
    #[case("static-roles/alice")]
    #[case("")]
    fn rejects_unknown_paths(#[case] path: &str) {
        assert!(matches!(
            RotationTarget::classify(path),
            Err(BackendError::UnknownPath { .. })
        ));
    }

    #[test]
    fn static_role_without_name_is_missing_name() {
        assert!(matches!(
            RotationTarget::classify("static-role"),
            Err(BackendError::MissingName)
        ));
    }

    #[rstest]
    #[case(0, "0")]
    #[case(35, "z")]
    #[case(36, "10")]
    #[case(u64::MAX, "3w5e11264sgsf")]
    fn base36(#[case] value: u64, #[case] expected: &str) {
        assert_eq!(to_base36(value), expected);
    }

    #[test]
    fn distinct_password_differs() {
        let current = generate_password();
        for _ in 0..32 {
            assert_ne!(generate_distinct_password(&current), current);
        }
    }

    #[tokio::test]
    async fn rotates_root_password_only() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_over(storage.clone(), Arc::new(DelayedApplier::default()));
        let config = ConfigStore::new(storage.clone());
        let before = RootCredential {
            message: "m".into(),
            username: "root".into(),
            password: "p0".into(),
            ..RootCredential::default()
        };
        config.put(&before).await.unwrap();

        let target = engine.rotate("config").await.unwrap();

        let after = config.get().await.unwrap();
        assert_eq!(target, RotationTarget::Root);
        assert_ne!(after.password, "p0");
        assert_eq!(
            RootCredential {
                password: before.password.clone(),
                ..after
            },
            before
        );
    }

    #[tokio::test]
    async fn rotates_named_role() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_over(storage.clone(), Arc::new(DelayedApplier::default()));
        let roles = StaticRoleStore::new(storage.clone());
        let db1 = StaticRole {
            username: "svc".into(),
            password: "p0".into(),
            ..StaticRole::default()
        };
        roles.put(&role_name("db1"), &db1).await.unwrap();

        engine.rotate("static-role/db1").await.unwrap();

        let after = roles.get(&role_name("db1")).await.unwrap();
        assert_eq!(after.username, "svc");
        assert_ne!(after.password, "p0");
        assert!(!after.password.is_empty());
    }

    #[tokio::test]
    async fn unknown_path_writes_nothing() {
        let storage = Arc::new(FaultyStorage::new(MemoryStorage::new()));
        let engine = engine_over(storage.clone(), Arc::new(DelayedApplier::default()));

        let err = engine.rotate("foo/bar").await.unwrap_err();

        assert_eq!(err.to_string(), "unknown path: foo/bar");
        assert!(storage.put_log().is_empty());
    }

    #[tokio::test]
    async fn root_read_failure_aborts() {
        let storage = Arc::new(FaultyStorage::new(MemoryStorage::new()));
        storage.fail(Op::Get, "config");
        let engine = engine_over(storage.clone(), Arc::new(DelayedApplier::default()));

        let err = engine.rotate("static-role/db1").await.unwrap_err();

        assert!(matches!(
            err,
            BackendError::Storage(StorageError::Injected { .. })
        ));
        assert!(storage.put_log().is_empty());
    }

    #[tokio::test]
    async fn failed_apply_keeps_old_password() {
        let storage = Arc::new(MemoryStorage::new());
        let roles = StaticRoleStore::new(storage.clone());
        let db1 = StaticRole {
            username: "svc".into(),
            password: "p0".into(),
            ..StaticRole::default()
        };
        roles.put(&role_name("db1"), &db1).await.unwrap();
        let engine = engine_over(storage.clone(), Arc::new(RejectingApplier));

        let err = engine.rotate("static-role/db1").await.unwrap_err();

        assert!(matches!(err, BackendError::Apply { .. }));
        assert_eq!(roles.get(&role_name("db1")).await.unwrap(), db1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_applier_waits() {
        let applier = DelayedApplier::new(Duration::from_secs(30));
        let started = tokio::time::Instant::now();

        applier
            .apply(&RotationTarget::Root, "root", "new")
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
