//! The backend: wires the stores, the scheduler gateway, the rotation engine
//! and the initialization counter behind the [`SecretsBackend`] capability
//! interface a host drives.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

use testing_secrets_storage::Storage;

use crate::consts::{BACKEND_HELP, PATH_CONFIG, ROOT_ROTATION_JOB_NAME, STATIC_ROTATION_JOB_NAME};
use crate::error::{BackendError, BackendResult};
use crate::initialize::InitializationCounter;
use crate::response::Response;
use crate::rotation::{
    CredentialApplier, DelayedApplier, RotationEngine, RotationGateway, RotationHandler,
    RotationParams, RotationScheduler, SchedulerError,
};
use crate::settings::BackendSettings;
use crate::store::{ConfigStore, ConfigUpdate, RoleName, RoleUpdate, StaticRoleStore};

/// `expire_time` layout of static credential reads (`Mon Jan  2 15:04:05 2006`)
pub const EXPIRE_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Operations a host invokes on the backend
///
/// Writes return `Ok(None)` on success. A write whose record was persisted
/// but whose scheduler call failed returns `Ok(Some(response))` with the
/// error message set.
#[async_trait]
pub trait SecretsBackend: Send + Sync {
    /// Create or update the root credential
    async fn on_config_write(&self, update: ConfigUpdate) -> BackendResult<Option<Response>>;

    /// Root credential fields, including the password
    async fn on_config_read(&self) -> BackendResult<Response>;

    /// Whether the root credential has been written
    async fn on_config_exists(&self) -> BackendResult<bool>;

    /// Create or update the static role `name`
    async fn on_role_write(
        &self,
        name: &str,
        update: RoleUpdate,
    ) -> BackendResult<Option<Response>>;

    /// Static role fields
    async fn on_role_read(&self, name: &str) -> BackendResult<Response>;

    /// Names of all static roles under `keys`
    async fn on_role_list(&self) -> BackendResult<Response>;

    /// Static credential view: credentials plus `ttl` and `expire_time` when
    /// the role has rotation parameters and the scheduler holds its job
    async fn on_cred_read(&self, name: &str) -> BackendResult<Response>;

    /// Rotation callback from the scheduler
    async fn on_rotate(&self, req_path: &str) -> BackendResult<()>;

    /// Initialization hook
    async fn on_initialize(&self) -> BackendResult<()>;
}

/// Backend instance over one storage and one scheduler
#[derive(Clone)]
pub struct Backend {
    settings: BackendSettings,
    config: ConfigStore,
    roles: StaticRoleStore,
    gateway: RotationGateway,
    engine: RotationEngine,
    counter: InitializationCounter,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("settings", &self.settings)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl Backend {
    pub fn builder() -> BackendBuilder {
        BackendBuilder::new()
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Running version as reported to the host (`v0.0.1`)
    pub fn version(&self) -> String {
        self.settings.version_string()
    }

    pub fn help(&self) -> &'static str {
        BACKEND_HELP
    }

    /// Register every stored record whose rotation is active
    ///
    /// For hosts whose scheduler does not survive restarts. A record the
    /// scheduler rejects is logged and skipped so the others still get
    /// registered. Returns the trigger paths registered.
    pub async fn register_stored_jobs(&self) -> BackendResult<Vec<String>> {
        let mut registered = Vec::new();

        let root = self.config.get().await?;
        if self
            .register(ROOT_ROTATION_JOB_NAME, PATH_CONFIG, &root.rotation)
            .await
        {
            registered.push(PATH_CONFIG.to_string());
        }

        for raw in self.roles.list().await? {
            let name = match RoleName::parse(&raw) {
                Ok(name) => name,
                Err(e) => {
                    tracing::error!(
                        name = %raw,
                        error = %e,
                        "skipping stored role with invalid name"
                    );
                    continue;
                }
            };
            let role = self.roles.get(&name).await?;
            let path = name.storage_key();
            if self
                .register(STATIC_ROTATION_JOB_NAME, &path, &role.rotation)
                .await
            {
                registered.push(path);
            }
        }

        tracing::info!(jobs = registered.len(), "registered stored rotation jobs");
        Ok(registered)
    }

    /// Register an active record; `false` when inactive or rejected
    async fn register(&self, job: &str, path: &str, params: &RotationParams) -> bool {
        if !params.is_active() {
            return false;
        }
        match self.gateway.register(job, path, params).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(path, error = %e, "skipping stored rotation job");
                false
            }
        }
    }

    /// Push a parameter transition to the scheduler; failures become an
    /// error response since the record is already stored
    async fn sync_rotation(
        &self,
        job: &str,
        path: &str,
        previous: &RotationParams,
        next: &RotationParams,
    ) -> Option<Response> {
        match self.gateway.sync(job, path, previous, next).await {
            Ok(_) => None,
            Err(e) => {
                tracing::error!(path, error = %e, "rotation job sync failed after write");
                Some(Response::error(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl SecretsBackend for Backend {
    async fn on_config_write(&self, update: ConfigUpdate) -> BackendResult<Option<Response>> {
        let previous = self.config.get().await?;
        let mut next = previous.clone();
        update.apply_to(&mut next)?;

        self.config.put(&next).await?;
        tracing::info!(path = PATH_CONFIG, "root credential written");

        Ok(self
            .sync_rotation(
                ROOT_ROTATION_JOB_NAME,
                PATH_CONFIG,
                &previous.rotation,
                &next.rotation,
            )
            .await)
    }

    async fn on_config_read(&self) -> BackendResult<Response> {
        let root = self.config.get().await?;
        Ok(Response::with_data(root.to_response_data()))
    }

    async fn on_config_exists(&self) -> BackendResult<bool> {
        self.config.exists().await
    }

    async fn on_role_write(
        &self,
        name: &str,
        update: RoleUpdate,
    ) -> BackendResult<Option<Response>> {
        let name = RoleName::parse(name)?;
        let previous = self.roles.get(&name).await?;
        let mut next = previous.clone();
        update.apply_to(&mut next)?;

        self.roles.put(&name, &next).await?;
        tracing::info!(name = %name, "static role written");

        Ok(self
            .sync_rotation(
                STATIC_ROTATION_JOB_NAME,
                &name.storage_key(),
                &previous.rotation,
                &next.rotation,
            )
            .await)
    }

    async fn on_role_read(&self, name: &str) -> BackendResult<Response> {
        let name = RoleName::parse(name)?;
        let role = self.roles.get(&name).await?;
        Ok(Response::with_data(role.to_response_data()))
    }

    async fn on_role_list(&self) -> BackendResult<Response> {
        let names = self.roles.list().await?;
        let mut data = Map::new();
        data.insert(
            "keys".into(),
            Value::Array(names.into_iter().map(Value::from).collect()),
        );
        Ok(Response::with_data(data))
    }

    async fn on_cred_read(&self, name: &str) -> BackendResult<Response> {
        let name = RoleName::parse(name)?;
        tracing::debug!(name = %name, "looking up static credential");
        let role = self.roles.get(&name).await?;

        let mut data = Map::new();
        data.insert("username".into(), Value::from(role.username.clone()));
        data.insert("password".into(), Value::from(role.password.clone()));

        if role.rotation.has_rotation_params() {
            // Disabled or window-only roles carry parameters but no job.
            match self.gateway.next_rotation(&name.storage_key()).await {
                Ok(expires) => {
                    let ttl = (expires - Utc::now()).num_seconds();
                    data.insert("ttl".into(), Value::from(ttl));
                    data.insert(
                        "expire_time".into(),
                        Value::from(expires.format(EXPIRE_TIME_FORMAT).to_string()),
                    );
                }
                Err(SchedulerError::JobNotFound { .. }) if !role.rotation.is_active() => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Response::with_data(data))
    }

    async fn on_rotate(&self, req_path: &str) -> BackendResult<()> {
        self.engine.rotate(req_path).await?;
        Ok(())
    }

    async fn on_initialize(&self) -> BackendResult<()> {
        self.counter.initialize().await?;
        Ok(())
    }
}

#[async_trait]
impl RotationHandler for Backend {
    async fn handle_rotation(&self, req_path: &str) -> BackendResult<()> {
        self.on_rotate(req_path).await
    }
}

/// Builder for [`Backend`]
///
/// Storage and scheduler are required. Without an explicit applier the
/// backend waits `settings.rotation_wait` in place of a downstream call.
#[derive(Default)]
pub struct BackendBuilder {
    storage: Option<Arc<dyn Storage>>,
    scheduler: Option<Arc<dyn RotationScheduler>>,
    applier: Option<Arc<dyn CredentialApplier>>,
    settings: BackendSettings,
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn RotationScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Replace the downstream password applier
    pub fn applier(mut self, applier: Arc<dyn CredentialApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    pub fn settings(mut self, settings: BackendSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate settings and assemble the backend
    pub fn build(self) -> BackendResult<Backend> {
        self.settings.validate()?;
        let storage = self
            .storage
            .ok_or(BackendError::MissingComponent("storage"))?;
        let scheduler = self
            .scheduler
            .ok_or(BackendError::MissingComponent("scheduler"))?;
        let applier: Arc<dyn CredentialApplier> = match self.applier {
            Some(applier) => applier,
            None => Arc::new(DelayedApplier::new(self.settings.rotation_wait)),
        };

        let config = ConfigStore::new(storage.clone());
        let roles = StaticRoleStore::new(storage.clone());

        Ok(Backend {
            gateway: RotationGateway::new(scheduler, self.settings.mount_point.clone()),
            engine: RotationEngine::new(config.clone(), roles.clone(), applier),
            counter: InitializationCounter::new(storage, config.clone()),
            config,
            roles,
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::InMemoryScheduler;
    use chrono::TimeZone;
    use testing_secrets_storage::MemoryStorage;

    #[test]
    fn builder_requires_storage() {
        let err = Backend::builder()
            .scheduler(Arc::new(InMemoryScheduler::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingComponent("storage")));
    }

    #[test]
    fn builder_requires_scheduler() {
        let err = Backend::builder()
            .storage(Arc::new(MemoryStorage::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingComponent("scheduler")));
    }

    #[test]
    fn builder_validates_settings() {
        let err = Backend::builder()
            .storage(Arc::new(MemoryStorage::new()))
            .scheduler(Arc::new(InMemoryScheduler::new()))
            .settings(BackendSettings {
                mount_point: String::new(),
                ..BackendSettings::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidField { .. }));
    }

    #[test]
    fn version_and_help() {
        let backend = Backend::builder()
            .storage(Arc::new(MemoryStorage::new()))
            .scheduler(Arc::new(InMemoryScheduler::new()))
            .build()
            .unwrap();
        assert_eq!(backend.version(), "v0.0.1");
        assert!(!backend.help().is_empty());
    }

    #[test]
    fn expire_time_uses_ansi_c_layout() {
        let t = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(t.format(EXPIRE_TIME_FORMAT).to_string(), "Mon Jan  2 15:04:05 2006");
    }
}
