//! Shared harness for backend integration tests
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use testing_secrets_backend::{
    Backend, ConfigUpdate, InMemoryScheduler, Response, RoleUpdate, RotationParamsUpdate,
};
use testing_secrets_storage::{FaultyStorage, MemoryStorage};

/// Backend over fault-injectable in-memory storage and an in-memory scheduler
pub struct Harness {
    pub storage: Arc<FaultyStorage<MemoryStorage>>,
    pub scheduler: Arc<InMemoryScheduler>,
    pub backend: Backend,
}

impl Harness {
    pub fn new() -> Self {
        let storage = Arc::new(FaultyStorage::new(MemoryStorage::new()));
        let scheduler = Arc::new(InMemoryScheduler::new());
        let backend = Backend::builder()
            .storage(storage.clone())
            .scheduler(scheduler.clone())
            .build()
            .unwrap();
        Self {
            storage,
            scheduler,
            backend,
        }
    }

    /// Raw stored bytes of `key`
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.inner().raw(key)
    }
}

pub fn role(username: &str, password: &str) -> RoleUpdate {
    RoleUpdate {
        username: Some(username.into()),
        password: Some(password.into()),
        ..RoleUpdate::default()
    }
}

pub fn periodic(secs: u64) -> RotationParamsUpdate {
    serde_json::from_value(serde_json::json!({ "rotation_period": secs })).unwrap()
}

pub fn low_check(value: i64) -> ConfigUpdate {
    ConfigUpdate {
        low_check: Some(value),
        ..ConfigUpdate::default()
    }
}

pub fn field<'a>(resp: &'a Response, key: &str) -> &'a Value {
    resp.get(key)
        .unwrap_or_else(|| panic!("response has no '{key}' field: {resp:?}"))
}
