//! Root credential record and its store

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use testing_secrets_storage::{Storage, get_json, put_json};

use crate::consts::PATH_CONFIG;
use crate::error::BackendResult;
use crate::rotation::{RotationParams, RotationParamsUpdate};

/// The backend's single primary credential
///
/// A backend that never had its config written behaves as if this record
/// held all zero values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootCredential {
    /// Free-text annotation
    pub message: String,
    pub username: String,
    pub password: String,
    /// Initialization failure threshold; `0` disables the check
    pub low_check: i64,
    /// Reserved
    pub high_check: i64,
    #[serde(flatten)]
    pub rotation: RotationParams,
}

impl fmt::Debug for RootCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCredential")
            .field("message", &self.message)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("low_check", &self.low_check)
            .field("high_check", &self.high_check)
            .field("rotation", &self.rotation)
            .finish()
    }
}

impl RootCredential {
    /// Response body of a config read
    pub fn to_response_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("message".into(), Value::from(self.message.clone()));
        data.insert("low_check".into(), Value::from(self.low_check));
        data.insert("high_check".into(), Value::from(self.high_check));
        data.insert("username".into(), Value::from(self.username.clone()));
        data.insert("password".into(), Value::from(self.password.clone()));
        self.rotation.populate(&mut data);
        data
    }
}

/// Partial write of the root credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_check: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_check: Option<i64>,
    #[serde(flatten)]
    pub rotation: RotationParamsUpdate,
}

impl ConfigUpdate {
    /// Apply the present fields to `record`
    ///
    /// Rotation fields are validated first; on error `record` is untouched.
    pub fn apply_to(&self, record: &mut RootCredential) -> BackendResult<()> {
        record.rotation.apply(&self.rotation)?;

        if let Some(message) = &self.message {
            record.message = message.clone();
        }
        if let Some(username) = &self.username {
            record.username = username.clone();
        }
        if let Some(password) = &self.password {
            record.password = password.clone();
        }
        if let Some(low_check) = self.low_check {
            record.low_check = low_check;
        }
        if let Some(high_check) = self.high_check {
            record.high_check = high_check;
        }
        Ok(())
    }
}

/// Reads and writes the root credential under [`PATH_CONFIG`]
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Current record, or the zero-value default when none was written
    pub async fn get(&self) -> BackendResult<RootCredential> {
        let record = get_json(self.storage.as_ref(), PATH_CONFIG).await?;
        Ok(record.unwrap_or_default())
    }

    /// Replace the stored record
    pub async fn put(&self, record: &RootCredential) -> BackendResult<()> {
        put_json(self.storage.as_ref(), PATH_CONFIG, record).await?;
        Ok(())
    }

    /// A config entry has been written
    pub async fn exists(&self) -> BackendResult<bool> {
        Ok(self.storage.get(PATH_CONFIG).await?.is_some())
    }
}
