//! Static roles and their store
//!
//! Roles live under `static-role/<name>`. Names may contain `/`, so a role
//! named `team/db1` is stored at `static-role/team/db1` and listing walks
//! nested prefixes.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use testing_secrets_storage::{Storage, get_json, put_json};

use crate::consts::{PATH_STATIC_ROLE, static_role_path};
use crate::error::{BackendError, BackendResult};
use crate::rotation::{RotationParams, RotationParamsUpdate};

// ASCII word characters only
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^\w(([\w\-./]+)?\w)?$")
        .unicode(false)
        .build()
        .expect("role name pattern is valid")
});

/// Validated, lower-cased role name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleName(String);

impl RoleName {
    /// Validate `raw` and lower-case it
    ///
    /// Empty input is [`BackendError::MissingName`]; anything outside word
    /// characters, `-`, `.` and `/` (or not starting and ending with a word
    /// character) is [`BackendError::InvalidName`].
    pub fn parse(raw: &str) -> BackendResult<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(BackendError::MissingName);
        }
        if !NAME_RE.is_match(&name) {
            return Err(BackendError::InvalidName {
                name: raw.to_string(),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key and trigger path of the role
    pub fn storage_key(&self) -> String {
        static_role_path(&self.0)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A named credential with its own rotation parameters
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticRole {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub rotation: RotationParams,
}

impl fmt::Debug for StaticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticRole")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("rotation", &self.rotation)
            .finish()
    }
}

impl StaticRole {
    /// Response body of a role read
    pub fn to_response_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("username".into(), Value::from(self.username.clone()));
        data.insert("password".into(), Value::from(self.password.clone()));
        self.rotation.populate(&mut data);
        data
    }
}

/// Partial write of a static role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(flatten)]
    pub rotation: RotationParamsUpdate,
}

impl RoleUpdate {
    /// Apply the present fields to `role`; on error `role` is untouched
    pub fn apply_to(&self, role: &mut StaticRole) -> BackendResult<()> {
        role.rotation.apply(&self.rotation)?;

        if let Some(username) = &self.username {
            role.username = username.clone();
        }
        if let Some(password) = &self.password {
            role.password = password.clone();
        }
        Ok(())
    }
}

/// Reads and writes static roles under [`PATH_STATIC_ROLE`]
#[derive(Clone)]
pub struct StaticRoleStore {
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for StaticRoleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticRoleStore").finish_non_exhaustive()
    }
}

impl StaticRoleStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Stored role, or the zero-value default for a name never written
    pub async fn get(&self, name: &RoleName) -> BackendResult<StaticRole> {
        let role = get_json(self.storage.as_ref(), &name.storage_key()).await?;
        Ok(role.unwrap_or_default())
    }

    /// Replace the stored role
    pub async fn put(&self, name: &RoleName, role: &StaticRole) -> BackendResult<()> {
        put_json(self.storage.as_ref(), &name.storage_key(), role).await?;
        Ok(())
    }

    /// Names of every stored role, sorted
    pub async fn list(&self) -> BackendResult<Vec<String>> {
        let mut names = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(sub) = pending.pop() {
            let prefix = format!("{PATH_STATIC_ROLE}/{sub}");
            for child in self.storage.list(&prefix).await? {
                match child.strip_suffix('/') {
                    Some(dir) => pending.push(format!("{sub}{dir}/")),
                    None => names.push(format!("{sub}{child}")),
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use testing_secrets_storage::MemoryStorage;

    fn store() -> StaticRoleStore {
        StaticRoleStore::new(Arc::new(MemoryStorage::new()))
    }

    fn name(raw: &str) -> RoleName {
        RoleName::parse(raw).unwrap()
    }

    #[rstest]
    #[case("db1")]
    #[case("a")]
    #[case("team/db-1")]
    #[case("svc.prod")]
    #[case("under_score")]
    fn accepts_valid_names(#[case] raw: &str) {
        assert_eq!(RoleName::parse(raw).unwrap().as_str(), raw);
    }

    #[rstest]
    #[case("-db")]
    #[case("db/")]
    #[case("has space")]
    #[case("semi;colon")]
    #[case("caf\u{e9}")]
    fn rejects_invalid_names(#[case] raw: &str) {
        assert!(matches!(
            RoleName::parse(raw),
            Err(BackendError::InvalidName { .. })
        ));
    }

    #[test]
    fn empty_name_is_missing() {
        assert!(matches!(RoleName::parse(""), Err(BackendError::MissingName)));
        assert!(matches!(RoleName::parse("  "), Err(BackendError::MissingName)));
    }

    #[test]
    fn names_are_lower_cased() {
        assert_eq!(name("DB1").as_str(), "db1");
        assert_eq!(name("DB1").storage_key(), "static-role/db1");
    }

    #[tokio::test]
    async fn absent_role_reads_as_default() {
        let store = store();
        assert_eq!(store.get(&name("ghost")).await.unwrap(), StaticRole::default());
    }

    #[tokio::test]
    async fn roles_are_independent() {
        let store = store();
        let alice = StaticRole {
            username: "alice".into(),
            password: "a".into(),
            ..StaticRole::default()
        };
        store.put(&name("alice"), &alice).await.unwrap();

        assert_eq!(store.get(&name("alice")).await.unwrap(), alice);
        assert_eq!(store.get(&name("bob")).await.unwrap(), StaticRole::default());
    }

    #[tokio::test]
    async fn list_includes_nested_names() {
        let store = store();
        for raw in ["db1", "team/db2", "team/inner/db3", "app"] {
            store.put(&name(raw), &StaticRole::default()).await.unwrap();
        }

        assert_eq!(
            store.list().await.unwrap(),
            vec!["app", "db1", "team/db2", "team/inner/db3"]
        );
    }

    #[tokio::test]
    async fn list_of_empty_store_is_empty() {
        assert!(store().list().await.unwrap().is_empty());
    }

    #[test]
    fn update_preserves_unset_fields() {
        let mut role = StaticRole {
            username: "svc".into(),
            password: "p0".into(),
            ..StaticRole::default()
        };
        let update = RoleUpdate {
            password: Some("p1".into()),
            ..RoleUpdate::default()
        };

        update.apply_to(&mut role).unwrap();

        assert_eq!(role.username, "svc");
        assert_eq!(role.password, "p1");
    }
}
