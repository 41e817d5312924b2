//! Config and static-role stores

mod config;
mod role;

pub use config::{ConfigStore, ConfigUpdate, RootCredential};
pub use role::{RoleName, RoleUpdate, StaticRole, StaticRoleStore};
