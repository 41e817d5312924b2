//! Backend settings for the CLI host
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `TESTING_SECRETS_MOUNT_POINT`, `TESTING_SECRETS_ROTATION_WAIT` and
//! `TESTING_SECRETS_RUNNING_VERSION`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use testing_secrets_backend::BackendSettings;

const ENV_PREFIX: &str = "TESTING_SECRETS_";
const ENV_KEYS: [&str; 3] = ["mount_point", "rotation_wait", "running_version"];

pub fn figment(file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(BackendSettings::default()));
    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).only(&ENV_KEYS))
}

/// Load and validate settings; an explicitly named file must exist
pub fn load(file: Option<&Path>) -> Result<BackendSettings> {
    if let Some(file) = file {
        if !file.is_file() {
            bail!("settings file {} does not exist", file.display());
        }
    }

    let settings: BackendSettings = figment(file)
        .extract()
        .context("failed to load backend settings")?;
    settings.validate().context("invalid backend settings")?;
    Ok(settings)
}
