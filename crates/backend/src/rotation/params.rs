//! Automated-rotation parameters shared by the root credential and static roles
//!
//! A record's parameters are *active* when automated rotation is not disabled
//! and either a schedule or a period is set. Whether a write has to talk to the
//! scheduler is derived by comparing the parameters stored before the write
//! with the ones stored after it; see [`RotationTransition`].

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BackendError, BackendResult};

/// Schedule descriptor embedded in [`RootCredential`](crate::RootCredential)
/// and [`StaticRole`](crate::StaticRole)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationParams {
    /// Cron expression; empty when unset
    pub rotation_schedule: String,

    /// How long a scheduled attempt stays valid
    #[serde(with = "humantime_serde")]
    pub rotation_window: Duration,

    /// Fixed-interval alternative to `rotation_schedule`
    #[serde(with = "humantime_serde")]
    pub rotation_period: Duration,

    /// Explicit opt-out
    pub disable_automated_rotation: bool,
}

/// Scheduler call a write requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTransition {
    /// Register (or re-register with new timing)
    Register,
    /// Remove the scheduler's interest in the record
    Deregister,
    /// No scheduler call
    Unchanged,
}

impl RotationParams {
    /// Any rotation field carries a value
    pub fn has_rotation_params(&self) -> bool {
        !self.rotation_schedule.is_empty()
            || !self.rotation_window.is_zero()
            || !self.rotation_period.is_zero()
    }

    /// Automated rotation is enabled and has a schedule or period to run on
    pub fn is_active(&self) -> bool {
        !self.disable_automated_rotation
            && (!self.rotation_schedule.is_empty() || !self.rotation_period.is_zero())
    }

    /// Active now and either inactive before or timed differently
    pub fn should_register(&self, previous: &Self) -> bool {
        self.is_active() && (!previous.is_active() || !self.same_timing(previous))
    }

    /// Active before and no longer active
    pub fn should_deregister(&self, previous: &Self) -> bool {
        previous.is_active() && !self.is_active()
    }

    /// Scheduler call needed to move from `previous` to `self`
    pub fn transition_from(&self, previous: &Self) -> RotationTransition {
        if self.should_deregister(previous) {
            RotationTransition::Deregister
        } else if self.should_register(previous) {
            RotationTransition::Register
        } else {
            RotationTransition::Unchanged
        }
    }

    /// Apply the fields present in `update`, leaving the others untouched
    ///
    /// A non-empty schedule must parse as a cron expression; on error nothing
    /// is changed.
    pub fn apply(&mut self, update: &RotationParamsUpdate) -> BackendResult<()> {
        if let Some(schedule) = &update.rotation_schedule {
            if !schedule.trim().is_empty() {
                parse_schedule(schedule).map_err(|reason| BackendError::InvalidField {
                    field: "rotation_schedule",
                    reason,
                })?;
            }
        }

        if let Some(schedule) = &update.rotation_schedule {
            self.rotation_schedule = schedule.trim().to_string();
        }
        if let Some(window) = update.rotation_window {
            self.rotation_window = window.0;
        }
        if let Some(period) = update.rotation_period {
            self.rotation_period = period.0;
        }
        if let Some(disable) = update.disable_automated_rotation {
            self.disable_automated_rotation = disable;
        }
        Ok(())
    }

    /// Write the rotation fields into a response body (durations as seconds)
    pub fn populate(&self, data: &mut Map<String, Value>) {
        data.insert(
            "rotation_schedule".into(),
            Value::from(self.rotation_schedule.clone()),
        );
        data.insert(
            "rotation_window".into(),
            Value::from(self.rotation_window.as_secs()),
        );
        data.insert(
            "rotation_period".into(),
            Value::from(self.rotation_period.as_secs()),
        );
        data.insert(
            "disable_automated_rotation".into(),
            Value::from(self.disable_automated_rotation),
        );
    }

    fn same_timing(&self, other: &Self) -> bool {
        self.rotation_schedule == other.rotation_schedule
            && self.rotation_window == other.rotation_window
            && self.rotation_period == other.rotation_period
    }
}

/// Partial update of [`RotationParams`]; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationParamsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_window: Option<DurationInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_period: Option<DurationInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_automated_rotation: Option<bool>,
}

/// Duration accepted on writes: integer seconds or a humantime string (`"1h"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDuration", into = "u64")]
pub struct DurationInput(pub Duration);

impl DurationInput {
    /// Whole seconds
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }
}

impl From<Duration> for DurationInput {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<DurationInput> for u64 {
    fn from(input: DurationInput) -> Self {
        input.0.as_secs()
    }
}

impl FromStr for DurationInput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Self::from_secs(secs));
        }
        humantime::parse_duration(s)
            .map(Self)
            .map_err(|e| format!("invalid duration '{s}': {e}"))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl TryFrom<RawDuration> for DurationInput {
    type Error = String;

    fn try_from(raw: RawDuration) -> Result<Self, Self::Error> {
        match raw {
            RawDuration::Seconds(secs) => Ok(Self::from_secs(secs)),
            RawDuration::Text(text) => text.parse(),
        }
    }
}

/// Parse a cron expression that still has an occurrence ahead of now
///
/// Standard five-field expressions get a leading seconds field of `0`; six
/// and seven-field expressions are taken as-is.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule, String> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    let schedule = cron::Schedule::from_str(&normalized)
        .map_err(|e| format!("invalid schedule '{expr}': {e}"))?;
    if schedule.upcoming(Utc).next().is_none() {
        return Err(format!("schedule '{expr}' has no future occurrence"));
    }
    Ok(schedule)
}
