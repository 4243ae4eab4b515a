//! Control configuration
//!
//! All values default to the compiled-in constants. Binaries may override
//! individual fields from the command line, then call `validate()`.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{handoff, ipmi, sensors, timing};
use crate::engine::PidTuning;
use crate::error::{IdracfanError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlConfig {
    pub tuning: PidTuning,
    /// CPU temperature above which firmware takes over
    pub cpu_ceiling: i32,
    #[serde(serialize_with = "serialize_ms")]
    pub poll_interval: Duration,
    #[serde(serialize_with = "serialize_ms")]
    pub command_timeout: Duration,
    /// ipmitool binary name or absolute path
    pub ipmitool: PathBuf,
    pub inlet_label: String,
    pub fan_pattern: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tuning: PidTuning::default(),
            cpu_ceiling: handoff::CPU_CEILING,
            poll_interval: timing::POLL_INTERVAL,
            command_timeout: timing::COMMAND_TIMEOUT,
            ipmitool: PathBuf::from(ipmi::TOOL),
            inlet_label: sensors::INLET_LABEL.to_string(),
            fan_pattern: sensors::FAN_PATTERN.to_string(),
        }
    }
}

impl ControlConfig {
    /// Reject values that would make the loop unsafe or meaningless
    pub fn validate(&self) -> Result<()> {
        let t = &self.tuning;
        for (name, value) in [("kp", t.kp), ("ki", t.ki), ("kd", t.kd)] {
            if !value.is_finite() || value < 0.0 {
                return Err(IdracfanError::config(format!("{} must be a finite, non-negative gain (got {})", name, value)));
            }
        }
        if t.ki == 0.0 {
            return Err(IdracfanError::config("ki must be non-zero"));
        }
        if !(t.integral_max > 0.0 && t.integral_max <= 100.0) {
            return Err(IdracfanError::config(format!("integral_max must be in (0, 100] (got {})", t.integral_max)));
        }
        if !(0.0..=t.integral_max).contains(&t.initial_integral) {
            return Err(IdracfanError::config("initial_integral must be within [0, integral_max]"));
        }
        if self.poll_interval.is_zero() {
            return Err(IdracfanError::config("poll interval must be greater than zero"));
        }
        if self.command_timeout.is_zero() {
            return Err(IdracfanError::config("command timeout must be greater than zero"));
        }
        if self.inlet_label.is_empty() {
            return Err(IdracfanError::config("inlet label must not be empty"));
        }
        regex::Regex::new(&self.fan_pattern)
            .map_err(|e| IdracfanError::config(format!("invalid fan pattern: {}", e)))?;
        Ok(())
    }
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
