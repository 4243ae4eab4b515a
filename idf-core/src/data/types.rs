//! Core data types for idracfan
//!
//! Everything here is ephemeral: built fresh from one sensor table and
//! dropped at the end of the cycle.

use serde::Serialize;
use std::fmt;

/// What a sensor row measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorCategory {
    Ambient,
    Cpu,
    Fan,
}

/// Reading or status parsed from the value column of a row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Value(f64),
    /// Sensor absent or switched off; excluded from averages
    Disabled,
    /// Sensor present but returned no usable reading; invalidates the sample
    Unreadable,
}

impl SensorStatus {
    pub fn value(&self) -> Option<f64> {
        match self {
            SensorStatus::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// One parsed row of an ipmitool sensor table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub label: String,
    pub category: SensorCategory,
    pub status: SensorStatus,
}

/// Why a cycle's sensor data was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    /// The table had no sensor rows at all
    NoData,
    /// A row reported "No Reading"
    Unreadable { sensor: String },
    /// A row could not be split into enough fields
    Malformed { line: String },
    MissingAmbient,
    MissingCpu,
    NoEnabledFans,
    /// The ipmitool invocation itself failed or timed out
    Command(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::NoData => write!(f, "sensor table is empty"),
            InvalidReason::Unreadable { sensor } => write!(f, "sensor '{}' is unreadable", sensor),
            InvalidReason::Malformed { line } => write!(f, "malformed sensor row '{}'", line),
            InvalidReason::MissingAmbient => write!(f, "no valid ambient (inlet) sensor"),
            InvalidReason::MissingCpu => write!(f, "no valid CPU temperature sensor"),
            InvalidReason::NoEnabledFans => write!(f, "no enabled fan sensors"),
            InvalidReason::Command(e) => write!(f, "ipmitool failed: {}", e),
        }
    }
}

/// Averaged temperatures of one cycle, truncated to whole degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Temperatures {
    pub ambient_avg: i32,
    pub cpu_avg: i32,
}

impl Temperatures {
    /// CPU temperature above ambient
    pub fn delta(&self) -> i32 {
        self.cpu_avg.saturating_sub(self.ambient_avg)
    }
}

/// Result of one temperature table read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemperatureSample {
    Valid(Temperatures),
    Invalid(InvalidReason),
}

impl TemperatureSample {
    pub fn is_valid(&self) -> bool {
        matches!(self, TemperatureSample::Valid(_))
    }

    pub fn temperatures(&self) -> Option<Temperatures> {
        match self {
            TemperatureSample::Valid(t) => Some(*t),
            TemperatureSample::Invalid(_) => None,
        }
    }
}

/// Result of one fan table read
#[derive(Debug, Clone, PartialEq)]
pub enum FanSample {
    Valid { average_rpm: f64, fans: usize },
    Invalid(InvalidReason),
}

impl FanSample {
    pub fn average_rpm(&self) -> Option<f64> {
        match self {
            FanSample::Valid { average_rpm, .. } => Some(*average_rpm),
            FanSample::Invalid(_) => None,
        }
    }
}
