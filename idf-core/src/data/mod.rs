//! Data types and configuration
//!
//! Per-cycle sensor values and the compiled-in control configuration.

mod config;
mod types;

pub use config::ControlConfig;
pub use types::{
    FanSample, InvalidReason, SensorCategory, SensorReading, SensorStatus, TemperatureSample,
    Temperatures,
};
