//! idracfan Core Library
//!
//! Closed-loop PID fan control for server chassis through IPMI.
//!
//! # Features
//!
//! - **Sensor Reading**: Parses `ipmitool sdr` temperature and fan tables, rejecting
//!   any cycle with unreadable data
//! - **PID Control**: Clamped integral and hold-time derivative over quantized readings
//! - **Firmware Handoff**: Returns control to the BMC above a hard CPU ceiling
//! - **Safe Exit**: [`FirmwareGuard`] releases control to firmware on every exit path
//!
//! # Module Structure
//!
//! - `hw/` - ipmitool invocation, sensor parsing, fan actuation
//! - `data/` - Sensor data types and configuration
//! - `engine/` - PID law and handoff state machine
//! - `control` - The per-cycle orchestration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use idf_core::{ControlConfig, ControlLoop, IpmiTool};
//!
//! let config = ControlConfig::default();
//! let tool = Arc::new(IpmiTool::new(&config.ipmitool, config.command_timeout));
//! let mut control = ControlLoop::new(tool, &config, Instant::now()).unwrap();
//! let _guard = control.start();
//! let outcome = control.run_cycle(Instant::now());
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod control;
pub mod error;

pub use data::{
    ControlConfig, FanSample, InvalidReason, SensorCategory, SensorReading, SensorStatus,
    TemperatureSample, Temperatures,
};

pub use engine::{
    clamp_duty, claim_unconditionally, ControllerState, DerivativeTracker, HandoffMachine,
    HandoffState, PidController, PidOutput, PidTuning, Transition,
};

pub use hw::{
    classify_value, locate_tool, locate_tool_in, parse_fan_table, parse_temperature_table,
    FanActuator, IpmiCommand, IpmiExecutor, IpmiTool, SensorReader,
};

pub use control::{ControlLoop, CycleOutcome, CycleReport, FirmwareGuard};

pub use error::{IdracfanError, Result};
