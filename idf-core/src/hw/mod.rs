//! Hardware interaction modules
//!
//! Everything that talks to the BMC through ipmitool.

mod actuator;
mod ipmi;
mod sensors;

pub use actuator::FanActuator;
pub use ipmi::{locate_tool, locate_tool_in, IpmiCommand, IpmiExecutor, IpmiTool};
pub use sensors::{classify_value, parse_fan_table, parse_temperature_table, SensorReader};

#[cfg(test)]
pub use ipmi::MockIpmiExecutor;
