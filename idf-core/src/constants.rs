//! Constants and configuration values for idracfan
//!
//! Centralizes all tuning values and ipmitool command bytes.
//! Tuning is compiled in; `ControlConfig::default()` is built from here.

use std::time::Duration;

/// PID tuning
pub mod pid {
    /// Target CPU-over-ambient temperature delta in degrees
    pub const TARGET_DELTA: i32 = 50;

    /// Proportional gain
    pub const KP: f64 = 2.0;

    /// Integral gain
    pub const KI: f64 = 0.01;

    /// Derivative gain
    pub const KD: f64 = 5.0;

    /// Ceiling of the integral term's contribution (percent)
    pub const INTEGRAL_MAX: f64 = 50.0;

    /// Integral contribution at process start (percent)
    pub const INITIAL_INTEGRAL: f64 = 10.0;
}

/// Duty cycle bounds
pub mod duty {
    pub const MIN_PERCENT: u8 = 0;
    pub const MAX_PERCENT: u8 = 100;
}

/// Firmware handoff
pub mod handoff {
    /// CPU temperature above which control is handed back to firmware
    pub const CPU_CEILING: i32 = 90;
}

/// Loop timing
pub mod timing {
    use super::Duration;

    /// Sleep between control cycles
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Upper bound on a single ipmitool invocation
    pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

    /// How often a running child is polled for exit while waiting
    pub const CHILD_POLL: Duration = Duration::from_millis(20);

    /// Consecutive skipped cycles before the skip is logged at warn level again
    pub const SKIP_WARN_EVERY: u32 = 30;
}

/// ipmitool invocation
pub mod ipmi {
    /// Binary name searched in PATH
    pub const TOOL: &str = "ipmitool";

    /// OEM raw prefix for Dell fan control (netfn 0x30, cmd 0x30)
    pub const RAW_PREFIX: [&str; 3] = ["raw", "0x30", "0x30"];

    /// Sub-command selecting manual/automatic mode
    pub const MODE_SELECT: &str = "0x01";

    /// Mode byte: firmware (automatic) control
    pub const MODE_FIRMWARE: &str = "0x01";

    /// Mode byte: manual control
    pub const MODE_MANUAL: &str = "0x00";

    /// Sub-command setting a duty cycle
    pub const SET_DUTY: &str = "0x02";

    /// Target selector: all fans
    pub const ALL_FANS: &str = "0xff";
}

/// Sensor table parsing
pub mod sensors {
    /// Field index (0-based) holding the reading or status
    pub const VALUE_FIELD: usize = 4;

    /// Label substring identifying the inlet (ambient) sensor
    pub const INLET_LABEL: &str = "Inlet";

    /// Regex identifying fan speed rows
    pub const FAN_PATTERN: &str = r"(?i)^fan\s*\d+";

    /// First token of an unreadable value ("No Reading")
    pub const UNREADABLE_TOKEN: &str = "No";

    /// Plausible temperature range; IPMI readings are a single byte
    pub const TEMP_MIN: f64 = -128.0;
    pub const TEMP_MAX: f64 = 255.0;
}
