//! Sensor table reading and parsing
//!
//! `ipmitool sdr type ...` prints one sensor per line with pipe-delimited
//! fields. Field 4 holds the reading or a status:
//!
//! ```text
//! Inlet Temp       | 04h | ok  |  7.1 | 23 degrees C
//! Temp             | 0Eh | ok  |  3.1 | 45 degrees C
//! Temp             | 0Fh | ns  |  3.2 | Disabled
//! Temp             | 0Fh | ns  |  3.2 | No Reading
//! Fan1 RPM         | 30h | ok  |  7.1 | 3600 RPM
//! Fan Redundancy   | 75h | ok  |  7.1 | Fully Redundant
//! ```
//!
//! A disabled sensor is dropped from the average. An unreadable or malformed
//! row invalidates the whole sample: skipping a cycle is better than acting
//! on partial data. A temperature outside the one-byte IPMI range counts as
//! malformed.

use regex::Regex;
use tracing::debug;

use crate::constants::sensors as sensor_const;
use crate::data::{
    ControlConfig, FanSample, InvalidReason, SensorCategory, SensorReading, SensorStatus,
    TemperatureSample, Temperatures,
};
use crate::error::{IdracfanError, Result};
use crate::hw::{IpmiCommand, IpmiExecutor};

/// Classify the value column of a sensor row
pub fn classify_value(field: &str) -> SensorStatus {
    let token = field.split_whitespace().next().unwrap_or("");
    if token == sensor_const::UNREADABLE_TOKEN || token.is_empty() {
        return SensorStatus::Unreadable;
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => SensorStatus::Value(v),
        _ => SensorStatus::Disabled,
    }
}

/// Split a row into its label and value column
fn split_row(line: &str) -> std::result::Result<(&str, &str), InvalidReason> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    match fields.get(sensor_const::VALUE_FIELD) {
        Some(value) if !value.is_empty() => Ok((fields[0], value)),
        _ => Err(InvalidReason::Malformed { line: line.trim().to_string() }),
    }
}

fn non_blank_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().filter(|l| !l.trim().is_empty())
}

/// Parse `sdr type temperature` output into averaged temperatures
///
/// Rows whose label contains `inlet_label` are ambient; all other rows
/// count toward the CPU average.
pub fn parse_temperature_table(output: &str, inlet_label: &str) -> TemperatureSample {
    let mut readings = Vec::new();

    for line in non_blank_lines(output) {
        let (label, value) = match split_row(line) {
            Ok(parts) => parts,
            Err(reason) => return TemperatureSample::Invalid(reason),
        };
        let category = if label.contains(inlet_label) {
            SensorCategory::Ambient
        } else {
            SensorCategory::Cpu
        };
        let reading = SensorReading {
            label: label.to_string(),
            category,
            status: classify_value(value),
        };
        match reading.status {
            SensorStatus::Unreadable => {
                return TemperatureSample::Invalid(InvalidReason::Unreadable { sensor: reading.label })
            }
            SensorStatus::Value(v) if !is_plausible_temperature(v) => {
                return TemperatureSample::Invalid(InvalidReason::Malformed { line: line.trim().to_string() })
            }
            _ => {}
        }
        readings.push(reading);
    }

    if readings.is_empty() {
        return TemperatureSample::Invalid(InvalidReason::NoData);
    }

    let Some(ambient_avg) = truncated_mean(&readings, SensorCategory::Ambient) else {
        return TemperatureSample::Invalid(InvalidReason::MissingAmbient);
    };
    let Some(cpu_avg) = truncated_mean(&readings, SensorCategory::Cpu) else {
        return TemperatureSample::Invalid(InvalidReason::MissingCpu);
    };

    TemperatureSample::Valid(Temperatures { ambient_avg, cpu_avg })
}

fn is_plausible_temperature(value: f64) -> bool {
    (sensor_const::TEMP_MIN..=sensor_const::TEMP_MAX).contains(&value)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn truncated_mean(readings: &[SensorReading], category: SensorCategory) -> Option<i32> {
    mean(
        readings
            .iter()
            .filter(|r| r.category == category)
            .filter_map(|r| r.status.value()),
    )
    .map(|avg| avg.trunc() as i32)
}

/// Parse `sdr type fan` output into the mean RPM of enabled fans
///
/// Rows whose label does not match `fan_pattern` (redundancy status and the
/// like) are ignored.
pub fn parse_fan_table(output: &str, fan_pattern: &Regex) -> FanSample {
    let mut readings = Vec::new();

    for line in non_blank_lines(output) {
        let label = line.split('|').next().unwrap_or("").trim();
        if !fan_pattern.is_match(label) {
            continue;
        }
        let (label, value) = match split_row(line) {
            Ok(parts) => parts,
            Err(reason) => return FanSample::Invalid(reason),
        };
        let reading = SensorReading {
            label: label.to_string(),
            category: SensorCategory::Fan,
            status: classify_value(value),
        };
        if reading.status == SensorStatus::Unreadable {
            return FanSample::Invalid(InvalidReason::Unreadable { sensor: reading.label });
        }
        readings.push(reading);
    }

    let rpms: Vec<f64> = readings.iter().filter_map(|r| r.status.value()).collect();
    match mean(rpms.iter().copied()) {
        Some(average_rpm) => FanSample::Valid { average_rpm, fans: rpms.len() },
        None => FanSample::Invalid(InvalidReason::NoEnabledFans),
    }
}

/// Queries and parses both sensor tables
#[derive(Debug, Clone)]
pub struct SensorReader {
    inlet_label: String,
    fan_pattern: Regex,
}

impl SensorReader {
    pub fn new(inlet_label: impl Into<String>, fan_pattern: &str) -> Result<Self> {
        let fan_pattern = Regex::new(fan_pattern)
            .map_err(|e| IdracfanError::config(format!("invalid fan pattern: {}", e)))?;
        Ok(Self {
            inlet_label: inlet_label.into(),
            fan_pattern,
        })
    }

    pub fn from_config(config: &ControlConfig) -> Result<Self> {
        Self::new(config.inlet_label.clone(), &config.fan_pattern)
    }

    pub fn read_temperatures(&self, executor: &dyn IpmiExecutor) -> TemperatureSample {
        let output = match executor.execute(&IpmiCommand::ReadTemperatures) {
            Ok(out) => out,
            Err(e) => return TemperatureSample::Invalid(InvalidReason::Command(e.to_string())),
        };
        let sample = parse_temperature_table(&output, &self.inlet_label);
        if !sample.is_valid() {
            debug!(table = %output, "Rejected temperature table");
        }
        sample
    }

    pub fn read_fan_speed(&self, executor: &dyn IpmiExecutor) -> FanSample {
        let output = match executor.execute(&IpmiCommand::ReadFans) {
            Ok(out) => out,
            Err(e) => return FanSample::Invalid(InvalidReason::Command(e.to_string())),
        };
        parse_fan_table(&output, &self.fan_pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::MockIpmiExecutor;

    const TEMPS: &str = "\
Inlet Temp       | 04h | ok  |  7.1 | 23 degrees C
Exhaust Temp     | 01h | ok  |  7.1 | 38 degrees C
Temp             | 0Eh | ok  |  3.1 | 61 degrees C
Temp             | 0Fh | ok  |  3.2 | 58 degrees C
";

    const FANS: &str = "\
Fan1 RPM         | 30h | ok  |  7.1 | 3600 RPM
Fan2 RPM         | 31h | ok  |  7.1 | 3480 RPM
Fan3 RPM         | 32h | ns  |  7.1 | Disabled
Fan Redundancy   | 75h | ok  |  7.1 | Fully Redundant
";

    fn fan_regex() -> Regex {
        Regex::new(sensor_const::FAN_PATTERN).unwrap()
    }

    fn reader() -> SensorReader {
        SensorReader::from_config(&ControlConfig::default()).unwrap()
    }

    #[test]
    fn test_classify_value() {
        assert_eq!(classify_value("23 degrees C"), SensorStatus::Value(23.0));
        assert_eq!(classify_value("3600 RPM"), SensorStatus::Value(3600.0));
        assert_eq!(classify_value("No Reading"), SensorStatus::Unreadable);
        assert_eq!(classify_value("Disabled"), SensorStatus::Disabled);
        assert_eq!(classify_value("Fully Redundant"), SensorStatus::Disabled);
        assert_eq!(classify_value(""), SensorStatus::Unreadable);
    }

    #[test]
    fn test_parse_temperatures() {
        // cpu = (38 + 61 + 58) / 3 = 52.33 -> 52
        let sample = parse_temperature_table(TEMPS, "Inlet");
        assert_eq!(
            sample,
            TemperatureSample::Valid(Temperatures { ambient_avg: 23, cpu_avg: 52 })
        );
    }

    #[test]
    fn test_disabled_sensor_excluded_from_average() {
        let table = "\
Inlet Temp | 04h | ok | 7.1 | 21 degrees C
Temp       | 0Eh | ok | 3.1 | 60 degrees C
Temp       | 0Fh | ns | 3.2 | Disabled
";
        let sample = parse_temperature_table(table, "Inlet");
        assert_eq!(sample.temperatures().unwrap().cpu_avg, 60);
    }

    #[test]
    fn test_unreadable_sensor_invalidates_sample() {
        let table = "\
Inlet Temp | 04h | ok | 7.1 | 21 degrees C
Temp       | 0Eh | ok | 3.1 | 60 degrees C
Temp       | 0Fh | ns | 3.2 | No Reading
";
        assert_eq!(
            parse_temperature_table(table, "Inlet"),
            TemperatureSample::Invalid(InvalidReason::Unreadable { sensor: "Temp".to_string() })
        );
    }

    #[test]
    fn test_unreadable_ambient_invalidates_sample() {
        let table = "\
Inlet Temp | 04h | ns | 7.1 | No Reading
Temp       | 0Eh | ok | 3.1 | 60 degrees C
";
        assert!(!parse_temperature_table(table, "Inlet").is_valid());
    }

    #[test]
    fn test_malformed_row_invalidates_sample() {
        let table = "\
Inlet Temp | 04h | ok | 7.1 | 21 degrees C
Temp | 0Eh | ok
";
        assert!(matches!(
            parse_temperature_table(table, "Inlet"),
            TemperatureSample::Invalid(InvalidReason::Malformed { .. })
        ));
    }

    #[test]
    fn test_out_of_range_temperature_invalidates_sample() {
        let table = "\
Inlet Temp | 04h | ok | 7.1 | -3000000000 degrees C
Temp       | 0Eh | ok | 3.1 | 60 degrees C
";
        assert!(matches!(
            parse_temperature_table(table, "Inlet"),
            TemperatureSample::Invalid(InvalidReason::Malformed { .. })
        ));

        let table = "\
Inlet Temp | 04h | ok | 7.1 | 21 degrees C
Temp       | 0Eh | ok | 3.1 | 256 degrees C
";
        assert!(!parse_temperature_table(table, "Inlet").is_valid());
    }

    #[test]
    fn test_byte_range_limits_accepted() {
        let table = "\
Inlet Temp | 04h | ok | 7.1 | -128 degrees C
Temp       | 0Eh | ok | 3.1 | 255 degrees C
";
        assert_eq!(
            parse_temperature_table(table, "Inlet"),
            TemperatureSample::Valid(Temperatures { ambient_avg: -128, cpu_avg: 255 })
        );
    }

    #[test]
    fn test_missing_categories() {
        assert_eq!(
            parse_temperature_table("", "Inlet"),
            TemperatureSample::Invalid(InvalidReason::NoData)
        );
        assert_eq!(
            parse_temperature_table("Temp | 0Eh | ok | 3.1 | 60 degrees C\n", "Inlet"),
            TemperatureSample::Invalid(InvalidReason::MissingAmbient)
        );
        assert_eq!(
            parse_temperature_table("Inlet Temp | 04h | ok | 7.1 | 21 degrees C\n", "Inlet"),
            TemperatureSample::Invalid(InvalidReason::MissingCpu)
        );
    }

    #[test]
    fn test_parse_fans() {
        let sample = parse_fan_table(FANS, &fan_regex());
        assert_eq!(sample, FanSample::Valid { average_rpm: 3540.0, fans: 2 });
    }

    #[test]
    fn test_fan_pattern_variants() {
        let re = fan_regex();
        assert!(re.is_match("Fan1 RPM"));
        assert!(re.is_match("Fan1A RPM"));
        assert!(re.is_match("FAN 2"));
        assert!(!re.is_match("Fan Redundancy"));
    }

    #[test]
    fn test_unreadable_fan_invalidates_sample() {
        let table = "Fan1 RPM | 30h | ok | 7.1 | 3600 RPM\nFan2 RPM | 31h | ns | 7.1 | No Reading\n";
        assert_eq!(
            parse_fan_table(table, &fan_regex()),
            FanSample::Invalid(InvalidReason::Unreadable { sensor: "Fan2 RPM".to_string() })
        );
    }

    #[test]
    fn test_no_enabled_fans() {
        let table = "Fan1 RPM | 30h | ns | 7.1 | Disabled\n";
        assert_eq!(
            parse_fan_table(table, &fan_regex()),
            FanSample::Invalid(InvalidReason::NoEnabledFans)
        );
    }

    #[test]
    fn test_reader_maps_command_error_to_invalid() {
        let mut mock = MockIpmiExecutor::new();
        mock.expect_execute()
            .returning(|_| Err(IdracfanError::generic("BMC unreachable")));

        let reader = reader();
        assert!(matches!(
            reader.read_temperatures(&mock),
            TemperatureSample::Invalid(InvalidReason::Command(_))
        ));
        assert!(matches!(
            reader.read_fan_speed(&mock),
            FanSample::Invalid(InvalidReason::Command(_))
        ));
    }

    #[test]
    fn test_reader_queries_tables() {
        let mut mock = MockIpmiExecutor::new();
        mock.expect_execute().returning(|cmd| match cmd {
            IpmiCommand::ReadTemperatures => Ok(TEMPS.to_string()),
            IpmiCommand::ReadFans => Ok(FANS.to_string()),
            _ => panic!("unexpected write {}", cmd),
        });

        let reader = reader();
        assert!(reader.read_temperatures(&mock).is_valid());
        assert_eq!(reader.read_fan_speed(&mock).average_rpm(), Some(3540.0));
    }
}
