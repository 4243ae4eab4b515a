/*
 * This file is part of idracfan.
 *
 * Copyright (C) 2025 idracfan contributors
 *
 * idracfan is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * idracfan is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with idracfan. If not, see <https://www.gnu.org/licenses/>.
 */

//! One-shot sensor snapshot for `idracfan status`

use std::fmt;

use idf_core::{FanSample, IpmiExecutor, SensorReader, TemperatureSample};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub ambient: Option<i32>,
    pub cpu: Option<i32>,
    pub delta: Option<i32>,
    /// Why the temperature sample was rejected, if it was
    pub temperature_error: Option<String>,
    pub fan_avg_rpm: Option<f64>,
    pub fans: usize,
    pub fan_error: Option<String>,
}

impl StatusReport {
    pub fn collect(reader: &SensorReader, executor: &dyn IpmiExecutor) -> Self {
        let mut report = StatusReport {
            ambient: None,
            cpu: None,
            delta: None,
            temperature_error: None,
            fan_avg_rpm: None,
            fans: 0,
            fan_error: None,
        };

        match reader.read_temperatures(executor) {
            TemperatureSample::Valid(t) => {
                report.ambient = Some(t.ambient_avg);
                report.cpu = Some(t.cpu_avg);
                report.delta = Some(t.delta());
            }
            TemperatureSample::Invalid(reason) => report.temperature_error = Some(reason.to_string()),
        }

        match reader.read_fan_speed(executor) {
            FanSample::Valid { average_rpm, fans } => {
                report.fan_avg_rpm = Some(average_rpm);
                report.fans = fans;
            }
            FanSample::Invalid(reason) => report.fan_error = Some(reason.to_string()),
        }

        report
    }

    pub fn temperatures_valid(&self) -> bool {
        self.temperature_error.is_none()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iDRAC Fan Status")?;
        writeln!(f, "================")?;
        match (self.ambient, self.cpu, self.delta) {
            (Some(ambient), Some(cpu), Some(delta)) => {
                writeln!(f, "Ambient:      {} C", ambient)?;
                writeln!(f, "CPU:          {} C", cpu)?;
                writeln!(f, "Delta:        {} C", delta)?;
            }
            _ => writeln!(
                f,
                "Temperatures: invalid ({})",
                self.temperature_error.as_deref().unwrap_or("unknown")
            )?,
        }
        match self.fan_avg_rpm {
            Some(rpm) => write!(f, "Fans:         {:.0} RPM average over {}", rpm, self.fans),
            None => write!(
                f,
                "Fans:         invalid ({})",
                self.fan_error.as_deref().unwrap_or("unknown")
            ),
        }
    }
}
