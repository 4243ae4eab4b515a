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

//! Command Line Interface
//!
//! Every command runs once against the BMC and returns the text to print.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use idf_core::constants::duty;
use idf_core::{
    claim_unconditionally, ControlConfig, FanActuator, IdracfanError, IpmiCommand, IpmiExecutor,
    SensorReader,
};
use tracing::info;

use crate::status::StatusReport;

#[derive(Parser, Debug)]
#[command(name = "idracfan")]
#[command(version)]
#[command(about = "idracfan - iDRAC fan control over IPMI")]
#[command(long_about = "idracfan - iDRAC fan control over IPMI

One-shot commands for inspecting and overriding the BMC fan controller.
Closed-loop control is provided by the idracfand daemon.

EXAMPLES:
    idracfan status                    Show temperatures and fan speed
    idracfan status --json             Same, as JSON
    idracfan release                   Return fans to the firmware
    idracfan set 30                    Pin all fans at 30%

ENVIRONMENT VARIABLES:
    IDRACFAN_LOG=debug     Enable debug logging on stderr")]
#[command(propagate_version = true)]
pub struct Cli {
    /// ipmitool binary (searched on PATH when not absolute)
    #[arg(long, global = true, value_name = "PATH")]
    pub ipmitool: Option<PathBuf>,

    /// Per-command timeout in milliseconds
    #[arg(long, global = true, value_name = "N")]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read temperatures and fan speed once
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take fan control away from the firmware
    Claim,

    /// Hand fan control back to the firmware
    Release,

    /// Claim control and set every fan to a fixed duty cycle
    Set {
        /// Duty cycle in percent (0-100)
        #[arg(allow_hyphen_values = true)]
        percent: i64,
    },
}

impl Cli {
    /// Defaults overlaid with the global flags
    pub fn config(&self) -> anyhow::Result<ControlConfig> {
        let mut config = ControlConfig::default();
        if let Some(path) = &self.ipmitool {
            config.ipmitool = path.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.command_timeout = Duration::from_millis(ms);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Validate an operator supplied duty cycle
pub fn parse_duty(percent: i64) -> Result<u8, IdracfanError> {
    if percent < i64::from(duty::MIN_PERCENT) || percent > i64::from(duty::MAX_PERCENT) {
        return Err(IdracfanError::InvalidDutyCycle { value: percent });
    }
    Ok(percent as u8)
}

pub fn execute(cli: &Cli, executor: &dyn IpmiExecutor, config: &ControlConfig) -> anyhow::Result<String> {
    match &cli.command {
        Commands::Status { json } => cmd_status(executor, config, *json),
        Commands::Claim => {
            claim_unconditionally(executor).context("failed to claim fan control")?;
            Ok("Fan control claimed; fans hold their current speed until set".to_string())
        }
        Commands::Release => {
            executor
                .execute(&IpmiCommand::ReleaseToFirmware)
                .context("failed to release fan control")?;
            info!("Fan control returned to firmware");
            Ok("Fan control returned to firmware".to_string())
        }
        Commands::Set { percent } => cmd_set(executor, *percent),
    }
}

fn cmd_status(executor: &dyn IpmiExecutor, config: &ControlConfig, json: bool) -> anyhow::Result<String> {
    let reader = SensorReader::from_config(config)?;
    let report = StatusReport::collect(&reader, executor);
    if json {
        Ok(serde_json::to_string_pretty(&report)?)
    } else {
        Ok(report.to_string())
    }
}

fn cmd_set(executor: &dyn IpmiExecutor, percent: i64) -> anyhow::Result<String> {
    // validate before touching the BMC
    let duty = parse_duty(percent)?;

    claim_unconditionally(executor).context("failed to claim fan control")?;
    let mut actuator = FanActuator::new();
    actuator
        .apply(executor, duty)
        .with_context(|| format!("failed to set fans to {}%", duty))?;

    Ok(format!(
        "Fans set to {}%; they stay there until `idracfan release` or idracfand takes over",
        duty
    ))
}
