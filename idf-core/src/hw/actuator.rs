//! Fan duty-cycle actuator
//!
//! Sends the set-duty command only when the duty cycle differs from the
//! last one the BMC accepted.

use tracing::debug;

use crate::constants::duty;
use crate::error::{IdracfanError, Result};
use crate::hw::{IpmiCommand, IpmiExecutor};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanActuator {
    last_applied: Option<u8>,
}

impl FanActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self) -> Option<u8> {
        self.last_applied
    }

    /// Apply a duty cycle; returns whether a command was sent
    ///
    /// `last_applied` only advances on success, so a failed write is sent
    /// again on the next call with the same value.
    pub fn apply(&mut self, executor: &dyn IpmiExecutor, percent: u8) -> Result<bool> {
        if percent > duty::MAX_PERCENT {
            return Err(IdracfanError::InvalidDutyCycle { value: i64::from(percent) });
        }
        if self.last_applied == Some(percent) {
            return Ok(false);
        }

        executor.execute(&IpmiCommand::SetFanDuty(percent))?;
        debug!(from = ?self.last_applied, to = percent, "Fan duty cycle changed");
        self.last_applied = Some(percent);
        Ok(true)
    }

    /// Drop the de-duplication memory (firmware may have moved the fans)
    pub fn forget(&mut self) {
        self.last_applied = None;
    }
}
