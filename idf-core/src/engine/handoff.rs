//! Firmware handoff state machine
//!
//! A safety interlock: when the CPU runs past the hard ceiling, fan control
//! goes back to the platform firmware's own table-driven controller. Control
//! is reclaimed once the CPU is at or below the ceiling again. Commands are
//! issued only on the transition edge.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::hw::{IpmiCommand, IpmiExecutor};

/// Who currently drives the fans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandoffState {
    SelfControlled,
    FirmwareControlled,
}

/// An edge of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ReleaseToFirmware,
    ClaimFromFirmware,
}

impl Transition {
    pub fn command(&self) -> IpmiCommand {
        match self {
            Transition::ReleaseToFirmware => IpmiCommand::ReleaseToFirmware,
            Transition::ClaimFromFirmware => IpmiCommand::ClaimFromFirmware,
        }
    }

    pub fn target(&self) -> HandoffState {
        match self {
            Transition::ReleaseToFirmware => HandoffState::FirmwareControlled,
            Transition::ClaimFromFirmware => HandoffState::SelfControlled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffMachine {
    state: HandoffState,
    ceiling: i32,
}

impl HandoffMachine {
    /// Starts firmware-controlled until control is explicitly claimed
    pub fn new(ceiling: i32) -> Self {
        Self {
            state: HandoffState::FirmwareControlled,
            ceiling,
        }
    }

    pub fn state(&self) -> HandoffState {
        self.state
    }

    pub fn ceiling(&self) -> i32 {
        self.ceiling
    }

    pub fn is_firmware_controlled(&self) -> bool {
        self.state == HandoffState::FirmwareControlled
    }

    /// Transition implied by a CPU temperature, if any
    pub fn evaluate(&self, cpu_avg: i32) -> Option<Transition> {
        match self.state {
            HandoffState::SelfControlled if cpu_avg > self.ceiling => Some(Transition::ReleaseToFirmware),
            HandoffState::FirmwareControlled if cpu_avg <= self.ceiling => Some(Transition::ClaimFromFirmware),
            _ => None,
        }
    }

    /// Evaluate and issue the edge command
    ///
    /// On command failure the state is left unchanged so the edge fires
    /// again next cycle.
    pub fn apply(&mut self, executor: &dyn IpmiExecutor, cpu_avg: i32) -> Result<Option<Transition>> {
        let Some(transition) = self.evaluate(cpu_avg) else {
            return Ok(None);
        };

        match transition {
            Transition::ReleaseToFirmware => warn!(
                cpu = cpu_avg,
                ceiling = self.ceiling,
                "Temperature over limit! Releasing fan control to firmware"
            ),
            Transition::ClaimFromFirmware => info!(
                cpu = cpu_avg,
                ceiling = self.ceiling,
                "Temperature in acceptable range. Taking fan control from firmware"
            ),
        }

        executor.execute(&transition.command())?;
        self.state = transition.target();
        Ok(Some(transition))
    }

    /// Record that control was claimed outside the edge logic (startup)
    pub fn mark_self_controlled(&mut self) {
        self.state = HandoffState::SelfControlled;
    }
}

/// Issue the claim command regardless of the believed state
pub fn claim_unconditionally(executor: &dyn IpmiExecutor) -> Result<()> {
    executor.execute(&IpmiCommand::ClaimFromFirmware).map(|_| ())
}
