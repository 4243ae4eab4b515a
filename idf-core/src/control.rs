//! Control loop orchestration
//!
//! One cycle: read temperatures → evaluate handoff → PID → actuate → read
//! back the fan speed. The loop owns every piece of mutable control state;
//! the daemon only supplies the clock and the sleep between cycles.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::constants::timing;
use crate::data::{ControlConfig, InvalidReason, TemperatureSample, Temperatures};
use crate::engine::{
    claim_unconditionally, ControllerState, HandoffMachine, HandoffState, PidController, Transition,
};
use crate::error::Result;
use crate::hw::{FanActuator, IpmiCommand, IpmiExecutor, SensorReader};

/// Diagnostic record of one applied cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub ambient: i32,
    pub cpu: i32,
    pub delta: i32,
    pub error: i32,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub control: u8,
    /// Mean RPM of enabled fans, `None` when the read-back failed
    pub fan_avg: Option<f64>,
    /// Whether a set-duty command was issued this cycle
    pub duty_sent: bool,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ambient={} cpu={} delta={} error={} P={:.2} I={:.2} D={:.2} control={}",
            self.ambient, self.cpu, self.delta, self.error, self.p, self.i, self.d, self.control
        )?;
        match self.fan_avg {
            Some(rpm) => write!(f, " fan_avg={:.0}", rpm),
            None => write!(f, " fan_avg=n/a"),
        }
    }
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Sensor data rejected; no state touched
    Skipped(InvalidReason),
    /// Firmware owns the fans; PID and actuation skipped
    FirmwareControlled(Temperatures),
    Applied(CycleReport),
}

/// Returns fan control to firmware when dropped
///
/// Armed before control is claimed so every exit path (normal return,
/// `?`, signal-driven shutdown, panic unwind) releases.
pub struct FirmwareGuard {
    executor: Arc<dyn IpmiExecutor>,
    armed: bool,
}

impl FirmwareGuard {
    pub fn new(executor: Arc<dyn IpmiExecutor>) -> Self {
        Self { executor, armed: true }
    }

    /// Release now and disarm
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.executor.execute(&IpmiCommand::ReleaseToFirmware).map(|_| ())
    }
}

impl Drop for FirmwareGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.executor.execute(&IpmiCommand::ReleaseToFirmware) {
            Ok(_) => info!("SHUTDOWN: Fan control returned to firmware"),
            Err(e) => error!(error = %e, "SHUTDOWN: Failed to return fan control to firmware"),
        }
    }
}

pub struct ControlLoop {
    executor: Arc<dyn IpmiExecutor>,
    reader: SensorReader,
    pid: PidController,
    state: ControllerState,
    handoff: HandoffMachine,
    actuator: FanActuator,
    /// Time of the last cycle that ran the PID
    last_processed: Instant,
    consecutive_skips: u32,
}

impl ControlLoop {
    pub fn new(executor: Arc<dyn IpmiExecutor>, config: &ControlConfig, started: Instant) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            reader: SensorReader::from_config(config)?,
            pid: PidController::new(config.tuning),
            state: ControllerState::new(&config.tuning),
            handoff: HandoffMachine::new(config.cpu_ceiling),
            actuator: FanActuator::new(),
            last_processed: started,
            consecutive_skips: 0,
        })
    }

    /// Claim fan control and arm the release-on-exit guard
    ///
    /// The claim is sent regardless of the believed handoff state. If it
    /// fails the machine stays firmware-controlled and the claim edge is
    /// retried on the next cycle below the ceiling.
    pub fn start(&mut self) -> FirmwareGuard {
        let guard = FirmwareGuard::new(Arc::clone(&self.executor));
        match claim_unconditionally(self.executor.as_ref()) {
            Ok(()) => {
                self.handoff.mark_self_controlled();
                info!("STARTUP: Took fan control from firmware");
            }
            Err(e) => error!(error = %e, "STARTUP: Failed to take fan control; will retry"),
        }
        guard
    }

    pub fn controller_state(&self) -> &ControllerState {
        &self.state
    }

    pub fn handoff_state(&self) -> HandoffState {
        self.handoff.state()
    }

    pub fn last_applied(&self) -> Option<u8> {
        self.actuator.last_applied()
    }

    /// Run one control cycle at wall-clock time `now`
    pub fn run_cycle(&mut self, now: Instant) -> CycleOutcome {
        let executor = Arc::clone(&self.executor);
        let executor = executor.as_ref();

        let temps = match self.reader.read_temperatures(executor) {
            TemperatureSample::Valid(t) => t,
            TemperatureSample::Invalid(reason) => {
                self.note_skip(&reason);
                return CycleOutcome::Skipped(reason);
            }
        };
        self.consecutive_skips = 0;

        match self.handoff.apply(executor, temps.cpu_avg) {
            Ok(Some(Transition::ClaimFromFirmware)) => self.actuator.forget(),
            Ok(_) => {}
            Err(e) => error!(cpu = temps.cpu_avg, error = %e, "Handoff command failed"),
        }
        if self.handoff.is_firmware_controlled() {
            return CycleOutcome::FirmwareControlled(temps);
        }

        let elapsed = now.saturating_duration_since(self.last_processed).as_secs_f64();
        self.last_processed = now;

        let delta = temps.delta();
        let error = self.pid.tuning().error_for(delta);
        let out = self.pid.step(&mut self.state, error, elapsed);

        let duty_sent = match self.actuator.apply(executor, out.control) {
            Ok(sent) => sent,
            Err(e) => {
                warn!(control = out.control, error = %e, "Failed to set fan duty cycle");
                false
            }
        };

        let fan_avg = self.reader.read_fan_speed(executor).average_rpm();

        CycleOutcome::Applied(CycleReport {
            ambient: temps.ambient_avg,
            cpu: temps.cpu_avg,
            delta,
            error,
            p: out.p,
            i: out.i,
            d: out.d,
            control: out.control,
            fan_avg,
            duty_sent,
        })
    }

    fn note_skip(&mut self, reason: &InvalidReason) {
        self.consecutive_skips += 1;
        debug!(skipped = self.consecutive_skips, "Skipping cycle: {}", reason);
        if self.consecutive_skips == 1 || self.consecutive_skips % timing::SKIP_WARN_EVERY == 0 {
            warn!(skipped = self.consecutive_skips, "Bad data from IPMI, skipping cycle: {}", reason);
        }
    }
}
