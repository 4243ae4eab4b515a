//! PID control law for chassis fan duty cycle
//!
//! The controlled variable is the CPU-over-ambient temperature delta; the
//! error is how far that delta sits above the target.
//!
//! # Terms
//!
//! 1. **P**: `error * kp`.
//!
//! 2. **I**: `error * elapsed` accumulates into a running total. The total is
//!    clamped so that `total * ki` stays within `[0, integral_max]`. Clamping
//!    the accumulator (not just the output) means accumulation resumes from
//!    the clamped base once the error changes sign.
//!
//! 3. **D**: ipmitool reports whole degrees, so the error is quantized and
//!    often repeats for several samples. The rate is therefore measured over
//!    the time since the error last *changed*, against the error value held
//!    before that change. See [`DerivativeTracker`].
//!
//! The control output is `P + I - D`, truncated and clamped to `[0, 100]`.

use serde::Serialize;

use crate::constants::{duty, pid as pid_const};

/// PID gains and limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidTuning {
    /// Target CPU-over-ambient delta in degrees
    pub target_delta: i32,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Ceiling of the integral contribution
    pub integral_max: f64,
    /// Integral contribution at process start
    pub initial_integral: f64,
}

impl Default for PidTuning {
    fn default() -> Self {
        Self {
            target_delta: pid_const::TARGET_DELTA,
            kp: pid_const::KP,
            ki: pid_const::KI,
            kd: pid_const::KD,
            integral_max: pid_const::INTEGRAL_MAX,
            initial_integral: pid_const::INITIAL_INTEGRAL,
        }
    }
}

impl PidTuning {
    /// Error signal for a measured CPU-over-ambient delta
    pub fn error_for(&self, delta: i32) -> i32 {
        delta.saturating_sub(self.target_delta)
    }
}

/// Hold-time derivative bookkeeping
///
/// Two transitions:
/// - error changed: the reference becomes the previous error and the hold
///   time restarts at this cycle's elapsed time
/// - error unchanged: the hold time keeps accumulating
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivativeTracker {
    last_error: i32,
    reference_error: i32,
    held_secs: f64,
}

impl DerivativeTracker {
    /// Record a new error sample and return the error rate in degrees/second
    pub fn update(&mut self, error: i32, elapsed_secs: f64) -> f64 {
        if error == self.last_error {
            self.held_secs += elapsed_secs;
        } else {
            self.reference_error = self.last_error;
            self.held_secs = elapsed_secs;
        }
        self.last_error = error;

        // held_secs > 0 whenever the loop has slept before its first sample
        if self.held_secs <= 0.0 {
            return 0.0;
        }
        (f64::from(error) - f64::from(self.reference_error)) / self.held_secs
    }

    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    pub fn reference_error(&self) -> i32 {
        self.reference_error
    }

    pub fn held_secs(&self) -> f64 {
        self.held_secs
    }
}

/// Persistent controller memory, owned by the control loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    /// Running sum of `error * elapsed_secs`, kept within the clamp range
    integral_total: f64,
    derivative: DerivativeTracker,
}

impl ControllerState {
    /// Fresh state seeded with the tuning's initial integral contribution
    pub fn new(tuning: &PidTuning) -> Self {
        let initial = tuning.initial_integral.clamp(0.0, tuning.integral_max);
        Self {
            integral_total: initial / tuning.ki,
            derivative: DerivativeTracker::default(),
        }
    }

    pub fn integral_total(&self) -> f64 {
        self.integral_total
    }

    pub fn derivative(&self) -> &DerivativeTracker {
        &self.derivative
    }
}

/// Terms and output of one PID step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidOutput {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// `p + i - d` before truncation and clamping
    pub raw: f64,
    /// Duty cycle to apply, 0-100
    pub control: u8,
}

/// Stateless PID law; all memory lives in [`ControllerState`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidController {
    tuning: PidTuning,
}

impl PidController {
    pub fn new(tuning: PidTuning) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> &PidTuning {
        &self.tuning
    }

    pub fn proportional(&self, error: i32) -> f64 {
        f64::from(error) * self.tuning.kp
    }

    pub fn integral(&self, state: &mut ControllerState, error: i32, elapsed_secs: f64) -> f64 {
        let ki = self.tuning.ki;
        state.integral_total += f64::from(error) * elapsed_secs;

        if state.integral_total * ki > self.tuning.integral_max {
            state.integral_total = self.tuning.integral_max / ki;
        } else if state.integral_total * ki < 0.0 {
            state.integral_total = 0.0;
        }

        // max / ki * ki may round a hair above max
        (state.integral_total * ki).min(self.tuning.integral_max)
    }

    pub fn derivative(&self, state: &mut ControllerState, error: i32, elapsed_secs: f64) -> f64 {
        self.tuning.kd * state.derivative.update(error, elapsed_secs)
    }

    /// Run all three terms and combine them into a duty cycle
    pub fn step(&self, state: &mut ControllerState, error: i32, elapsed_secs: f64) -> PidOutput {
        let p = self.proportional(error);
        let i = self.integral(state, error, elapsed_secs);
        let d = self.derivative(state, error, elapsed_secs);
        let raw = p + i - d;

        PidOutput {
            p,
            i,
            d,
            raw,
            control: clamp_duty(raw),
        }
    }
}

/// Truncate toward zero and clamp into the duty-cycle range
pub fn clamp_duty(raw: f64) -> u8 {
    if raw.is_nan() {
        return duty::MAX_PERCENT;
    }
    let truncated = raw.trunc();
    truncated.clamp(f64::from(duty::MIN_PERCENT), f64::from(duty::MAX_PERCENT)) as u8
}
