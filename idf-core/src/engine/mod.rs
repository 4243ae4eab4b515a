//! Control engine modules
//!
//! Pure computation: the PID law and the firmware handoff state machine.

mod handoff;
mod pid;

pub use handoff::{claim_unconditionally, HandoffMachine, HandoffState, Transition};
pub use pid::{clamp_duty, ControllerState, DerivativeTracker, PidController, PidOutput, PidTuning};
