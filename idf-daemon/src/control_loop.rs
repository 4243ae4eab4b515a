//! Fan Control Loop
//!
//! Drives `ControlLoop::run_cycle` on a fixed cadence until shutdown.
//!
//! # Concurrency
//! Single task on a current-thread runtime. The only suspension point is the
//! sleep between cycles, raced against the shutdown signal; ipmitool calls
//! inside a cycle are synchronous and bounded by the command timeout.

use std::future::Future;
use std::time::{Duration, Instant};

use idf_core::{ControlLoop, CycleOutcome, CycleReport};
use tracing::{debug, info, warn};

/// How each applied cycle is written to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Run until `shutdown` resolves, then return the loop for inspection
pub async fn run_control_loop<F>(
    mut control: ControlLoop,
    poll_interval: Duration,
    format: ReportFormat,
    shutdown: F,
) -> ControlLoop
where
    F: Future<Output = ()>,
{
    info!(interval_ms = poll_interval.as_millis() as u64, "Fan control loop starting");
    tokio::pin!(shutdown);

    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = &mut shutdown => {
                info!(cycles, "Fan control loop shutting down");
                break;
            }
        }

        cycles += 1;
        match control.run_cycle(Instant::now()) {
            CycleOutcome::Applied(report) => log_report(&report, format),
            CycleOutcome::FirmwareControlled(temps) => {
                debug!(ambient = temps.ambient_avg, cpu = temps.cpu_avg, "Firmware in control, skipping PID");
            }
            // already logged (rate limited) by the loop
            CycleOutcome::Skipped(_) => {}
        }
    }

    info!("Fan control loop stopped");
    control
}

fn log_report(report: &CycleReport, format: ReportFormat) {
    match format {
        ReportFormat::Text => info!("{}", report),
        ReportFormat::Json => match serde_json::to_string(report) {
            Ok(line) => info!("{}", line),
            Err(e) => warn!(error = %e, "Failed to serialize cycle report; {}", report),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idf_core::{ControlConfig, HandoffState, IpmiCommand, IpmiExecutor, Result};
    use std::sync::{Arc, Mutex};

    const TEMPS: &str = "Inlet Temp | 04h | ok | 7.1 | 22 degrees C\nTemp | 0Eh | ok | 3.1 | 72 degrees C\n";
    const FANS: &str = "Fan1 RPM | 30h | ok | 7.1 | 3000 RPM\n";

    #[derive(Default)]
    struct RecordingIpmi {
        log: Mutex<Vec<IpmiCommand>>,
    }

    impl RecordingIpmi {
        fn writes(&self) -> Vec<IpmiCommand> {
            self.log.lock().unwrap().iter().copied().filter(|c| c.is_write()).collect()
        }
    }

    impl IpmiExecutor for RecordingIpmi {
        fn execute(&self, command: &IpmiCommand) -> Result<String> {
            self.log.lock().unwrap().push(*command);
            Ok(match command {
                IpmiCommand::ReadTemperatures => TEMPS.to_string(),
                IpmiCommand::ReadFans => FANS.to_string(),
                _ => String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_loop_runs_until_shutdown_then_guard_releases() {
        let ipmi = Arc::new(RecordingIpmi::default());
        let executor: Arc<dyn IpmiExecutor> = ipmi.clone();
        let mut control = ControlLoop::new(executor, &ControlConfig::default(), Instant::now()).unwrap();
        let guard = control.start();

        let shutdown = tokio::time::sleep(Duration::from_millis(120));
        let control = run_control_loop(control, Duration::from_millis(20), ReportFormat::Json, shutdown).await;
        assert_eq!(control.handoff_state(), HandoffState::SelfControlled);

        // error 0 every cycle -> integral stays at its initial 10%
        assert_eq!(control.last_applied(), Some(10));
        let writes = ipmi.writes();
        assert_eq!(writes.first(), Some(&IpmiCommand::ClaimFromFirmware));
        assert_eq!(writes.iter().filter(|c| **c == IpmiCommand::SetFanDuty(10)).count(), 1);

        drop(guard);
        assert_eq!(ipmi.writes().last(), Some(&IpmiCommand::ReleaseToFirmware));
    }

    #[tokio::test]
    async fn test_immediate_shutdown_runs_no_cycles() {
        let ipmi = Arc::new(RecordingIpmi::default());
        let executor: Arc<dyn IpmiExecutor> = ipmi.clone();
        let control = ControlLoop::new(executor, &ControlConfig::default(), Instant::now()).unwrap();

        let control = run_control_loop(control, Duration::from_secs(60), ReportFormat::Text, async {}).await;
        assert_eq!(control.last_applied(), None);
        assert!(ipmi.log.lock().unwrap().is_empty());
    }
}
