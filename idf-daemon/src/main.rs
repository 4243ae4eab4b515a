//! idracfan Daemon (idracfand)
//!
//! Closed-loop fan control for Dell iDRAC servers over IPMI.
//!
//! # Operation
//! - Claims manual fan control from the BMC at startup
//! - Once per second: reads inlet and CPU temperatures, runs the PID
//!   controller on their delta, writes one duty cycle to all fans
//! - Hands control back to the firmware while the CPU runs above the ceiling
//!   and reclaims it once the CPU cools
//! - Always returns control to the firmware on exit, signal or panic
//!
//! # Privileges
//! ipmitool needs access to `/dev/ipmi0`, which normally means root. The
//! daemon warns rather than refuses so it can also drive a remote
//! interface through a wrapper script.

mod control_loop;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use idf_core::constants::timing;
use idf_core::{locate_tool, ControlConfig, ControlLoop, IpmiExecutor, IpmiTool};
use tracing::{debug, error, info, warn};

use crate::control_loop::{run_control_loop, ReportFormat};
use crate::signals::ShutdownSignals;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the tracing filter directive
const LOG_ENV: &str = "IDRACFAN_LOG";

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct DaemonArgs {
    ipmitool: Option<PathBuf>,
    timeout: Option<Duration>,
    report: ReportFormat,
    journald: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ArgsAction {
    Run(DaemonArgs),
    Help,
    Version,
}

fn parse_args<I>(args: I) -> Result<ArgsAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = DaemonArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(ArgsAction::Help),
            "-v" | "--version" => return Ok(ArgsAction::Version),
            "--json" => parsed.report = ReportFormat::Json,
            "--journald" => parsed.journald = true,
            "--ipmitool" => {
                let path = args.next().ok_or("--ipmitool requires a path argument")?;
                parsed.ipmitool = Some(PathBuf::from(path));
            }
            "--timeout-ms" => {
                let raw = args.next().ok_or("--timeout-ms requires a number")?;
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| format!("--timeout-ms expects milliseconds, got '{}'", raw))?;
                if ms == 0 {
                    return Err("--timeout-ms must be greater than zero".into());
                }
                parsed.timeout = Some(Duration::from_millis(ms));
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(ArgsAction::Run(parsed))
}

fn print_help() {
    eprintln!("idracfand {} - PID fan control for Dell iDRAC over IPMI", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    idracfand [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("        --ipmitool PATH     ipmitool binary (default: searched on PATH)");
    eprintln!("        --timeout-ms N      Per-command timeout (default: {} ms)", timing::COMMAND_TIMEOUT.as_millis());
    eprintln!("        --json              Log each cycle as a JSON object");
    eprintln!("        --journald          Log to the systemd journal");
    eprintln!("    -v, --version           Print version");
    eprintln!("    -h, --help              Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}        Log filter (trace, debug, info, warn, error)", LOG_ENV);
}

fn print_version() {
    println!("idracfand {}", VERSION);
}

// ============================================================================
// Startup
// ============================================================================

/// Returns a description of the sink that ended up active
fn init_logging(journald: bool) -> &'static str {
    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return "systemd journal";
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();
    "stdout"
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        error!("PANIC at {}: {}", location, message);
        // unwinding drops the firmware guard, which hands the fans back
        eprintln!("PANIC at {}: {}", location, message);
    }));
}

fn verify_privileges() {
    // SAFETY: geteuid is always safe - it just returns the process's effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Not running as root (euid={}); ipmitool may be unable to reach the BMC", euid);
    } else {
        info!("Running as root");
    }
}

fn build_config(args: &DaemonArgs) -> anyhow::Result<ControlConfig> {
    let mut config = ControlConfig::default();
    if let Some(path) = &args.ipmitool {
        config.ipmitool = path.clone();
    }
    if let Some(timeout) = args.timeout {
        config.command_timeout = timeout;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(ArgsAction::Run(args)) => args,
        Ok(ArgsAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(ArgsAction::Version) => {
            print_version();
            return Ok(());
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            print_help();
            std::process::exit(1);
        }
    };

    let sink = init_logging(args.journald);
    install_panic_hook();

    info!("STARTUP: idracfand {} starting", VERSION);
    info!("STARTUP: Logging to {}", sink);
    verify_privileges();

    let config = build_config(&args)?;

    let program = match locate_tool(&config.ipmitool) {
        Ok(path) => path,
        Err(e) => {
            error!("{}", e);
            error!("you need to have ipmitool installed");
            std::process::exit(1);
        }
    };
    info!("STARTUP: Using {}", program.display());

    match serde_json::to_string(&config) {
        Ok(json) => debug!(config = %json, "STARTUP: Effective configuration"),
        Err(e) => debug!(error = %e, "STARTUP: Could not render configuration"),
    }

    // Registered before the claim so a stop request during startup still
    // goes through the guard
    let signals = ShutdownSignals::install().context("failed to install signal handlers")?;

    let executor: Arc<dyn IpmiExecutor> = Arc::new(IpmiTool::new(program, config.command_timeout));
    let mut control = ControlLoop::new(executor, &config, Instant::now())?;

    // From here on every exit path returns the fans to the firmware
    let guard = control.start();
    info!(
        target_delta = config.tuning.target_delta,
        ceiling = config.cpu_ceiling,
        "STARTUP: Control loop armed"
    );

    run_control_loop(control, config.poll_interval, args.report, signals.recv()).await;

    if let Err(e) = guard.release() {
        error!("SHUTDOWN: Failed to return fan control to firmware: {}", e);
    }
    info!("SHUTDOWN: idracfand stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ArgsAction, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_args_runs_with_defaults() {
        assert_eq!(parse(&[]), Ok(ArgsAction::Run(DaemonArgs::default())));
    }

    #[test]
    fn test_all_options() {
        let action = parse(&["--ipmitool", "/opt/ipmitool", "--timeout-ms", "2500", "--json", "--journald"]).unwrap();
        let ArgsAction::Run(args) = action else {
            panic!("expected run action");
        };
        assert_eq!(args.ipmitool, Some(PathBuf::from("/opt/ipmitool")));
        assert_eq!(args.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(args.report, ReportFormat::Json);
        assert!(args.journald);
    }

    #[test]
    fn test_help_and_version_short_circuit() {
        assert_eq!(parse(&["--json", "-h"]), Ok(ArgsAction::Help));
        assert_eq!(parse(&["--version"]), Ok(ArgsAction::Version));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse(&["--ipmitool"]).is_err());
        assert!(parse(&["--timeout-ms", "soon"]).is_err());
        assert!(parse(&["--timeout-ms", "0"]).is_err());
        assert!(parse(&["--fast"]).unwrap_err().contains("--fast"));
    }

    #[test]
    fn test_build_config_applies_overrides() {
        let args = DaemonArgs {
            ipmitool: Some(PathBuf::from("/usr/local/bin/ipmitool")),
            timeout: Some(Duration::from_secs(2)),
            ..DaemonArgs::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.ipmitool, PathBuf::from("/usr/local/bin/ipmitool"));
        assert_eq!(config.command_timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, timing::POLL_INTERVAL);
    }
}
