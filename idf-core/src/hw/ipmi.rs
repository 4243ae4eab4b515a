//! ipmitool invocation
//!
//! The control loop only needs "run this command, give me its text output".
//! [`IpmiExecutor`] is that seam; [`IpmiTool`] is the real implementation,
//! with a bounded wait so a hung BMC cannot starve the loop.
//!
//! # Commands (Dell OEM raw interface)
//!
//! - `sdr type temperature` / `sdr type fan` - sensor tables
//! - `raw 0x30 0x30 0x02 0xff <duty>` - set all fans to a duty cycle
//! - `raw 0x30 0x30 0x01 0x01` - firmware (automatic) fan control
//! - `raw 0x30 0x30 0x01 0x00` - manual fan control

use std::ffi::OsStr;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::constants::{ipmi, timing};
use crate::error::{IdracfanError, Result};

/// A management-interface request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpmiCommand {
    ReadTemperatures,
    ReadFans,
    /// Duty cycle in percent, 0-100
    SetFanDuty(u8),
    ReleaseToFirmware,
    ClaimFromFirmware,
}

impl IpmiCommand {
    /// ipmitool argument vector
    pub fn args(&self) -> Vec<String> {
        match self {
            IpmiCommand::ReadTemperatures => vec!["sdr".into(), "type".into(), "temperature".into()],
            IpmiCommand::ReadFans => vec!["sdr".into(), "type".into(), "fan".into()],
            IpmiCommand::SetFanDuty(percent) => {
                let byte = format!("{:#x}", percent);
                raw_args(&[ipmi::SET_DUTY, ipmi::ALL_FANS, &byte])
            }
            IpmiCommand::ReleaseToFirmware => raw_args(&[ipmi::MODE_SELECT, ipmi::MODE_FIRMWARE]),
            IpmiCommand::ClaimFromFirmware => raw_args(&[ipmi::MODE_SELECT, ipmi::MODE_MANUAL]),
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, IpmiCommand::ReadTemperatures | IpmiCommand::ReadFans)
    }
}

fn raw_args(tail: &[&str]) -> Vec<String> {
    ipmi::RAW_PREFIX
        .iter()
        .chain(tail.iter())
        .map(|s| s.to_string())
        .collect()
}

impl fmt::Display for IpmiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", ipmi::TOOL, self.args().join(" "))
    }
}

/// Runs management-interface commands and returns their stdout
#[cfg_attr(test, mockall::automock)]
pub trait IpmiExecutor: Send + Sync {
    fn execute(&self, command: &IpmiCommand) -> Result<String>;
}

/// Executes commands with the ipmitool binary
#[derive(Debug, Clone)]
pub struct IpmiTool {
    program: PathBuf,
    timeout: Duration,
}

impl IpmiTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the child, killing it once the deadline passes
    fn wait_bounded(&self, child: &mut Child, command: &IpmiCommand) -> Result<std::process::ExitStatus> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IdracfanError::Timeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(timing::CHILD_POLL);
        }
    }
}

impl Default for IpmiTool {
    fn default() -> Self {
        Self::new(ipmi::TOOL, timing::COMMAND_TIMEOUT)
    }
}

impl IpmiExecutor for IpmiTool {
    fn execute(&self, command: &IpmiCommand) -> Result<String> {
        let args = command.args();
        trace!(program = %self.program.display(), args = ?args, "Running ipmitool");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| IdracfanError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // drain both pipes while waiting so a large table cannot fill the
        // pipe buffer and stall the child
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        // on timeout the readers are left to finish once the killed child's
        // pipes close
        let status = self.wait_bounded(&mut child, command)?;
        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);

        if !status.success() {
            return Err(IdracfanError::CommandFailed {
                command: command.to_string(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(command = %command, bytes = stdout.len(), "ipmitool finished");
        Ok(stdout)
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(reader: thread::JoinHandle<String>) -> String {
    reader.join().unwrap_or_default()
}

/// Resolve the ipmitool binary using the process PATH
pub fn locate_tool(program: &Path) -> Result<PathBuf> {
    locate_tool_in(program, std::env::var_os("PATH").as_deref())
}

/// Resolve a binary against an explicit PATH value
///
/// A program containing a path separator must point at an executable file;
/// a bare name is looked up in each PATH entry.
pub fn locate_tool_in(program: &Path, path_var: Option<&OsStr>) -> Result<PathBuf> {
    let not_found = || IdracfanError::ToolNotFound {
        tool: program.display().to_string(),
    };

    if program.components().count() > 1 || program.is_absolute() {
        return if is_executable(program) {
            Ok(program.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let path_var = path_var.ok_or_else(not_found)?;
    std::env::split_paths(path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
