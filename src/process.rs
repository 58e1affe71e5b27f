//! Abortable external-process work unit.
//!
//! [`ProcessUnit`] is the concrete execution primitive drivers hand to
//! the chain: it spawns an external process and polls for completion on
//! a fixed interval instead of blocking in `wait()`, so an abort request
//! on the chain's token is observed promptly. On abort the child is
//! killed and the unit reports [`Outcome::Aborted`] rather than an exit
//! code.

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use tracing::{debug, info, trace, warn};
use which::which;

use crate::chain::{AbortToken, Outcome, WorkUnit};
use crate::error::RolloutError;

/// How often a running process is polled for completion and the abort
/// token is checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// External process specification and execution logic.
///
/// Non-zero exit codes are failures unless `ignore_errors` is set, in
/// which case the code is reported via [`Outcome::Completed`].
#[derive(Debug, Clone)]
pub struct ProcessUnit {
    args: Vec<String>,
    cwd: Option<Utf8PathBuf>,
    ignore_errors: bool,
    poll_interval: Duration,
}

impl ProcessUnit {
    /// Creates a unit for the given command line (program plus arguments).
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            cwd: None,
            ignore_errors: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the working directory for the process.
    #[must_use]
    pub fn with_cwd(mut self, cwd: Utf8PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    /// Treats non-zero exit codes as a reportable result instead of a
    /// failure.
    #[must_use]
    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    /// Overrides the completion poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

impl WorkUnit for ProcessUnit {
    fn describe(&self) -> String {
        format!("process: {}", self.command_line())
    }

    fn run(&self, abort: &AbortToken) -> Result<Outcome> {
        let (program, rest) = self.args.split_first().ok_or_else(|| {
            RolloutError::Validation("process unit requires a program name".to_string())
        })?;

        let program_path =
            which(program).with_context(|| format!("command not found: {}", program))?;
        trace!("command found: {}: {}", program, program_path.to_string_lossy());

        let mut command = Command::new(program_path);
        command.args(rest);
        if let Some(ref cwd) = self.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| RolloutError::Execution {
            command: self.command_line(),
            status: format!("failed to spawn: {}", e),
        })?;
        trace!("spawned process: {}: pid={}", program, child.id());

        // try_wait/sleep instead of a blocking wait so the abort token
        // is checked once per poll interval.
        let status = loop {
            let polled = child.try_wait().map_err(|e| RolloutError::Execution {
                command: self.command_line(),
                status: format!("failed to poll process: {}", e),
            })?;
            if let Some(status) = polled {
                break status;
            }

            if abort.is_aborted() {
                let pid = child.id();
                info!(pid = pid, "abort requested, terminating process");
                if let Err(e) = child.kill() {
                    debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
                }
                if let Err(e) = child.wait() {
                    warn!(pid = pid, "failed to wait for process after kill: {}", e);
                }
                return Ok(Outcome::Aborted);
            }

            thread::sleep(self.poll_interval);
        };

        match status.code() {
            Some(0) => Ok(Outcome::Completed(0)),
            Some(code) if self.ignore_errors => {
                debug!("process exited with code {} (ignored): {}", code, self.command_line());
                Ok(Outcome::Completed(code))
            }
            Some(code) => Err(RolloutError::Execution {
                command: self.command_line(),
                status: format!("exit code: {}", code),
            }
            .into()),
            // Killed by a signal we did not send; no exit code to report.
            None => Err(RolloutError::Execution {
                command: self.command_line(),
                status: format!("terminated by signal: {}", status),
            }
            .into()),
        }
    }
}
