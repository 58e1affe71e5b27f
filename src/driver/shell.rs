//! Driver that delegates each step to an external command.
//!
//! The configured command is invoked once per upgrade step with the
//! service name and the target hostnames appended as arguments, e.g.
//! `command = "upgrade-service.sh"` yields
//! `upgrade-service.sh nova-api ctl-1 ctl-2`. The command runs as an
//! abortable [`ProcessUnit`], so pausing or cancelling a chain
//! terminates the running process.
//!
//! Parameters:
//! - `command` (required): command line to run per step
//! - `pre_upgrade`: command line to run once before any step
//! - `workdir`: working directory for spawned processes
//! - `ignore_errors`: `true`/`false`, forwarded to the process unit

use anyhow::Result;
use camino::Utf8PathBuf;

use crate::chain::WorkUnit;
use crate::error::RolloutError;
use crate::model::{DriverParams, Host, Service, UpgradeTask};
use crate::process::ProcessUnit;

use super::{UpgradeDriver, noop_unit};

#[derive(Debug)]
pub struct ShellDriver {
    command: Vec<String>,
    pre_upgrade: Option<Vec<String>>,
    workdir: Option<Utf8PathBuf>,
    ignore_errors: bool,
}

/// Splits a parameter value into command-line words.
///
/// Plain whitespace splitting; quoting is not interpreted.
fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

impl ShellDriver {
    /// Registry factory; validates the parameter map.
    pub fn factory(params: DriverParams) -> Result<Box<dyn UpgradeDriver>, RolloutError> {
        let command = params
            .get("command")
            .map(|v| split_command(v))
            .filter(|args| !args.is_empty())
            .ok_or_else(|| {
                RolloutError::Validation(
                    "shell driver requires a non-empty 'command' parameter".to_string(),
                )
            })?;

        let pre_upgrade = params
            .get("pre_upgrade")
            .map(|v| split_command(v))
            .filter(|args| !args.is_empty());

        let workdir = params.get("workdir").map(Utf8PathBuf::from);

        let ignore_errors = match params.get("ignore_errors").map(String::as_str) {
            None => false,
            Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(RolloutError::Validation(format!(
                    "shell driver parameter 'ignore_errors' must be 'true' or 'false', got '{}'",
                    other
                )));
            }
        };

        Ok(Box::new(Self {
            command,
            pre_upgrade,
            workdir,
            ignore_errors,
        }))
    }

    fn unit(&self, args: Vec<String>) -> Box<dyn WorkUnit> {
        let mut unit = ProcessUnit::new(args).with_ignore_errors(self.ignore_errors);
        if let Some(ref workdir) = self.workdir {
            unit = unit.with_cwd(workdir.clone());
        }
        Box::new(unit)
    }
}

impl UpgradeDriver for ShellDriver {
    fn pre_upgrade(&self) -> Result<Box<dyn WorkUnit>> {
        match &self.pre_upgrade {
            Some(args) => Ok(self.unit(args.clone())),
            None => noop_unit(),
        }
    }

    fn start(
        &self,
        _upgrade: &UpgradeTask,
        service: &Service,
        hosts: &[Host],
    ) -> Result<Box<dyn WorkUnit>> {
        let mut args = self.command.clone();
        args.push(service.name.clone());
        args.extend(hosts.iter().map(|h| h.hostname.clone()));
        Ok(self.unit(args))
    }
}
