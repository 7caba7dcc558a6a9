use anyhow::{bail, Result};
use clap::Args;
use hpc_bridge::config::ExecutionMode;
use hpc_bridge::slurm::submit::shell_quote;
use log::info;
use std::time::Duration;

use super::{failure, ConnectionArgs};

#[derive(Args)]
#[command(about = "Run a command on the cluster")]
pub struct RunCommand {
    /// Command and arguments to run remotely
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,

    /// Run on a compute node through `srun --pty`, whatever the configured mode
    #[arg(long, conflicts_with = "direct")]
    slurm: bool,

    /// Run on the login node, whatever the configured mode
    #[arg(long)]
    direct: bool,

    /// Timeout in seconds (default: 300 direct, 600 under srun)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Fail when the remote command exits non-zero
    #[arg(long)]
    check: bool,
}

impl RunCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        if self.command.iter().all(|part| part.trim().is_empty()) {
            bail!("No command given");
        }

        let mut session = connection.open_session()?;
        let mode = self.mode(session.config().execution_mode);
        let timeout = self
            .timeout
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or_else(|| mode.default_timeout());

        let info = session.probe().map_err(|e| failure(&session, e))?;

        let command = build_remote_command(&self.command, mode, &info.working_directory);
        info!(
            "Running on {} ({} mode, timeout {:?}): {}",
            info.hostname, mode, timeout, command
        );

        if self.check {
            let result = session
                .execute_checked(&command, timeout)
                .map_err(|e| failure(&session, e))?;
            print!("{}", result.combined());
        } else {
            let output = session
                .execute(&command, timeout)
                .map_err(|e| failure(&session, e))?;
            print!("{}", output);
        }

        Ok(())
    }

    fn mode(&self, configured: ExecutionMode) -> ExecutionMode {
        if self.slurm {
            ExecutionMode::Slurm
        } else if self.direct {
            ExecutionMode::Direct
        } else {
            configured
        }
    }
}

/// Quotes `args` into one command line, wrapped in `srun --pty` in slurm
/// mode, that runs from `working_directory`.
fn build_remote_command(args: &[String], mode: ExecutionMode, working_directory: &str) -> String {
    let mut line = args
        .iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    if mode == ExecutionMode::Slurm {
        line = format!("srun --pty {}", line);
    }

    // "~" means the working directory lookup failed; the login shell starts there.
    match working_directory {
        "" | "~" => line,
        dir => format!("cd {} && {}", shell_quote(dir), line),
    }
}
