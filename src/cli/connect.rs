use anyhow::Result;
use clap::Args;

use super::{failure, ConnectionArgs};

#[derive(Args)]
#[command(about = "Connect to the login node and report where commands will run")]
pub struct ConnectCommand {}

impl ConnectCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        let mut session = connection.open_session()?;
        let info = session.probe().map_err(|e| failure(&session, e))?;

        println!("Connected to {}", session.host());
        println!("  User: {}", session.username().unwrap_or("<unknown>"));
        println!("  Port: {}", session.port());
        println!("  Authentication: {}", session.auth_method());
        if let Some(key) = session.key_path() {
            println!("  Key: {}", key.display());
        }
        println!("  Remote hostname: {}", info.hostname);
        println!("  Working directory: {}", info.working_directory);
        println!("  Execution mode: {}", session.config().execution_mode);
        if session.config().slurm_use_singularity {
            println!("  Batch jobs: --singularity by default");
        }

        session.disconnect();
        Ok(())
    }
}
