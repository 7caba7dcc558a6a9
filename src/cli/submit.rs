use anyhow::{Context, Result};
use clap::Args;
use hpc_bridge::slurm::{JobOptions, SlurmClient};
use std::fs;
use std::path::PathBuf;

use super::{failure, ConnectionArgs};

#[derive(Args)]
#[command(about = "Submit a batch script with sbatch")]
pub struct SubmitCommand {
    /// Local job script to submit
    script: PathBuf,

    /// sbatch options as a JSON object, e.g. '{"--nodes": 2, "--exclusive": true}'
    options: Option<String>,

    /// Print only the job id
    #[arg(short, long)]
    quiet: bool,
}

impl SubmitCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        let script = fs::read_to_string(&self.script)
            .with_context(|| format!("Failed to read job script {}", self.script.display()))?;
        let options = self.parse_options()?;

        let config = connection.session_config()?;
        let session = connection.open_session()?;
        let mut client = SlurmClient::new(session).with_config(&config);

        let job_id = match client.submit(&script, &options) {
            Ok(id) => id,
            Err(e) => return Err(failure(client.runner(), e)),
        };

        if self.quiet {
            println!("{}", job_id);
        } else {
            println!("Submitted batch job {}", job_id);
        }
        Ok(())
    }

    fn parse_options(&self) -> Result<JobOptions> {
        match &self.options {
            Some(raw) => {
                let value: serde_json::Value =
                    serde_json::from_str(raw).context("Job options are not valid JSON")?;
                Ok(JobOptions::from_json(&value)?)
            }
            None => Ok(JobOptions::new()),
        }
    }
}
