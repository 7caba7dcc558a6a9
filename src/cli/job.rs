use anyhow::Result;
use clap::Args;
use hpc_bridge::slurm::SlurmClient;

use super::ConnectionArgs;

#[derive(Args)]
#[command(about = "Show the status of one job")]
pub struct JobCommand {
    /// Slurm job id
    job_id: String,

    /// Print the record as JSON
    #[arg(long)]
    json: bool,
}

impl JobCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        let config = connection.session_config()?;
        let mut session = connection.open_session()?;

        let record = {
            let mut client = SlurmClient::new(&mut session).with_config(&config);
            client.job_status(&self.job_id)
        };
        session.disconnect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&record)?);
            return Ok(());
        }

        println!("Job {}", record.job_id);
        println!("  State: {} ({})", record.state_name(), record.state);
        if !record.name.is_empty() {
            println!("  Name: {}", record.name);
            println!("  User: {}", record.user);
            println!("  Partition: {}", record.partition);
            println!("  Time used: {}", record.time_used);
            println!("  Nodes: {}", record.nodes);
        }
        if !record.reason.is_empty() {
            println!("  Reason: {}", record.reason);
        }
        if !record.submit_time_raw.is_empty() {
            println!("  Submitted: {}", record.submit_time_raw);
        }
        Ok(())
    }
}
