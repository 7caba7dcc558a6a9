use anyhow::Result;
use clap::Args;
use hpc_bridge::slurm::{JobRecord, QueueReport, QueueSelection, SlurmClient, WaitSummary};

use super::{failure, ConnectionArgs};

#[derive(Args)]
#[command(about = "Show jobs in the Slurm queue")]
pub struct StatusCommand {
    /// Only this job
    #[arg(short, long)]
    job_id: Option<String>,

    /// Jobs of the connecting user (the default)
    #[arg(short, long)]
    user: bool,

    /// Jobs of all users
    #[arg(short, long)]
    all: bool,

    /// Add wait-time statistics for pending jobs
    #[arg(short, long)]
    waiting_summary: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl StatusCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        let selection = QueueSelection {
            job_id: self.job_id.clone(),
            user: self.user,
            all: self.all,
        };
        // Reject conflicting selectors before opening a connection.
        let scope = selection.resolve()?;

        let config = connection.session_config()?;
        let session = connection.open_session()?;
        let mut client = SlurmClient::new(session).with_config(&config);

        let report = match client.query(&scope, self.waiting_summary) {
            Ok(report) => report,
            Err(e) => return Err(failure(client.runner(), e)),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &QueueReport) {
    if report.jobs.is_empty() {
        println!("No jobs found.");
    } else {
        println!(
            "{:<12} {:<10} {:<20} {:<10} {:<4} {:>10} {:>5}  {}",
            "JOBID", "PARTITION", "NAME", "USER", "ST", "TIME", "NODES", "REASON"
        );
        println!("{:-<100}", "");
        for job in &report.jobs {
            print_job(job);
        }
        println!();
        println!("{} job(s)", report.jobs.len());
    }

    if let Some(summary) = &report.waiting_summary {
        println!();
        print_summary(summary);
    }
}

fn print_job(job: &JobRecord) {
    println!(
        "{:<12} {:<10} {:<20} {:<10} {:<4} {:>10} {:>5}  {}",
        job.job_id,
        truncate(&job.partition, 10),
        truncate(&job.name, 20),
        truncate(&job.user, 10),
        job.state,
        job.time_used,
        job.nodes,
        job.reason
    );
}

fn print_summary(summary: &WaitSummary) {
    println!("Pending jobs: {}", summary.pending_count);
    if let Some(message) = &summary.message {
        println!("  {}", message);
    }
    if !summary.has_statistics() {
        return;
    }
    println!("  Sampled: {}", summary.sampled_count);
    let rows = [
        ("Min wait", &summary.min_wait_human),
        ("Avg wait", &summary.avg_wait_human),
        ("Max wait", &summary.max_wait_human),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
