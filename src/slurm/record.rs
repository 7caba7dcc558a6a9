use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// State reported for a job id that is not a valid Slurm id.
pub const STATE_INVALID_ID: &str = "INVALID_ID";
/// State reported when the queue has no entry for the job.
pub const STATE_NOT_FOUND: &str = "NOT_FOUND";
/// State reported when the queue could not be queried at all.
pub const STATE_QUERY_FAILED: &str = "QUERY_FAILED";

/// One row of `squeue` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub partition: String,
    pub name: String,
    pub user: String,
    /// Compact state code (`PD`, `R`, `CG`, ...)
    pub state: String,
    pub time_used: String,
    pub nodes: String,
    pub reason: String,
    pub submit_time_raw: String,
    /// `None` when `submit_time_raw` could not be parsed
    pub submit_time: Option<NaiveDateTime>,
}

impl JobRecord {
    /// A record that stands in for a job the queue could not describe.
    pub fn synthetic(job_id: &str, state: &str, reason: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            partition: String::new(),
            name: String::new(),
            user: String::new(),
            state: state.to_string(),
            time_used: String::new(),
            nodes: String::new(),
            reason: reason.into(),
            submit_time_raw: String::new(),
            submit_time: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == "PD"
    }

    /// Long name for the compact state code.
    pub fn state_name(&self) -> &str {
        match self.state.as_str() {
            "PD" => "PENDING",
            "R" => "RUNNING",
            "CG" => "COMPLETING",
            "CD" => "COMPLETED",
            "CF" => "CONFIGURING",
            "CA" => "CANCELLED",
            "F" => "FAILED",
            "TO" => "TIMEOUT",
            "NF" => "NODE_FAIL",
            "PR" => "PREEMPTED",
            "OOM" => "OUT_OF_MEMORY",
            "S" => "SUSPENDED",
            "ST" => "STOPPED",
            "BF" => "BOOT_FAIL",
            "DL" => "DEADLINE",
            "RQ" => "REQUEUED",
            "RS" => "RESIZING",
            "SE" => "SPECIAL_EXIT",
            other => other,
        }
    }
}
