//! Wait-time statistics for pending jobs.
//!
//! Elapsed time is measured against the local clock. Slurm prints submit
//! times in the cluster's local time without an offset, so both sides are
//! compared as naive local timestamps; skew between the two clocks shows up
//! as negative samples, which are dropped.

use crate::slurm::record::JobRecord;
use chrono::{Local, NaiveDateTime};
use log::{debug, warn};
use serde::Serialize;

/// Summary of how long pending jobs have been waiting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitSummary {
    /// Every pending job, including those without a usable submit time
    pub pending_count: usize,
    /// Pending jobs that contributed a wait sample
    pub sampled_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_wait_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_wait_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_wait_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_wait_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WaitSummary {
    fn without_samples(pending_count: usize, message: &str) -> Self {
        Self {
            pending_count,
            sampled_count: 0,
            min_wait_seconds: None,
            avg_wait_seconds: None,
            max_wait_seconds: None,
            min_wait_human: None,
            avg_wait_human: None,
            max_wait_human: None,
            message: Some(message.to_string()),
        }
    }

    pub fn has_statistics(&self) -> bool {
        self.avg_wait_seconds.is_some()
    }
}

/// Summarizes pending jobs against the current local time.
pub fn summarize(jobs: &[JobRecord]) -> WaitSummary {
    summarize_at(jobs, Local::now().naive_local())
}

/// Summarizes pending jobs against `now`.
pub fn summarize_at(jobs: &[JobRecord], now: NaiveDateTime) -> WaitSummary {
    let pending: Vec<&JobRecord> = jobs.iter().filter(|job| job.is_pending()).collect();
    let submitted: Vec<NaiveDateTime> = pending.iter().filter_map(|job| job.submit_time).collect();

    if submitted.is_empty() {
        let message = if pending.is_empty() {
            "No pending jobs found."
        } else {
            "No pending jobs with a parseable submit time."
        };
        return WaitSummary::without_samples(pending.len(), message);
    }

    let mut waits: Vec<i64> = Vec::with_capacity(submitted.len());
    for submit_time in submitted {
        let elapsed = (now - submit_time).num_seconds();
        if elapsed < 0 {
            debug!(
                "Ignoring negative wait of {}s (submit time {})",
                elapsed, submit_time
            );
            continue;
        }
        waits.push(elapsed);
    }

    if waits.is_empty() {
        warn!("All pending submit times are in the future; clocks may be out of sync");
        return WaitSummary::without_samples(
            pending.len(),
            "Submit times of pending jobs are ahead of the local clock.",
        );
    }

    let min = waits.iter().copied().min().unwrap_or_default();
    let max = waits.iter().copied().max().unwrap_or_default();
    let avg = waits.iter().sum::<i64>() as f64 / waits.len() as f64;

    WaitSummary {
        pending_count: pending.len(),
        sampled_count: waits.len(),
        min_wait_seconds: Some(min),
        avg_wait_seconds: Some(avg),
        max_wait_seconds: Some(max),
        min_wait_human: Some(format_duration(min)),
        avg_wait_human: Some(format_duration(avg as i64)),
        max_wait_human: Some(format_duration(max)),
        message: None,
    }
}

/// Renders whole seconds as `H:MM:SS`, prefixed with days when needed.
pub fn format_duration(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}
