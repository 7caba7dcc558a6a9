//! Queue queries through `squeue`.
//!
//! `squeue` is asked for a fixed pipe-delimited format without a header.
//! Parsing is split in two: [`SqueueFormat`] is the strict per-line grammar,
//! and [`scan_records`] is the tolerant scanner that skips banner lines
//! before the first real row and drops malformed rows after it.

use crate::error::{Error, Result};
use crate::remote::CommandRunner;
use crate::slurm::record::{
    JobRecord, STATE_INVALID_ID, STATE_NOT_FOUND, STATE_QUERY_FAILED,
};
use crate::slurm::submit::shell_quote;
use crate::slurm::wait::{summarize, WaitSummary};
use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Column names, in output order.
pub const SQUEUE_FIELDS: [&str; 9] = [
    "jobid",
    "partition",
    "name",
    "user",
    "state",
    "time",
    "nodes",
    "reason",
    "submit_time",
];

/// `squeue -o` format producing [`SQUEUE_FIELDS`].
pub const SQUEUE_FORMAT: &str = "%i|%P|%j|%u|%t|%M|%D|%R|%V";

pub const FIELD_DELIMITER: char = '|';

/// Which jobs a query covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueueScope {
    Job(String),
    #[default]
    CurrentUser,
    AllUsers,
}

/// Flag-style scope selection as it arrives from a command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSelection {
    pub job_id: Option<String>,
    pub user: bool,
    pub all: bool,
}

impl QueueSelection {
    /// Turns the flags into a scope; nothing set means the current user.
    pub fn resolve(&self) -> Result<QueueScope> {
        let job_id = self
            .job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let selected = [job_id.is_some(), self.user, self.all]
            .iter()
            .filter(|set| **set)
            .count();
        if selected > 1 {
            return Err(Error::Configuration(
                "Only one of job id, user or all may be given".to_string(),
            ));
        }

        Ok(match (job_id, self.user, self.all) {
            (Some(id), _, _) => QueueScope::Job(id.to_string()),
            (None, _, true) => QueueScope::AllUsers,
            _ => {
                debug!("No queue scope given, defaulting to current user");
                QueueScope::CurrentUser
            }
        })
    }
}

/// Parsed queue plus the optional wait summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueReport {
    pub jobs: Vec<JobRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_summary: Option<WaitSummary>,
}

/// Builds the `squeue` command for `scope`.
pub fn build_query_command(scope: &QueueScope, current_user: Option<&str>) -> Result<String> {
    let mut command = format!("squeue -h -o '{}'", SQUEUE_FORMAT);
    match scope {
        QueueScope::Job(job_id) => {
            command.push_str(" -j ");
            command.push_str(&shell_quote(job_id));
        }
        QueueScope::CurrentUser => {
            let user = current_user
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    Error::Configuration(
                        "Cannot query the current user's jobs: username unknown".to_string(),
                    )
                })?;
            command.push_str(" -u ");
            command.push_str(&shell_quote(user));
        }
        QueueScope::AllUsers => {}
    }
    Ok(command)
}

/// Why a line did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    FieldCount { expected: usize, found: usize },
    EmptyJobId,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::FieldCount { expected, found } => {
                write!(f, "expected {} fields, found {}", expected, found)
            }
            LineError::EmptyJobId => write!(f, "empty job id"),
        }
    }
}

/// Strict grammar for one line of scheduler output.
pub trait LineParser {
    /// Whether `line` looks like the first real data row.
    fn is_data_start(&self, line: &str) -> bool;

    fn parse_line(&self, line: &str) -> std::result::Result<JobRecord, LineError>;
}

/// The [`SQUEUE_FORMAT`] grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqueueFormat;

impl SqueueFormat {
    fn split(line: &str) -> Vec<&str> {
        line.split(FIELD_DELIMITER).map(str::trim).collect()
    }
}

impl LineParser for SqueueFormat {
    fn is_data_start(&self, line: &str) -> bool {
        let fields = Self::split(line);
        fields.len() == SQUEUE_FIELDS.len() && is_numeric_job_id(fields[0])
    }

    fn parse_line(&self, line: &str) -> std::result::Result<JobRecord, LineError> {
        let fields = Self::split(line);
        if fields.len() != SQUEUE_FIELDS.len() {
            return Err(LineError::FieldCount {
                expected: SQUEUE_FIELDS.len(),
                found: fields.len(),
            });
        }
        if fields[0].is_empty() {
            return Err(LineError::EmptyJobId);
        }

        let submit_time_raw = fields[8].to_string();
        let submit_time = parse_submit_time(&submit_time_raw);
        if submit_time.is_none() {
            debug!(
                "Unparseable submit time '{}' for job {}",
                submit_time_raw, fields[0]
            );
        }

        Ok(JobRecord {
            job_id: fields[0].to_string(),
            partition: fields[1].to_string(),
            name: fields[2].to_string(),
            user: fields[3].to_string(),
            state: fields[4].to_string(),
            time_used: fields[5].to_string(),
            nodes: fields[6].to_string(),
            reason: fields[7].to_string(),
            submit_time_raw,
            submit_time,
        })
    }
}

/// Digits, optionally followed by an array suffix (`123_4`, `123_[1-9]`).
fn is_numeric_job_id(field: &str) -> bool {
    let base = field.split('_').next().unwrap_or_default();
    !base.is_empty() && base.chars().all(|c| c.is_ascii_digit())
}

/// Parses output leniently: leading noise is skipped and bad rows dropped.
pub fn scan_records<P: LineParser>(parser: &P, output: &str) -> Vec<JobRecord> {
    let lines: Vec<&str> = output.lines().collect();

    let Some(start) = lines.iter().position(|line| parser.is_data_start(line)) else {
        if !output.trim().is_empty() {
            debug!("No queue rows found in scheduler output");
        }
        return Vec::new();
    };
    for banner in &lines[..start] {
        if !banner.trim().is_empty() {
            debug!("Skipping scheduler banner line: {}", banner);
        }
    }

    let mut records = Vec::new();
    for line in &lines[start..] {
        if line.trim().is_empty() {
            continue;
        }
        match parser.parse_line(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed queue line ({}): {}", e, line),
        }
    }
    records
}

/// Parses `squeue` output in [`SQUEUE_FORMAT`].
pub fn parse_queue_output(output: &str) -> Vec<JobRecord> {
    scan_records(&SqueueFormat, output)
}

const SUBMIT_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a scheduler timestamp; `None` for `N/A`, `Unknown` and the like.
pub fn parse_submit_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(parsed) = SUBMIT_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(parsed);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}

/// Text that marks a failed `squeue` run even when stdout is non-empty.
const QUERY_ERROR_MARKERS: [&str; 3] = ["squeue: error:", "command not found", "slurm_load_jobs error"];

const INVALID_JOB_ID_MARKER: &str = "Invalid job id specified";

/// Runs the query for `scope` and parses the result.
pub fn query<R: CommandRunner>(
    runner: &mut R,
    scope: &QueueScope,
    want_summary: bool,
    timeout: Duration,
) -> Result<QueueReport> {
    let command = build_query_command(scope, runner.remote_user())?;
    info!("Querying Slurm queue: {}", command);

    let output = runner.run_command(&command, timeout)?;
    let jobs = parse_queue_output(&output);

    if jobs.is_empty() {
        // A finished job falls out of the queue and squeue reports its id as invalid.
        if matches!(scope, QueueScope::Job(_)) && output.contains(INVALID_JOB_ID_MARKER) {
            debug!("squeue no longer knows the job: {}", output.trim());
        } else if QUERY_ERROR_MARKERS.iter().any(|m| output.contains(m)) {
            return Err(Error::RemoteExecution(format!(
                "squeue failed\n\nCommand:\n{}\n\nOutput:\n{}",
                command, output
            )));
        }
    }

    debug!("Parsed {} job records", jobs.len());
    let waiting_summary = want_summary.then(|| summarize(&jobs));
    Ok(QueueReport {
        jobs,
        waiting_summary,
    })
}

fn is_valid_job_id(job_id: &str) -> bool {
    let mut parts = job_id.splitn(2, '_');
    let base = parts.next().unwrap_or_default();
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    digits(base) && parts.next().map_or(true, digits)
}

/// Looks up one job and never fails.
///
/// Problems come back as a synthetic record whose state is one of
/// [`STATE_INVALID_ID`], [`STATE_NOT_FOUND`] or [`STATE_QUERY_FAILED`].
pub fn job_status<R: CommandRunner>(runner: &mut R, job_id: &str, timeout: Duration) -> JobRecord {
    let job_id = job_id.trim();
    if !is_valid_job_id(job_id) {
        return JobRecord::synthetic(
            job_id,
            STATE_INVALID_ID,
            format!("'{}' is not a valid Slurm job id", job_id),
        );
    }

    match query(runner, &QueueScope::Job(job_id.to_string()), false, timeout) {
        Ok(report) => {
            // squeue may answer with array element rows such as `123_4`; only an
            // exact id match counts.
            let mut jobs = report.jobs;
            match jobs.iter().position(|job| job.job_id == job_id) {
                Some(index) => jobs.swap_remove(index),
                None => JobRecord::synthetic(
                    job_id,
                    STATE_NOT_FOUND,
                    "Job is not in the queue (it may have finished)",
                ),
            }
        }
        Err(e) => {
            warn!("Status query for job {} failed: {}", job_id, e);
            JobRecord::synthetic(job_id, STATE_QUERY_FAILED, e.to_string())
        }
    }
}
