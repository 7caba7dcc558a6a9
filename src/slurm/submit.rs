//! Job submission through `sbatch`.
//!
//! The script body travels inside a quoted heredoc, so nothing in it is
//! expanded by the login shell. Success is detected from the
//! `Submitted batch job <id>` line alone.

use crate::error::{Error, Result};
use crate::remote::CommandRunner;
use log::{debug, info};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use uuid::Uuid;

const SUBMIT_COMMAND: &str = "sbatch";

const SINGULARITY_OPTION: &str = "singularity";
const DOCKER_OPTION: &str = "docker";

/// Value of one `sbatch` option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// `true` renders as a bare `--key`; `false` drops the option.
    Flag(bool),
    Text(String),
    Number(serde_json::Number),
}

impl OptionValue {
    fn is_truthy(&self) -> bool {
        match self {
            OptionValue::Flag(b) => *b,
            OptionValue::Text(s) => !s.is_empty(),
            OptionValue::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        }
    }
}

/// `sbatch` options in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    entries: Vec<(String, OptionValue)>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bare flag such as `--exclusive`.
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.insert(key, OptionValue::Flag(true));
        self
    }

    /// Adds `--key=value`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, OptionValue::Text(value.into()));
        self
    }

    /// Adds or replaces an option, keeping its original position on replace.
    ///
    /// `nodes` and `--nodes` name the same option.
    pub fn insert(&mut self, key: impl Into<String>, value: OptionValue) {
        let key = key.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| option_name(k) == option_name(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(k, _)| option_name(k) == option_name(key))
            .map(|(_, value)| value)
    }

    /// Adds `--singularity` when `use_singularity` is set and the caller
    /// named neither `singularity` nor `docker`. An explicit
    /// `singularity: false` is left alone.
    pub fn apply_singularity_default(&mut self, use_singularity: bool) {
        if !use_singularity {
            return;
        }
        if self.contains(SINGULARITY_OPTION) {
            debug!("Keeping caller's --{} setting", SINGULARITY_OPTION);
            return;
        }
        if self.contains(DOCKER_OPTION) {
            debug!("--{} given, not adding --{}", DOCKER_OPTION, SINGULARITY_OPTION);
            return;
        }
        info!("Adding --{} to job options from configuration", SINGULARITY_OPTION);
        self.insert(SINGULARITY_OPTION, OptionValue::Flag(true));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds options from a JSON object such as `{"--nodes": 1, "exclusive": true}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::Configuration("Job options must be a JSON object".to_string())
        })?;

        let mut options = JobOptions::new();
        for (key, value) in object {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::Bool(b) => OptionValue::Flag(*b),
                serde_json::Value::Number(n) => OptionValue::Number(n.clone()),
                serde_json::Value::String(s) => OptionValue::Text(s.clone()),
                other => OptionValue::Text(other.to_string()),
            };
            options.insert(key.clone(), value);
        }
        Ok(options)
    }

    /// Renders each truthy option as `--key` or `--key=<quoted value>`.
    pub fn render(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, value)| value.is_truthy())
            .filter_map(|(key, value)| {
                let name = option_name(key);
                if name.is_empty() {
                    return None;
                }
                Some(match value {
                    OptionValue::Flag(_) => format!("--{}", name),
                    OptionValue::Text(s) => format!("--{}={}", name, shell_quote(s)),
                    OptionValue::Number(n) => format!("--{}={}", name, n),
                })
            })
            .collect()
    }
}

fn option_name(key: &str) -> &str {
    key.trim().trim_start_matches('-')
}

/// Quotes `s` for a POSIX shell, leaving plainly safe strings untouched.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

fn heredoc_marker(script: &str) -> String {
    loop {
        let marker = format!("HPCBRIDGE_EOF_{}", Uuid::new_v4().simple());
        if !script.contains(&marker) {
            return marker;
        }
    }
}

/// Builds the complete `sbatch` invocation with the script in a heredoc.
pub fn build_submit_command(script: &str, options: &JobOptions) -> Result<String> {
    if script.trim().is_empty() {
        return Err(Error::Configuration(
            "Job script content is empty".to_string(),
        ));
    }

    let mut command = String::from(SUBMIT_COMMAND);
    for option in options.render() {
        command.push(' ');
        command.push_str(&option);
    }

    let marker = heredoc_marker(script);
    command.push_str(&format!(" <<'{}'\n", marker));
    command.push_str(script);
    if !script.ends_with('\n') {
        command.push('\n');
    }
    command.push_str(&marker);

    Ok(command)
}

fn job_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Submitted batch job (\d+)").expect("valid regex"))
}

/// Extracts the job id from `sbatch` output.
pub fn parse_job_id(output: &str) -> Option<String> {
    job_id_regex()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Submits `script` and returns the id the scheduler assigned.
pub fn submit<R: CommandRunner>(
    runner: &mut R,
    script: &str,
    options: &JobOptions,
    timeout: Duration,
) -> Result<String> {
    let command = build_submit_command(script, options)?;
    debug!("Submission command:\n{}", command);

    let output = runner.run_command(&command, timeout)?;

    match parse_job_id(&output) {
        Some(job_id) => {
            info!("Submitted batch job {}", job_id);
            Ok(job_id)
        }
        None => Err(Error::Submission { command, output }),
    }
}
