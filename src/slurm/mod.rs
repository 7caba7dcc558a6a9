//! Slurm client layered on a remote command runner.
//!
//! The scheduler is driven through its command-line tools: `sbatch` for
//! submission and `squeue` for queue state, whose text output is parsed
//! into [`JobRecord`]s.

pub mod queue;
pub mod record;
pub mod submit;
pub mod wait;

pub use queue::{
    parse_queue_output, LineParser, QueueReport, QueueScope, QueueSelection, SqueueFormat,
};
pub use record::{JobRecord, STATE_INVALID_ID, STATE_NOT_FOUND, STATE_QUERY_FAILED};
pub use submit::{JobOptions, OptionValue};
pub use wait::{summarize, summarize_at, WaitSummary};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::remote::CommandRunner;
use std::time::Duration;

const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Scheduler operations over one runner.
///
/// `SlurmClient<SessionManager>` owns the session and closes it when dropped;
/// `SlurmClient<&mut SessionManager>` borrows one the caller keeps open.
pub struct SlurmClient<R: CommandRunner> {
    runner: R,
    submit_timeout: Duration,
    query_timeout: Duration,
    use_singularity: bool,
}

impl<R: CommandRunner> SlurmClient<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            use_singularity: false,
        }
    }

    /// Takes timeouts and the singularity default from a session configuration.
    pub fn with_config(mut self, config: &SessionConfig) -> Self {
        self.submit_timeout = Duration::from_secs(config.submit_timeout.max(1));
        self.query_timeout = Duration::from_secs(config.query_timeout.max(1));
        self.use_singularity = config.slurm_use_singularity;
        self
    }

    /// Whether submissions get `--singularity` unless they name a runtime.
    pub fn with_singularity_default(mut self, enabled: bool) -> Self {
        self.use_singularity = enabled;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    pub fn into_inner(self) -> R {
        self.runner
    }

    /// Submits a job script and returns its job id.
    pub fn submit(&mut self, script: &str, options: &JobOptions) -> Result<String> {
        let mut options = options.clone();
        options.apply_singularity_default(self.use_singularity);
        submit::submit(&mut self.runner, script, &options, self.submit_timeout)
    }

    /// Lists jobs in `scope`, optionally with a wait summary.
    pub fn query(&mut self, scope: &QueueScope, want_summary: bool) -> Result<QueueReport> {
        queue::query(&mut self.runner, scope, want_summary, self.query_timeout)
    }

    /// Like [`query`](Self::query) but takes flag-style selectors.
    pub fn query_selection(
        &mut self,
        selection: &QueueSelection,
        want_summary: bool,
    ) -> Result<QueueReport> {
        let scope = selection.resolve()?;
        self.query(&scope, want_summary)
    }

    /// Status of one job; failures become a synthetic record.
    pub fn job_status(&mut self, job_id: &str) -> JobRecord {
        queue::job_status(&mut self.runner, job_id, self.query_timeout)
    }
}
