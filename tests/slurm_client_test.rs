use hpc_bridge::config::SessionConfig;
use hpc_bridge::remote::CommandRunner;
use hpc_bridge::slurm::{
    JobOptions, OptionValue, QueueScope, QueueSelection, SlurmClient, STATE_INVALID_ID, STATE_NOT_FOUND,
    STATE_QUERY_FAILED,
};
use hpc_bridge::{BridgeError, ErrorKind, Result};
use std::collections::VecDeque;
use std::time::Duration;

/// Replies to commands from a script and records what it was asked to run.
struct ScriptedRunner {
    user: Option<String>,
    replies: VecDeque<Result<String>>,
    commands: Vec<String>,
}

impl ScriptedRunner {
    fn new(user: Option<&str>) -> Self {
        Self {
            user: user.map(str::to_string),
            replies: VecDeque::new(),
            commands: Vec::new(),
        }
    }

    fn reply(mut self, output: &str) -> Self {
        self.replies.push_back(Ok(output.to_string()));
        self
    }

    fn fail(mut self, error: BridgeError) -> Self {
        self.replies.push_back(Err(error));
        self
    }
}

impl CommandRunner for ScriptedRunner {
    fn run_command(&mut self, command: &str, _timeout: Duration) -> Result<String> {
        self.commands.push(command.to_string());
        self.replies
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    fn remote_user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

const QUEUE_OUTPUT: &str = "\
1001|gpu|train|alice|R|1:02:03|2|node[01-02]|2024-01-01T08:00:00
1002|gpu|eval|alice|PD|0:00|1|(Priority)|2024-01-01T09:00:00
1003|cpu|prep|alice|PD|0:00|1|(Resources)|N/A
";

#[test]
fn test_submit_returns_job_id_and_sends_heredoc() {
    let runner = ScriptedRunner::new(Some("alice")).reply("Submitted batch job 12345\n");
    let mut client = SlurmClient::new(runner);

    let options = JobOptions::new().set("partition", "gpu").flag("exclusive");
    let job_id = client
        .submit("#!/bin/bash\nsrun hostname\n", &options)
        .unwrap();
    assert_eq!(job_id, "12345");

    let sent = &client.runner().commands[0];
    assert!(sent.starts_with("sbatch --partition=gpu --exclusive <<'HPCBRIDGE_EOF_"));
    assert!(sent.contains("srun hostname\n"));
}

#[test]
fn test_submit_without_job_id_reports_command_and_output() {
    let runner =
        ScriptedRunner::new(Some("alice")).reply("sbatch: error: invalid partition specified: nope");
    let mut client = SlurmClient::new(runner);

    let err = client
        .submit("echo hi", &JobOptions::new().set("partition", "nope"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unparseable);
    match err {
        BridgeError::Submission { command, output } => {
            assert!(command.starts_with("sbatch --partition=nope"));
            assert!(output.contains("invalid partition"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_submit_propagates_transport_errors() {
    let runner = ScriptedRunner::new(None).fail(BridgeError::NotConnected);
    let mut client = SlurmClient::new(runner);
    let err = client.submit("echo hi", &JobOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}

#[test]
fn test_query_current_user_with_summary() {
    let runner = ScriptedRunner::new(Some("alice")).reply(QUEUE_OUTPUT);
    let mut client = SlurmClient::new(runner);

    let report = client.query(&QueueScope::CurrentUser, true).unwrap();
    assert_eq!(report.jobs.len(), 3);
    assert_eq!(report.jobs[0].state, "R");
    assert_eq!(report.jobs[1].job_id, "1002");

    let summary = report.waiting_summary.expect("summary requested");
    assert_eq!(summary.pending_count, 2);
    assert_eq!(summary.sampled_count, 1);
    assert!(summary.has_statistics());

    let sent = &client.runner().commands[0];
    assert!(sent.starts_with("squeue -h -o '%i|%P|%j|%u|%t|%M|%D|%R|%V'"));
    assert!(sent.ends_with(" -u alice"));
}

#[test]
fn test_query_scopes_build_distinct_commands() {
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("")
        .reply("");
    let mut client = SlurmClient::new(runner);

    let report = client.query(&QueueScope::AllUsers, false).unwrap();
    assert!(report.jobs.is_empty());
    assert!(report.waiting_summary.is_none());
    client
        .query(&QueueScope::Job("77".to_string()), false)
        .unwrap();

    let commands = &client.runner().commands;
    assert!(!commands[0].contains(" -u ") && !commands[0].contains(" -j "));
    assert!(commands[1].ends_with(" -j 77"));
}

#[test]
fn test_query_current_user_needs_a_username() {
    let mut client = SlurmClient::new(ScriptedRunner::new(None));
    let err = client.query(&QueueScope::CurrentUser, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(client.runner().commands.is_empty());
}

#[test]
fn test_conflicting_selection_is_rejected_before_running() {
    let mut client = SlurmClient::new(ScriptedRunner::new(Some("alice")));
    let selection = QueueSelection {
        job_id: Some("5".to_string()),
        user: false,
        all: true,
    };
    let err = client.query_selection(&selection, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(client.runner().commands.is_empty());
}

#[test]
fn test_query_tolerates_banner_and_malformed_rows() {
    let output = "\
Welcome to the cluster. Maintenance on Friday.
1001|gpu|train|alice|R|1:02:03|2|node01|2024-01-01T08:00:00
garbage line without delimiters
1002|gpu|eval|alice|PD|0:00|1|(Priority)|2024-01-01T09:00:00
";
    let runner = ScriptedRunner::new(Some("alice")).reply(output);
    let mut client = SlurmClient::new(runner);

    let report = client.query(&QueueScope::CurrentUser, false).unwrap();
    let ids: Vec<&str> = report.jobs.iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, vec!["1001", "1002"]);
}

#[test]
fn test_query_reports_scheduler_errors() {
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("squeue: error: slurm_load_jobs error: Unable to contact slurm controller");
    let mut client = SlurmClient::new(runner);

    let err = client.query(&QueueScope::CurrentUser, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteFailure);
}

#[test]
fn test_job_status_found() {
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("1002|gpu|eval|alice|PD|0:00|1|(Priority)|2024-01-01T09:00:00\n");
    let mut client = SlurmClient::new(runner);

    let record = client.job_status("1002");
    assert_eq!(record.job_id, "1002");
    assert_eq!(record.state_name(), "PENDING");
    assert!(record.submit_time.is_some());
}

#[test]
fn test_job_status_synthetic_states() {
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("slurm_load_jobs error: Invalid job id specified")
        .fail(BridgeError::Timeout("squeue".to_string()));
    let mut client = SlurmClient::new(runner);

    let invalid = client.job_status("12; rm -rf ~");
    assert_eq!(invalid.state, STATE_INVALID_ID);
    assert!(client.runner().commands.is_empty());

    let gone = client.job_status("4242");
    assert_eq!(gone.state, STATE_NOT_FOUND);

    let failed = client.job_status("4243");
    assert_eq!(failed.state, STATE_QUERY_FAILED);
    assert!(!failed.reason.is_empty());
}

#[test]
fn test_configured_singularity_default_is_injected() {
    let config = SessionConfig::new("login.example.org").with_slurm_use_singularity(true);
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("Submitted batch job 1\n")
        .reply("Submitted batch job 2\n")
        .reply("Submitted batch job 3\n");
    let mut client = SlurmClient::new(runner).with_config(&config);

    let options = JobOptions::new().set("partition", "gpu");
    client.submit("echo hi", &options).unwrap();
    assert!(client.runner().commands[0].starts_with("sbatch --partition=gpu --singularity <<"));
    // The caller's options are left as given.
    assert!(!options.contains("singularity"));

    client
        .submit("echo hi", &JobOptions::new().flag("docker"))
        .unwrap();
    assert!(!client.runner().commands[1].contains("--singularity"));

    let mut opted_out = JobOptions::new();
    opted_out.insert("--singularity", OptionValue::Flag(false));
    client.submit("echo hi", &opted_out).unwrap();
    assert!(client.runner().commands[2].starts_with("sbatch <<"));
}

#[test]
fn test_singularity_not_injected_by_default() {
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("Submitted batch job 1\n")
        .reply("Submitted batch job 2\n");
    let mut client = SlurmClient::new(runner);

    client.submit("echo hi", &JobOptions::new()).unwrap();
    assert!(!client.runner().commands[0].contains("--singularity"));

    let mut client = SlurmClient::new(client.into_inner()).with_singularity_default(true);
    client.submit("echo hi", &JobOptions::new()).unwrap();
    assert!(client.runner().commands[1].starts_with("sbatch --singularity <<"));
}

#[test]
fn test_job_status_ignores_rows_for_other_ids() {
    let runner = ScriptedRunner::new(Some("alice"))
        .reply("123_4|gpu|train|alice|R|0:10|1|node01|2024-01-01T08:00:00\n");
    let mut client = SlurmClient::new(runner);

    let record = client.job_status("123");
    assert_eq!(record.state, STATE_NOT_FOUND);
    assert_eq!(record.job_id, "123");
}

#[test]
fn test_borrowed_runner_stays_with_caller() {
    let mut runner = ScriptedRunner::new(Some("alice"))
        .reply("Submitted batch job 9\n")
        .reply(QUEUE_OUTPUT);

    {
        let mut client = SlurmClient::new(&mut runner)
            .with_submit_timeout(Duration::from_secs(5))
            .with_query_timeout(Duration::from_secs(5));
        assert_eq!(client.submit("echo hi", &JobOptions::new()).unwrap(), "9");
    }
    assert_eq!(runner.commands.len(), 1);

    let mut client = SlurmClient::new(&mut runner);
    assert_eq!(client.query(&QueueScope::AllUsers, false).unwrap().jobs.len(), 3);
    assert_eq!(runner.commands.len(), 2);
}

#[test]
fn test_report_serializes_to_json() {
    let runner = ScriptedRunner::new(Some("alice")).reply(QUEUE_OUTPUT);
    let mut client = SlurmClient::new(runner);
    let report = client.query(&QueueScope::CurrentUser, true).unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["jobs"].as_array().unwrap().len(), 3);
    assert_eq!(value["jobs"][0]["job_id"], "1001");
    assert_eq!(value["waiting_summary"]["pending_count"], 2);
}
