use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn hpc_bridge(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hpc-bridge"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("HPC_BRIDGE_PASSWORD")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to run hpc-bridge")
}

#[test]
fn test_config_init_then_show() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("nested").join("config.yml");

    let output = hpc_bridge(
        &config,
        &["--host", "login.example.org", "--user", "alice", "config", "init"],
    );
    assert!(output.status.success(), "{:?}", output);
    assert!(config.exists());

    let contents = fs::read_to_string(&config).unwrap();
    assert!(contents.contains("login.example.org"));
    assert!(contents.contains("alice"));
    assert!(!contents.contains("password"));
    assert!(contents.contains("execution_mode: direct"));
    assert!(contents.contains("slurm_use_singularity: false"));

    let output = hpc_bridge(&config, &["config", "show"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("alice@login.example.org"));
}

#[test]
fn test_config_init_does_not_overwrite_without_force() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.yml");
    fs::write(&config, "hpc:\n  host: keep.example.org\n").unwrap();

    let output = hpc_bridge(&config, &["--host", "other.example.org", "config", "init"]);
    assert!(output.status.success());
    assert!(fs::read_to_string(&config).unwrap().contains("keep.example.org"));

    let output = hpc_bridge(
        &config,
        &["--host", "other.example.org", "config", "init", "--force"],
    );
    assert!(output.status.success());
    assert!(fs::read_to_string(&config).unwrap().contains("other.example.org"));
}

#[test]
fn test_status_rejects_conflicting_selectors() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.yml");

    let output = hpc_bridge(&config, &["status", "--job-id", "42", "--all"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Only one of job id, user or all"));
}

#[test]
fn test_connect_without_host_fails_with_hint() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("missing.yml");

    let output = hpc_bridge(&config, &["connect"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--host"));
}

#[test]
fn test_malformed_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.yml");
    fs::write(&config, "hpc: [not, a, mapping\n").unwrap();

    let output = hpc_bridge(&config, &["config", "show"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config file"));
}
