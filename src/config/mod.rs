//! Configuration management for hpc-bridge.
//!
//! This module handles loading and saving the connection settings used to
//! reach the remote cluster.
//!
//! # Configuration File Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/hpc-bridge/config.yml`
//! - macOS: `~/Library/Application Support/hpc-bridge/config.yml`
//! - Windows: `C:\Users\<User>\AppData\Roaming\hpc-bridge\config.yml`
//!
//! # Example Configuration
//!
//! ```yaml
//! hpc:
//!   host: "login.cluster.example.org"
//!   username: "alice"
//!   port: 22
//!   auth_method: "key"
//!   key_dir: "~/.ssh"
//!   key_file: "id_ed25519"
//!   known_hosts: "~/.ssh/known_hosts"
//!   connect_timeout: 10
//!   execution_mode: "direct"
//!   slurm_use_singularity: false
//! ```
//!
//! Passwords are never written back to disk.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default SSH port
const DEFAULT_SSH_PORT: u16 = 22;

const DEFAULT_AUTH_METHOD: &str = "key";

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default timeout for scheduler commands in seconds
const DEFAULT_SCHEDULER_TIMEOUT: u64 = 60;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection settings for the cluster login node
    #[serde(default)]
    pub hpc: SessionConfig,
}

/// Where `run` executes commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// On the login node over plain SSH
    #[default]
    Direct,
    /// On a compute node through `srun --pty`
    Slurm,
}

impl ExecutionMode {
    /// Timeout for one command; allocations under `srun` may queue first.
    pub fn default_timeout(self) -> Duration {
        match self {
            ExecutionMode::Direct => Duration::from_secs(300),
            ExecutionMode::Slurm => Duration::from_secs(600),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Direct => f.write_str("direct"),
            ExecutionMode::Slurm => f.write_str("slurm"),
        }
    }
}

/// Settings for one remote session.
///
/// Fields missing from the file take their values from `Default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hostname or IP address of the login node
    pub host: Option<String>,

    /// SSH port (default: 22)
    pub port: u16,

    /// Remote username; falls back to the local OS user when unset
    pub username: Option<String>,

    /// Authentication method, `key` or `password`
    pub auth_method: String,

    /// Private key file name or path
    pub key_file: Option<String>,

    /// Directory a relative `key_file` is resolved against
    pub key_dir: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// OpenSSH known_hosts file
    pub known_hosts: Option<String>,

    /// Connection timeout in seconds
    pub connect_timeout: u64,

    /// Timeout for `sbatch` in seconds
    pub submit_timeout: u64,

    /// Timeout for `squeue` in seconds
    pub query_timeout: u64,

    /// Default mode for `run`
    pub execution_mode: ExecutionMode,

    /// Add `--singularity` to submissions that name no container runtime
    pub slurm_use_singularity: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_SSH_PORT,
            username: None,
            auth_method: DEFAULT_AUTH_METHOD.to_string(),
            key_file: None,
            key_dir: Some("~/.ssh".to_string()),
            password: None,
            known_hosts: Some("~/.ssh/known_hosts".to_string()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            submit_timeout: DEFAULT_SCHEDULER_TIMEOUT,
            query_timeout: DEFAULT_SCHEDULER_TIMEOUT,
            execution_mode: ExecutionMode::Direct,
            slurm_use_singularity: false,
        }
    }
}

impl Config {
    /// Returns the default configuration file path for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hpc-bridge").join("config.yml"))
    }

    /// Loads configuration from the default location.
    ///
    /// Returns `Ok(Config::default())` if no config file exists.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Loads configuration from a specific file path.
    ///
    /// Returns `Ok(Config::default())` if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read config file: {}\n\n\
                     File path: {}\n\n\
                     Suggestions:\n\
                     • Check file permissions: ls -la {}\n\
                     • Try recreating with: hpc-bridge config init",
                    e,
                    path.display(),
                    path.display()
                ),
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file: {}\n\n\
                 File path: {}\n\n\
                 Suggestions:\n\
                 • Check YAML syntax in the config file\n\
                 • Verify indentation uses spaces, not tabs\n\n\
                 Example valid config:\n\
                 hpc:\n\
                   host: \"login.cluster.example.org\"\n\
                   username: \"alice\"\n\
                   auth_method: \"key\"\n\
                   key_file: \"~/.ssh/id_ed25519\"",
                e,
                path.display()
            ))
        })
    }

    /// Saves configuration to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory\n\n\
                 Suggestions:\n\
                 • Check HOME environment variable is set\n\
                 • Verify XDG_CONFIG_HOME is accessible",
            ))
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Saves configuration to a specific file path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create config directory: {}\n\nDirectory: {}",
                        e,
                        parent.display()
                    ),
                ))
            })?;
        }

        let contents = serde_yaml::to_string(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to write config file: {}\n\nFile path: {}",
                    e,
                    path.display()
                ),
            ))
        })
    }
}

impl SessionConfig {
    /// Creates a configuration for `host` with defaults everywhere else.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_auth_method(mut self, method: impl Into<String>) -> Self {
        self.auth_method = method.into();
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<String>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_key_dir(mut self, key_dir: impl Into<String>) -> Self {
        self.key_dir = Some(key_dir.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_known_hosts(mut self, path: impl Into<String>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = seconds;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_slurm_use_singularity(mut self, enabled: bool) -> Self {
        self.slurm_use_singularity = enabled;
        self
    }

    /// Returns the SSH connection string (user@host:port).
    pub fn connection_string(&self) -> String {
        let host = self.host.as_deref().unwrap_or("<unset>");
        let target = match &self.username {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        };
        if self.port == DEFAULT_SSH_PORT {
            target
        } else {
            format!("{}:{}", target, self.port)
        }
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert!(config.host.is_none());
        assert_eq!(config.port, 22);
        assert_eq!(config.auth_method, "key");
        assert_eq!(config.connect_timeout, 10);
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new("login.example.org")
            .with_port(2222)
            .with_username("alice")
            .with_auth_method("password")
            .with_password("hunter2")
            .with_connect_timeout(5);

        assert_eq!(config.host.as_deref(), Some("login.example.org"));
        assert_eq!(config.port, 2222);
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.connect_timeout, 5);
    }

    #[test]
    fn test_connection_string() {
        let config = SessionConfig::new("login.example.org").with_username("alice");
        assert_eq!(config.connection_string(), "alice@login.example.org");
        assert_eq!(
            config.with_port(2222).connection_string(),
            "alice@login.example.org:2222"
        );
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = Config {
            hpc: SessionConfig::new("login.example.org").with_password("secret"),
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("login.example.org"));
        assert!(!yaml.contains("secret"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yml");

        let config = Config {
            hpc: SessionConfig::new("login.example.org")
                .with_username("alice")
                .with_key_file("id_ed25519"),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.hpc.host.as_deref(), Some("login.example.org"));
        assert_eq!(loaded.hpc.key_file.as_deref(), Some("id_ed25519"));
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.yml")).unwrap();
        assert!(config.hpc.host.is_none());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "hpc:\n  host: cluster\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.hpc.host.as_deref(), Some("cluster"));
        assert_eq!(config.hpc.port, 22);
        assert_eq!(config.hpc.query_timeout, 60);
        assert_eq!(config.hpc.key_dir.as_deref(), Some("~/.ssh"));
        assert_eq!(config.hpc.known_hosts.as_deref(), Some("~/.ssh/known_hosts"));
        assert_eq!(config.hpc.execution_mode, ExecutionMode::Direct);
        assert!(!config.hpc.slurm_use_singularity);
    }

    #[test]
    fn test_relative_key_file_resolves_against_default_key_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "hpc:\n  host: cluster\n  username: alice\n  key_file: id_ed25519\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        let resolved = crate::remote::auth::resolve_key_path(
            config.hpc.key_dir.as_deref(),
            config.hpc.key_file.as_deref(),
        )
        .unwrap();
        assert_eq!(resolved, expand_home("~/.ssh").join("id_ed25519"));
    }

    #[test]
    fn test_execution_settings_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "hpc:\n  host: cluster\n  execution_mode: slurm\n  slurm_use_singularity: true\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.hpc.execution_mode, ExecutionMode::Slurm);
        assert!(config.hpc.slurm_use_singularity);
        assert_eq!(
            config.hpc.execution_mode.default_timeout(),
            Duration::from_secs(600)
        );
        assert_eq!(
            ExecutionMode::Direct.default_timeout(),
            Duration::from_secs(300)
        );

        fs::write(&path, "hpc:\n  execution_mode: batch\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.ssh/id_rsa"), home.join(".ssh/id_rsa"));
        }
    }
}
