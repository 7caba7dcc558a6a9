pub mod config;
pub mod connect;
pub mod job;
pub mod run;
pub mod status;
pub mod submit;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use hpc_bridge::config::{Config, SessionConfig};
use hpc_bridge::remote::{diagnose_error, SessionManager};
use hpc_bridge::BridgeError;
use log::debug;
use std::path::PathBuf;

/// Environment variable that supplies the SSH password.
pub const PASSWORD_ENV: &str = "HPC_BRIDGE_PASSWORD";

/// Connection overrides, given before the subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Configuration file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Login node hostname
    #[arg(long)]
    pub host: Option<String>,

    /// Remote username
    #[arg(long)]
    pub user: Option<String>,

    /// SSH port
    #[arg(long)]
    pub port: Option<u16>,

    /// Private key file (implies key authentication)
    #[arg(long)]
    pub key: Option<PathBuf>,
}

impl ConnectionArgs {
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        };
        Ok(config?)
    }

    /// Configuration file contents with command-line and environment overrides applied.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut session = self.load_config()?.hpc;

        if let Some(host) = &self.host {
            session.host = Some(host.clone());
        }
        if let Some(user) = &self.user {
            session.username = Some(user.clone());
        }
        if let Some(port) = self.port {
            session.port = port;
        }
        if let Some(key) = &self.key {
            let key = std::fs::canonicalize(key).unwrap_or_else(|_| key.clone());
            session.key_file = Some(key.to_string_lossy().into_owned());
            session.auth_method = "key".to_string();
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            debug!("Using password from {}", PASSWORD_ENV);
            session.password = Some(password);
        }

        Ok(session)
    }

    /// Builds a session manager and connects it.
    pub fn open_session(&self) -> Result<SessionManager> {
        let config = self.session_config()?;
        let host = config.host.clone().unwrap_or_default();
        let port = config.port;

        let mut session =
            SessionManager::new(config).map_err(|e| anyhow!(diagnose_error(&e, &host, port, None)))?;

        session
            .try_connect()
            .map_err(|e| failure(&session, e))
            .with_context(|| format!("Could not connect to {}", session.host()))?;
        Ok(session)
    }
}

/// Turns a library error into a CLI error carrying troubleshooting hints.
pub fn failure(session: &SessionManager, error: BridgeError) -> anyhow::Error {
    anyhow!(diagnose_error(
        &error,
        session.host(),
        session.port(),
        session.key_path()
    ))
}
