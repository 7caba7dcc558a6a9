//! CLI command for managing hpc-bridge configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use hpc_bridge::config::{Config, SessionConfig};
use std::path::PathBuf;

use super::ConnectionArgs;

#[derive(Args)]
#[command(about = "Manage hpc-bridge configuration")]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective connection settings
    Show,

    /// Show the configuration file path
    Path,

    /// Write a configuration file, seeded from --host/--user/--port/--key when given
    Init {
        /// Overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        match &self.action {
            ConfigAction::Show => self.show_config(connection),
            ConfigAction::Path => self.show_path(connection),
            ConfigAction::Init { force } => self.init_config(connection, *force),
        }
    }

    fn config_path(connection: &ConnectionArgs) -> Option<PathBuf> {
        connection.config.clone().or_else(Config::default_path)
    }

    fn show_config(&self, connection: &ConnectionArgs) -> Result<()> {
        let session = connection.session_config()?;

        if session.host.is_none() {
            println!("No cluster host configured.");
            println!();
            println!("To create a configuration file, run:");
            println!("  hpc-bridge --host <login-node> config init");
            return Ok(());
        }

        let config = Config { hpc: session };
        println!("{}", serde_yaml::to_string(&config)?);
        println!("Connection string: {}", config.hpc.connection_string());

        Ok(())
    }

    fn show_path(&self, connection: &ConnectionArgs) -> Result<()> {
        match Self::config_path(connection) {
            Some(path) => {
                println!("Configuration file path: {}", path.display());
                if path.exists() {
                    println!("Status: File exists");
                } else {
                    println!("Status: File does not exist");
                }
            }
            None => {
                println!("Could not determine configuration directory");
            }
        }

        Ok(())
    }

    fn init_config(&self, connection: &ConnectionArgs, force: bool) -> Result<()> {
        let path = Self::config_path(connection)
            .ok_or_else(|| anyhow::anyhow!("Could not determine configuration directory"))?;

        if path.exists() && !force {
            println!("Configuration file already exists at: {}", path.display());
            println!("Use --force to overwrite");
            return Ok(());
        }

        let host = connection
            .host
            .clone()
            .unwrap_or_else(|| "login.cluster.example.org".to_string());
        let mut session = SessionConfig::new(host).with_key_file("id_ed25519");
        if let Some(user) = &connection.user {
            session = session.with_username(user.clone());
        }
        if let Some(port) = connection.port {
            session = session.with_port(port);
        }
        if let Some(key) = &connection.key {
            session = session.with_key_file(key.to_string_lossy().into_owned());
        }

        let config = Config { hpc: session };
        config.save_to(&path)?;

        println!("Created configuration file at: {}", path.display());
        println!();
        println!("Edit the file to match your cluster, then check the connection:");
        println!("  hpc-bridge config show");
        println!("  hpc-bridge connect");

        Ok(())
    }
}
