//! Lifecycle of the single SSH session used to reach the cluster.
//!
//! `SessionManager` owns at most one [`ActiveSession`]. Connecting is
//! idempotent, any transport failure during execution drops the session,
//! and dropping the manager closes it.

use crate::config::{expand_home, SessionConfig};
use crate::error::{Error, Result};
use crate::remote::auth::{load_private_key, resolve_key_path, AuthMethod, LoadedKey};
use crate::remote::executor::{
    classify_io_error, classify_ssh_error, timeout_millis, ActiveSession, CommandResult,
};
use crate::remote::runner::CommandRunner;
use log::{debug, error, info, warn};
use ssh2::{CheckResult, KnownHostFileKind, Session};
use std::env;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeout used for the short commands issued by [`SessionManager::probe`].
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Identity of the remote side after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub hostname: String,
    pub working_directory: String,
}

enum Credential {
    Key(LoadedKey),
    Password(String),
}

/// Owns one authenticated remote session.
///
/// Not meant to be shared across threads; every operation takes `&mut self`.
pub struct SessionManager {
    config: SessionConfig,
    host: String,
    username: Option<String>,
    auth_method: AuthMethod,
    key_path: Option<PathBuf>,
    known_hosts: Option<PathBuf>,
    connect_timeout: Duration,
    warnings: Vec<String>,
    session: Option<ActiveSession>,
}

impl SessionManager {
    /// Validates `config` and resolves key material without touching the network.
    ///
    /// A missing key file is not an error here: the path is cleared, a warning
    /// is recorded, and `connect` will fail later.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Configuration("HPC host is not configured".to_string()))?
            .to_string();

        let auth_method = AuthMethod::parse(&config.auth_method)?;
        let username = config
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(local_username);

        let mut warnings = Vec::new();
        let key_path = match auth_method {
            AuthMethod::Key => {
                match resolve_key_path(config.key_dir.as_deref(), config.key_file.as_deref()) {
                    Some(path) if path.exists() => Some(path),
                    Some(path) => {
                        let message = format!("SSH key file not found: {}", path.display());
                        warn!("{}", message);
                        warnings.push(message);
                        None
                    }
                    None => {
                        let message = "Key authentication selected but no key file configured"
                            .to_string();
                        warn!("{}", message);
                        warnings.push(message);
                        None
                    }
                }
            }
            AuthMethod::Password => None,
        };

        let known_hosts = config.known_hosts.as_deref().map(expand_home);
        let connect_timeout = Duration::from_secs(config.connect_timeout.max(1));

        Ok(Self {
            config,
            host,
            username,
            auth_method,
            key_path,
            known_hosts,
            connect_timeout,
            warnings,
            session: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    pub fn key_path(&self) -> Option<&Path> {
        self.key_path.as_deref()
    }

    /// Problems found while resolving the configuration.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the transport is alive right now.
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(ActiveSession::is_alive)
    }

    /// Connects, collapsing every failure into `false`.
    pub fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(e) => {
                error!("SSH connection to {} failed: {}", self.target(), e);
                false
            }
        }
    }

    /// Connects and reports why it failed.
    ///
    /// Returns immediately when a live session already exists. On failure the
    /// manager is always left disconnected.
    pub fn try_connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("Already connected to {}", self.target());
            return Ok(());
        }
        // A stale handle may still be around after the peer went away.
        self.disconnect();

        let result = self.open_session();
        match result {
            Ok(active) => {
                info!("Connected to {}", self.target());
                self.session = Some(active);
                Ok(())
            }
            Err(e) => {
                self.session = None;
                Err(e)
            }
        }
    }

    fn open_session(&self) -> Result<ActiveSession> {
        let username = self.username.clone().ok_or_else(|| {
            Error::Configuration("No username configured and none found locally".to_string())
        })?;
        let credential = self.credential()?;

        info!("Connecting to {}", self.target());
        let addr = self.resolve_address()?;
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| classify_io_error(e, &format!("Failed to connect to {}", self.host)))?;

        let mut session = Session::new()
            .map_err(|e| classify_ssh_error(e, "Failed to create SSH session"))?;
        session.set_tcp_stream(tcp.try_clone()?);
        session.set_timeout(timeout_millis(self.connect_timeout));
        session
            .handshake()
            .map_err(|e| classify_ssh_error(e, "SSH handshake failed"))?;

        self.verify_host_key(&session)?;

        match credential {
            Credential::Key(key) => {
                debug!(
                    "Authenticating as {} with {} key {}",
                    username,
                    key.key_type,
                    key.path.display()
                );
                session
                    .userauth_pubkey_file(&username, None, &key.path, None)
                    .map_err(|e| {
                        Error::AuthenticationFailed(format!(
                            "Public key authentication failed for {}: {}",
                            username, e
                        ))
                    })?;
            }
            Credential::Password(password) => {
                debug!("Authenticating as {} with password", username);
                session
                    .userauth_password(&username, &password)
                    .map_err(|e| {
                        Error::AuthenticationFailed(format!(
                            "Password authentication failed for {}: {}",
                            username, e
                        ))
                    })?;
            }
        }

        if !session.authenticated() {
            return Err(Error::AuthenticationFailed(format!(
                "Server did not accept credentials for {}",
                username
            )));
        }

        // Lets is_connected() probe the transport with a keepalive.
        session.set_keepalive(true, 30);

        Ok(ActiveSession::new(session, tcp))
    }

    fn credential(&self) -> Result<Credential> {
        match self.auth_method {
            AuthMethod::Key => {
                let path = self.key_path.as_deref().ok_or_else(|| {
                    Error::Configuration(format!(
                        "No usable SSH key for key authentication{}",
                        self.warnings
                            .first()
                            .map(|w| format!(" ({})", w))
                            .unwrap_or_default()
                    ))
                })?;
                Ok(Credential::Key(load_private_key(path)?))
            }
            AuthMethod::Password => self
                .config
                .password
                .clone()
                .filter(|p| !p.is_empty())
                .map(Credential::Password)
                .ok_or_else(|| {
                    Error::Configuration(
                        "Password authentication selected but no password supplied".to_string(),
                    )
                }),
        }
    }

    fn resolve_address(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|e| {
                Error::Configuration(format!("Failed to resolve host '{}': {}", self.host, e))
            })?
            .next()
            .ok_or_else(|| {
                Error::Configuration(format!("No addresses found for host '{}'", self.host))
            })
    }

    /// Checks the server key against known_hosts.
    ///
    /// Unknown hosts are accepted on first use; a key that differs from the
    /// recorded one is rejected.
    fn verify_host_key(&self, session: &Session) -> Result<()> {
        let (key, key_type) = session.host_key().ok_or_else(|| {
            Error::RemoteExecution("Server did not present a host key".to_string())
        })?;

        let mut known = session
            .known_hosts()
            .map_err(|e| classify_ssh_error(e, "Failed to initialise known hosts"))?;

        match self.known_hosts_file() {
            Some(path) => {
                if let Err(e) = known.read_file(&path, KnownHostFileKind::OpenSSH) {
                    warn!("Could not read known hosts {}: {}", path.display(), e);
                }
            }
            None => debug!("No known_hosts file available"),
        }

        match known.check_port(&self.host, self.config.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => {
                warn!(
                    "Host key for {} ({:?}) is not in known_hosts; accepting it",
                    self.host, key_type
                );
                Ok(())
            }
            CheckResult::Mismatch => Err(Error::AuthenticationFailed(format!(
                "Host key for {} does not match known_hosts",
                self.host
            ))),
            CheckResult::Failure => Err(Error::RemoteExecution(format!(
                "Failed to check host key for {}",
                self.host
            ))),
        }
    }

    fn known_hosts_file(&self) -> Option<PathBuf> {
        self.known_hosts
            .clone()
            .filter(|p| p.exists())
            .or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".ssh").join("known_hosts"))
                    .filter(|p| p.exists())
            })
    }

    /// Runs `command` and returns stdout plus any stderr.
    ///
    /// The remote exit status is not inspected; use
    /// [`execute_checked`](Self::execute_checked) for that.
    pub fn execute(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.run(command, timeout).map(|r| r.combined())
    }

    /// Like [`execute`](Self::execute) but fails on a non-zero exit status.
    pub fn execute_checked(&mut self, command: &str, timeout: Duration) -> Result<CommandResult> {
        let result = self.run(command, timeout)?;
        if result.is_success() {
            Ok(result)
        } else {
            Err(Error::RemoteExecution(format!(
                "Command exited with status {}: {}\n{}",
                result.exit_status,
                command,
                result.combined()
            )))
        }
    }

    fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandResult> {
        let active = self.session.as_ref().ok_or(Error::NotConnected)?;
        debug!("Executing remote command (timeout {:?}): {}", timeout, command);

        match active.run(command, timeout) {
            Ok(result) => Ok(result),
            Err(e @ Error::ConnectionLost(_)) => {
                warn!("Connection to {} lost: {}", self.host, e);
                self.disconnect();
                Err(e)
            }
            Err(e @ Error::Timeout(_)) => Err(Error::Timeout(format!(
                "Command timed out after {:?}: {} ({})",
                timeout, command, e
            ))),
            Err(e) => Err(e),
        }
    }

    /// Closes the session if there is one.
    pub fn disconnect(&mut self) {
        if let Some(mut active) = self.session.take() {
            info!("Disconnecting from {}", self.host);
            active.shutdown();
        }
    }

    /// Asks the remote side for its hostname and working directory.
    pub fn probe(&mut self) -> Result<RemoteInfo> {
        let reported = self.execute("hostname", PROBE_TIMEOUT)?;
        let hostname = match reported.trim() {
            "" => {
                warn!("'hostname' returned nothing; using configured host");
                self.host.clone()
            }
            name => name.to_string(),
        };

        let working_directory = self.remote_working_directory()?;
        Ok(RemoteInfo {
            hostname,
            working_directory,
        })
    }

    fn remote_working_directory(&mut self) -> Result<String> {
        for command in ["pwd -P", "pwd"] {
            match self.execute(command, PROBE_TIMEOUT) {
                Ok(out) if !out.trim().is_empty() => return Ok(out.trim().to_string()),
                Ok(_) => warn!("'{}' returned nothing", command),
                Err(e @ Error::ConnectionLost(_)) => return Err(e),
                Err(e) => warn!("'{}' failed: {}", command, e),
            }
        }
        Ok("~".to_string())
    }

    fn target(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}:{}", user, self.host, self.config.port),
            None => format!("{}:{}", self.host, self.config.port),
        }
    }
}

impl CommandRunner for SessionManager {
    fn run_command(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.execute(command, timeout)
    }

    fn remote_user(&self) -> Option<&str> {
        self.username()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn local_username() -> Option<String> {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}
