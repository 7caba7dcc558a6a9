//! Command execution over an established SSH transport.
//!
//! This module provides `ActiveSession`, the owned handle around one live
//! `ssh2::Session`, and the failure classification shared by connect and
//! execute.

use crate::error::{Error, Result};
use log::{debug, warn};
use ssh2::{ErrorCode, Session};
use std::io::{self, Read};
use std::net::TcpStream;
use std::time::Duration;

/// Marker placed between stdout and stderr in combined output.
pub const STDERR_MARKER: &str = "\n--- STDERR ---\n";

// Error codes from libssh2.h
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_EAGAIN: i32 = -37;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

/// Result of executing a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit status reported by the remote side
    pub exit_status: i32,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }

    /// Stdout, followed by stderr after [`STDERR_MARKER`] when there is any.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}{}{}", self.stdout, STDERR_MARKER, self.stderr)
        }
    }
}

/// Owned handle to one authenticated transport.
///
/// Dropping it sends an SSH disconnect, so a session can never outlive the
/// manager holding it.
pub struct ActiveSession {
    session: Session,
    stream: TcpStream,
    closed: bool,
}

impl ActiveSession {
    pub(crate) fn new(session: Session, stream: TcpStream) -> Self {
        Self {
            session,
            stream,
            closed: false,
        }
    }

    /// Probes the transport without running a command.
    pub fn is_alive(&self) -> bool {
        if self.closed || !self.session.authenticated() {
            return false;
        }
        if self.stream.peer_addr().is_err() {
            return false;
        }
        match self.stream.take_error() {
            Ok(None) => {}
            _ => return false,
        }
        self.session.keepalive_send().is_ok()
    }

    /// Runs `command` on a fresh channel and buffers everything it prints.
    pub fn run(&self, command: &str, timeout: Duration) -> Result<CommandResult> {
        self.session.set_timeout(timeout_millis(timeout));

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| classify_ssh_error(e, "Failed to open channel"))?;

        channel
            .exec(command)
            .map_err(|e| classify_ssh_error(e, "Failed to execute command"))?;

        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .map_err(|e| classify_io_error(e, "Failed to read stdout"))?;

        let mut stderr = Vec::new();
        channel
            .stderr()
            .read_to_end(&mut stderr)
            .map_err(|e| classify_io_error(e, "Failed to read stderr"))?;

        channel
            .wait_close()
            .map_err(|e| classify_ssh_error(e, "Failed to close channel"))?;

        let exit_status = channel
            .exit_status()
            .map_err(|e| classify_ssh_error(e, "Failed to get exit status"))?;

        debug!("Command exit status: {}", exit_status);

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    /// Sends an SSH disconnect once; later calls are no-ops.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self
            .session
            .disconnect(None, "hpc-bridge closing session", None)
        {
            warn!("Error while closing SSH session: {}", e);
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Maps an ssh2 error onto the bridge taxonomy.
pub fn classify_ssh_error(err: ssh2::Error, context: &str) -> Error {
    let message = format!("{}: {}", context, err);
    match err.code() {
        ErrorCode::Session(code) => error_for_code(code, message),
        _ => Error::RemoteExecution(message),
    }
}

/// Maps an I/O error (possibly wrapping an ssh2 error) onto the taxonomy.
pub fn classify_io_error(err: io::Error, context: &str) -> Error {
    let message = format!("{}: {}", context, err);

    let wrapped_code = err
        .get_ref()
        .and_then(|e| e.downcast_ref::<ssh2::Error>())
        .map(|inner| inner.code());
    if let Some(ErrorCode::Session(code)) = wrapped_code {
        return error_for_code(code, message);
    }

    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(message),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Error::ConnectionLost(message),
        _ => Error::RemoteExecution(message),
    }
}

fn error_for_code(code: i32, message: String) -> Error {
    match code {
        LIBSSH2_ERROR_TIMEOUT | LIBSSH2_ERROR_SOCKET_TIMEOUT | LIBSSH2_ERROR_EAGAIN => {
            Error::Timeout(message)
        }
        LIBSSH2_ERROR_SOCKET_SEND | LIBSSH2_ERROR_SOCKET_RECV | LIBSSH2_ERROR_SOCKET_DISCONNECT => {
            Error::ConnectionLost(message)
        }
        LIBSSH2_ERROR_AUTHENTICATION_FAILED | LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED => {
            Error::AuthenticationFailed(message)
        }
        _ => Error::RemoteExecution(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_command_result_is_success() {
        let success = CommandResult {
            stdout: "ok".to_string(),
            stderr: String::new(),
            exit_status: 0,
        };
        assert!(success.is_success());

        let failure = CommandResult {
            stdout: String::new(),
            stderr: "error".to_string(),
            exit_status: 1,
        };
        assert!(!failure.is_success());
    }

    #[test]
    fn test_combined_output() {
        let quiet = CommandResult {
            stdout: "node01\n".to_string(),
            stderr: String::new(),
            exit_status: 0,
        };
        assert_eq!(quiet.combined(), "node01\n");

        let noisy = CommandResult {
            stdout: "partial\n".to_string(),
            stderr: "squeue: error: bad user".to_string(),
            exit_status: 1,
        };
        assert_eq!(
            noisy.combined(),
            "partial\n\n--- STDERR ---\nsqueue: error: bad user"
        );
    }

    #[test]
    fn test_classify_ssh_error_codes() {
        let timeout = ssh2::Error::new(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT), "timed out");
        assert_eq!(classify_ssh_error(timeout, "exec").kind(), ErrorKind::Timeout);

        let dropped = ssh2::Error::new(ErrorCode::Session(LIBSSH2_ERROR_SOCKET_RECV), "recv");
        assert_eq!(
            classify_ssh_error(dropped, "exec").kind(),
            ErrorKind::ConnectionLost
        );

        let denied = ssh2::Error::new(
            ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED),
            "denied",
        );
        assert_eq!(classify_ssh_error(denied, "auth").kind(), ErrorKind::AuthFailed);

        let other = ssh2::Error::new(ErrorCode::Session(-22), "request denied");
        assert_eq!(
            classify_ssh_error(other, "exec").kind(),
            ErrorKind::RemoteFailure
        );
    }

    #[test]
    fn test_classify_io_error_kinds() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(
            classify_io_error(timeout, "read"),
            Error::Timeout(_)
        ));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let classified = classify_io_error(reset, "read");
        assert!(matches!(classified, Error::ConnectionLost(_)));
        assert!(classified.to_string().contains("reset by peer"));

        let other = io::Error::new(io::ErrorKind::InvalidData, "garbled");
        assert!(matches!(
            classify_io_error(other, "read"),
            Error::RemoteExecution(_)
        ));
    }

    #[test]
    fn test_classify_wrapped_ssh_error() {
        let inner = ssh2::Error::new(ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT), "gone");
        let wrapped = io::Error::new(io::ErrorKind::Other, inner);
        assert!(matches!(
            classify_io_error(wrapped, "read"),
            Error::ConnectionLost(_)
        ));
    }

    #[test]
    fn test_timeout_millis_clamps() {
        assert_eq!(timeout_millis(Duration::from_secs(10)), 10_000);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), u32::MAX);
    }
}
