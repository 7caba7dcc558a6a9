use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Remote execution error: {0}")]
    RemoteExecution(String),

    #[error("Job submission failed: no job id in scheduler output\n\nCommand:\n{command}\n\nOutput:\n{output}")]
    Submission { command: String, output: String },

    #[error("Not connected to a remote host")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),
}

/// Coarse classification shared by every fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConnected,
    Configuration,
    AuthFailed,
    Timeout,
    ConnectionLost,
    Unparseable,
    RemoteFailure,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NotConnected => ErrorKind::NotConnected,
            BridgeError::Configuration(_) => ErrorKind::Configuration,
            BridgeError::AuthenticationFailed(_) => ErrorKind::AuthFailed,
            BridgeError::Timeout(_) => ErrorKind::Timeout,
            BridgeError::ConnectionLost(_) => ErrorKind::ConnectionLost,
            BridgeError::Submission { .. } => ErrorKind::Unparseable,
            BridgeError::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ErrorKind::Timeout,
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => ErrorKind::ConnectionLost,
                _ => ErrorKind::RemoteFailure,
            },
            BridgeError::RemoteExecution(_) | BridgeError::Ssh(_) => ErrorKind::RemoteFailure,
        }
    }
}

pub type Error = BridgeError;
pub type Result<T> = std::result::Result<T, Error>;
