//! Remote session infrastructure.
//!
//! This module provides the SSH session used to reach the cluster login node:
//! credential loading, the session lifecycle, command execution and the
//! diagnostics rendered when any of it fails.

pub mod auth;
pub mod diagnostics;
pub mod executor;
pub mod runner;
pub mod session;

pub use auth::{AuthMethod, KeyType, LoadedKey};
pub use diagnostics::diagnose_error;
pub use executor::{CommandResult, STDERR_MARKER};
pub use runner::CommandRunner;
pub use session::{RemoteInfo, SessionManager};
