//! The seam between the scheduler client and whatever runs its commands.

use crate::error::Result;
use std::time::Duration;

/// Something that can run a shell command on the cluster.
///
/// Implemented by [`SessionManager`](crate::remote::SessionManager) and by
/// `&mut R` for any runner, so a scheduler client can either own its session
/// (closing it when dropped) or borrow one the caller keeps open.
pub trait CommandRunner {
    fn run_command(&mut self, command: &str, timeout: Duration) -> Result<String>;

    /// The remote account commands run as, if known.
    fn remote_user(&self) -> Option<&str>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run_command(&mut self, command: &str, timeout: Duration) -> Result<String> {
        (**self).run_command(command, timeout)
    }

    fn remote_user(&self) -> Option<&str> {
        (**self).remote_user()
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run_command(&mut self, command: &str, timeout: Duration) -> Result<String> {
        (**self).run_command(command, timeout)
    }

    fn remote_user(&self) -> Option<&str> {
        (**self).remote_user()
    }
}
