//! Troubleshooting hints for remote failures.
//!
//! The CLI renders these below an error so the user gets a next step rather
//! than only the raw libssh2 or scheduler message.

use crate::error::{Error, ErrorKind};
use std::path::Path;

/// Builds an error message followed by suggestions matching its kind.
pub fn diagnose_error(error: &Error, host: &str, port: u16, key_path: Option<&Path>) -> String {
    let error_str = error.to_string().to_lowercase();
    let mut suggestions = Vec::new();

    match error.kind() {
        ErrorKind::NotConnected => {
            suggestions.push("• Connect first with: hpc-bridge connect".to_string());
        }
        ErrorKind::Configuration => {
            if error_str.contains("host") {
                suggestions.push(
                    "• Set the host in the config file or pass --host <hostname>".to_string(),
                );
            }
            if error_str.contains("key") {
                suggestions.push(
                    "• Check key_dir and key_file in the config file, or pass --key <path>"
                        .to_string(),
                );
            }
            if error_str.contains("password") {
                suggestions.push("• Export HPC_BRIDGE_PASSWORD or use key authentication".to_string());
            }
            if error_str.contains("resolve") || error_str.contains("no addresses") {
                suggestions.push(format!("• Verify the hostname '{}' is spelled correctly", host));
            }
        }
        ErrorKind::AuthFailed => {
            if error_str.contains("host key") {
                suggestions.push(format!(
                    "• The recorded host key for {} changed; verify it with your administrators",
                    host
                ));
                suggestions.push(format!(
                    "• If the change is expected: ssh-keygen -R {} and reconnect",
                    host
                ));
            } else if error_str.contains("encrypted") {
                suggestions.push(
                    "• Passphrase-protected keys are not supported; use an unencrypted key \
                     or password authentication"
                        .to_string(),
                );
            } else {
                suggestions.push("• Verify your SSH key has correct permissions (chmod 600)".to_string());
                match key_path {
                    Some(key) => suggestions.push(format!(
                        "• Verify the public key for {} is in ~/.ssh/authorized_keys on {}",
                        key.display(),
                        host
                    )),
                    None => suggestions.push("• Check the username and password".to_string()),
                }
            }
        }
        ErrorKind::ConnectionLost => {
            suggestions.push(format!("• Verify the host '{}' is reachable", host));
            suggestions.push(format!(
                "• Check if SSH is running on port {} (try: ssh -p {} {})",
                port, port, host
            ));
            suggestions.push("• Reconnect with: hpc-bridge connect".to_string());
        }
        ErrorKind::Timeout => {
            suggestions.push("• The remote side did not answer in time; try a larger --timeout".to_string());
            suggestions.push("• The scheduler may be overloaded; retry in a moment".to_string());
        }
        ErrorKind::Unparseable => {
            if error_str.contains("command not found") {
                suggestions.push(format!("• Slurm tools are not on PATH for the login shell on {}", host));
            }
            if error_str.contains("sbatch: error") {
                suggestions.push("• sbatch rejected the job; check the options and script header".to_string());
            }
        }
        ErrorKind::RemoteFailure => {
            if error_str.contains("command not found") || error_str.contains("status 127") {
                suggestions.push(format!("• The command is not installed or not on PATH on {}", host));
            }
            if error_str.contains("permission denied") {
                suggestions.push("• Permission denied on the remote side; check file modes".to_string());
            }
        }
    }

    if suggestions.is_empty() {
        suggestions.push("• Verify the remote host is accessible".to_string());
        suggestions.push(format!("• Test the connection manually: ssh -p {} {}", port, host));
    }

    format!("{}\n\nTroubleshooting suggestions:\n{}", error, suggestions.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnose_connection_refused() {
        let error = Error::ConnectionLost("Failed to connect to cluster: connection refused".into());
        let diagnosis = diagnose_error(&error, "cluster", 22, None);

        assert!(diagnosis.contains("Verify the host 'cluster' is reachable"));
        assert!(diagnosis.contains("SSH is running on port 22"));
    }

    #[test]
    fn test_diagnose_authentication_failure() {
        let error = Error::AuthenticationFailed("Public key authentication failed".into());
        let diagnosis =
            diagnose_error(&error, "cluster", 22, Some(Path::new("/home/a/.ssh/id_rsa")));

        assert!(diagnosis.contains("chmod 600"));
        assert!(diagnosis.contains("/home/a/.ssh/id_rsa"));
        assert!(diagnosis.contains("authorized_keys"));
    }

    #[test]
    fn test_diagnose_host_key_mismatch() {
        let error = Error::AuthenticationFailed("Host key for cluster does not match".into());
        let diagnosis = diagnose_error(&error, "cluster", 22, None);
        assert!(diagnosis.contains("ssh-keygen -R cluster"));
    }

    #[test]
    fn test_diagnose_not_connected() {
        let diagnosis = diagnose_error(&Error::NotConnected, "cluster", 22, None);
        assert!(diagnosis.contains("hpc-bridge connect"));
    }

    #[test]
    fn test_diagnose_generic_error() {
        let error = Error::RemoteExecution("unknown error".into());
        let diagnosis = diagnose_error(&error, "cluster", 2222, None);

        assert!(diagnosis.contains("remote host is accessible"));
        assert!(diagnosis.contains("ssh -p 2222 cluster"));
    }
}
