//! Bridge between a local control process and a remote Slurm cluster.
//!
//! A [`SessionManager`](remote::SessionManager) owns one SSH session to the
//! login node; a [`SlurmClient`](slurm::SlurmClient) runs `sbatch` and
//! `squeue` over it and turns their output into structured records.

pub mod config;
pub mod error;
pub mod remote;
pub mod slurm;

pub use error::{BridgeError, ErrorKind, Result};
