//! Capability Router
//!
//! Matches console lines against the current registry snapshot and fans each line out to every
//! matching capability.

pub mod console;
pub mod dispatcher;

use std::path::PathBuf;

use rehost_abi::CapabilityFault;
use thiserror::Error;

pub use console::{run_console, ConsoleExit, QUIT_COMMAND};
pub use dispatcher::{dispatch, DispatchAborted, DispatchOutcome};

/// A capability failed while handling a line.
#[derive(Debug, Error)]
#[error("{prefix}: {kind}")]
pub struct DispatchFault {
    pub prefix: String,
    pub module: PathBuf,
    pub kind: FaultKind,
}

#[derive(Debug, Error)]
pub enum FaultKind {
    #[error(transparent)]
    Fault(#[from] CapabilityFault),

    #[error("panicked: {0}")]
    Panic(String),
}
