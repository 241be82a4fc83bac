//! Common Error Types
//!
//! Error taxonomy for the module lifecycle and the host.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::router::DispatchFault;

pub use rehost_abi::panic_message;

/// Reading a module file failed, so it could not be fingerprinted.
#[derive(Debug, Error)]
#[error("failed to read module {}: {source}", path.display())]
pub struct FingerprintError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A module could not be turned into a loaded unit.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed or incompatible binary, missing entry point, or a fault while constructing
    /// capabilities.
    #[error("load failure: {0}")]
    LoadFailure(String),

    /// Valid module that exports nothing usable.
    #[error("module exports no capabilities")]
    NoCapabilitiesFound,
}

impl LoadError {
    pub fn failure(cause: impl std::fmt::Display) -> Self {
        Self::LoadFailure(cause.to_string())
    }
}

/// The filesystem notification backend could not be set up.
#[derive(Debug, Error)]
#[error("failed to watch {}: {source}", path.display())]
pub struct WatchError {
    pub path: PathBuf,
    #[source]
    pub source: notify::Error,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host already started")]
    AlreadyStarted,

    #[error("module directory {}: {source}", path.display())]
    ModuleDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not resolve the module directory: {0}")]
    Resolve(String),

    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchFault),
}
