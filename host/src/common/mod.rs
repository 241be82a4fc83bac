//! Common Utilities
//!
//! Shared error types, result alias, and path resolution used across the host.

pub mod error;
pub mod paths;
pub mod result;

pub use error::{FingerprintError, HostError, LoadError, WatchError};
pub use paths::{default_module_dir, module_extension, shadow_dir};
pub use result::HostResult;
