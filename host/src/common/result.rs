//! Common Result Type
//!
//! Type alias for host results.

use super::error::HostError;

/// Host result type
pub type HostResult<T> = Result<T, HostError>;
