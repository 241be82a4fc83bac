//! The handler contract every exported capability implements.

use std::io;

use thiserror::Error;

/// A prefix-dispatched line handler exported by a module.
///
/// The host invokes [`Capability::handle`] with the full input line whenever [`Capability::prefix`]
/// is a case-insensitive prefix of it. The prefix is read once at load time and must be non-empty.
pub trait Capability: Send + Sync {
    fn prefix(&self) -> &str;

    fn handle(&self, line: &str, out: &mut dyn io::Write) -> Result<(), CapabilityFault>;
}

/// A fault raised by a capability while handling a line.
#[derive(Debug, Error)]
pub enum CapabilityFault {
    #[error("argument fault: {0}")]
    Argument(String),

    #[error("{0}")]
    Failed(String),

    /// The handler panicked; the panic was caught inside the module.
    #[error("panicked: {0}")]
    Panicked(String),

    #[error("output error: {0}")]
    Io(#[from] io::Error),
}

impl CapabilityFault {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Text following `prefix` in `line`, trimmed. Empty when the line is the bare prefix.
pub fn arguments<'a>(line: &'a str, prefix: &str) -> &'a str {
    line.get(prefix.len()..).unwrap_or_default().trim()
}
