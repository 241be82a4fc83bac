//! Sample module: repeats whatever follows `echo`.
//!
//! Build with `cargo build -p rehost-echo` and copy the resulting dynamic library into the host's
//! module directory.

use std::io::Write;

use rehost_abi::{arguments, Capability, CapabilityFault};

pub const ECHO_PREFIX: &str = "echo";

#[derive(Debug, Default)]
pub struct Echo;

impl Capability for Echo {
    fn prefix(&self) -> &str {
        ECHO_PREFIX
    }

    fn handle(&self, line: &str, out: &mut dyn Write) -> Result<(), CapabilityFault> {
        let text = arguments(line, ECHO_PREFIX);
        if text.is_empty() {
            return Err(CapabilityFault::argument("echo expects text to repeat"));
        }
        writeln!(out, "{text}")?;
        Ok(())
    }
}

pub fn echo() -> Box<dyn Capability> {
    Box::new(Echo)
}

rehost_abi::export_module!(echo);
