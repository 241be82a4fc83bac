//! Test module: `boom` panics on every line it handles, `steady` keeps working.

use std::io::Write;

use rehost_abi::{arguments, Capability, CapabilityFault};

pub const BOOM_PREFIX: &str = "boom";
pub const STEADY_PREFIX: &str = "steady";

#[derive(Debug, Default)]
pub struct Boom;

impl Capability for Boom {
    fn prefix(&self) -> &str {
        BOOM_PREFIX
    }

    fn handle(&self, _line: &str, _out: &mut dyn Write) -> Result<(), CapabilityFault> {
        panic!("kaboom")
    }
}

#[derive(Debug, Default)]
pub struct Steady;

impl Capability for Steady {
    fn prefix(&self) -> &str {
        STEADY_PREFIX
    }

    fn handle(&self, line: &str, out: &mut dyn Write) -> Result<(), CapabilityFault> {
        writeln!(out, "steady: {}", arguments(line, STEADY_PREFIX))?;
        Ok(())
    }
}

pub fn boom() -> Box<dyn Capability> {
    Box::new(Boom)
}

pub fn steady() -> Box<dyn Capability> {
    Box::new(Steady)
}

rehost_abi::export_module!(boom, steady);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exported_boom_panic_is_contained() {
        let capabilities = rehost_module_declaration.capabilities().unwrap();
        let mut out = Vec::new();

        let fault = capabilities[0].handle("boom", &mut out).unwrap_err();
        assert!(matches!(fault, CapabilityFault::Panicked(_)));

        capabilities[1].handle("steady on", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "steady: on\n");
    }
}
