//! Panic containment on the module side of the library boundary.
//!
//! A module links its own copy of the standard library, so a panic that unwinds out of module
//! code into the host cannot be caught there and aborts the process. Everything here is compiled
//! into the module through [`export_module!`](crate::export_module): capability construction,
//! [`Capability::prefix`], [`Capability::handle`] and drop all run inside the module's own
//! `catch_unwind`.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};

use crate::{Capability, CapabilityFactory, CapabilityFault};

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Wraps a capability so no panic escapes its methods or its destructor.
struct Guarded {
    prefix: String,
    inner: Option<Box<dyn Capability>>,
}

impl Capability for Guarded {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(&self, line: &str, out: &mut dyn io::Write) -> Result<(), CapabilityFault> {
        let Some(inner) = self.inner.as_ref() else {
            return Err(CapabilityFault::failed("capability already dropped"));
        };
        panic::catch_unwind(AssertUnwindSafe(|| inner.handle(line, out))).unwrap_or_else(|payload| {
            Err(CapabilityFault::Panicked(panic_message(payload.as_ref())))
        })
    }
}

impl Drop for Guarded {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(inner)));
        }
    }
}

/// Runs every factory in order and wraps each capability in a panic guard.
///
/// A panic in a factory or in a capability's `prefix` fails the whole construction; capabilities
/// built before it are dropped.
pub fn construct(factories: &[CapabilityFactory]) -> Result<Vec<Box<dyn Capability>>, String> {
    let mut capabilities: Vec<Box<dyn Capability>> = Vec::with_capacity(factories.len());

    for (index, factory) in factories.iter().enumerate() {
        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            let capability = factory();
            let prefix = capability.prefix().to_string();
            (prefix, capability)
        }));

        match built {
            Ok((prefix, capability)) => capabilities.push(Box::new(Guarded {
                prefix,
                inner: Some(capability),
            })),
            Err(payload) => {
                return Err(format!(
                    "capability factory {} panicked: {}",
                    index,
                    panic_message(payload.as_ref())
                ))
            }
        }
    }

    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Boom;

    impl Capability for Boom {
        fn prefix(&self) -> &str {
            "boom"
        }

        fn handle(&self, _line: &str, _out: &mut dyn io::Write) -> Result<(), CapabilityFault> {
            panic!("kaboom")
        }
    }

    impl Drop for Boom {
        fn drop(&mut self) {
            if !std::thread::panicking() {
                panic!("drop kaboom")
            }
        }
    }

    fn boom() -> Box<dyn Capability> {
        Box::new(Boom)
    }

    fn broken() -> Box<dyn Capability> {
        panic!("no capability today")
    }

    #[test]
    fn test_handler_panic_becomes_a_fault() {
        let capabilities = construct(&[boom]).unwrap();
        assert_eq!(capabilities[0].prefix(), "boom");

        let mut out = Vec::new();
        let fault = capabilities[0].handle("boom", &mut out).unwrap_err();
        assert!(matches!(&fault, CapabilityFault::Panicked(message) if message == "kaboom"));
        assert_eq!(fault.to_string(), "panicked: kaboom");

        // The panicking destructor is contained too.
        drop(capabilities);
    }

    #[test]
    fn test_factory_panic_fails_construction() {
        let err = construct(&[boom, broken]).err().unwrap();
        assert_eq!(err, "capability factory 1 panicked: no capability today");
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");

        let payload = panic::catch_unwind(|| panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
