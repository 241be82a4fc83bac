//! Capability Router Dispatcher
//!
//! Runs one line through one registry snapshot.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use super::{DispatchFault, FaultKind};
use crate::common::error::panic_message;
use crate::config::FaultPolicy;
use crate::modules::record::InvokeError;
use crate::registry::RegistryState;

/// Result of dispatching one line.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Capabilities that ran, including ones that faulted.
    pub invoked: usize,
    /// Matches skipped because their module was unloaded after the snapshot was taken.
    pub withdrawn: usize,
    /// Everything the capabilities wrote, in invocation order.
    pub output: Vec<u8>,
    /// Faults caught under [`FaultPolicy::Isolate`].
    pub faults: Vec<DispatchFault>,
}

impl DispatchOutcome {
    pub fn is_unrecognized(&self) -> bool {
        self.invoked == 0
    }
}

/// A dispatch stopped by the first fault under [`FaultPolicy::Propagate`].
#[derive(Debug)]
pub struct DispatchAborted {
    /// What the capabilities that ran before the fault produced.
    pub outcome: DispatchOutcome,
    pub fault: DispatchFault,
}

/// Invokes every capability in `snapshot` whose prefix matches `line`, in snapshot order.
///
/// Under [`FaultPolicy::Propagate`] the first fault stops the dispatch. The output written up to
/// that point is returned alongside it.
pub fn dispatch(
    snapshot: &RegistryState,
    line: &str,
    policy: FaultPolicy,
) -> Result<DispatchOutcome, DispatchAborted> {
    let mut outcome = DispatchOutcome::default();

    for capability in snapshot.matching(line) {
        // Loaded modules contain their own panics; this catches capabilities linked into the host.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            capability.invoke(line, &mut outcome.output)
        }));

        let kind = match result {
            Ok(Ok(())) => {
                outcome.invoked += 1;
                continue;
            }
            Ok(Err(InvokeError::Withdrawn)) => {
                debug!(
                    "Skipping '{}': module {:?} was unloaded",
                    capability.prefix(),
                    capability.module_path()
                );
                outcome.withdrawn += 1;
                continue;
            }
            Ok(Err(InvokeError::Fault(fault))) => FaultKind::Fault(fault),
            Err(payload) => FaultKind::Panic(panic_message(payload.as_ref())),
        };

        outcome.invoked += 1;
        let fault = DispatchFault {
            prefix: capability.prefix().to_string(),
            module: capability.module_path().to_path_buf(),
            kind,
        };

        match policy {
            FaultPolicy::Isolate => {
                warn!("Capability fault in {:?}: {}", fault.module, fault);
                outcome.faults.push(fault);
            }
            FaultPolicy::Propagate => return Err(DispatchAborted { outcome, fault }),
        }
    }

    Ok(outcome)
}
