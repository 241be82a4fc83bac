//! Module Lifecycle
//!
//! Discovers module files, loads them as independently unloadable units, reconciles the loaded
//! set against the directory, and watches the directory for changes.

pub mod fingerprint;
pub mod loader;
pub mod manager;
pub mod reconciler;
pub mod record;
pub mod scan;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use fingerprint::{fingerprint, Fingerprint, ModuleBytes};
pub use loader::{DylibLoader, LibraryHandle, ModuleLoader};
pub use manager::ModuleManager;
pub use reconciler::{reconcile, ModuleMap, ReconcileReport, Reconciliation};
pub use record::{CapabilityInstance, InvokeError, ModuleRecord, ModuleUnit};
pub use scan::{is_module_file, scan_module_dir};
pub use watcher::{ChangeEvent, ChangeReason, DirectoryWatcher, WatchOptions};
