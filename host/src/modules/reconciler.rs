//! Module Reconciler
//!
//! Diffs the module directory listing against the loaded modules and applies load, reload and
//! unload actions. Per-file failures are isolated: a file that cannot be read keeps its previous
//! record, a file that cannot be loaded is left out until a later cycle loads it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::fingerprint::ModuleBytes;
use super::loader::ModuleLoader;
use super::record::ModuleRecord;

pub type ModuleMap = BTreeMap<PathBuf, ModuleRecord>;

/// What one reconciliation did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub loaded: Vec<PathBuf>,
    pub reloaded: Vec<PathBuf>,
    pub unloaded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub retained: usize,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReconcileReport {
    /// Whether any module was loaded, reloaded or unloaded.
    pub fn changed(&self) -> bool {
        !(self.loaded.is_empty() && self.reloaded.is_empty() && self.unloaded.is_empty())
    }
}

pub struct Reconciliation {
    pub modules: ModuleMap,
    pub changed: bool,
    pub report: ReconcileReport,
}

pub fn reconcile(
    loader: &dyn ModuleLoader,
    mut current: ModuleMap,
    listing: &BTreeSet<PathBuf>,
) -> Reconciliation {
    let mut modules = ModuleMap::new();
    let mut report = ReconcileReport::default();

    for path in listing {
        let module = match ModuleBytes::read(path) {
            Ok(module) => module,
            Err(e) => {
                warn!("{}; will retry next cycle", e);
                report.failed.push((path.clone(), e.to_string()));
                if let Some(record) = current.remove(path) {
                    modules.insert(path.clone(), record);
                    report.retained += 1;
                }
                continue;
            }
        };

        let replacing = match current.remove(path) {
            Some(record) if record.fingerprint() == module.fingerprint => {
                debug!(
                    "Module {:?} unchanged since {}",
                    path,
                    record.loaded_at().to_rfc3339()
                );
                modules.insert(path.clone(), record);
                report.retained += 1;
                continue;
            }
            Some(stale) => {
                // The superseded code goes before its replacement is mapped.
                drop(stale);
                true
            }
            None => false,
        };

        match loader.load(path, &module) {
            Ok(record) => {
                modules.insert(path.clone(), record);
                if replacing {
                    report.reloaded.push(path.clone());
                } else {
                    report.loaded.push(path.clone());
                }
            }
            Err(e) => {
                warn!("Failed to load module {:?}: {}; will retry next cycle", path, e);
                report.failed.push((path.clone(), e.to_string()));
                if replacing {
                    report.unloaded.push(path.clone());
                }
            }
        }
    }

    for (path, record) in current {
        drop(record);
        report.unloaded.push(path);
    }

    report.finished_at = Some(Utc::now());
    Reconciliation {
        modules,
        changed: report.changed(),
        report,
    }
}
