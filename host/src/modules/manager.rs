//! Module Manager
//!
//! Owns the live module map. Serializes reconciliations and publishes a new registry state
//! whenever one changes the loaded module set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::loader::ModuleLoader;
use super::reconciler::{reconcile, ModuleMap, ReconcileReport};
use super::scan::scan_module_dir;
use crate::common::module_extension;
use crate::registry::CapabilityRegistry;

pub struct ModuleManager {
    module_dir: PathBuf,
    extension: String,
    loader: Arc<dyn ModuleLoader>,
    registry: Arc<CapabilityRegistry>,
    // Held for the whole of a reconciliation, so reconciliations never interleave.
    modules: Mutex<ModuleMap>,
}

impl ModuleManager {
    pub fn new(
        module_dir: impl Into<PathBuf>,
        loader: Arc<dyn ModuleLoader>,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            module_dir: module_dir.into(),
            extension: module_extension().to_string(),
            loader,
            registry,
            modules: Mutex::new(ModuleMap::new()),
        }
    }

    /// Overrides the module file extension (the platform library extension by default).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Paths of the currently loaded modules.
    pub async fn loaded_paths(&self) -> Vec<PathBuf> {
        self.modules.lock().await.keys().cloned().collect()
    }

    /// Rescans the module directory and reconciles the loaded modules against it.
    pub async fn resync(&self) -> ReconcileReport {
        let mut modules = self.modules.lock().await;

        let current = std::mem::take(&mut *modules);
        let dir = self.module_dir.clone();
        let extension = self.extension.clone();
        let loader = Arc::clone(&self.loader);

        let outcome = tokio::task::spawn_blocking(move || match scan_module_dir(&dir, &extension) {
            Ok(listing) => Ok(reconcile(loader.as_ref(), current, &listing)),
            Err(e) => Err((current, e)),
        })
        .await;

        match outcome {
            Ok(Ok(reconciliation)) => {
                *modules = reconciliation.modules;
                let report = reconciliation.report;
                if reconciliation.changed {
                    info!(
                        "Reconciled {:?}: {} loaded, {} reloaded, {} unloaded, {} retained, {} failed",
                        self.module_dir,
                        report.loaded.len(),
                        report.reloaded.len(),
                        report.unloaded.len(),
                        report.retained,
                        report.failed.len()
                    );
                    self.registry.publish(&modules);
                } else {
                    debug!(
                        "Reconciled {:?}: no changes ({} retained)",
                        self.module_dir, report.retained
                    );
                }
                report
            }
            Ok(Err((current, e))) => {
                warn!(
                    "Failed to scan module directory {:?}: {}; keeping {} loaded modules",
                    self.module_dir,
                    e,
                    current.len()
                );
                *modules = current;
                ReconcileReport {
                    finished_at: Some(Utc::now()),
                    ..ReconcileReport::default()
                }
            }
            Err(e) => {
                // The map went down with the task, so every module is already unloaded.
                error!("Reconciliation task failed: {}", e);
                self.registry.publish(&modules);
                ReconcileReport {
                    finished_at: Some(Utc::now()),
                    ..ReconcileReport::default()
                }
            }
        }
    }

    /// Withdraws every capability, then unloads every module.
    pub async fn shutdown(&self) {
        let mut modules = self.modules.lock().await;
        let unloading = std::mem::take(&mut *modules);
        if unloading.is_empty() {
            return;
        }

        self.registry.publish(&modules);
        info!("Unloading {} modules", unloading.len());
        drop(unloading);
    }
}
