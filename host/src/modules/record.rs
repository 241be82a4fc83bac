//! Module Records
//!
//! A loaded module is split into three pieces:
//!
//! - [`ModuleUnit`] owns the module's code: its capability objects and its library handle, behind
//!   a read/write gate. Invocations hold the read side, unloading takes the write side.
//! - [`ModuleRecord`] is the reconciler's bookkeeping entry for one path. Dropping it unloads the
//!   unit.
//! - [`CapabilityInstance`] is the handle published in registry snapshots. It never outlives the
//!   code it points at: once the unit is unloaded, invoking it reports [`InvokeError::Withdrawn`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rehost_abi::{Capability, CapabilityFault};
use tracing::info;

use super::fingerprint::Fingerprint;
use super::loader::LibraryHandle;

/// Case folding used for prefix matching.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

#[derive(Debug)]
pub enum InvokeError {
    /// The owning module was unloaded after the snapshot was taken.
    Withdrawn,
    Fault(CapabilityFault),
}

struct LoadedCode {
    // Field order is drop order: capability objects live in the library's memory and must go
    // before it is closed.
    capabilities: Vec<Box<dyn Capability>>,
    _library: Option<LibraryHandle>,
}

/// An independently unloadable unit of loaded code.
pub struct ModuleUnit {
    path: PathBuf,
    code: RwLock<Option<LoadedCode>>,
}

impl ModuleUnit {
    /// `library` is `None` for code that lives in the host image itself.
    pub fn new(
        path: impl Into<PathBuf>,
        capabilities: Vec<Box<dyn Capability>>,
        library: Option<LibraryHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            code: RwLock::new(Some(LoadedCode {
                capabilities,
                _library: library,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.code
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn prefixes(&self) -> Vec<String> {
        let code = self.code.read().unwrap_or_else(PoisonError::into_inner);
        code.iter()
            .flat_map(|code| code.capabilities.iter())
            .map(|capability| capability.prefix().to_string())
            .collect()
    }

    /// Runs the capability in `slot`. The unit cannot be unloaded while this is in progress.
    pub fn invoke(&self, slot: usize, line: &str, out: &mut dyn io::Write) -> Result<(), InvokeError> {
        let code = self.code.read().unwrap_or_else(PoisonError::into_inner);
        let capability = code
            .as_ref()
            .and_then(|code| code.capabilities.get(slot))
            .ok_or(InvokeError::Withdrawn)?;
        capability.handle(line, out).map_err(InvokeError::Fault)
    }

    /// Waits for in-flight invocations, then drops the capabilities and closes the library.
    ///
    /// Returns `false` if the unit was already unloaded.
    pub fn unload(&self) -> bool {
        let code = self
            .code
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        code.is_some()
    }
}

impl fmt::Debug for ModuleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleUnit")
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Published handle to one capability of a loaded module.
#[derive(Clone)]
pub struct CapabilityInstance {
    prefix: Arc<str>,
    folded_prefix: Arc<str>,
    slot: usize,
    unit: Arc<ModuleUnit>,
}

impl CapabilityInstance {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn module_path(&self) -> &Path {
        self.unit.path()
    }

    /// `folded_line` must already be passed through [`fold_case`].
    pub fn matches_folded(&self, folded_line: &str) -> bool {
        folded_line.starts_with(&*self.folded_prefix)
    }

    pub fn matches(&self, line: &str) -> bool {
        self.matches_folded(&fold_case(line))
    }

    pub fn invoke(&self, line: &str, out: &mut dyn io::Write) -> Result<(), InvokeError> {
        self.unit.invoke(self.slot, line, out)
    }

    pub fn is_live(&self) -> bool {
        self.unit.is_loaded()
    }
}

impl fmt::Debug for CapabilityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityInstance")
            .field("prefix", &self.prefix)
            .field("module", &self.unit.path())
            .field("slot", &self.slot)
            .finish()
    }
}

/// Bookkeeping for one loaded module file. Never updated in place: a changed file gets a new
/// record and the old one is dropped, which unloads it.
pub struct ModuleRecord {
    path: PathBuf,
    fingerprint: Fingerprint,
    loaded_at: DateTime<Utc>,
    capabilities: Vec<CapabilityInstance>,
    unit: Arc<ModuleUnit>,
}

impl ModuleRecord {
    pub fn new(path: impl Into<PathBuf>, fingerprint: Fingerprint, unit: Arc<ModuleUnit>) -> Self {
        let capabilities = unit
            .prefixes()
            .into_iter()
            .enumerate()
            .map(|(slot, prefix)| CapabilityInstance {
                folded_prefix: fold_case(&prefix).into(),
                prefix: prefix.into(),
                slot,
                unit: Arc::clone(&unit),
            })
            .collect();

        Self {
            path: path.into(),
            fingerprint,
            loaded_at: Utc::now(),
            capabilities,
            unit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn capabilities(&self) -> &[CapabilityInstance] {
        &self.capabilities
    }

    pub fn unit(&self) -> &Arc<ModuleUnit> {
        &self.unit
    }
}

impl Drop for ModuleRecord {
    fn drop(&mut self) {
        if self.unit.unload() {
            info!(
                "Unloaded module {:?} ({} capabilities, fingerprint {})",
                self.path,
                self.capabilities.len(),
                self.fingerprint.short(12)
            );
        }
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("path", &self.path)
            .field("fingerprint", &self.fingerprint)
            .field("loaded_at", &self.loaded_at)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
