//! Module Loader
//!
//! Maps module bytes into the process as dynamic libraries and enumerates the capabilities they
//! export through the `rehost_module_declaration` entry point.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use libloading::{Library, Symbol};
use rehost_abi::{Capability, ModuleDeclaration, ENTRY_SYMBOL, ENTRY_SYMBOL_NAME};
use tracing::{debug, info, warn};

use super::fingerprint::ModuleBytes;
use super::record::{ModuleRecord, ModuleUnit};
use crate::common::{module_extension, LoadError};

/// Turns module bytes into a loaded [`ModuleRecord`].
///
/// Ownership of the returned record passes to the caller; dropping it unloads the module. On
/// error, nothing stays loaded.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path, module: &ModuleBytes) -> Result<ModuleRecord, LoadError>;

    /// Releases loader-wide resources once every module it produced is unloaded.
    fn shutdown(&self) {}
}

/// An open dynamic library and the shadow file it was mapped from.
///
/// Dropping closes the library, then deletes the shadow file.
pub struct LibraryHandle {
    library: Option<Library>,
    shadow_path: PathBuf,
}

impl LibraryHandle {
    fn open(shadow_path: PathBuf) -> Result<Self, LoadError> {
        // SAFETY: module initializers run with full host privilege; modules are trusted code.
        match unsafe { Library::new(&shadow_path) } {
            Ok(library) => Ok(Self {
                library: Some(library),
                shadow_path,
            }),
            Err(e) => {
                remove_shadow(&shadow_path);
                Err(LoadError::failure(e))
            }
        }
    }

    fn declaration(&self) -> Result<ModuleDeclaration, LoadError> {
        let library = self
            .library
            .as_ref()
            .ok_or_else(|| LoadError::failure("library already closed"))?;

        // SAFETY: the symbol is declared by `rehost_abi::export_module!` as a
        // `ModuleDeclaration` static. Its ABI version is checked before any function pointer in
        // it is called.
        unsafe {
            let symbol: Symbol<*const ModuleDeclaration> = library
                .get(ENTRY_SYMBOL)
                .map_err(|e| LoadError::failure(format!("missing `{ENTRY_SYMBOL_NAME}`: {e}")))?;
            let declaration = *symbol;
            if declaration.is_null() {
                return Err(LoadError::failure(format!("`{ENTRY_SYMBOL_NAME}` is null")));
            }
            Ok(declaration.read())
        }
    }
}

impl Drop for LibraryHandle {
    fn drop(&mut self) {
        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                warn!("Failed to close library {:?}: {}", self.shadow_path, e);
            }
        }
        remove_shadow(&self.shadow_path);
    }
}

fn remove_shadow(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove shadow copy {:?}: {}", path, e),
    }
}

/// Drops capabilities whose prefix is empty or carries surrounding whitespace. Console lines are
/// trimmed before matching, so such a prefix could never match.
pub(crate) fn usable_capabilities(
    path: &Path,
    capabilities: Vec<Box<dyn Capability>>,
) -> Vec<Box<dyn Capability>> {
    capabilities
        .into_iter()
        .filter(|capability| {
            let prefix = capability.prefix();
            let usable = !prefix.is_empty() && prefix.trim() == prefix;
            if !usable {
                warn!("Skipping capability with unusable prefix {:?} in {:?}", prefix, path);
            }
            usable
        })
        .collect()
}

/// Loads modules as dynamic libraries from private shadow copies.
///
/// The module directory file itself is never mapped, so it can be replaced or deleted while the
/// old code is still loaded, and the code that runs is exactly the fingerprinted bytes.
pub struct DylibLoader {
    shadow_dir: PathBuf,
    sequence: AtomicU64,
}

impl DylibLoader {
    pub fn new(shadow_dir: impl Into<PathBuf>) -> Self {
        Self {
            shadow_dir: shadow_dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn shadow_dir(&self) -> &Path {
        &self.shadow_dir
    }

    /// Removes the shadow directory. Call once every module is unloaded.
    pub fn cleanup(&self) {
        match fs::remove_dir_all(&self.shadow_dir) {
            Ok(()) => debug!("Removed shadow directory {:?}", self.shadow_dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove shadow directory {:?}: {}", self.shadow_dir, e),
        }
    }

    fn write_shadow(&self, path: &Path, module: &ModuleBytes) -> Result<PathBuf, LoadError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module");
        // A fresh name per load keeps the dynamic linker from handing back a cached handle.
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let shadow_path = self.shadow_dir.join(format!(
            "{}-{}-{}.{}",
            stem,
            module.fingerprint.short(12),
            sequence,
            module_extension()
        ));

        fs::create_dir_all(&self.shadow_dir)
            .and_then(|()| fs::write(&shadow_path, &module.bytes))
            .map_err(|e| {
                remove_shadow(&shadow_path);
                LoadError::failure(format!("failed to write shadow copy {shadow_path:?}: {e}"))
            })?;

        Ok(shadow_path)
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &Path, module: &ModuleBytes) -> Result<ModuleRecord, LoadError> {
        let shadow_path = self.write_shadow(path, module)?;
        debug!("Loading {:?} from shadow copy {:?}", path, shadow_path);

        let handle = LibraryHandle::open(shadow_path)?;
        let declaration = handle.declaration()?;

        declaration.check_compatible().map_err(LoadError::failure)?;

        // Construction runs under the module's own panic guard. Capabilities created before a
        // failing factory are dropped while `handle` still keeps their code mapped.
        let capabilities = declaration.capabilities().map_err(LoadError::failure)?;
        let capabilities = usable_capabilities(path, capabilities);

        if capabilities.is_empty() {
            return Err(LoadError::NoCapabilitiesFound);
        }

        info!(
            "Loaded module {:?} ({} capabilities, fingerprint {})",
            path,
            capabilities.len(),
            module.fingerprint.short(12)
        );

        let unit = ModuleUnit::new(path, capabilities, Some(handle));
        Ok(ModuleRecord::new(path, module.fingerprint, unit))
    }

    fn shutdown(&self) {
        self.cleanup();
    }
}
