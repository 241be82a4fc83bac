//! Path Utilities
//!
//! Resolution of the module directory and the shadow-copy directory.

use std::env;
use std::path::PathBuf;

use super::error::HostError;

const MODULE_DIR_NAME: &str = "modules";

/// Extension of loadable module files on this platform (`so`, `dylib` or `dll`).
pub fn module_extension() -> &'static str {
    env::consts::DLL_EXTENSION
}

/// Default module directory: `<executable dir>/modules`
pub fn default_module_dir() -> Result<PathBuf, HostError> {
    let exe = env::current_exe().map_err(|e| HostError::Resolve(e.to_string()))?;
    let dir = exe
        .parent()
        .ok_or_else(|| HostError::Resolve(format!("{} has no parent", exe.display())))?;
    Ok(dir.join(MODULE_DIR_NAME))
}

/// Per-process directory holding the shadow copies that are actually mapped
///
/// `<cache dir>/rehost/shadow/<pid>`, falling back to the system temp dir.
pub fn shadow_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("rehost")
        .join("shadow")
        .join(std::process::id().to_string())
}
