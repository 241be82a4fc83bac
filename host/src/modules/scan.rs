//! Module Directory Scan
//!
//! Lists the module files currently present in the module directory.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Whether `path` names a module file: the given extension, not a dotfile or editor temp file.
pub fn is_module_file(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') || name.ends_with(".tmp") || name.ends_with(".swp") {
        return false;
    }
    path.extension().and_then(|s| s.to_str()) == Some(extension)
}

/// Module files directly inside `dir`, sorted by path.
///
/// Fails only if the directory itself cannot be read; unreadable entries are skipped.
pub fn scan_module_dir(dir: &Path, extension: &str) -> io::Result<BTreeSet<PathBuf>> {
    let mut listing = BTreeSet::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read entry in {:?}: {}", dir, e);
                continue;
            }
        };

        let path = entry.path();
        if !is_module_file(&path, extension) {
            continue;
        }

        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => continue,
            Ok(_) => {
                listing.insert(path);
            }
            Err(e) => warn!("Failed to stat {:?}: {}", path, e),
        }
    }

    debug!("Found {} module files in {:?}", listing.len(), dir);
    Ok(listing)
}
