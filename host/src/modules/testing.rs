//! In-process stand-ins for dynamic modules.
//!
//! [`ScriptedLoader`] reads a module file as text, one capability prefix per line, and builds the
//! capabilities inside the host image. The word `corrupt` anywhere in the file makes the load
//! fail; `echo` maps to the sample echo module; `panic:<prefix>` yields a capability whose handler
//! panics.
//!
//! [`module_library`] locates the real dynamic libraries of the workspace's module crates for
//! tests that go through the dynamic loader.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rehost_abi::{arguments, Capability, CapabilityFault};

use super::fingerprint::ModuleBytes;
use super::loader::ModuleLoader;
use super::record::{ModuleRecord, ModuleUnit};
use crate::common::LoadError;

/// Writes `<prefix>@<tag>: <arguments>` for every line it handles.
struct Tagged {
    prefix: String,
    tag: String,
}

impl Capability for Tagged {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(&self, line: &str, out: &mut dyn io::Write) -> Result<(), CapabilityFault> {
        writeln!(
            out,
            "{}@{}: {}",
            self.prefix,
            self.tag,
            arguments(line, &self.prefix)
        )?;
        Ok(())
    }
}

struct Recording {
    prefix: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Capability for Recording {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(&self, line: &str, _out: &mut dyn io::Write) -> Result<(), CapabilityFault> {
        self.calls.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

struct Panicking {
    prefix: String,
}

impl Capability for Panicking {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(&self, _line: &str, _out: &mut dyn io::Write) -> Result<(), CapabilityFault> {
        panic!("{} exploded", self.prefix)
    }
}

pub fn capability(prefix: &str) -> Box<dyn Capability> {
    Box::new(Tagged {
        prefix: prefix.to_string(),
        tag: "test".to_string(),
    })
}

pub fn recording(prefix: &str) -> (Box<dyn Capability>, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let capability = Box::new(Recording {
        prefix: prefix.to_string(),
        calls: Arc::clone(&calls),
    });
    (capability, calls)
}

#[derive(Debug, Default)]
pub struct ScriptedLoader {
    loads: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Successful and failed load attempts so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for ScriptedLoader {
    fn load(&self, path: &Path, module: &ModuleBytes) -> Result<ModuleRecord, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let text = std::str::from_utf8(&module.bytes).map_err(LoadError::failure)?;
        if text.contains("corrupt") {
            return Err(LoadError::failure("not a loadable module"));
        }

        let tag = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string();

        let capabilities: Vec<Box<dyn Capability>> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| match line.strip_prefix("panic:") {
                Some(prefix) => Box::new(Panicking {
                    prefix: prefix.to_string(),
                }) as Box<dyn Capability>,
                None if line == rehost_echo::ECHO_PREFIX => rehost_echo::echo(),
                None => Box::new(Tagged {
                    prefix: line.to_string(),
                    tag: tag.clone(),
                }),
            })
            .collect();

        if capabilities.is_empty() {
            return Err(LoadError::NoCapabilitiesFound);
        }

        let unit = ModuleUnit::new(path, capabilities, None);
        Ok(ModuleRecord::new(path, module.fingerprint, unit))
    }
}

/// Path to the dynamic library built from the workspace module crate `lib_name`.
///
/// Dev-dependencies with a `cdylib` target are built next to the test binary. When the library is
/// not there, it is built into a separate target directory.
pub fn module_library(lib_name: &str) -> PathBuf {
    let file_name = format!("{DLL_PREFIX}{lib_name}{DLL_SUFFIX}");

    let exe = std::env::current_exe().unwrap();
    let deps_dir = exe.parent().unwrap();
    let candidates = [deps_dir.join(&file_name), deps_dir.join("..").join(&file_name)];
    if let Some(found) = candidates.iter().find(|path| path.is_file()) {
        return found.clone();
    }

    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
    let target_dir = deps_dir.join("..").join("..").join("rehost-test-modules");
    let package = lib_name.replace('_', "-");
    let status = Command::new(option_env!("CARGO").unwrap_or("cargo"))
        .arg("build")
        .arg("--manifest-path")
        .arg(workspace.join("Cargo.toml"))
        .args(["-p", &package, "--lib"])
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .unwrap();
    assert!(status.success(), "building {package} failed");

    let built = target_dir.join("debug").join(&file_name);
    assert!(built.is_file(), "{built:?} missing after build");
    built
}
