//! Module registration convention.
//!
//! Each module exports exactly one static named [`ENTRY_SYMBOL_NAME`]. It carries the contract
//! versions the module was built against and a constructor for the module's capabilities.

use thiserror::Error;

use crate::Capability;

/// Bumped whenever [`Capability`] or [`ModuleDeclaration`] changes shape.
pub const ABI_VERSION: u32 = 1;

/// Compiler that built this crate. Trait objects only cross the library boundary safely when
/// host and module agree on it.
pub const RUSTC_VERSION: &str = env!("REHOST_RUSTC_VERSION");

pub const ENTRY_SYMBOL_NAME: &str = "rehost_module_declaration";

/// NUL-terminated form of [`ENTRY_SYMBOL_NAME`] for symbol lookup.
pub const ENTRY_SYMBOL: &[u8] = b"rehost_module_declaration\0";

/// Constructs one capability instance.
pub type CapabilityFactory = fn() -> Box<dyn Capability>;

/// Why a declaration cannot be used by this build of the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatibility {
    #[error("ABI version {found} does not match host ABI version {expected}")]
    AbiVersion { found: u32, expected: u32 },

    #[error("built with `{found}`, host built with `{expected}`")]
    Rustc { found: String, expected: String },
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct ModuleDeclaration {
    pub abi_version: u32,
    pub rustc_version: &'static str,
    /// Compiled into the module by [`export_module!`]; returns guarded capabilities or the text
    /// of a construction panic.
    pub construct: fn() -> Result<Vec<Box<dyn Capability>>, String>,
}

impl ModuleDeclaration {
    /// Runs every factory, in declaration order.
    pub fn capabilities(&self) -> Result<Vec<Box<dyn Capability>>, String> {
        (self.construct)()
    }

    /// Checks the declared versions against the ones this crate was built with.
    ///
    /// Nothing else in the declaration may be touched until this succeeds.
    pub fn check_compatible(&self) -> Result<(), Incompatibility> {
        if self.abi_version != ABI_VERSION {
            return Err(Incompatibility::AbiVersion {
                found: self.abi_version,
                expected: ABI_VERSION,
            });
        }
        if self.rustc_version != RUSTC_VERSION {
            return Err(Incompatibility::Rustc {
                found: self.rustc_version.to_string(),
                expected: RUSTC_VERSION.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_compatible(&self) -> bool {
        self.check_compatible().is_ok()
    }
}

impl std::fmt::Debug for ModuleDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDeclaration")
            .field("abi_version", &self.abi_version)
            .field("rustc_version", &self.rustc_version)
            .finish_non_exhaustive()
    }
}

/// Exports a [`ModuleDeclaration`] listing the given capability factories.
///
/// Each argument is a path to a `fn() -> Box<dyn Capability>`. The generated constructor and the
/// guards around every capability are compiled into the module, so module panics never unwind
/// into the host.
///
/// ```ignore
/// fn echo() -> Box<dyn rehost_abi::Capability> {
///     Box::new(Echo)
/// }
///
/// rehost_abi::export_module!(echo);
/// ```
#[macro_export]
macro_rules! export_module {
    ($($factory:expr),+ $(,)?) => {
        #[doc(hidden)]
        fn __rehost_construct_capabilities() -> ::std::result::Result<
            ::std::vec::Vec<::std::boxed::Box<dyn $crate::Capability>>,
            ::std::string::String,
        > {
            $crate::guard::construct(&[$($factory as $crate::CapabilityFactory),+])
        }

        #[doc(hidden)]
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static rehost_module_declaration: $crate::ModuleDeclaration = $crate::ModuleDeclaration {
            abi_version: $crate::ABI_VERSION,
            rustc_version: $crate::RUSTC_VERSION,
            construct: __rehost_construct_capabilities,
        };
    };
}
