//! Capability contract shared by the rehost plugin host and the modules it loads.
//!
//! A module is a `cdylib` that depends on this crate and invokes [`export_module!`] once. The
//! host resolves the exported [`ModuleDeclaration`] by its fixed symbol name, checks
//! [`ABI_VERSION`] and [`RUSTC_VERSION`], and constructs capabilities through the declared
//! factories. Panics raised by module code are caught before they cross back into the host.

pub mod capability;
pub mod declaration;
pub mod guard;

pub use capability::{arguments, Capability, CapabilityFault};
pub use declaration::{
    CapabilityFactory, Incompatibility, ModuleDeclaration, ABI_VERSION, ENTRY_SYMBOL,
    ENTRY_SYMBOL_NAME, RUSTC_VERSION,
};
pub use guard::panic_message;
