//! Runtime module system.
//!
//! Modules are dynamically loaded libraries (.so/.dylib/.dll) that contribute
//! task and check classes to the host. Loading a module runs its
//! registration entry point, which fills a [`TypeRegistry`] with named
//! descriptors. The [`ClassFactory`] then resolves a class name to a
//! descriptor and constructs an instance behind a caller-chosen interface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    ClassFactory                      │
//! │  - create::<dyn Task>(module, class)                 │
//! │  - fatal on missing module, class or instance        │
//! └─────────────────────────────────────────────────────┘
//!                │                          │
//!                ▼                          ▼
//!   ┌─────────────────────────┐  ┌─────────────────────┐
//!   │      ModuleLoader       │  │    TypeRegistry     │
//!   │  (load once, no unload) │─▶│ class → factory fn  │
//!   └─────────────────────────┘  └─────────────────────┘
//!          │             │
//!          ▼             ▼
//!   ┌─────────────┐ ┌─────────────┐
//!   │ NativeLoader│ │ StaticLoader│
//!   │ (.so/.dll)  │ │ (in-process)│
//!   └─────────────┘ └─────────────┘
//! ```
//!
//! # FFI Exports
//!
//! Native modules must export these symbols, generated by
//! [`export_module!`](crate::export_module):
//! - `qc_module_abi_version()` -> u32 (must equal [`MODULE_ABI_VERSION`])
//! - `qc_module_register(*mut TypeRegistry)`
//!
//! Descriptors cross the library boundary as Rust types, so a module must be
//! built with the same toolchain and the same `qc-framework` version as the
//! host.

pub mod factory;
pub mod loader;
pub mod native;
pub mod registry;

use std::path::PathBuf;

use thiserror::Error;

pub use factory::{ClassFactory, FactoryError, FatalError};
pub use loader::{DynamicLoader, ModuleLoader, ModuleState, RegisterFn, StaticLoader};
pub use native::NativeLoader;
pub use registry::{InterfaceKey, Instantiation, TypeDescriptor, TypeRegistry};

/// ABI version a native module must report.
pub const MODULE_ABI_VERSION: u32 = 1;

/// Symbol exporting the module ABI version.
pub const ABI_VERSION_SYMBOL: &str = "qc_module_abi_version";

/// Symbol exporting the module registration entry point.
pub const REGISTER_SYMBOL: &str = "qc_module_register";

/// Errors raised while bringing a module into the process.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("Module not found: {module} ({path})")]
    NotFound { module: String, path: PathBuf },

    #[error("Failed to load library for module {module}: {source}")]
    Library {
        module: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Symbol {symbol} not found in module {module}: {source}")]
    SymbolNotFound {
        module: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("Incompatible ABI in module {module}: expected {expected}, got {got}")]
    IncompatibleAbi {
        module: String,
        expected: u32,
        got: u32,
    },

    #[error("Unknown module: {0}")]
    Unknown(String),
}

impl ModuleLoadError {
    /// Name of the module that failed to load.
    pub fn module(&self) -> &str {
        match self {
            ModuleLoadError::NotFound { module, .. }
            | ModuleLoadError::Library { module, .. }
            | ModuleLoadError::SymbolNotFound { module, .. }
            | ModuleLoadError::IncompatibleAbi { module, .. } => module,
            ModuleLoadError::Unknown(module) => module,
        }
    }
}

/// Check if a file looks like a native module library.
pub fn is_native_module(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| matches!(ext, "so" | "dylib" | "dll"))
        .unwrap_or(false)
}
