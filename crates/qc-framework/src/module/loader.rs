//! Load-once bookkeeping on top of a dynamic loading facility.

use std::collections::{HashMap, HashSet};

use super::registry::TypeRegistry;
use super::ModuleLoadError;

/// Registration entry point of a module.
pub type RegisterFn = fn(&mut TypeRegistry);

/// Facility that brings a module's code into the process.
///
/// A successful `load` must leave the module's descriptors in `registry`.
pub trait DynamicLoader: Send {
    /// Load `module_name` and run its registration entry point.
    fn load(&mut self, module_name: &str, registry: &mut TypeRegistry)
        -> Result<(), ModuleLoadError>;
}

/// Load state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    NotLoaded,
    Loaded,
}

/// Tracks which modules are resident and loads each one at most once.
///
/// Modules are never unloaded: descriptors and instances created from them
/// may be referenced for the rest of the process.
pub struct ModuleLoader<D> {
    facility: D,
    loaded: HashSet<String>,
}

impl<D: DynamicLoader> ModuleLoader<D> {
    /// Create a loader on top of a loading facility.
    pub fn new(facility: D) -> Self {
        Self {
            facility,
            loaded: HashSet::new(),
        }
    }

    /// Make sure `module_name` is loaded; later calls for the same name are no-ops.
    pub fn ensure_loaded(
        &mut self,
        module_name: &str,
        registry: &mut TypeRegistry,
    ) -> Result<(), ModuleLoadError> {
        if self.loaded.contains(module_name) {
            tracing::debug!(module = module_name, "Module already loaded");
            return Ok(());
        }

        self.facility.load(module_name, registry)?;
        self.loaded.insert(module_name.to_string());
        tracing::info!(module = module_name, "Loaded module");
        Ok(())
    }

    /// Current state of a module.
    pub fn state(&self, module_name: &str) -> ModuleState {
        if self.loaded.contains(module_name) {
            ModuleState::Loaded
        } else {
            ModuleState::NotLoaded
        }
    }

    /// Names of all loaded modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.iter().cloned().collect();
        names.sort();
        names
    }

    /// The underlying facility.
    pub fn facility(&self) -> &D {
        &self.facility
    }
}

/// In-process facility for modules linked into the host binary.
#[derive(Default)]
pub struct StaticLoader {
    modules: HashMap<String, RegisterFn>,
}

impl StaticLoader {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Add a module under `module_name`.
    pub fn with_module(mut self, module_name: impl Into<String>, register: RegisterFn) -> Self {
        self.modules.insert(module_name.into(), register);
        self
    }

    /// Whether a module is available.
    pub fn provides(&self, module_name: &str) -> bool {
        self.modules.contains_key(module_name)
    }
}

impl DynamicLoader for StaticLoader {
    fn load(
        &mut self,
        module_name: &str,
        registry: &mut TypeRegistry,
    ) -> Result<(), ModuleLoadError> {
        let register = self
            .modules
            .get(module_name)
            .ok_or_else(|| ModuleLoadError::Unknown(module_name.to_string()))?;
        register(registry);
        Ok(())
    }
}
