//! Native module loader for .so/.dylib/.dll files.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::loader::DynamicLoader;
use super::registry::TypeRegistry;
use super::{ModuleLoadError, ABI_VERSION_SYMBOL, MODULE_ABI_VERSION, REGISTER_SYMBOL};

/// Type for the exported ABI version function.
type AbiVersionFn = unsafe extern "C" fn() -> u32;
/// Type for the exported registration function.
type ModuleRegisterFn = unsafe extern "C" fn(*mut TypeRegistry);

/// Loads modules from shared libraries.
#[derive(Debug, Default)]
pub struct NativeLoader {
    /// Directories searched in order before falling back to the platform loader
    search_paths: Vec<PathBuf>,
}

impl NativeLoader {
    /// Create a loader that relies on the platform library search path.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Add a directory to search for module libraries.
    pub fn with_search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Configured search directories.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Work out which file to hand to the platform loader for a module.
    ///
    /// A name that already looks like a library path is used verbatim and
    /// must exist. Otherwise `QcTPC` becomes `libQcTPC.so` (or the platform
    /// equivalent) and is looked up in the search paths.
    pub fn resolve(&self, module_name: &str) -> Result<PathBuf, ModuleLoadError> {
        let as_path = Path::new(module_name);
        if super::is_native_module(as_path) || as_path.components().count() > 1 {
            if !as_path.exists() {
                return Err(ModuleLoadError::NotFound {
                    module: module_name.to_string(),
                    path: as_path.to_path_buf(),
                });
            }
            return Ok(as_path.to_path_buf());
        }

        let stem = module_name.strip_prefix("lib").unwrap_or(module_name);
        let file_name = PathBuf::from(libloading::library_filename(stem));

        Ok(self
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .unwrap_or(file_name))
    }
}

impl DynamicLoader for NativeLoader {
    fn load(
        &mut self,
        module_name: &str,
        registry: &mut TypeRegistry,
    ) -> Result<(), ModuleLoadError> {
        let path = self.resolve(module_name)?;
        tracing::debug!(module = module_name, path = %path.display(), "Opening module library");

        let library = unsafe {
            Library::new(&path).map_err(|source| ModuleLoadError::Library {
                module: module_name.to_string(),
                source,
            })?
        };

        {
            let abi_version: Symbol<AbiVersionFn> = unsafe {
                library
                    .get(ABI_VERSION_SYMBOL.as_bytes())
                    .map_err(|source| ModuleLoadError::SymbolNotFound {
                        module: module_name.to_string(),
                        symbol: ABI_VERSION_SYMBOL,
                        source,
                    })?
            };
            let got = unsafe { abi_version() };
            if got != MODULE_ABI_VERSION {
                return Err(ModuleLoadError::IncompatibleAbi {
                    module: module_name.to_string(),
                    expected: MODULE_ABI_VERSION,
                    got,
                });
            }

            let register: Symbol<ModuleRegisterFn> = unsafe {
                library
                    .get(REGISTER_SYMBOL.as_bytes())
                    .map_err(|source| ModuleLoadError::SymbolNotFound {
                        module: module_name.to_string(),
                        symbol: REGISTER_SYMBOL,
                        source,
                    })?
            };
            unsafe { register(registry as *mut TypeRegistry) };
        }

        // Registered factories point into the library, and instances built
        // from them may outlive this loader, so the library stays resident.
        std::mem::forget(library);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_creation() {
        let loader = NativeLoader::new().with_search_path("/opt/qc/lib");
        assert_eq!(loader.search_paths().len(), 1);
    }

    #[test]
    fn test_resolve_bare_name_without_search_paths() {
        let loader = NativeLoader::new();
        let path = loader.resolve("QcSkeleton").unwrap();
        assert_eq!(path, PathBuf::from(libloading::library_filename("QcSkeleton")));
    }

    #[test]
    fn test_resolve_strips_lib_prefix() {
        let loader = NativeLoader::new();
        assert_eq!(
            loader.resolve("libQcSkeleton").unwrap(),
            loader.resolve("QcSkeleton").unwrap()
        );
    }

    #[test]
    fn test_resolve_missing_explicit_path() {
        let loader = NativeLoader::new();
        let result = loader.resolve("/nonexistent/path/libQcSkeleton.so");
        assert!(matches!(result, Err(ModuleLoadError::NotFound { .. })));
    }
}
