//! Class factory: module name + class name → instance of an interface.

use parking_lot::Mutex;
use thiserror::Error;

use super::loader::{DynamicLoader, ModuleLoader, ModuleState};
use super::native::NativeLoader;
use super::registry::{InterfaceKey, Instantiation, TypeRegistry};
use super::ModuleLoadError;

/// A module provided no usable class; the deployment is broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("no type descriptor for {0}")]
    NoDescriptor(String),

    #[error("type descriptor for {0} produced no instance")]
    EmptyInstance(String),

    #[error("{class_name} is registered as {registered}, requested as {requested}")]
    InterfaceMismatch {
        class_name: String,
        registered: String,
        requested: String,
    },
}

/// Errors returned by [`ClassFactory::create`]. All of them are fatal to the
/// feature that asked for the class.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("Failed to instantiate Quality Control module: {0}")]
    Fatal(#[from] FatalError),
}

struct FactoryState<D> {
    loader: ModuleLoader<D>,
    registry: TypeRegistry,
}

/// Resolves classes from runtime modules and constructs them.
///
/// Loading, lookup and construction happen under one lock, so concurrent
/// `create` calls never load the same module twice.
pub struct ClassFactory<D = NativeLoader> {
    state: Mutex<FactoryState<D>>,
}

impl ClassFactory<NativeLoader> {
    /// Factory backed by shared libraries.
    pub fn native(loader: NativeLoader) -> Self {
        Self::new(loader)
    }
}

impl<D: DynamicLoader> ClassFactory<D> {
    /// Create a factory on top of a loading facility.
    pub fn new(facility: D) -> Self {
        Self {
            state: Mutex::new(FactoryState {
                loader: ModuleLoader::new(facility),
                registry: TypeRegistry::new(),
            }),
        }
    }

    /// Load `module_name` if needed and build a new `class_name` as `T`.
    ///
    /// ```rust,ignore
    /// let factory = ClassFactory::native(NativeLoader::new());
    /// let task = factory.create::<dyn Task>("QcSkeleton", "o2::quality_control_modules::skeleton::SkeletonTask")?;
    /// ```
    pub fn create<T: ?Sized + 'static>(
        &self,
        module_name: &str,
        class_name: &str,
    ) -> Result<Box<T>, FactoryError> {
        let mut state = self.state.lock();
        let FactoryState { loader, registry } = &mut *state;

        loader.ensure_loaded(module_name, registry)?;

        tracing::info!(class = class_name, "Loading class");
        let descriptor = registry
            .find_descriptor(class_name)
            .ok_or_else(|| FatalError::NoDescriptor(class_name.to_string()))?;

        tracing::info!(
            class = class_name,
            interface = descriptor.interface_name(),
            "Instantiating class"
        );
        let instance = match TypeRegistry::instantiate::<T>(descriptor) {
            Instantiation::Created(instance) => instance,
            Instantiation::Empty => {
                return Err(FatalError::EmptyInstance(class_name.to_string()).into());
            }
            Instantiation::WrongInterface => {
                return Err(FatalError::InterfaceMismatch {
                    class_name: class_name.to_string(),
                    registered: descriptor.interface().to_string(),
                    requested: InterfaceKey::of::<T>().to_string(),
                }
                .into());
            }
        };

        tracing::info!(module = module_name, class = class_name, "Quality Control module loaded");
        Ok(instance)
    }

    /// Load a module without instantiating anything.
    pub fn ensure_loaded(&self, module_name: &str) -> Result<(), ModuleLoadError> {
        let mut state = self.state.lock();
        let FactoryState { loader, registry } = &mut *state;
        loader.ensure_loaded(module_name, registry)
    }

    /// Load state of a module.
    pub fn module_state(&self, module_name: &str) -> ModuleState {
        self.state.lock().loader.state(module_name)
    }

    /// Classes currently known to the registry, sorted.
    pub fn class_names(&self) -> Vec<String> {
        self.state
            .lock()
            .registry
            .class_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
