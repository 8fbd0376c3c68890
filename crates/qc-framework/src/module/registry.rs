//! Type registry populated by module loading.
//!
//! Each entry maps a fully-qualified class name to a factory closure that
//! produces a boxed instance of the interface the class was registered as.
//!
//! Modules are separate builds with their own copy of this crate, so
//! `TypeId` cannot identify an interface across the library boundary.
//! Descriptors carry an [`InterfaceKey`] instead: the interface's type name,
//! the module ABI version and the framework version the registering code was
//! compiled with. A factory is only handed out when all three match.

use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;

use super::MODULE_ABI_VERSION;

/// Factory closure stored for an interface `T`.
type Factory<T> = Box<dyn Fn() -> Option<Box<T>> + Send + Sync>;

/// Identity of an interface that survives separate compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceKey {
    pub name: &'static str,
    pub abi_version: u32,
    pub framework_version: &'static str,
}

impl InterfaceKey {
    /// Key of interface `T` as seen by this build of the framework.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            abi_version: MODULE_ABI_VERSION,
            framework_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl fmt::Display for InterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (abi {}, framework {})",
            self.name, self.abi_version, self.framework_version
        )
    }
}

/// Runtime metadata enabling construction of a named class.
pub struct TypeDescriptor {
    class_name: String,
    interface: InterfaceKey,
    /// Leaked `Factory<T>` for the interface named by `interface`.
    factory: NonNull<()>,
    /// Frees `factory`; compiled alongside the code that registered it.
    drop_factory: unsafe fn(NonNull<()>),
}

// SAFETY: `factory` points to a `Factory<T>`, which is `Send + Sync`, and is
// only ever read through a shared reference.
unsafe impl Send for TypeDescriptor {}
unsafe impl Sync for TypeDescriptor {}

unsafe fn drop_factory<T: ?Sized + 'static>(factory: NonNull<()>) {
    drop(Box::from_raw(factory.cast::<Factory<T>>().as_ptr()));
}

impl TypeDescriptor {
    fn new<T: ?Sized + 'static>(class_name: String, factory: Factory<T>) -> Self {
        Self {
            class_name,
            interface: InterfaceKey::of::<T>(),
            factory: NonNull::from(Box::leak(Box::new(factory))).cast(),
            drop_factory: drop_factory::<T>,
        }
    }

    /// Fully-qualified class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Name of the interface the class was registered against.
    pub fn interface_name(&self) -> &'static str {
        self.interface.name
    }

    pub fn interface(&self) -> InterfaceKey {
        self.interface
    }

    /// Whether instances of this class can be produced as `T`.
    pub fn implements<T: ?Sized + 'static>(&self) -> bool {
        self.interface == InterfaceKey::of::<T>()
    }

    fn factory<T: ?Sized + 'static>(&self) -> Option<&Factory<T>> {
        if !self.implements::<T>() {
            return None;
        }
        // SAFETY: the key matches, so `factory` was created from a
        // `Factory<T>` by `TypeDescriptor::new::<T>` and is still owned here.
        Some(unsafe { self.factory.cast::<Factory<T>>().as_ref() })
    }
}

impl Drop for TypeDescriptor {
    fn drop(&mut self) {
        // SAFETY: `factory` came from `Box::leak` in `new` and is freed once.
        unsafe { (self.drop_factory)(self.factory) }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("class_name", &self.class_name)
            .field("interface", &self.interface)
            .finish()
    }
}

/// Result of asking a descriptor for an instance.
pub enum Instantiation<T: ?Sized> {
    /// The factory produced an instance.
    Created(Box<T>),
    /// The factory ran but produced nothing.
    Empty,
    /// The descriptor was registered against another interface.
    WrongInterface,
}

/// Append-only registry of class descriptors.
#[derive(Default)]
pub struct TypeRegistry {
    descriptors: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Register a class as an implementation of interface `T`.
    ///
    /// A later registration under the same class name replaces the earlier
    /// one; the replaced descriptor is logged.
    pub fn register<T, F>(&mut self, class_name: impl Into<String>, factory: F)
    where
        T: ?Sized + 'static,
        F: Fn() -> Option<Box<T>> + Send + Sync + 'static,
    {
        let class_name = class_name.into();
        let descriptor = TypeDescriptor::new::<T>(class_name.clone(), Box::new(factory));

        if let Some(previous) = self.descriptors.insert(class_name, descriptor) {
            tracing::warn!(
                class = previous.class_name(),
                "Type descriptor registered twice, keeping the newest"
            );
        }
    }

    /// Look up a descriptor by class name.
    pub fn find_descriptor(&self, class_name: &str) -> Option<&TypeDescriptor> {
        self.descriptors.get(class_name)
    }

    /// Construct a new instance from a descriptor.
    pub fn instantiate<T: ?Sized + 'static>(descriptor: &TypeDescriptor) -> Instantiation<T> {
        match descriptor.factory::<T>() {
            Some(factory) => match factory() {
                Some(instance) => Instantiation::Created(instance),
                None => Instantiation::Empty,
            },
            None => Instantiation::WrongInterface,
        }
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("classes", &self.class_names())
            .finish()
    }
}
