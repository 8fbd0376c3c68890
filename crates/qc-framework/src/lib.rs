//! Runtime core of the quality control task host.
//!
//! Two subsystems live here:
//! - [`module`]: loading task modules at run time and instantiating their
//!   classes behind a fixed interface.
//! - [`discovery`]: announcing this process to a service registry and
//!   answering its health probe.
//!
//! [`task`], [`check`] and [`publish`] define the narrow surface module
//! classes see.

pub mod check;
pub mod config;
pub mod discovery;
pub mod macros;
pub mod module;
pub mod publish;
pub mod task;

pub use check::{Check, Quality};
pub use discovery::{DiscoveryConfig, ServiceDiscovery};
pub use module::{ClassFactory, FactoryError, FatalError, ModuleLoadError};
pub use task::{Task, TaskError};

/// Re-exports commonly used types.
pub mod prelude {
    // Module system
    pub use crate::module::{
        ClassFactory, DynamicLoader, FactoryError, FatalError, InterfaceKey, ModuleLoadError,
        ModuleState, NativeLoader, StaticLoader, TypeRegistry,
    };

    // Service discovery
    pub use crate::discovery::{
        DiscoveryConfig, HttpTransport, ServiceDiscovery, ServiceRecord, Transport,
        TransportError,
    };

    // Task and check surface
    pub use crate::check::{Check, Quality};
    pub use crate::publish::{MonitorObject, ObjectsManager, PublishError};
    pub use crate::task::{
        get_from_config, get_from_config_or, Activity, CustomParameters, Task, TaskError,
    };
}
