//! Macros for module authors.

/// Export the entry points a native module needs.
///
/// The argument is a function `fn(&mut TypeRegistry)` that registers the
/// module's classes.
///
/// # Usage
/// ```ignore
/// use qc_framework::prelude::*;
///
/// #[derive(Default)]
/// struct SkeletonTask;
///
/// impl Task for SkeletonTask {
///     // ...
/// }
///
/// fn register(registry: &mut TypeRegistry) {
///     registry.register::<dyn Task, _>(
///         "o2::quality_control_modules::skeleton::SkeletonTask",
///         || Some(Box::new(SkeletonTask::default())),
///     );
/// }
///
/// qc_framework::export_module!(register);
/// ```
#[macro_export]
macro_rules! export_module {
    ($register:path) => {
        /// ABI version this module was built against.
        #[no_mangle]
        pub extern "C" fn qc_module_abi_version() -> u32 {
            $crate::module::MODULE_ABI_VERSION
        }

        /// Register this module's classes into the host registry.
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn qc_module_register(registry: *mut $crate::module::TypeRegistry) {
            // SAFETY: the host passes a live, exclusively borrowed registry.
            if let Some(registry) = unsafe { registry.as_mut() } {
                let register: fn(&mut $crate::module::TypeRegistry) = $register;
                register(registry);
            }
        }
    };
}
