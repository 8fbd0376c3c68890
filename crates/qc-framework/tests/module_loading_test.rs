//! Module Loading Tests
//!
//! Tests the load-once / resolve-many path and its failure modes:
//! - Idempotent module loading
//! - Missing class descriptors
//! - Native library resolution and link failures
//! - Building and loading a real native module

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use qc_framework::prelude::*;

static REPEATED_LOADS: AtomicUsize = AtomicUsize::new(0);
static CONCURRENT_LOADS: AtomicUsize = AtomicUsize::new(0);

const SKELETON_CLASS: &str = "o2::quality_control_modules::skeleton::SkeletonTask";
const SKELETON_CHECK: &str = "o2::quality_control_modules::skeleton::SkeletonCheck";

#[derive(Default)]
struct SkeletonTask {
    cycles: u64,
}

impl Task for SkeletonTask {
    fn initialize(
        &mut self,
        objects: &mut ObjectsManager,
        _params: &CustomParameters,
    ) -> Result<(), TaskError> {
        objects.publish("example")?;
        Ok(())
    }

    fn end_of_cycle(&mut self) -> Result<(), TaskError> {
        self.cycles += 1;
        Ok(())
    }
}

struct PublishedCheck;

impl Check for PublishedCheck {
    fn check(&mut self, objects: &BTreeMap<String, MonitorObject>) -> Quality {
        if objects.is_empty() {
            Quality::Bad
        } else {
            Quality::Good
        }
    }
}

fn register_skeleton(registry: &mut TypeRegistry) {
    registry.register::<dyn Task, _>(SKELETON_CLASS, || Some(Box::new(SkeletonTask::default())));
    registry.register::<dyn Check, _>(SKELETON_CHECK, || Some(Box::new(PublishedCheck)));
}

fn register_skeleton_repeated(registry: &mut TypeRegistry) {
    REPEATED_LOADS.fetch_add(1, Ordering::SeqCst);
    register_skeleton(registry);
}

fn register_skeleton_concurrent(registry: &mut TypeRegistry) {
    CONCURRENT_LOADS.fetch_add(1, Ordering::SeqCst);
    register_skeleton(registry);
}

fn register_nothing(_registry: &mut TypeRegistry) {}

fn factory() -> ClassFactory<StaticLoader> {
    ClassFactory::new(
        StaticLoader::new()
            .with_module("QcSkeleton", register_skeleton)
            .with_module("QcEmpty", register_nothing),
    )
}

#[test]
fn test_create_task_from_module() {
    let factory = factory();
    let mut task = factory
        .create::<dyn Task>("QcSkeleton", SKELETON_CLASS)
        .unwrap();

    let mut objects = ObjectsManager::new("SkeletonTask");
    task.initialize(&mut objects, &CustomParameters::new()).unwrap();
    task.end_of_cycle().unwrap();
    assert_eq!(objects.published_names(), vec!["example"]);
}

#[test]
fn test_create_check_from_module() {
    let factory = factory();
    let mut task = factory
        .create::<dyn Task>("QcSkeleton", SKELETON_CLASS)
        .unwrap();
    let mut check = factory
        .create::<dyn Check>("QcSkeleton", SKELETON_CHECK)
        .unwrap();

    let mut objects = ObjectsManager::new("SkeletonTask");
    assert_eq!(check.check(objects.objects()), Quality::Bad);

    task.initialize(&mut objects, &CustomParameters::new()).unwrap();
    let quality = check.check(objects.objects());
    assert_eq!(quality, Quality::Good);

    for object in objects.objects_mut() {
        check.beautify(object, quality);
    }
    assert_eq!(objects.get("example").unwrap().metadata["quality"], "Good");
}

#[test]
fn test_check_requested_as_task_is_fatal() {
    let factory = factory();
    let result = factory.create::<dyn Task>("QcSkeleton", SKELETON_CHECK);
    match result {
        Err(FactoryError::Fatal(FatalError::InterfaceMismatch {
            registered,
            requested,
            ..
        })) => {
            assert!(registered.contains("Check"));
            assert!(requested.contains("Task"));
        }
        Err(other) => panic!("Expected InterfaceMismatch, got {}", other),
        Ok(_) => panic!("Expected InterfaceMismatch, got an instance"),
    }
}

#[test]
fn test_repeated_create_loads_once() {
    let factory = ClassFactory::new(
        StaticLoader::new().with_module("QcSkeleton", register_skeleton_repeated),
    );

    for _ in 0..5 {
        factory
            .create::<dyn Task>("QcSkeleton", SKELETON_CLASS)
            .unwrap();
    }
    factory.ensure_loaded("QcSkeleton").unwrap();

    assert_eq!(REPEATED_LOADS.load(Ordering::SeqCst), 1);
    assert_eq!(factory.module_state("QcSkeleton"), ModuleState::Loaded);
}

#[test]
fn test_concurrent_create_loads_once() {
    let factory = Arc::new(ClassFactory::new(
        StaticLoader::new().with_module("QcSkeleton", register_skeleton_concurrent),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let factory = factory.clone();
            std::thread::spawn(move || {
                factory
                    .create::<dyn Task>("QcSkeleton", SKELETON_CLASS)
                    .is_ok()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(CONCURRENT_LOADS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_module_without_class_is_fatal() {
    let factory = factory();
    let result = factory.create::<dyn Task>("QcEmpty", SKELETON_CLASS);

    match result {
        Err(FactoryError::Fatal(FatalError::NoDescriptor(class))) => {
            assert_eq!(class, SKELETON_CLASS);
        }
        Err(other) => panic!("Expected NoDescriptor, got {}", other),
        Ok(_) => panic!("Expected NoDescriptor, got an instance"),
    }
    // The module itself did load.
    assert_eq!(factory.module_state("QcEmpty"), ModuleState::Loaded);
}

#[test]
fn test_unknown_module_is_load_error() {
    let factory = factory();
    let result = factory.create::<dyn Task>("QcTPC", SKELETON_CLASS);
    assert!(matches!(
        result,
        Err(FactoryError::ModuleLoad(ModuleLoadError::Unknown(_)))
    ));
}

#[test]
fn test_native_missing_library() {
    let factory = ClassFactory::native(NativeLoader::new());
    let result = factory.create::<dyn Task>("QcDefinitelyNotInstalled", SKELETON_CLASS);
    assert!(matches!(
        result,
        Err(FactoryError::ModuleLoad(ModuleLoadError::Library { .. }))
    ));
    assert_eq!(
        factory.module_state("QcDefinitelyNotInstalled"),
        ModuleState::NotLoaded
    );
}

#[test]
fn test_native_missing_explicit_path() {
    let factory = ClassFactory::native(NativeLoader::new());
    let result = factory.ensure_loaded("/nonexistent/path/to/libQcTPC.so");
    assert!(matches!(result, Err(ModuleLoadError::NotFound { .. })));
}

#[test]
fn test_native_garbage_library() {
    let dir = tempfile::tempdir().unwrap();
    let file_name = libloading::library_filename("QcGarbage");
    let path = dir.path().join(&file_name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"this is not a shared library").unwrap();
    drop(file);

    // Found through the search path, then rejected by the platform loader.
    let loader = NativeLoader::new().with_search_path(dir.path());
    assert_eq!(loader.resolve("QcGarbage").unwrap(), path);

    let factory = ClassFactory::native(loader);
    let result = factory.ensure_loaded("QcGarbage");
    assert!(matches!(result, Err(ModuleLoadError::Library { .. })));
}

/// Builds `tests/test-modules/skeleton_task` once per test run and returns
/// the directory holding the shared library.
fn skeleton_module_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/test-modules/skeleton_task/Cargo.toml");
        let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("test-modules");

        let status = Command::new(env!("CARGO"))
            .arg("build")
            .arg("--manifest-path")
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&target_dir)
            .status()
            .expect("Failed to run cargo for the skeleton module");
        assert!(status.success(), "Building the skeleton module failed: {}", status);

        target_dir.join("debug")
    })
}

#[test]
fn test_native_skeleton_task() {
    let dir = skeleton_module_dir();
    let factory = ClassFactory::native(NativeLoader::new().with_search_path(dir));
    let mut task = factory
        .create::<dyn Task>("QcSkeleton", SKELETON_CLASS)
        .unwrap();

    let mut objects = ObjectsManager::new("SkeletonTask");
    task.initialize(&mut objects, &CustomParameters::new()).unwrap();
    task.end_of_cycle().unwrap();
    assert_eq!(objects.published_names(), vec!["example", "payloadSize"]);

    // Loaded once, resolved many times.
    factory
        .create::<dyn Task>("QcSkeleton", SKELETON_CLASS)
        .unwrap();
    assert_eq!(factory.module_state("QcSkeleton"), ModuleState::Loaded);

    assert!(matches!(
        factory.create::<dyn Task>("QcSkeleton", "o2::quality_control_modules::skeleton::Missing"),
        Err(FactoryError::Fatal(FatalError::NoDescriptor(_)))
    ));
}

#[test]
fn test_native_skeleton_check() {
    let dir = skeleton_module_dir();
    let factory = ClassFactory::native(NativeLoader::new().with_search_path(dir));
    let mut check = factory
        .create::<dyn Check>("QcSkeleton", SKELETON_CHECK)
        .unwrap();
    assert_eq!(check.accepted_type(), "TH1");

    let mut objects = ObjectsManager::new("SkeletonTask");
    assert_eq!(check.check(objects.objects()), Quality::Bad);
    objects.publish("example").unwrap();
    assert_eq!(check.check(objects.objects()), Quality::Good);

    assert!(matches!(
        factory.create::<dyn Task>("QcSkeleton", SKELETON_CHECK),
        Err(FactoryError::Fatal(FatalError::InterfaceMismatch { .. }))
    ));
}
