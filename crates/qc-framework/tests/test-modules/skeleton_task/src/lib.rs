//! Skeleton module with one task and one check.
//!
//! Built and loaded by `tests/module_loading_test.rs`.

#![allow(non_snake_case)]

use std::collections::BTreeMap;

use qc_framework::prelude::*;

pub const TASK_CLASS: &str = "o2::quality_control_modules::skeleton::SkeletonTask";
pub const CHECK_CLASS: &str = "o2::quality_control_modules::skeleton::SkeletonCheck";

#[derive(Default)]
struct SkeletonTask {
    cycles: u64,
    threshold: u32,
}

impl Task for SkeletonTask {
    fn initialize(
        &mut self,
        objects: &mut ObjectsManager,
        params: &CustomParameters,
    ) -> Result<(), TaskError> {
        self.threshold = get_from_config_or(params, "threshold", 10);
        objects.publish("example")?;
        objects.publish("payloadSize")?;
        Ok(())
    }

    fn end_of_cycle(&mut self) -> Result<(), TaskError> {
        self.cycles += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.cycles = 0;
    }
}

/// Good when `example` is published, Bad otherwise.
#[derive(Default)]
struct SkeletonCheck;

impl Check for SkeletonCheck {
    fn check(&mut self, objects: &BTreeMap<String, MonitorObject>) -> Quality {
        if objects.contains_key("example") {
            Quality::Good
        } else {
            Quality::Bad
        }
    }

    fn accepted_type(&self) -> &str {
        "TH1"
    }
}

fn register(registry: &mut TypeRegistry) {
    registry.register::<dyn Task, _>(TASK_CLASS, || Some(Box::new(SkeletonTask::default())));
    registry.register::<dyn Check, _>(CHECK_CLASS, || Some(Box::new(SkeletonCheck)));
}

qc_framework::export_module!(register);
