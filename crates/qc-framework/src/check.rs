//! Checks: classes that judge published objects and annotate them.
//!
//! A check is loaded through the same [`ClassFactory`](crate::ClassFactory)
//! as a task, requested as `dyn Check`.

use std::collections::BTreeMap;
use std::fmt;

use crate::publish::MonitorObject;
use crate::task::{CustomParameters, TaskError};

/// Metadata key under which [`Quality::annotate`] stores the verdict.
pub const QUALITY_METADATA_KEY: &str = "quality";

/// Verdict of a check. `Null` means no verdict could be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    #[default]
    Null,
    Good,
    Medium,
    Bad,
}

impl Quality {
    /// Severity level; lower is better and `Null` ranks worst.
    pub fn level(self) -> u32 {
        match self {
            Quality::Good => 1,
            Quality::Medium => 2,
            Quality::Bad => 3,
            Quality::Null => u32::MAX,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Quality::Null => "Null",
            Quality::Good => "Good",
            Quality::Medium => "Medium",
            Quality::Bad => "Bad",
        }
    }

    pub fn is_worse_than(self, other: Quality) -> bool {
        self.level() > other.level()
    }

    /// The worse of two verdicts.
    pub fn worst(self, other: Quality) -> Quality {
        if other.is_worse_than(self) {
            other
        } else {
            self
        }
    }

    /// Record this verdict in an object's metadata.
    pub fn annotate(self, object: &mut MonitorObject) {
        object.add_metadata(QUALITY_METADATA_KEY, self.name());
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A check loaded from a module.
pub trait Check: Send {
    /// Read parameters. Called once before the first `check`.
    fn configure(&mut self, _params: &CustomParameters) -> Result<(), TaskError> {
        Ok(())
    }

    /// Judge the published objects.
    fn check(&mut self, objects: &BTreeMap<String, MonitorObject>) -> Quality;

    /// Annotate an object with the outcome of the last `check`.
    fn beautify(&mut self, object: &mut MonitorObject, quality: Quality) {
        quality.annotate(object);
    }

    /// Object kind this check understands; empty accepts anything.
    fn accepted_type(&self) -> &str {
        ""
    }
}
