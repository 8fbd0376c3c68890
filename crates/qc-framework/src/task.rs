//! Interface implemented by task modules, and their custom parameters.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::publish::{ObjectsManager, PublishError};

/// Free-form `key → value` parameters from a task's configuration.
pub type CustomParameters = HashMap<String, String>;

/// Errors raised by tasks and parameter lookups.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid value for parameter {key}: {details}")]
    InvalidParameter { key: String, details: String },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Task failed: {0}")]
    Failed(String),
}

/// Identifies a data-taking period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub run_number: u64,
    pub run_type: String,
    pub provenance: String,
}

impl Activity {
    pub fn new(run_number: u64) -> Self {
        Self {
            run_number,
            ..Self::default()
        }
    }
}

/// A monitoring task loaded from a module.
///
/// Only `initialize` is required; the lifecycle hooks default to no-ops.
pub trait Task: Send {
    /// Publish objects and read parameters.
    fn initialize(
        &mut self,
        objects: &mut ObjectsManager,
        params: &CustomParameters,
    ) -> Result<(), TaskError>;

    fn start_of_activity(&mut self, _activity: &Activity) -> Result<(), TaskError> {
        Ok(())
    }

    fn start_of_cycle(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    fn end_of_cycle(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    fn end_of_activity(&mut self, _activity: &Activity) -> Result<(), TaskError> {
        Ok(())
    }

    fn reset(&mut self) {}
}

/// Typed lookup of a custom parameter.
pub fn get_from_config<T>(params: &CustomParameters, key: &str) -> Result<T, TaskError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = params
        .get(key)
        .ok_or_else(|| TaskError::MissingParameter(key.to_string()))?;
    raw.trim()
        .parse()
        .map_err(|e: T::Err| TaskError::InvalidParameter {
            key: key.to_string(),
            details: e.to_string(),
        })
}

/// Typed lookup of a custom parameter, falling back to `default`.
pub fn get_from_config_or<T>(params: &CustomParameters, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match get_from_config(params, key) {
        Ok(value) => value,
        Err(TaskError::MissingParameter(_)) => {
            tracing::debug!(key, ?default, "Parameter not set, using default");
            default
        }
        Err(e) => {
            tracing::warn!(key, ?default, error = %e, "Parameter unusable, using default");
            default
        }
    }
}
