//! Publishing of monitoring objects.
//!
//! Tasks hand their objects to an [`ObjectsManager`]. The manager keeps the
//! list unique by name and, when a discovery client is attached, announces
//! the list as registry tags of the form `<task>/<object>`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::discovery::{ServiceDiscovery, Transport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Object already published: {0}")]
    AlreadyPublished(String),

    #[error("Object not published: {0}")]
    NotPublished(String),
}

/// A published summary object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorObject {
    pub name: String,
    pub task_name: String,
    pub description: String,
    /// Free-form annotations, e.g. entry counts set by the task or the
    /// quality set by a check.
    pub metadata: BTreeMap<String, String>,
}

impl MonitorObject {
    pub fn new(name: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_name: task_name.into(),
            description: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_metadata(key, value);
        self
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Registry tag for this object.
    pub fn path(&self) -> String {
        format!("{}/{}", self.task_name, self.name)
    }
}

/// Objects published by one task.
pub struct ObjectsManager {
    task_name: String,
    objects: BTreeMap<String, MonitorObject>,
    discovery: Option<Box<dyn Announcer>>,
}

/// Anything that can announce a tag list; implemented by [`ServiceDiscovery`].
pub trait Announcer: Send {
    fn announce(&mut self, tags: &str);
}

impl<T: Transport> Announcer for ServiceDiscovery<T> {
    fn announce(&mut self, tags: &str) {
        self.register(tags);
    }
}

impl ObjectsManager {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            objects: BTreeMap::new(),
            discovery: None,
        }
    }

    /// Announce published objects through `discovery`.
    pub fn with_discovery(mut self, discovery: impl Announcer + 'static) -> Self {
        self.discovery = Some(Box::new(discovery));
        self
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Create and publish an object owned by this task.
    pub fn publish(&mut self, name: impl Into<String>) -> Result<(), PublishError> {
        let object = MonitorObject::new(name, self.task_name.clone());
        self.start_publishing(object)
    }

    pub fn start_publishing(&mut self, object: MonitorObject) -> Result<(), PublishError> {
        if self.objects.contains_key(&object.name) {
            return Err(PublishError::AlreadyPublished(object.name));
        }
        tracing::debug!(task = %self.task_name, object = %object.name, "Start publishing");
        self.objects.insert(object.name.clone(), object);
        Ok(())
    }

    pub fn stop_publishing(&mut self, name: &str) -> Result<MonitorObject, PublishError> {
        self.objects
            .remove(name)
            .ok_or_else(|| PublishError::NotPublished(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&MonitorObject> {
        self.objects.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MonitorObject> {
        self.objects.get_mut(name)
    }

    /// Published objects keyed by name, as handed to checks.
    pub fn objects(&self) -> &BTreeMap<String, MonitorObject> {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut MonitorObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Names of published objects, sorted.
    pub fn published_names(&self) -> Vec<&str> {
        self.objects.keys().map(String::as_str).collect()
    }

    /// Comma-separated `<task>/<object>` list.
    pub fn tags(&self) -> String {
        self.objects
            .values()
            .map(MonitorObject::path)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Re-register with the current object list. No-op without discovery.
    pub fn update_service_discovery(&mut self) {
        let tags = self.tags();
        match self.discovery.as_mut() {
            Some(discovery) => discovery.announce(&tags),
            None => tracing::debug!(task = %self.task_name, "No service discovery attached"),
        }
    }
}
