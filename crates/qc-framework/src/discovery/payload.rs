//! Registration document sent to the registry.

use serde::Serialize;

use crate::config::discovery::{CHECK_INTERVAL, DEREGISTER_CRITICAL_AFTER};

/// What this process announces about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub service_name: String,
    pub instance_id: String,
    pub health_endpoint: String,
    pub tags: Vec<String>,
}

impl ServiceRecord {
    pub fn new(
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
        health_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            instance_id: instance_id.into(),
            health_endpoint: health_endpoint.into(),
            tags: Vec::new(),
        }
    }

    /// Replace the tags with the non-empty pieces of a comma-separated list.
    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = split_tags(tags);
        self
    }

    /// Body of the registration request.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&RegistrationPayload::from(self))
    }
}

/// Split a comma-separated tag list, dropping empty pieces.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegistrationPayload<'a> {
    name: &'a str,
    #[serde(rename = "ID")]
    id: &'a str,
    /// Absent, not empty, when there is nothing to announce.
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a [String],
    checks: [HealthCheck<'a>; 1],
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HealthCheck<'a> {
    name: String,
    interval: &'static str,
    deregister_critical_service_after: &'static str,
    #[serde(rename = "TCP")]
    tcp: &'a str,
}

impl<'a> From<&'a ServiceRecord> for RegistrationPayload<'a> {
    fn from(record: &'a ServiceRecord) -> Self {
        Self {
            name: &record.service_name,
            id: &record.instance_id,
            tags: &record.tags,
            checks: [HealthCheck {
                name: format!("Health check {}", record.instance_id),
                interval: CHECK_INTERVAL,
                deregister_critical_service_after: DEREGISTER_CRITICAL_AFTER,
                tcp: &record.health_endpoint,
            }],
        }
    }
}
