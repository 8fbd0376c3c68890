//! Registration client for a Consul-style service registry.

use std::time::Duration;

use thiserror::Error;

use super::health::HealthListener;
use super::limiter::{FailureClass, LogLimiter};
use super::payload::ServiceRecord;
use super::transport::{HttpTransport, Transport, TransportError};
use crate::config::{self, discovery::DEREGISTER_PATH, discovery::REGISTER_PATH};

/// Errors raised while constructing the client.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Transport unavailable: {0}")]
    Transport(#[from] TransportError),
}

/// Parameters of a [`ServiceDiscovery`] client.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Registry base URL, e.g. `http://localhost:8500`
    pub registry_url: String,
    pub service_name: String,
    pub instance_id: String,
    /// `host:port` the registry should probe; replaced by a default when it has no port
    pub health_endpoint: String,
    pub failure_log_interval: Duration,
    pub accept_window: Duration,
}

impl DiscoveryConfig {
    pub fn new(
        registry_url: impl Into<String>,
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            registry_url: registry_url.into(),
            service_name: service_name.into(),
            instance_id: instance_id.into(),
            health_endpoint: String::new(),
            failure_log_interval: config::discovery::FAILURE_LOG_INTERVAL,
            accept_window: config::discovery::ACCEPT_WINDOW,
        }
    }

    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = endpoint.into();
        self
    }

    pub fn with_failure_log_interval(mut self, interval: Duration) -> Self {
        self.failure_log_interval = interval;
        self
    }

    pub fn with_accept_window(mut self, window: Duration) -> Self {
        self.accept_window = window;
        self
    }
}

/// Use `endpoint` if it names a port, else the local default.
pub fn normalize_health_endpoint(endpoint: &str) -> String {
    if endpoint.contains(':') {
        endpoint.to_string()
    } else {
        config::default_health_endpoint()
    }
}

/// Port part of a `host:port` endpoint.
pub fn parse_port(endpoint: &str) -> Option<u16> {
    endpoint
        .rsplit_once(':')
        .and_then(|(_, port)| port.trim().parse().ok())
}

/// Announces this process to the registry for as long as it lives.
///
/// Construction starts the health listener and registers with no tags.
/// Dropping the client stops the listener and deregisters. Registry failures
/// are never returned: they are logged, at most once per failure class per
/// interval, and the client simply stays unregistered until the next
/// [`register`](Self::register) succeeds.
pub struct ServiceDiscovery<T: Transport = HttpTransport> {
    base_url: String,
    record: ServiceRecord,
    transport: T,
    limiter: LogLimiter,
    health: HealthListener,
    registered: bool,
}

impl ServiceDiscovery<HttpTransport> {
    /// Client using the default HTTP transport.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> ServiceDiscovery<T> {
    /// Client using a caller-supplied transport.
    pub fn with_transport(config: DiscoveryConfig, transport: T) -> Self {
        let health_endpoint = normalize_health_endpoint(&config.health_endpoint);

        let health = match parse_port(&health_endpoint) {
            Some(port) => HealthListener::spawn_with_window(port, config.accept_window),
            None => {
                tracing::warn!(
                    endpoint = %health_endpoint,
                    "Health endpoint has no usable port, health listener not started"
                );
                HealthListener::disabled()
            }
        };

        let mut client = Self {
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            record: ServiceRecord::new(config.service_name, config.instance_id, health_endpoint),
            transport,
            limiter: LogLimiter::new(config.failure_log_interval),
            health,
            registered: false,
        };
        client.register("");
        client
    }

    /// Announce (or refresh) this instance with a comma-separated tag list.
    pub fn register(&mut self, tags: &str) {
        let record = self.record.clone().with_tags(tags);
        let body = match record.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize registration");
                return;
            }
        };

        let accepted = self.send(REGISTER_PATH, body);
        self.record = record;
        self.registered = accepted;
        tracing::info!(tags, accepted, "Registration to ServiceDiscovery");
    }

    /// Withdraw this instance from the registry.
    pub fn deregister(&mut self) {
        let path = format!("{}{}", DEREGISTER_PATH, self.record.instance_id);
        self.send(&path, String::new());
        self.registered = false;
        tracing::info!("Deregistration from ServiceDiscovery");
    }

    /// Whether the last registration was accepted by the registry.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// The record as last announced.
    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// Endpoint the registry probes.
    pub fn health_endpoint(&self) -> &str {
        &self.record.health_endpoint
    }

    pub fn health_listener(&self) -> &HealthListener {
        &self.health
    }

    /// Failure warnings that made it to the log.
    pub fn logged_failures(&self) -> u64 {
        self.limiter.emitted()
    }

    /// Failure warnings swallowed by the rate limiter.
    pub fn suppressed_failures(&self) -> u64 {
        self.limiter.suppressed()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// PUT `body` to `path`; true when the registry answered 200..=206.
    fn send(&mut self, path: &str, body: String) -> bool {
        let uri = format!("{}{}", self.base_url, path);
        match self.transport.put(&uri, body) {
            Ok(status) if (200..=206).contains(&status) => true,
            Ok(status) => {
                if self.limiter.allow(FailureClass::Status) {
                    tracing::warn!(%uri, status, "ServiceDiscovery::send(...) Response code: {}", status);
                }
                false
            }
            Err(e) => {
                if self.limiter.allow(FailureClass::Transport) {
                    tracing::warn!(%uri, error = %e, "ServiceDiscovery::send(...) {}", e);
                }
                false
            }
        }
    }
}

impl<T: Transport> Drop for ServiceDiscovery<T> {
    fn drop(&mut self) {
        self.health.stop();
        self.deregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records requests and answers with a fixed status.
    #[derive(Clone, Default)]
    struct Recorder {
        status: u16,
        requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl Recorder {
        fn answering(status: u16) -> Self {
            Self {
                status,
                requests: Arc::default(),
            }
        }
    }

    impl Transport for Recorder {
        fn put(&mut self, url: &str, body: String) -> Result<u16, TransportError> {
            self.requests.lock().push((url.to_string(), body));
            Ok(self.status)
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn put(&mut self, _url: &str, _body: String) -> Result<u16, TransportError> {
            Err(TransportError::Connect("connection refused".to_string()))
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn config(port: u16) -> DiscoveryConfig {
        DiscoveryConfig::new("http://consul:8500/", "qc-worker", "qc-worker-7")
            .with_health_endpoint(format!("127.0.0.1:{}", port))
            .with_accept_window(Duration::from_millis(50))
    }

    #[test]
    fn test_normalize_health_endpoint() {
        assert_eq!(normalize_health_endpoint("node1:8080"), "node1:8080");
        assert_eq!(normalize_health_endpoint(""), config::default_health_endpoint());
        assert_eq!(normalize_health_endpoint("node1"), config::default_health_endpoint());
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("node1:8080"), Some(8080));
        assert_eq!(parse_port("node1:http"), None);
        assert_eq!(parse_port("node1"), None);
    }

    #[test]
    fn test_construction_registers_without_tags() {
        let recorder = Recorder::answering(200);
        let client = ServiceDiscovery::with_transport(config(free_port()), recorder.clone());
        assert!(client.is_registered());

        let requests = recorder.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "http://consul:8500/v1/agent/service/register");
        let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert!(body.get("Tags").is_none());
        assert_eq!(body["ID"], "qc-worker-7");
    }

    #[test]
    fn test_register_tags() {
        let recorder = Recorder::answering(200);
        let mut client = ServiceDiscovery::with_transport(config(free_port()), recorder.clone());
        client.register("a,b,c");

        let requests = recorder.requests.lock().clone();
        let body: serde_json::Value = serde_json::from_str(&requests[1].1).unwrap();
        assert_eq!(body["Tags"], serde_json::json!(["a", "b", "c"]));
        assert_eq!(client.record().tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_drop_deregisters() {
        let recorder = Recorder::answering(200);
        let client = ServiceDiscovery::with_transport(config(free_port()), recorder.clone());
        drop(client);

        let requests = recorder.requests.lock().clone();
        let (url, body) = requests.last().unwrap();
        assert_eq!(url, "http://consul:8500/v1/agent/service/deregister/qc-worker-7");
        assert!(body.is_empty());
    }

    #[test]
    fn test_server_error_is_rate_limited() {
        let recorder = Recorder::answering(500);
        let mut client = ServiceDiscovery::with_transport(config(free_port()), recorder);
        for _ in 0..20 {
            client.register("a");
        }
        assert!(!client.is_registered());
        assert_eq!(client.logged_failures(), 1);
        assert_eq!(client.suppressed_failures(), 20);
    }

    #[test]
    fn test_status_band() {
        for (status, accepted) in [(199, false), (200, true), (204, true), (206, true), (207, false)] {
            let client =
                ServiceDiscovery::with_transport(config(free_port()), Recorder::answering(status));
            assert_eq!(client.is_registered(), accepted, "status {}", status);
        }
    }

    #[test]
    fn test_unreachable_registry_is_not_fatal() {
        let mut client = ServiceDiscovery::with_transport(config(free_port()), Unreachable);
        client.register("a,b");
        client.deregister();
        assert!(!client.is_registered());
        assert_eq!(client.logged_failures(), 1);
    }
}
