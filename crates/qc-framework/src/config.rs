//! Shared defaults and environment-variable names.
//!
//! Everything the runtime needs to know that is not passed explicitly lives
//! here, so the library and the host binary agree on the same values.

use std::time::{Duration, TryFromFloatSecsError};

/// Service discovery defaults.
pub mod discovery {
    use std::time::Duration;

    /// Port the health listener binds when no endpoint is configured.
    pub const DEFAULT_HEALTH_PORT: u16 = 7777;
    /// Connect timeout for registry requests.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    /// Total timeout for registry requests.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
    /// TCP keepalive on the registry connection.
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(120);
    /// Minimum interval between two warnings of the same failure class.
    pub const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(600);
    /// Probe interval announced to the registry.
    pub const CHECK_INTERVAL: &str = "5s";
    /// Grace period after which the registry drops a failing instance.
    pub const DEREGISTER_CRITICAL_AFTER: &str = "1m";
    /// How long one health-listener iteration waits for a connection.
    pub const ACCEPT_WINDOW: Duration = Duration::from_secs(1);

    /// Registration endpoint, relative to the registry base URL.
    pub const REGISTER_PATH: &str = "/v1/agent/service/register";
    /// Deregistration endpoint prefix, followed by the instance id.
    pub const DEREGISTER_PATH: &str = "/v1/agent/service/deregister/";
}

/// Environment variable names.
pub mod env_vars {
    /// Registry base URL, e.g. `http://localhost:8500`.
    pub const CONSUL_URL: &str = "QC_CONSUL_URL";
    /// `host:port` the registry probes.
    pub const HEALTH_ENDPOINT: &str = "QC_HEALTH_ENDPOINT";
    /// Colon-separated directories searched for module libraries.
    pub const MODULE_PATH: &str = "QC_MODULE_PATH";
    /// Emit JSON logs when set to `true`.
    pub const LOG_JSON: &str = "QC_LOG_JSON";
    /// Host name override used for the default health endpoint.
    pub const HOSTNAME: &str = "HOSTNAME";
}

/// Name of this machine, as the registry should see it.
///
/// `HOSTNAME` wins when set; otherwise the OS is asked, then `localhost`.
pub fn local_hostname() -> String {
    std::env::var(env_vars::HOSTNAME)
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|n| n.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string())
        })
}

/// Health endpoint used when none (or an unusable one) is configured.
pub fn default_health_endpoint() -> String {
    format!("{}:{}", local_hostname(), discovery::DEFAULT_HEALTH_PORT)
}

/// Registry base URL from the environment, if set.
pub fn consul_url() -> Option<String> {
    std::env::var(env_vars::CONSUL_URL)
        .ok()
        .filter(|u| !u.is_empty())
}

/// Module search directories from the environment.
pub fn module_paths() -> Vec<std::path::PathBuf> {
    std::env::var_os(env_vars::MODULE_PATH)
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default()
}

/// Whether JSON logging was requested.
pub fn log_json() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

/// Seconds to `Duration`, clamped to at least one millisecond.
///
/// Fails on infinite values and on values too large for a `Duration`.
pub fn duration_from_secs_f64(secs: f64) -> Result<Duration, TryFromFloatSecsError> {
    Duration::try_from_secs_f64(secs.max(0.001))
}
