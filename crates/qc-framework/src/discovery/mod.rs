//! Service discovery: registry announcement and health probing.
//!
//! ```text
//! ServiceDiscovery ──PUT /v1/agent/service/register──────────▶ registry
//!        │          ──PUT /v1/agent/service/deregister/<id>──▶
//!        │
//!        └── HealthListener (own thread) ◀──TCP connect every 5s── registry
//! ```
//!
//! Registry failures are expected during outages. They never reach the
//! caller, and their warnings are rate limited per client.

pub mod client;
pub mod health;
pub mod limiter;
pub mod payload;
pub mod transport;

pub use client::{
    normalize_health_endpoint, parse_port, DiscoveryConfig, DiscoveryError, ServiceDiscovery,
};
pub use health::HealthListener;
pub use limiter::{FailureClass, LogLimiter};
pub use payload::{split_tags, ServiceRecord};
pub use transport::{HttpTransport, Transport, TransportError};
