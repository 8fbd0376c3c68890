//! HTTP transport used to talk to the registry.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::config::discovery::{CONNECT_TIMEOUT, REQUEST_TIMEOUT, TCP_KEEPALIVE};

/// Transport-level failures: no HTTP status was obtained.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Blocking request capability owned by the registration client.
pub trait Transport: Send {
    /// Send `body` with PUT to `url`; returns the HTTP status code.
    fn put(&mut self, url: &str, body: String) -> Result<u16, TransportError>;
}

/// `reqwest` blocking client with bounded timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Client with the default 2 s connect and total timeouts.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(connect: Duration, total: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect)
            .timeout(total)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn put(&mut self, url: &str, body: String) -> Result<u16, TransportError> {
        let mut request = self.client.put(url);
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        let response = request.body(body).send()?;
        Ok(response.status().as_u16())
    }
}
