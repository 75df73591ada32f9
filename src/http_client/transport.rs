//! Transport layer: performs a single request/response exchange.
//!
//! The retry loop talks to a [`Transport`] so tests can script responses;
//! [`ReqwestTransport`] is the real network implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use super::request::PreparedRequest;
use super::response::{extract_response_headers, HttpResponse};
use super::user_agent::USER_AGENT;

/// Failure of a single exchange before a response was received.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }

    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(timeout)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client with the crate's default user agent.
    ///
    /// Timeouts are applied per request, not on the client.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| {
                TransportError::InvalidRequest(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let built = builder
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let start = Instant::now();
        let response = self
            .client
            .execute(built)
            .await
            .map_err(|e| TransportError::from_reqwest(e, request.timeout))?;
        let elapsed = start.elapsed();

        let status = response.status();
        let url = response.url().to_string();
        let headers = extract_response_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, request.timeout))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed,
            url,
        })
    }
}
