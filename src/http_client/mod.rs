//! Rate-limited HTTP client with bounded, fixed-delay retries.
//!
//! Every attempt takes a slot from the [`RateLimiter`] before it reaches the
//! [`Transport`]; the [`ResponseClassifier`] decides whether to return, retry
//! or give up.

mod classify;
mod error;
mod log_format;
mod request;
mod response;
mod transport;
mod user_agent;

pub use classify::{Classification, ResponseClassifier};
pub use error::{FailureKind, RequestFailed};
pub use log_format::{
    extract_cookies, format_exchange, human_readable_size, log_exchange, parse_query_params,
    redact_headers, CookieLog, ExchangeLog,
};
pub use request::{merge_headers, PreparedRequest, RequestOptions};
pub use response::HttpResponse;
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use user_agent::{random_user_agent, BROWSER_USER_AGENTS, USER_AGENT};

use std::borrow::Cow;
use std::sync::Arc;

use reqwest::Method;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError, RequestConfig};
use crate::rate_limit::{RateLimitError, RateLimiter};

/// Errors raised while assembling an [`HttpClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to create rate limiter: {0}")]
    RateLimit(#[from] RateLimitError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// HTTP client that executes requests under a shared rate limit.
///
/// Cloning is cheap; clones share the transport and the rate limiter.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    rate_limiter: RateLimiter,
    classifier: ResponseClassifier,
    config: Arc<RequestConfig>,
}

/// Builder for constructing `HttpClient` with optional collaborators.
///
/// Without overrides the rate limiter is built from `rate_limit` settings and
/// requests go through a [`ReqwestTransport`].
pub struct HttpClientBuilder {
    config: Config,
    rate_limiter: Option<RateLimiter>,
    transport: Option<Arc<dyn Transport>>,
}

impl HttpClientBuilder {
    /// Set a shared rate limiter.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Replace the network transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the `HttpClient`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the shared rate
    /// limit state cannot be opened, or the HTTP client cannot be created.
    pub fn build(self) -> Result<HttpClient, ClientBuildError> {
        self.config.validate()?;

        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => RateLimiter::from_settings(&self.config.rate_limit)?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let classifier = ResponseClassifier::from_config(&self.config.request);

        info!(
            "HTTP client initialized (timeout {:.1}s, {} retries)",
            self.config.request.timeout, self.config.request.retries.max
        );

        Ok(HttpClient {
            transport,
            rate_limiter,
            classifier,
            config: Arc::new(self.config.request),
        })
    }
}

impl HttpClient {
    /// Client with the given configuration and default collaborators.
    pub fn new(config: &Config) -> Result<Self, ClientBuildError> {
        Self::builder(config).build()
    }

    pub fn builder(config: &Config) -> HttpClientBuilder {
        HttpClientBuilder {
            config: config.clone(),
            rate_limiter: None,
            transport: None,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Resolve options against the configured defaults.
    pub fn prepare(&self, method: Method, url: &str, options: RequestOptions) -> PreparedRequest {
        PreparedRequest {
            method,
            url: url.to_string(),
            headers: merge_headers(&self.config.headers, &options.headers),
            query: options.query,
            body: options.body,
            timeout: options.timeout.unwrap_or_else(|| self.config.timeout()),
        }
    }

    /// Execute a request, retrying retryable outcomes within the budget.
    ///
    /// Makes at most `retries.max + 1` attempts, each preceded by a rate
    /// limit acquisition. Returns the first response whose status is a
    /// success code.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, RequestFailed> {
        let caller_agent = options
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("user-agent"));
        let prepared = self.prepare(method, url, options);
        let max_attempts = self.config.retries.max.saturating_add(1);

        let mut attempts = 0;
        let mut last_status = None;
        let mut last_error = None;
        let mut kind = FailureKind::Exhausted;

        while attempts < max_attempts {
            attempts += 1;
            self.rate_limiter.acquire().await;

            let request = self.with_user_agent(&prepared, caller_agent);
            let (classification, fatal_kind) = match self.transport.send(&request).await {
                Ok(response) => {
                    let status = response.status_code();
                    log_status(&request, &response);
                    log_exchange(&request, &response);

                    let classification = self.classifier.classify(status);
                    if classification.is_success() {
                        return Ok(response);
                    }
                    last_status = Some(status);
                    last_error = None;
                    (classification, FailureKind::Rejected)
                }
                Err(e) => {
                    error!(
                        "Network error making request {} {}: {}",
                        request.method, request.url, e
                    );
                    last_status = None;
                    last_error = Some(e.to_string());
                    (
                        self.classifier.classify_transport_error(&e),
                        FailureKind::InvalidRequest,
                    )
                }
            };

            match classification {
                Classification::Retryable { delay } => {
                    if attempts < max_attempts {
                        warn!(
                            "Retrying {} {} in {:.2}s (attempt {}/{})",
                            prepared.method,
                            prepared.url,
                            delay.as_secs_f64(),
                            attempts + 1,
                            max_attempts
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                _ => {
                    kind = fatal_kind;
                    break;
                }
            }
        }

        error!(
            "HTTP request failed after {} attempt(s): {} {}",
            attempts, prepared.method, prepared.url
        );
        Err(RequestFailed {
            method: prepared.method,
            url: prepared.url,
            attempts,
            last_status,
            last_error,
            kind,
        })
    }

    /// GET with query parameters.
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, RequestFailed> {
        let options = query
            .iter()
            .fold(RequestOptions::new(), |opts, (k, v)| opts.query(k, v));
        self.execute(Method::GET, url, options).await
    }

    /// POST a raw body.
    pub async fn post(&self, url: &str, body: impl Into<Vec<u8>>) -> Result<HttpResponse, RequestFailed> {
        self.execute(Method::POST, url, RequestOptions::new().body(body))
            .await
    }

    /// POST a JSON body.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<HttpResponse, RequestFailed> {
        let options = RequestOptions::new().json(body).map_err(|e| RequestFailed {
            method: Method::POST,
            url: url.to_string(),
            attempts: 0,
            last_status: None,
            last_error: Some(format!("Failed to serialize JSON body: {}", e)),
            kind: FailureKind::InvalidRequest,
        })?;
        self.execute(Method::POST, url, options).await
    }

    pub async fn head(&self, url: &str) -> Result<HttpResponse, RequestFailed> {
        self.execute(Method::HEAD, url, RequestOptions::new()).await
    }

    /// Pick a browser agent for this attempt unless the caller set one.
    /// A configured default agent is replaced.
    fn with_user_agent<'a>(
        &self,
        request: &'a PreparedRequest,
        caller_agent: bool,
    ) -> Cow<'a, PreparedRequest> {
        if !self.config.randomize_agent || caller_agent {
            return Cow::Borrowed(request);
        }
        let mut request = request.clone();
        request.set_header("User-Agent", random_user_agent());
        Cow::Owned(request)
    }
}

fn log_status(request: &PreparedRequest, response: &HttpResponse) {
    let status = response.status_code();
    let preview = || response.text_preview(200);
    match status {
        401 => error!("Authentication error: {} {} - {}", status, request.url, preview()),
        403 => error!("Forbidden: {} {} - {}", status, request.url, preview()),
        404 => error!("Not found: {} {} - {}", status, request.url, preview()),
        429 => error!("Too many requests: {} {} - {}", status, request.url, preview()),
        400..=499 => error!("Client error: {} {} - {}", status, request.url, preview()),
        500..=599 => error!("Server error ({}) {}: {}", status, request.url, preview()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Transport that replays a fixed script and records what it was sent.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16, TransportError>>>,
        sent: Mutex<Vec<PreparedRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<u16, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn sent(&self) -> Vec<PreparedRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(200));
            next.map(|status| {
                HttpResponse::new(StatusCode::from_u16(status).unwrap(), request.url.clone())
                    .with_body(format!("status {}", status))
            })
        }
    }

    fn client(config: &Config, transport: Arc<ScriptedTransport>) -> HttpClient {
        HttpClient::builder(config)
            .transport(transport)
            .rate_limiter(RateLimiter::in_memory(1000, Duration::from_secs(1)))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_then_success() {
        let transport = ScriptedTransport::new(vec![Ok(503), Ok(503), Ok(200)]);
        let client = client(&Config::default(), transport.clone());

        let start = Instant::now();
        let response = client
            .get("https://example.com/items", &[])
            .await
            .unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(transport.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_status_short_circuits() {
        let transport = ScriptedTransport::new(vec![Ok(403), Ok(200)]);
        let client = client(&Config::default(), transport.clone());

        let start = Instant::now();
        let err = client
            .get("https://example.com/secret", &[])
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert_eq!(err.attempts, 1);
        assert_eq!(err.last_status, Some(403));
        assert_eq!(err.kind, FailureKind::Rejected);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_requests_waits_before_retry() {
        let transport = ScriptedTransport::new(vec![Ok(429), Ok(200)]);
        let client = client(&Config::default(), transport.clone());

        let start = Instant::now();
        let response = client.head("https://example.com/").await.unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Connect("connection refused".into())),
            Ok(200),
        ]);
        let client = client(&Config::default(), transport.clone());

        let start = Instant::now();
        let response = client.get("https://example.com/", &[]).await.unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded_by_retry_budget() {
        let mut config = Config::default();
        config.request.retries.max = 2;
        let transport = ScriptedTransport::new(vec![Ok(500); 10]);
        let client = client(&config, transport.clone());

        let start = Instant::now();
        let err = client
            .post("https://example.com/submit", "payload")
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_status, Some(500));
        assert!(err.is_exhausted());
        // No delay after the final attempt
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_on_transport_errors_keeps_last_error() {
        let mut config = Config::default();
        config.request.retries.max = 1;
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout(Duration::from_secs(30))),
            Err(TransportError::Other("reset by peer".into())),
        ]);
        let client = client(&config, transport.clone());

        let err = client.get("https://example.com/", &[]).await.unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.last_status, None);
        assert_eq!(err.last_error.as_deref(), Some("reset by peer"));
        assert_eq!(err.kind, FailureKind::Exhausted);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::InvalidRequest("relative URL without a base".into())),
            Ok(200),
        ]);
        let client = client(&Config::default(), transport.clone());

        let err = client.get("/relative", &[]).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert_eq!(err.kind, FailureKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_every_attempt_takes_a_rate_limit_slot() {
        let transport = ScriptedTransport::new(vec![Ok(404)]);
        let limiter = RateLimiter::in_memory(100, Duration::from_secs(60));
        let client = HttpClient::builder(&Config::default())
            .transport(transport.clone())
            .rate_limiter(limiter.clone())
            .build()
            .unwrap();

        client.get("https://example.com/a", &[]).await.unwrap_err();
        client.get("https://example.com/b", &[]).await.unwrap();

        assert_eq!(limiter.recent_admissions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_default_headers_and_timeout_applied() {
        let mut config = Config::default();
        config.request.timeout = 7.0;
        config
            .request
            .headers
            .insert("Accept".into(), "text/html".into());
        config
            .request
            .headers
            .insert("X-Client".into(), "throttle".into());
        let transport = ScriptedTransport::new(vec![Ok(200), Ok(200)]);
        let client = client(&config, transport.clone());

        client
            .execute(
                Method::GET,
                "https://example.com/",
                RequestOptions::new().header("accept", "application/json"),
            )
            .await
            .unwrap();
        client
            .execute(
                Method::GET,
                "https://example.com/",
                RequestOptions::new().timeout(Duration::from_secs(2)),
            )
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].header("Accept"), Some("application/json"));
        assert_eq!(sent[0].header("x-client"), Some("throttle"));
        assert_eq!(sent[0].timeout, Duration::from_secs(7));
        assert_eq!(sent[1].timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_randomized_agent_respects_caller_agent() {
        let mut config = Config::default();
        config.request.randomize_agent = true;
        let transport = ScriptedTransport::new(vec![Ok(200), Ok(200)]);
        let client = client(&config, transport.clone());

        client.get("https://example.com/", &[]).await.unwrap();
        client
            .execute(
                Method::GET,
                "https://example.com/",
                RequestOptions::new().header("User-Agent", "custom/1.0"),
            )
            .await
            .unwrap();

        let sent = transport.sent();
        let random = sent[0].header("user-agent").unwrap();
        assert!(BROWSER_USER_AGENTS.contains(&random));
        assert_eq!(sent[1].header("user-agent"), Some("custom/1.0"));
    }

    #[tokio::test]
    async fn test_randomized_agent_replaces_configured_default() {
        let mut config = Config::default();
        config.request.randomize_agent = true;
        config
            .request
            .headers
            .insert("User-Agent".into(), "configured/1.0".into());
        let transport = ScriptedTransport::new(vec![Ok(200)]);
        let client = client(&config, transport.clone());

        client.get("https://example.com/", &[]).await.unwrap();

        let sent = transport.sent();
        let agent = sent[0].header("user-agent").unwrap();
        assert!(BROWSER_USER_AGENTS.contains(&agent), "sent {}", agent);
        assert_eq!(
            sent[0]
                .headers
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_configured_success_code_outside_2xx_is_returned() {
        let mut config = Config::default();
        config.request.success_codes = [200, 304].into_iter().collect();
        let transport = ScriptedTransport::new(vec![Ok(304), Ok(200)]);
        let client = client(&config, transport.clone());

        let response = client.get("https://example.com/cached", &[]).await.unwrap();

        assert_eq!(response.status_code(), 304);
        assert!(client.classifier().is_success(response.status_code()));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_post_json_sets_body() {
        let transport = ScriptedTransport::new(vec![Ok(201)]);
        let client = client(&Config::default(), transport.clone());

        client
            .post_json("https://example.com/items", &serde_json::json!({"name": "a"}))
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].header("content-type"), Some("application/json"));
        assert_eq!(sent[0].body.as_deref(), Some(br#"{"name":"a"}"#.as_slice()));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.request.success_codes.clear();
        let result = HttpClient::builder(&config)
            .transport(ScriptedTransport::new(vec![]))
            .build();
        assert!(matches!(result, Err(ClientBuildError::Config(_))));
    }
}
