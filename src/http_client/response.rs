//! HTTP response wrapper.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;

/// A completed exchange with its body fully buffered.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Header names are lower-case. Repeated headers are joined with ", ",
    /// except `set-cookie`, whose values are joined with newlines.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Time from sending the request until the response headers arrived.
    pub elapsed: Duration,
    /// Final URL, including the query string.
    pub url: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, url: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            elapsed: Duration::ZERO,
            url: url.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Get a header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get response body as text (lossy UTF-8).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize response body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body text cut to at most `max_chars` characters, for log lines.
    pub fn text_preview(&self, max_chars: usize) -> String {
        let text = self.text();
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text,
        }
    }
}

/// Flatten reqwest headers into the lower-case map used by [`HttpResponse`].
pub(crate) fn extract_response_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let separator = if name == reqwest::header::SET_COOKIE {
            "\n"
        } else {
            ", "
        };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}
