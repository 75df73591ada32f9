//! Request options and the prepared request handed to a transport.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;

/// Caller-supplied options for one logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Per-attempt timeout; the configured timeout when unset.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. Later values replace earlier ones with the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully resolved request: defaults merged, timeout chosen.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl PreparedRequest {
    /// Look up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value regardless of case.
    pub fn set_header(&mut self, name: &str, value: &str) {
        set_header(&mut self.headers, name, value);
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}

/// Merge default headers with caller headers. Caller values win on a
/// case-insensitive name collision.
pub fn merge_headers(
    defaults: &BTreeMap<String, String>,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = defaults
        .iter()
        .filter(|(name, _)| {
            !overrides
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case(name.as_str()))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (name, value) in overrides {
        set_header(&mut merged, name, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_headers_win_ignoring_case() {
        let defaults = BTreeMap::from([
            ("Accept".to_string(), "text/html".to_string()),
            ("X-Client".to_string(), "throttle".to_string()),
        ]);
        let overrides = vec![("accept".to_string(), "application/json".to_string())];

        let merged = merge_headers(&defaults, &overrides);

        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&("X-Client".to_string(), "throttle".to_string())));
        assert!(merged.contains(&("accept".to_string(), "application/json".to_string())));
    }

    #[test]
    fn test_options_header_replaces_previous_value() {
        let options = RequestOptions::new()
            .header("Authorization", "Bearer old")
            .header("authorization", "Bearer new");
        assert_eq!(
            options.headers,
            vec![("authorization".to_string(), "Bearer new".to_string())]
        );
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let options = RequestOptions::new()
            .json(&serde_json::json!({"q": "records"}))
            .unwrap();
        assert_eq!(options.body.as_deref(), Some(br#"{"q":"records"}"#.as_slice()));
        assert!(options
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn test_prepared_header_lookup_is_case_insensitive() {
        let mut request = PreparedRequest {
            method: Method::GET,
            url: "https://example.com".to_string(),
            headers: vec![("User-Agent".to_string(), "a".to_string())],
            query: Vec::new(),
            body: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(request.header("user-agent"), Some("a"));

        request.set_header("user-agent", "b");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("USER-AGENT"), Some("b"));
    }
}
