//! Redacted, JSON-serializable description of an HTTP exchange for debug logs.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, Level};
use url::Url;

use super::request::PreparedRequest;
use super::response::HttpResponse;

const REDACTED: &str = "[REDACTED]";

/// Header names whose values never reach the logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "auth",
    "x-auth",
    "x-api-key",
    "api-key",
    "apikey",
    "password",
    "x-access-token",
    "token",
    "jwt",
    "bearer",
    "cookie",
    "set-cookie",
    "session",
    "x-session-id",
    "sessionid",
    "csrf",
    "x-csrf-token",
    "x-xsrf-token",
    "key",
    "secret",
    "private",
    "signature",
    "x-user-id",
    "userid",
];

/// Cookie names whose values never reach the logs.
const SENSITIVE_COOKIES: &[&str] = &[
    "auth",
    "token",
    "session",
    "csrf",
    "key",
    "secret",
    "password",
    "access",
    "user",
    "id",
    "jwt",
    "refresh",
    "api",
    "credentials",
    "oauth",
];

#[derive(Debug, Serialize)]
pub struct ExchangeLog {
    pub request: RequestLog,
    pub response: ResponseLog,
}

#[derive(Debug, Serialize)]
pub struct RequestLog {
    pub host: String,
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ResponseLog {
    pub status_code: u16,
    pub elapsed_time_ms: String,
    pub size: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, CookieLog>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct CookieLog {
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

/// Describe one exchange with sensitive headers and cookies redacted.
pub fn format_exchange(request: &PreparedRequest, response: &HttpResponse) -> ExchangeLog {
    let (host, path) = match Url::parse(&response.url) {
        Ok(url) => {
            let host = match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => String::new(),
            };
            let path = if url.path().is_empty() {
                "/".to_string()
            } else {
                url.path().to_string()
            };
            (host, path)
        }
        Err(_) => (String::new(), "/".to_string()),
    };

    ExchangeLog {
        request: RequestLog {
            host,
            path,
            method: request.method.to_string(),
            headers: redact_headers(request.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            query_params: parse_query_params(&response.url),
        },
        response: ResponseLog {
            status_code: response.status_code(),
            elapsed_time_ms: format!("{:.3}", response.elapsed.as_secs_f64() * 1000.0),
            size: human_readable_size(response.body.len() as u64),
            headers: redact_headers(response.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            cookies: extract_cookies(response),
        },
    }
}

/// Emit the redacted exchange at debug level. Skipped entirely when debug
/// logging is off.
pub fn log_exchange(request: &PreparedRequest, response: &HttpResponse) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    match serde_json::to_string(&format_exchange(request, response)) {
        Ok(payload) => debug!("HTTP response: {}", payload),
        Err(e) => debug!(
            "Failed to format HTTP response ({}): {}",
            response.status_code(),
            e
        ),
    }
}

/// Replace the values of sensitive headers with a placeholder.
pub fn redact_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .map(|(name, value)| {
            let value = if is_sensitive_header(name) {
                REDACTED.to_string()
            } else {
                value.to_string()
            };
            (name.to_string(), value)
        })
        .collect()
}

fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name))
}

/// Query parameters of `url`. Bare switches (`?verbose`) map to `true`.
pub fn parse_query_params(url: &str) -> serde_json::Map<String, Value> {
    let mut params = serde_json::Map::new();
    let Ok(url) = Url::parse(url) else {
        return params;
    };
    let Some(raw) = url.query() else {
        return params;
    };

    for (key, value) in url.query_pairs() {
        if !key.is_empty() {
            params.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
    for switch in raw.split('&').filter(|p| !p.is_empty() && !p.contains('=')) {
        params.insert(switch.to_string(), Value::Bool(true));
    }
    params
}

/// Format a byte count with binary units, e.g. `1.50 KiB`.
pub fn human_readable_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = size as f64;
    let mut idx = 0;
    while value >= 1024.0 && idx < UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    format!("{:.2} {}", value, UNITS[idx])
}

/// Parse `Set-Cookie` values from the response, redacting sensitive names.
pub fn extract_cookies(response: &HttpResponse) -> BTreeMap<String, CookieLog> {
    let mut cookies = BTreeMap::new();
    let Some(raw) = response.header("set-cookie") else {
        return cookies;
    };

    for line in raw.lines() {
        let mut parts = line.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let mut cookie = CookieLog {
            value: if SENSITIVE_COOKIES.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                REDACTED.to_string()
            } else {
                value.trim().to_string()
            },
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
        };

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().to_string())),
                None => (attr, None),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = val,
                "path" => cookie.path = val,
                "expires" => cookie.expires = val,
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }
        cookies.insert(name.to_string(), cookie);
    }
    cookies
}
