//! Terminal error of a logical request.

use std::fmt;

use reqwest::Method;

/// Why the attempt loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Every attempt in the retry budget failed with a retryable outcome.
    Exhausted,
    /// A non-retryable status was received.
    Rejected,
    /// The request could not be built (bad URL, invalid header).
    InvalidRequest,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Exhausted => "retries exhausted",
            FailureKind::Rejected => "rejected",
            FailureKind::InvalidRequest => "invalid request",
        };
        f.write_str(s)
    }
}

/// A request that did not produce a success response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{method} {url} failed after {attempts} attempt(s) ({kind}){}", describe_last(.last_status, .last_error))]
pub struct RequestFailed {
    pub method: Method,
    pub url: String,
    pub attempts: u32,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
    pub kind: FailureKind,
}

fn describe_last(status: &Option<u16>, error: &Option<String>) -> String {
    match (status, error) {
        (Some(status), _) => format!(": last status {}", status),
        (None, Some(error)) => format!(": {}", error),
        (None, None) => String::new(),
    }
}

impl RequestFailed {
    pub fn is_exhausted(&self) -> bool {
        self.kind == FailureKind::Exhausted
    }
}
