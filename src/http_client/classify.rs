//! Status code classification for the retry loop.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::RequestConfig;

use super::transport::TransportError;

/// What the retry loop should do with an attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Try again after `delay`, budget permitting.
    Retryable { delay: Duration },
    Fatal,
}

impl Classification {
    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success)
    }
}

/// Maps status codes and transport errors to a [`Classification`].
///
/// Holds only its code sets and fixed delays; classification never does I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseClassifier {
    success_codes: BTreeSet<u16>,
    retryable_codes: BTreeSet<u16>,
    rate_limit_delay: Duration,
    server_error_delay: Duration,
    transport_error_delay: Duration,
}

impl ResponseClassifier {
    pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(15);
    pub const DEFAULT_SERVER_ERROR_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_TRANSPORT_ERROR_DELAY: Duration = Duration::from_secs(1);

    /// Classifier with the default delays.
    pub fn new(
        success_codes: impl IntoIterator<Item = u16>,
        retryable_codes: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            success_codes: success_codes.into_iter().collect(),
            retryable_codes: retryable_codes.into_iter().collect(),
            rate_limit_delay: Self::DEFAULT_RATE_LIMIT_DELAY,
            server_error_delay: Self::DEFAULT_SERVER_ERROR_DELAY,
            transport_error_delay: Self::DEFAULT_TRANSPORT_ERROR_DELAY,
        }
    }

    pub fn with_delays(mut self, rate_limit: Duration, server_error: Duration, transport_error: Duration) -> Self {
        self.rate_limit_delay = rate_limit;
        self.server_error_delay = server_error;
        self.transport_error_delay = transport_error;
        self
    }

    pub fn from_config(config: &RequestConfig) -> Self {
        let retries = &config.retries;
        Self::new(
            config.success_codes.iter().copied(),
            retries.codes.iter().copied(),
        )
        .with_delays(
            retries.rate_limit_delay(),
            retries.server_error_delay(),
            retries.transport_error_delay(),
        )
    }

    /// Classify a received status code. Success codes are checked first.
    pub fn classify(&self, status: u16) -> Classification {
        if self.success_codes.contains(&status) {
            return Classification::Success;
        }
        if self.retryable_codes.contains(&status) {
            let delay = match status {
                429 => self.rate_limit_delay,
                500..=599 => self.server_error_delay,
                _ => Duration::ZERO,
            };
            return Classification::Retryable { delay };
        }
        Classification::Fatal
    }

    /// Classify a failed exchange that produced no status.
    pub fn classify_transport_error(&self, error: &TransportError) -> Classification {
        if error.is_retryable() {
            Classification::Retryable {
                delay: self.transport_error_delay,
            }
        } else {
            Classification::Fatal
        }
    }

    pub fn is_success(&self, status: u16) -> bool {
        self.success_codes.contains(&status)
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        !self.is_success(status) && self.retryable_codes.contains(&status)
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::from_config(&RequestConfig::default())
    }
}
