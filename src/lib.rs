//! throttle-http - rate-limited HTTP request execution.
//!
//! Outgoing requests pass through a sliding-window [`rate_limit::RateLimiter`]
//! (in-process or shared between processes through SQLite) and a bounded,
//! fixed-delay retry policy in [`http_client::HttpClient`].

pub mod cli;
pub mod config;
pub mod http_client;
pub mod rate_limit;

pub use config::Config;
pub use http_client::{HttpClient, HttpResponse, RequestFailed, RequestOptions};
pub use rate_limit::RateLimiter;
