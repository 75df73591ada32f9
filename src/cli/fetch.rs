//! `fetch` command: run requests through one shared client.

use std::time::Instant;

use console::style;
use futures::stream::{self, StreamExt};
use reqwest::Method;

use crate::cli::icons::{dim_arrow, error, success};
use crate::config::Config;
use crate::http_client::{HttpClient, RequestOptions};

pub struct FetchArgs {
    pub url: String,
    pub method: String,
    pub headers: Vec<String>,
    pub data: Option<String>,
    pub count: usize,
    pub concurrency: usize,
}

/// Parse a `Name: value` header argument.
fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid header '{}', expected 'Name: value'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header '{}': empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub async fn cmd_fetch(config: &Config, args: FetchArgs) -> anyhow::Result<()> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow::anyhow!("Invalid HTTP method: {}", args.method))?;

    let mut options = RequestOptions::new();
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        options = options.header(&name, &value);
    }
    if let Some(data) = args.data {
        options = options.body(data);
    }

    let client = HttpClient::new(config)?;
    let count = args.count.max(1);
    let started = Instant::now();

    let results: Vec<_> = stream::iter(0..count)
        .map(|_| {
            let client = client.clone();
            let method = method.clone();
            let options = options.clone();
            let url = args.url.as_str();
            async move { client.execute(method, url, options).await }
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let mut failures = 0;
    for result in &results {
        match result {
            Ok(response) => {
                eprintln!(
                    "{} {} {} {}",
                    success(),
                    style(response.status_code()).green(),
                    dim_arrow(),
                    style(format!("{:.1}ms", response.elapsed.as_secs_f64() * 1000.0)).dim()
                );
                if count == 1 {
                    println!("{}", response.text());
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}", error(), e);
            }
        }
    }

    if count > 1 {
        eprintln!(
            "{} {} request(s), {} failed, in {:.2}s",
            dim_arrow(),
            count,
            failures,
            started.elapsed().as_secs_f64()
        );
    }

    if failures > 0 {
        anyhow::bail!("{} of {} request(s) failed", failures, count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Accept: application/json").unwrap(),
            ("Accept".to_string(), "application/json".to_string())
        );
        assert_eq!(
            parse_header("X-Time:12:30").unwrap(),
            ("X-Time".to_string(), "12:30".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
