//! HTTP transport for report queries
//!
//! A report is a single GET whose full response body is returned as one
//! string. There is no retry and no backoff.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, Result};

/// Boxed future returned by [`Transport::get`]
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Something that can perform a GET and return the response body
pub trait Transport: Send + Sync {
    /// Fetch `url` and return the body with line separators removed
    fn get<'a>(&'a self, url: &'a str) -> TransportFuture<'a>;
}

/// Transport backed by a `reqwest` client
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport, optionally overriding the client's request timeout
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http_client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, url: &'a str) -> TransportFuture<'a> {
        Box::pin(async move {
            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::Report(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Report(format!("server returned {}", status)));
            }

            let body = response
                .text()
                .await
                .map_err(|e| Error::Report(format!("failed to read response: {}", e)))?;

            Ok(join_lines(&body))
        })
    }
}

/// Concatenate the lines of `body`, dropping `\n`, `\r\n` and lone `\r`
/// separators
pub fn join_lines(body: &str) -> String {
    body.split(&['\n', '\r'][..]).collect()
}
