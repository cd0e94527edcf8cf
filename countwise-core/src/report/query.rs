//! Report queries: URL assembly, outcomes and handles

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::cancel::CancellationToken;
use super::transport::Transport;
use crate::error::{Error, Result};

/// Receives the server response of a successful query.
///
/// Never called when the query is disabled, cancelled, or fails.
pub trait AnalyticsListener: Send + Sync {
    fn on_server_response(&self, response: &str);
}

impl<F> AnalyticsListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_server_response(&self, response: &str) {
        self(response)
    }
}

/// How a query ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Server answered; full body with line separators removed
    Response(String),
    /// Analytics are disabled, nothing was sent
    Disabled,
    /// Request or response failed
    Failed(String),
    /// Cancelled before completion
    Cancelled,
}

impl QueryOutcome {
    /// The response body, if the server answered
    pub fn response(&self) -> Option<&str> {
        match self {
            QueryOutcome::Response(body) => Some(body),
            _ => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, QueryOutcome::Response(_))
    }
}

enum HandleState {
    Ready(QueryOutcome),
    Running(JoinHandle<QueryOutcome>),
}

/// Handle to a query started with [`Analytics::query`](crate::Analytics::query)
///
/// Dropping the handle does not stop the query.
pub struct QueryHandle {
    state: HandleState,
    cancel: CancellationToken,
}

impl QueryHandle {
    pub(crate) fn ready(outcome: QueryOutcome) -> Self {
        Self {
            state: HandleState::Ready(outcome),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn running(task: JoinHandle<QueryOutcome>, cancel: CancellationToken) -> Self {
        Self {
            state: HandleState::Running(task),
            cancel,
        }
    }

    /// Cancel the query. The listener will not be invoked afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let HandleState::Running(task) = &self.state {
            task.abort();
        }
    }

    /// Token observed by the running query
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Running(task) => task.is_finished(),
        }
    }

    /// Wait for the query to end and return how it ended
    pub async fn outcome(self) -> QueryOutcome {
        match self.state {
            HandleState::Ready(outcome) => outcome,
            HandleState::Running(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => QueryOutcome::Cancelled,
                Err(e) => QueryOutcome::Failed(format!("query task failed: {}", e)),
            },
        }
    }
}

/// Append `params` to `base` as a percent-encoded query string.
///
/// Existing query parameters on `base` are kept.
pub fn build_report_url(base: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| Error::Config(format!("invalid report URL {:?}: {}", base, e)))?;

    if params.is_empty() {
        return Ok(url.into());
    }

    let encoded = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
        _ => encoded,
    };
    url.set_query(Some(&query));

    Ok(url.into())
}

/// Send one report request and deliver the response to `listener`.
pub async fn run_query(
    transport: Arc<dyn Transport>,
    url: String,
    listener: Option<Box<dyn AnalyticsListener>>,
    cancel: CancellationToken,
) -> QueryOutcome {
    if cancel.is_cancelled() {
        return QueryOutcome::Cancelled;
    }

    tracing::debug!(url = %url, "Querying report endpoint");

    let body = match transport.get(&url).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Query to server failed");
            return QueryOutcome::Failed(e.to_string());
        }
    };

    if cancel.is_cancelled() {
        tracing::debug!("Query cancelled, dropping response");
        return QueryOutcome::Cancelled;
    }

    if let Some(listener) = listener {
        listener.on_server_response(&body);
    }
    QueryOutcome::Response(body)
}
