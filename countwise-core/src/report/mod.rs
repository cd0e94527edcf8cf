//! Report queries
//!
//! A report is one HTTP GET carrying every stored entry as a query parameter.
//! Each query runs on its own tokio task:
//! - nothing is sent while analytics are disabled
//! - the listener only sees successful responses
//! - failures are logged and kept in the [`QueryOutcome`]
//!
//! ## Usage
//!
//! ```toml
//! [analytics]
//! default_url = "https://stats.example.com/query"
//! ```

mod cancel;
mod query;
mod transport;

pub use cancel::CancellationToken;
pub use query::{build_report_url, run_query, AnalyticsListener, QueryHandle, QueryOutcome};
pub use transport::{join_lines, HttpTransport, Transport, TransportFuture};
