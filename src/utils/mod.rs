//! Utility modules supporting the harvester.
//!
//! - [`HttpClient`]: shared reqwest client with user agent and timeouts
//! - [`RetryPolicy`]: classification predicate, attempt bound and backoff
//! - [`with_retry`]: execute an operation under a [`RetryPolicy`]
//! - [`ProgressReporter`]: batch progress bar
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use pubmed_harvest::sources::SourceError;
//! use pubmed_harvest::utils::{with_retry, RetryPolicy};
//!
//! # async fn fetch_page() -> Result<String, SourceError> { Ok(String::new()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! // Retries 400 Bad Request after 1s, then 2s, then gives up
//! let page = with_retry(&RetryPolicy::default(), fetch_page).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod progress;
mod retry;

pub use http::HttpClient;
pub use progress::ProgressReporter;
pub use retry::{with_retry, ErrorClassifier, RetryPolicy};
