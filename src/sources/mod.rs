//! Remote result-set sources.
//!
//! A [`ResultSetSource`] is any service with search / session / paginated
//! fetch semantics: one search call produces an opaque server-held session,
//! and pages of raw article XML are then fetched from it by offset.
//! [`PubMedSource`] talks to NCBI E-utilities; [`MockSource`] is a scripted
//! stand-in for tests.

pub mod mock;
mod pubmed;

pub use mock::MockSource;
pub use pubmed::{parse_article_set, PubMedSource};

use crate::models::SessionState;
use async_trait::async_trait;

/// A searchable service that keeps result sets on the server side.
#[async_trait]
pub trait ResultSetSource: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source
    fn id(&self) -> &str;

    /// Run a search and return a session positioned at offset zero.
    ///
    /// Only the session handle and result count are returned, no records.
    async fn search(&self, query: &str) -> Result<SessionState, SourceError>;

    /// Fetch one page of raw article XML starting at `offset`.
    ///
    /// The session's handle and query key are passed through unchanged.
    async fn fetch_page(
        &self,
        session: &SessionState,
        offset: u64,
        page_size: u64,
    ) -> Result<String, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Connection, timeout or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Error reported by the service inside a successful response
    #[error("API error: {0}")]
    Api(String),

    /// Malformed response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// A transient error persisted through every allowed attempt
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SourceError>,
    },
}

impl SourceError {
    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the service rejected the request with 400 Bad Request.
    ///
    /// E-utilities answers 400 intermittently under load for requests that
    /// succeed when repeated.
    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(reqwest::StatusCode::BAD_REQUEST.as_u16())
    }
}
