//! Server-held search session and harvesting progress.

use serde::{Deserialize, Serialize};

/// Handle on an E-utilities history-server result set plus the next offset
/// to fetch.
///
/// `session_handle` and `query_key` are opaque tokens returned by the
/// initial search and passed back unchanged on every page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(alias = "WebEnv")]
    pub session_handle: String,

    #[serde(alias = "QueryKey")]
    pub query_key: String,

    #[serde(alias = "Count")]
    pub total_count: u64,

    #[serde(alias = "RetStart")]
    pub next_offset: u64,
}

impl SessionState {
    /// Create a fresh session positioned at offset zero
    pub fn new(
        session_handle: impl Into<String>,
        query_key: impl Into<String>,
        total_count: u64,
    ) -> Self {
        Self {
            session_handle: session_handle.into(),
            query_key: query_key.into(),
            total_count,
            next_offset: 0,
        }
    }

    /// Whether every page of the result set has been processed
    pub fn is_complete(&self) -> bool {
        self.next_offset >= self.total_count
    }

    /// Move past one page, never beyond `total_count`
    pub fn advance(&mut self, page_size: u64) {
        self.next_offset = self
            .next_offset
            .saturating_add(page_size)
            .min(self.total_count);
    }

    /// Number of results not yet fetched
    pub fn remaining(&self) -> u64 {
        self.total_count.saturating_sub(self.next_offset)
    }
}
