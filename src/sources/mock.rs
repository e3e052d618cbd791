//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::models::SessionState;
use crate::sources::{ResultSetSource, SourceError};

/// Session handle issued by [`MockSource::search`]
pub const MOCK_SESSION_HANDLE: &str = "MCID_mock";

/// A scripted result-set source.
///
/// `search` yields a session over `total_count` synthetic articles and
/// `fetch_page` serves them as E-utilities XML. Failures can be queued per
/// offset; each queued error is returned once before the page is served.
#[derive(Debug)]
pub struct MockSource {
    total_count: u64,
    search_calls: Mutex<u32>,
    fetch_attempts: Mutex<Vec<(u64, Instant)>>,
    failures: Mutex<HashMap<u64, VecDeque<SourceError>>>,
}

impl MockSource {
    /// Create a mock whose searches match `total_count` articles.
    pub fn new(total_count: u64) -> Self {
        Self {
            total_count,
            search_calls: Mutex::new(0),
            fetch_attempts: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Queue an error for the next fetch at `offset`.
    pub fn push_failure(&self, offset: u64, error: SourceError) {
        let mut guard = self.failures.lock().unwrap();
        guard.entry(offset).or_default().push_back(error);
    }

    /// Queue `times` 400 Bad Request responses at `offset`.
    pub fn fail_with_bad_request(&self, offset: u64, times: usize) {
        for _ in 0..times {
            self.push_failure(
                offset,
                SourceError::Http {
                    status: 400,
                    body: "Bad Request".to_string(),
                },
            );
        }
    }

    /// Number of searches issued.
    pub fn search_calls(&self) -> u32 {
        *self.search_calls.lock().unwrap()
    }

    /// Offsets of every fetch attempt, failed ones included, in call order.
    pub fn fetch_attempts(&self) -> Vec<u64> {
        let guard = self.fetch_attempts.lock().unwrap();
        guard.iter().map(|(offset, _)| *offset).collect()
    }

    /// Time elapsed between consecutive fetch attempts.
    pub fn fetch_gaps(&self) -> Vec<std::time::Duration> {
        let guard = self.fetch_attempts.lock().unwrap();
        guard
            .windows(2)
            .map(|pair| pair[1].1.duration_since(pair[0].1))
            .collect()
    }
}

#[async_trait]
impl ResultSetSource for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    async fn search(&self, _query: &str) -> Result<SessionState, SourceError> {
        *self.search_calls.lock().unwrap() += 1;
        Ok(SessionState::new(MOCK_SESSION_HANDLE, "1", self.total_count))
    }

    async fn fetch_page(
        &self,
        session: &SessionState,
        offset: u64,
        page_size: u64,
    ) -> Result<String, SourceError> {
        self.fetch_attempts.lock().unwrap().push((offset, Instant::now()));

        if session.session_handle != MOCK_SESSION_HANDLE {
            return Err(SourceError::Http {
                status: 400,
                body: format!("Unknown WebEnv {}", session.session_handle),
            });
        }

        let queued = {
            let mut guard = self.failures.lock().unwrap();
            guard.get_mut(&offset).and_then(|queue| queue.pop_front())
        };
        if let Some(error) = queued {
            return Err(error);
        }

        let end = offset.saturating_add(page_size).min(self.total_count);
        Ok(article_set_xml(offset..end))
    }
}

/// Helper to render synthetic articles as an efetch `PubmedArticleSet`.
///
/// Article `n` is titled `"Article n"` with a single author `"Author{n} A"`.
pub fn article_set_xml(indices: std::ops::Range<u64>) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" ?>\n<PubmedArticleSet>\n");
    for n in indices {
        xml.push_str(&format!(
            "<PubmedArticle><MedlineCitation><PMID>{n}</PMID><Article>\
             <Journal><JournalIssue><PubDate><Year>2020</Year></PubDate></JournalIssue>\
             <Title>Mock Journal</Title></Journal>\
             <ArticleTitle>Article {n}</ArticleTitle>\
             <AuthorList><Author><LastName>Author{n}</LastName><Initials>A</Initials></Author></AuthorList>\
             </Article></MedlineCitation></PubmedArticle>\n"
        ));
    }
    xml.push_str("</PubmedArticleSet>\n");
    xml
}
