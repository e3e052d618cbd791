//! PubMed source implementation using the E-utilities history server.
//!
//! `esearch` is called once with `usehistory=y` to park the result set on
//! NCBI's side; pages are then pulled with `efetch` using the returned
//! `WebEnv` / `query_key` pair.

use async_trait::async_trait;
use quick_xml::de::from_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::HarvestConfig;
use crate::models::{format_author, publication_year, ArticleRecord, SessionState};
use crate::sources::{ResultSetSource, SourceError};
use crate::utils::HttpClient;

/// Longest response body kept in an HTTP error
const MAX_ERROR_BODY: usize = 512;

/// PubMed research source
///
/// Uses NCBI E-utilities for searching and paging through PubMed records.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: Arc<HttpClient>,
    base_url: String,
    tool: String,
    email: String,
    api_key: Option<String>,
}

impl PubMedSource {
    /// Create a new PubMed source from the harvest configuration
    pub fn new(config: &HarvestConfig) -> Result<Self, SourceError> {
        let user_agent = format!(
            "{}/{} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            config.email
        );
        let client = HttpClient::with_settings(&user_agent, config.request_timeout())?;
        Ok(Self::with_client(Arc::new(client), config))
    }

    /// Create with a custom HTTP client
    pub fn with_client(client: Arc<HttpClient>, config: &HarvestConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tool: config.tool.clone(),
            email: config.email.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
        }
    }

    /// Parameters NCBI asks every client to identify itself with
    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", self.tool.clone()), ("email", self.email.clone())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    fn encode(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Build the esearch URL that stores the result set on the history server
    fn build_search_url(&self, query: &str) -> String {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("usehistory", "y".to_string()),
            ("retmax", "0".to_string()),
            ("retmode", "xml".to_string()),
        ];
        params.extend(self.identity_params());

        format!("{}/esearch.fcgi?{}", self.base_url, Self::encode(&params))
    }

    /// Build the efetch URL for one page of a stored result set
    fn build_fetch_url(&self, session: &SessionState, offset: u64, page_size: u64) -> String {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("WebEnv", session.session_handle.clone()),
            ("query_key", session.query_key.clone()),
            ("retstart", offset.to_string()),
            ("retmax", page_size.to_string()),
            ("rettype", "abstract".to_string()),
            ("retmode", "xml".to_string()),
        ];
        params.extend(self.identity_params());

        format!("{}/efetch.fcgi?{}", self.base_url, Self::encode(&params))
    }

    /// GET a URL and return the body, mapping non-success statuses to
    /// [`SourceError::Http`]
    async fn get_text(&self, url: &str, action: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to {}: {}", action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    /// Parse an esearch response into a fresh session
    pub fn parse_search_response(xml: &str) -> Result<SessionState, SourceError> {
        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct ESearchResult {
            Count: Option<String>,
            QueryKey: Option<String>,
            WebEnv: Option<String>,
            #[serde(rename = "ERROR")]
            error: Option<String>,
        }

        let result: ESearchResult = from_str(xml)
            .map_err(|e| SourceError::Parse(format!("Failed to parse PubMed search XML: {}", e)))?;

        if let Some(error) = result.error {
            return Err(SourceError::Api(format!("PubMed search failed: {}", error)));
        }

        let session_handle = result
            .WebEnv
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SourceError::Api("PubMed search returned no WebEnv".to_string()))?;
        let query_key = result
            .QueryKey
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SourceError::Api("PubMed search returned no QueryKey".to_string()))?;
        let count = result
            .Count
            .ok_or_else(|| SourceError::Api("PubMed search returned no Count".to_string()))?;
        let total_count = count
            .trim()
            .parse::<u64>()
            .map_err(|e| SourceError::Parse(format!("Invalid result count '{}': {}", count, e)))?;

        Ok(SessionState::new(
            session_handle.trim(),
            query_key.trim(),
            total_count,
        ))
    }
}

#[async_trait]
impl ResultSetSource for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    async fn search(&self, query: &str) -> Result<SessionState, SourceError> {
        let url = self.build_search_url(query);
        tracing::debug!("PubMed esearch term: {}", query);

        let xml = self.get_text(&url, "search PubMed").await?;
        let session = Self::parse_search_response(&xml)?;

        tracing::info!(
            "PubMed search matched {} articles (query_key {})",
            session.total_count,
            session.query_key
        );
        Ok(session)
    }

    async fn fetch_page(
        &self,
        session: &SessionState,
        offset: u64,
        page_size: u64,
    ) -> Result<String, SourceError> {
        let url = self.build_fetch_url(session, offset, page_size);
        tracing::debug!("PubMed efetch retstart={} retmax={}", offset, page_size);

        self.get_text(&url, "fetch PubMed records").await
    }
}

/// Elements the article-set parser reacts to, identified by their trailing
/// path in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Article,
    Title,
    Abstract,
    AbstractText,
    Author,
    LastName,
    Initials,
    JournalTitle,
    Year,
    MedlineDate,
    ELocationId,
    Error,
}

impl Field {
    fn collects_text(self) -> bool {
        !matches!(self, Field::Article | Field::Abstract | Field::Author)
    }
}

const FIELDS: &[(&[&str], Field)] = &[
    (&["PubmedArticleSet", "PubmedArticle"], Field::Article),
    (&["MedlineCitation", "Article", "ArticleTitle"], Field::Title),
    (&["MedlineCitation", "Article", "Abstract"], Field::Abstract),
    (&["Article", "Abstract", "AbstractText"], Field::AbstractText),
    (&["Article", "AuthorList", "Author"], Field::Author),
    (&["AuthorList", "Author", "LastName"], Field::LastName),
    (&["AuthorList", "Author", "Initials"], Field::Initials),
    (&["Article", "Journal", "Title"], Field::JournalTitle),
    (&["JournalIssue", "PubDate", "Year"], Field::Year),
    (&["JournalIssue", "PubDate", "MedlineDate"], Field::MedlineDate),
    (&["MedlineCitation", "Article", "ELocationID"], Field::ELocationId),
    (&["eFetchResult", "ERROR"], Field::Error),
];

/// Field whose element is exactly the last one in `path`
fn field_at(path: &[String]) -> Option<Field> {
    FIELDS
        .iter()
        .find(|(suffix, _)| {
            path.len() >= suffix.len()
                && path[path.len() - suffix.len()..]
                    .iter()
                    .zip(suffix.iter())
                    .all(|(name, expected)| name == expected)
        })
        .map(|(_, field)| *field)
}

/// Field that text at `path` belongs to: the innermost recognised ancestor,
/// so inline markup such as `<i>` inside a title is flattened into it
fn text_field(path: &[String]) -> Option<Field> {
    (1..=path.len())
        .rev()
        .find_map(|end| field_at(&path[..end]))
        .filter(|field| field.collects_text())
}

#[derive(Debug, Default)]
struct ArticleFields {
    title: String,
    has_abstract: bool,
    abstract_segments: Vec<String>,
    authors: Vec<String>,
    journal: String,
    doi: Option<String>,
    year: Option<String>,
    medline_date: Option<String>,
}

impl ArticleFields {
    fn into_record(self) -> ArticleRecord {
        let abstract_text = if self.has_abstract {
            self.abstract_segments.join(" ")
        } else {
            String::new()
        };
        let year = publication_year(self.year.as_deref(), self.medline_date.as_deref());

        ArticleRecord::new(
            self.title,
            abstract_text,
            self.authors,
            self.journal,
            self.doi.unwrap_or_default(),
            year,
        )
    }
}

#[derive(Debug, Default)]
struct AuthorFields {
    last_name: Option<String>,
    initials: Option<String>,
}

/// Streaming state for one efetch document
#[derive(Debug, Default)]
struct ArticleSetParser {
    path: Vec<String>,
    article: Option<ArticleFields>,
    author: Option<AuthorFields>,
    // Open ELocationID carrying EIdType="doi"
    doi: Option<String>,
    error: Option<String>,
    records: Vec<ArticleRecord>,
}

impl ArticleSetParser {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), SourceError> {
        self.path
            .push(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());

        match field_at(&self.path) {
            Some(Field::Article) => {
                self.article = Some(ArticleFields::default());
            }
            Some(Field::Error) => {
                self.error.get_or_insert_with(String::new);
            }
            _ => {}
        }

        let Some(article) = self.article.as_mut() else {
            return Ok(());
        };

        match field_at(&self.path) {
            Some(Field::Abstract) => article.has_abstract = true,
            Some(Field::AbstractText) => article.abstract_segments.push(String::new()),
            Some(Field::Author) => self.author = Some(AuthorFields::default()),
            Some(Field::LastName) => {
                if let Some(author) = self.author.as_mut() {
                    author.last_name.get_or_insert_with(String::new);
                }
            }
            Some(Field::Initials) => {
                if let Some(author) = self.author.as_mut() {
                    author.initials.get_or_insert_with(String::new);
                }
            }
            Some(Field::Year) => {
                article.year.get_or_insert_with(String::new);
            }
            Some(Field::MedlineDate) => {
                article.medline_date.get_or_insert_with(String::new);
            }
            Some(Field::ELocationId) => {
                let id_type = start
                    .try_get_attribute("EIdType")
                    .map_err(|e| SourceError::Parse(format!("Bad ELocationID attribute: {}", e)))?;
                let is_doi = id_type.is_some_and(|attr| attr.value.as_ref() == b"doi");
                self.doi = (is_doi && article.doi.is_none()).then(String::new);
            }
            _ => {}
        }

        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(field) = text_field(&self.path) else {
            return;
        };

        if field == Field::Error {
            self.error.get_or_insert_with(String::new).push_str(text);
            return;
        }

        let Some(article) = self.article.as_mut() else {
            return;
        };

        let target = match field {
            Field::Title => Some(&mut article.title),
            Field::AbstractText => article.abstract_segments.last_mut(),
            Field::JournalTitle => Some(&mut article.journal),
            Field::Year => article.year.as_mut(),
            Field::MedlineDate => article.medline_date.as_mut(),
            Field::ELocationId => self.doi.as_mut(),
            Field::LastName => self.author.as_mut().and_then(|a| a.last_name.as_mut()),
            Field::Initials => self.author.as_mut().and_then(|a| a.initials.as_mut()),
            _ => None,
        };

        if let Some(target) = target {
            target.push_str(text);
        }
    }

    fn close(&mut self) {
        let field = field_at(&self.path);
        self.path.pop();

        match field {
            Some(Field::Article) => {
                if let Some(article) = self.article.take() {
                    self.records.push(article.into_record());
                }
                self.author = None;
                self.doi = None;
            }
            Some(Field::Author) => {
                if let (Some(author), Some(article)) = (self.author.take(), self.article.as_mut()) {
                    article.authors.push(format_author(
                        author.last_name.as_deref(),
                        author.initials.as_deref(),
                    ));
                }
            }
            Some(Field::ELocationId) => {
                if let (Some(doi), Some(article)) = (self.doi.take(), self.article.as_mut()) {
                    article.doi.get_or_insert(doi);
                }
            }
            _ => {}
        }
    }
}

/// Parse one efetch page (`<PubmedArticleSet>`) into article records.
///
/// Records come out in document order, one per `PubmedArticle`; other
/// entries such as `PubmedBookArticle` are skipped. Missing fields fall back
/// to their defaults. Only a document that is not well-formed, or an
/// `eFetchResult` error payload, is an error.
pub fn parse_article_set(xml: &str) -> Result<Vec<ArticleRecord>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut parser = ArticleSetParser::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => parser.open(e)?,
            Ok(Event::Empty(ref e)) => {
                parser.open(e)?;
                parser.close();
            }
            Ok(Event::End(_)) => parser.close(),
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| {
                    SourceError::Parse(format!("Failed to decode PubMed fetch XML text: {}", e))
                })?;
                parser.text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                parser.text(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::Parse(format!(
                    "Failed to parse PubMed fetch XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
        buf.clear();
    }

    if !parser.path.is_empty() {
        return Err(SourceError::Parse(format!(
            "PubMed fetch XML ended inside <{}>",
            parser.path.join("/")
        )));
    }

    if let Some(error) = parser.error {
        return Err(SourceError::Api(format!(
            "PubMed fetch failed: {}",
            error.trim()
        )));
    }

    Ok(parser.records)
}
