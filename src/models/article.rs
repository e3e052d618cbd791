//! Simplified article record written to the batch files.

use serde::{Deserialize, Serialize};

/// Year used when neither `Year` nor `MedlineDate` is present
pub const UNKNOWN_YEAR: &str = "UnknownYear";

/// First author used when the author list is empty
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// One PubMed article reduced to the fields kept in the output files.
///
/// Records carry no identity of their own; they are identified by their
/// position in the batch file they were written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Article title with inline markup flattened
    pub title: String,

    /// All abstract segments joined by a single space
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Authors as `"LastName Initials"`, in citation order
    pub authors: Vec<String>,

    /// Journal title
    pub journal: String,

    /// DOI from the article's electronic location list
    pub doi: String,

    /// Publication year, or [`UNKNOWN_YEAR`]
    pub year: String,

    /// First entry of `authors`, or [`UNKNOWN_AUTHOR`]
    pub first_author: String,
}

impl ArticleRecord {
    /// Create a record, deriving `first_author` from the author list
    pub fn new(
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        authors: Vec<String>,
        journal: impl Into<String>,
        doi: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        let first_author = authors
            .first()
            .cloned()
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            authors,
            journal: journal.into(),
            doi: doi.into(),
            year: year.into(),
            first_author,
        }
    }
}

/// Format an author entry as last name and initials joined by a space.
///
/// Missing parts are treated as empty, so an author with neither field
/// (a collective name, for instance) becomes a single space.
pub fn format_author(last_name: Option<&str>, initials: Option<&str>) -> String {
    format!("{} {}", last_name.unwrap_or(""), initials.unwrap_or(""))
}

/// Resolve the publication year from a journal issue's `PubDate`.
///
/// An explicit `Year` wins. Otherwise the first token of `MedlineDate` is
/// used, so `"2023 Jan-Feb"` yields `"2023"`.
pub fn publication_year(year: Option<&str>, medline_date: Option<&str>) -> String {
    if let Some(year) = year {
        return year.to_string();
    }

    medline_date
        .and_then(|date| date.split_whitespace().next())
        .unwrap_or(UNKNOWN_YEAR)
        .to_string()
}
