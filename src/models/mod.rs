//! Core data models for harvested articles and the resumable search session.

mod article;
mod session;

pub use article::{format_author, publication_year, ArticleRecord, UNKNOWN_AUTHOR, UNKNOWN_YEAR};
pub use session::SessionState;
