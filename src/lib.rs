//! # PubMed Harvest
//!
//! Resumable harvesting of PubMed article metadata through NCBI E-utilities.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Article records and the checkpointed search session
//! - [`sources`]: Result-set sources (PubMed E-utilities, a scripted mock)
//! - [`harvest`]: The fetch / parse / write / checkpoint loop
//! - [`utils`]: HTTP client, retry policy and progress reporting
//! - [`config`]: Configuration management

pub mod config;
pub mod harvest;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use config::HarvestConfig;
pub use harvest::{HarvestError, HarvestSummary, Harvester};
pub use models::{ArticleRecord, SessionState};
pub use sources::{PubMedSource, ResultSetSource, SourceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
