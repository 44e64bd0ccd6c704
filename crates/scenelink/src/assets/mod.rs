//! Asset Resolution
//!
//! Fetches mesh documents from remote storage, imports them and notifies
//! every waiter once. Requests for the same URL share one download.
//!
//! ```text
//!   request_asset ─► pending[url] ─► GET ─► settle ─► importer ─► resolved[url]
//!                        ▲                                            │
//!                   later requests join                       waiters fire
//! ```

mod importer;
mod manager;

pub use importer::*;
pub use manager::*;

/// Errors raised while fetching or importing an asset
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Asset body is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed mesh document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Mesh document has no root element")]
    EmptyDocument,

    #[error("Import failed: {0}")]
    Import(String),
}
