//! Scene Documents
//!
//! Turns scene documents pushed by the authority into entities and
//! components on the [`EcModel`](scenelink_ecs::EcModel).

mod parser;

pub use parser::*;

/// Errors raised while parsing a scene document
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("Malformed scene XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed scene XML attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Malformed JSON scene: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported scene document: {0}")]
    UnsupportedDocument(String),
}
