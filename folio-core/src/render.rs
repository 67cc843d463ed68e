//! The renderer seam: source bytes in, HTML body and metadata out.

use async_trait::async_trait;
use folio_types::{DocumentType, SourceIdentity};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read source: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported document: {0}")]
    Unsupported(String),

    #[error("Render failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedHeading {
    pub text: String,
    pub level: u8,
}

impl RenderedHeading {
    pub fn new(text: impl Into<String>, level: u8) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }
}

/// A link as written in the source; `raw` must match the `href`/`src`
/// value the renderer emitted in the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedLink {
    pub raw: String,
    pub is_embed: bool,
}

impl RenderedLink {
    pub fn link(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            is_embed: false,
        }
    }

    pub fn embed(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            is_embed: true,
        }
    }
}

/// Output of a renderer for one document
///
/// Headings are listed in document order and must correspond one-to-one
/// with the `<h1>`..`<h6>` tags in `body`, not counting those inside an
/// element of class `markdown-embed-content` (transcluded documents).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub headings: Vec<RenderedHeading>,
    #[serde(default)]
    pub links: Vec<RenderedLink>,
    #[serde(default)]
    pub body: String,
}

impl RenderedDocument {
    /// Title, falling back to the source file name without extension
    pub fn title_or_file_stem(&self, source: &SourceIdentity) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        let name = source.path.rsplit('/').next().unwrap_or(&source.path);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name.to_string(),
        }
    }
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        source: &SourceIdentity,
        bytes: &[u8],
    ) -> Result<RenderedDocument, RenderError>;
}
