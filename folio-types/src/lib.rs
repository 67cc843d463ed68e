//! Shared types for folio
//!
//! This crate holds the persisted shape of an export: the identity of a
//! source document, the per-file records kept between runs, and the website
//! snapshot written next to the exported site.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Version stamped into every snapshot written by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

/// Identity of a source document as seen by the file provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIdentity {
    /// Vault-relative POSIX path
    pub path: String,
    /// Last modification, milliseconds since the Unix epoch
    pub modified_time: i64,
    /// Size in bytes
    pub size: i64,
}

impl SourceIdentity {
    pub fn new(path: impl Into<String>, modified_time: i64, size: i64) -> Self {
        Self {
            path: path.into(),
            modified_time,
            size,
        }
    }

    /// Lower-cased extension of the source path, without the dot
    pub fn extension(&self) -> Option<String> {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

/// What kind of document produced a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Markdown,
    Canvas,
    ExternalMarkdown,
    #[default]
    Attachment,
}

impl DocumentType {
    /// Document type implied by a source extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "md" => DocumentType::Markdown,
            "canvas" => DocumentType::Canvas,
            _ => DocumentType::Attachment,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Markdown => "markdown",
            DocumentType::Canvas => "canvas",
            DocumentType::ExternalMarkdown => "external-markdown",
            DocumentType::Attachment => "attachment",
        }
    }
}

/// Per-file record used for change detection between runs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub modified_time: i64,
    #[serde(default)]
    pub source_size: i64,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub export_path: String,
    #[serde(default)]
    pub show_in_tree: bool,
    #[serde(default)]
    pub tree_order: i64,
    #[serde(default)]
    pub backlinks: BTreeSet<String>,
    #[serde(rename = "type", default)]
    pub document_type: DocumentType,
}

impl FileData {
    /// True when the source no longer matches what was exported
    pub fn is_stale(&self, source: &SourceIdentity) -> bool {
        self.modified_time != source.modified_time || self.source_size != source.size
    }
}

/// A heading as recorded in the snapshot, with its resolved anchor id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingData {
    pub heading: String,
    pub level: u8,
    pub id: String,
}

/// Everything the snapshot keeps about an exported page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebpageData {
    #[serde(flatten)]
    pub file: FileData,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub headers: Vec<HeadingData>,

    /// Target paths of other exported files this page links to
    #[serde(default)]
    pub links: BTreeSet<String>,

    /// Target paths of embedded resources
    #[serde(default)]
    pub attachments: BTreeSet<String>,
}

/// Persisted record of the most recent completed export
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSnapshot {
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub file_info: BTreeMap<String, FileData>,

    #[serde(default)]
    pub webpages: BTreeMap<String, WebpageData>,

    #[serde(default)]
    pub source_to_target: BTreeMap<String, String>,

    #[serde(default)]
    pub attachments: BTreeSet<String>,

    #[serde(default)]
    pub all_files: BTreeSet<String>,

    #[serde(default)]
    pub shown_in_tree: BTreeSet<String>,

    #[serde(default)]
    pub created_time: i64,

    #[serde(default)]
    pub modified_time: i64,

    #[serde(default)]
    pub site_name: String,

    #[serde(default)]
    pub export_root: String,

    #[serde(default)]
    pub base_url: String,
}

impl WebsiteSnapshot {
    /// Empty snapshot for a site that has never been exported
    pub fn new(created_time: i64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_time,
            modified_time: created_time,
            ..Self::default()
        }
    }

    pub fn file(&self, target_path: &str) -> Option<&FileData> {
        self.file_info.get(target_path)
    }

    pub fn webpage(&self, target_path: &str) -> Option<&WebpageData> {
        self.webpages.get(target_path)
    }

    pub fn target_for_source(&self, source_path: &str) -> Option<&str> {
        self.source_to_target.get(source_path).map(String::as_str)
    }

    /// Every target path the snapshot knows about, recorded or listed
    pub fn known_targets(&self) -> BTreeSet<String> {
        self.all_files
            .iter()
            .chain(self.file_info.keys())
            .cloned()
            .collect()
    }
}
