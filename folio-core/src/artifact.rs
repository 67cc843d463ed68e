//! Output artifacts produced by an export run.

use folio_types::{DocumentType, FileData, HeadingData, SourceIdentity, WebpageData};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Webpage,
    Attachment,
}

/// Payload of an artifact
///
/// Shells are registered `Empty` before anything is rendered or read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArtifactData {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
}

impl ArtifactData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ArtifactData::Empty => &[],
            ArtifactData::Text(text) => text.as_bytes(),
            ArtifactData::Bytes(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// One output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Absent for synthetic files such as the feed
    pub source: Option<SourceIdentity>,
    pub target_path: String,
    pub kind: ArtifactKind,
    pub data: ArtifactData,
    pub show_in_tree: bool,
    pub tree_order: i64,
    pub document_type: DocumentType,
}

impl Artifact {
    /// Empty artifact for a source, registered before rendering
    pub fn shell(
        source: SourceIdentity,
        target_path: impl Into<String>,
        kind: ArtifactKind,
    ) -> Self {
        let document_type = match kind {
            ArtifactKind::Webpage => source
                .extension()
                .map(|ext| DocumentType::from_extension(&ext))
                .unwrap_or(DocumentType::Markdown),
            ArtifactKind::Attachment => DocumentType::Attachment,
        };

        Self {
            source: Some(source),
            target_path: target_path.into(),
            kind,
            data: ArtifactData::Empty,
            show_in_tree: true,
            tree_order: 0,
            document_type,
        }
    }

    /// File with no source document behind it
    pub fn synthetic(target_path: impl Into<String>, data: ArtifactData) -> Self {
        Self {
            source: None,
            target_path: target_path.into(),
            kind: ArtifactKind::Attachment,
            data,
            show_in_tree: false,
            tree_order: 0,
            document_type: DocumentType::Attachment,
        }
    }

    pub fn with_tree(mut self, show_in_tree: bool, tree_order: i64) -> Self {
        self.show_in_tree = show_in_tree;
        self.tree_order = tree_order;
        self
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source.as_ref().map(|source| source.path.as_str())
    }

    pub fn is_webpage(&self) -> bool {
        self.kind == ArtifactKind::Webpage
    }

    /// Snapshot record for this artifact
    ///
    /// Backlinks start empty; they are rebuilt from links when the run is
    /// finalized.
    pub fn file_data(&self, created_time: i64) -> FileData {
        let (modified_time, source_size, source_path) = match &self.source {
            Some(source) => (source.modified_time, source.size, source.path.clone()),
            None => (created_time, self.data.as_bytes().len() as i64, String::new()),
        };

        FileData {
            created_time,
            modified_time,
            source_size,
            source_path,
            export_path: self.target_path.clone(),
            show_in_tree: self.show_in_tree,
            tree_order: self.tree_order,
            backlinks: BTreeSet::new(),
            document_type: self.document_type,
        }
    }
}

/// A rendered page with everything the snapshot and search index need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpageArtifact {
    pub artifact: Artifact,
    pub title: String,
    pub icon: String,
    pub description: String,
    pub author: String,
    pub headings: Vec<HeadingData>,
    /// Target paths of exported files this page links to
    pub links: BTreeSet<String>,
    pub backlinks: BTreeSet<String>,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
    /// Target paths of embedded resources
    pub attachments: BTreeSet<String>,
    /// Rewritten HTML body
    pub body: String,
}

impl WebpageArtifact {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            title: String::new(),
            icon: String::new(),
            description: String::new(),
            author: String::new(),
            headings: Vec::new(),
            links: BTreeSet::new(),
            backlinks: BTreeSet::new(),
            tags: Vec::new(),
            aliases: Vec::new(),
            attachments: BTreeSet::new(),
            body: String::new(),
        }
    }

    pub fn target_path(&self) -> &str {
        &self.artifact.target_path
    }

    pub fn webpage_data(&self, created_time: i64) -> WebpageData {
        let mut file = self.artifact.file_data(created_time);
        file.backlinks = self.backlinks.clone();

        WebpageData {
            file,
            title: self.title.clone(),
            icon: self.icon.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
            aliases: self.aliases.clone(),
            tags: self.tags.clone(),
            headers: self.headings.clone(),
            links: self.links.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_document_type() {
        let page = Artifact::shell(
            SourceIdentity::new("a.canvas", 1, 2),
            "a.html",
            ArtifactKind::Webpage,
        );
        assert_eq!(page.document_type, DocumentType::Canvas);
        assert!(page.data.is_empty());

        let image = Artifact::shell(
            SourceIdentity::new("a.png", 1, 2),
            "a.png",
            ArtifactKind::Attachment,
        );
        assert_eq!(image.document_type, DocumentType::Attachment);
    }

    #[test]
    fn test_file_data_from_source() {
        let artifact = Artifact::shell(
            SourceIdentity::new("Notes/A.md", 10, 20),
            "notes/a.html",
            ArtifactKind::Webpage,
        )
        .with_tree(true, 3);
        let data = artifact.file_data(5);

        assert_eq!(data.created_time, 5);
        assert_eq!(data.modified_time, 10);
        assert_eq!(data.source_size, 20);
        assert_eq!(data.source_path, "Notes/A.md");
        assert_eq!(data.export_path, "notes/a.html");
        assert_eq!(data.tree_order, 3);
        assert_eq!(data.document_type, DocumentType::Markdown);
    }

    #[test]
    fn test_synthetic_file_data() {
        let artifact = Artifact::synthetic("site-lib/rss.xml", ArtifactData::Text("<rss/>".into()));
        let data = artifact.file_data(7);
        assert!(data.source_path.is_empty());
        assert_eq!(data.source_size, 6);
        assert!(!data.show_in_tree);
    }

    #[test]
    fn test_webpage_data_carries_metadata() {
        let mut page = WebpageArtifact::new(Artifact::shell(
            SourceIdentity::new("A.md", 1, 1),
            "a.html",
            ArtifactKind::Webpage,
        ));
        page.title = "A".into();
        page.links.insert("b.html".into());
        page.headings.push(HeadingData {
            heading: "Intro".into(),
            level: 1,
            id: "intro_0".into(),
        });

        let data = page.webpage_data(1);
        assert_eq!(data.title, "A");
        assert!(data.links.contains("b.html"));
        assert_eq!(data.headers[0].id, "intro_0");
        assert_eq!(data.file.export_path, "a.html");
    }
}
