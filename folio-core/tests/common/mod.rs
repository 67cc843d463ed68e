//! In-memory collaborators for export tests

#![allow(dead_code)]

use async_trait::async_trait;
use folio_core::render::{
    DocumentRenderer, RenderError, RenderedDocument, RenderedHeading, RenderedLink,
};
use folio_core::source::{SourceProvider, SourceResolver, VaultPaths};
use folio_core::store::{OutputSink, SiteStore, FEED_FILE, SEARCH_INDEX_FILE, SNAPSHOT_FILE};
use folio_core::{ExportOptions, ExportReport, Exporter, SearchIndex};
use folio_types::{DocumentType, SourceIdentity, WebsiteSnapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Mutex;

/// Source documents held in memory
#[derive(Default)]
pub struct MemoryVault {
    files: BTreeMap<String, (SourceIdentity, Vec<u8>)>,
    paths: VaultPaths,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, path: &str, modified_time: i64, content: &str) {
        let identity = SourceIdentity::new(path, modified_time, content.len() as i64);
        self.files
            .insert(path.to_string(), (identity, content.as_bytes().to_vec()));
        self.paths.insert(path);
    }

    pub fn remove(&mut self, path: &str) {
        self.files.remove(path);
        self.paths = VaultPaths::new(self.files.keys());
    }

    /// Every source, as a provider would enumerate them
    pub fn identities(&self) -> Vec<SourceIdentity> {
        self.files.values().map(|(identity, _)| identity.clone()).collect()
    }

    pub fn identities_except(&self, skip: &[&str]) -> Vec<SourceIdentity> {
        self.identities()
            .into_iter()
            .filter(|identity| !skip.contains(&identity.path.as_str()))
            .collect()
    }
}

impl SourceResolver for MemoryVault {
    fn resolve_source_path(&self, link: &str, from: &str) -> Option<String> {
        self.paths.resolve_source_path(link, from)
    }
}

#[async_trait]
impl SourceProvider for MemoryVault {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    async fn stat(&self, path: &str) -> io::Result<SourceIdentity> {
        self.files
            .get(path)
            .map(|(identity, _)| identity.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

/// Line-based markup: `#` headings, `[[link]]`, `![[embed]]`, `title: X`
///
/// A document containing `!!fail` fails to render.
pub struct MarkupRenderer;

fn render_inline(line: &str, links: &mut Vec<RenderedLink>) -> String {
    let mut out = String::new();
    let mut rest = line;
    while let Some(start) = rest.find("[[") {
        let Some(len) = rest[start + 2..].find("]]") else {
            break;
        };
        let embed = rest[..start].ends_with('!');
        let before = if embed { &rest[..start - 1] } else { &rest[..start] };
        out.push_str(before);

        let target = &rest[start + 2..start + 2 + len];
        if embed {
            out.push_str(&format!("<img src=\"{target}\">"));
            links.push(RenderedLink::embed(target));
        } else {
            out.push_str(&format!("<a href=\"{target}\">{target}</a>"));
            links.push(RenderedLink::link(target));
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl DocumentRenderer for MarkupRenderer {
    async fn render(
        &self,
        source: &SourceIdentity,
        bytes: &[u8],
    ) -> Result<RenderedDocument, RenderError> {
        let text = String::from_utf8_lossy(bytes);
        if text.contains("!!fail") {
            return Err(RenderError::Failed(format!("cannot render {}", source.path)));
        }

        let mut doc = RenderedDocument {
            document_type: DocumentType::Markdown,
            ..RenderedDocument::default()
        };
        let mut body = String::new();

        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some(title) = line.strip_prefix("title: ") {
                doc.title = Some(title.to_string());
                continue;
            }
            let level = line.chars().take_while(|c| *c == '#').count();
            if (1..=6).contains(&level) && line[level..].starts_with(' ') {
                let heading = line[level..].trim();
                body.push_str(&format!("<h{level}>{heading}</h{level}>\n"));
                doc.headings.push(RenderedHeading::new(heading, level as u8));
                continue;
            }
            body.push_str(&format!("<p>{}</p>\n", render_inline(line, &mut doc.links)));
        }

        doc.body = body;
        Ok(doc)
    }
}

/// Destination held in memory; serves as both output sink and site store
#[derive(Default)]
pub struct MemorySite {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<BTreeSet<String>>,
    fail_prepare: Mutex<bool>,
}

impl MemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_to(&self, target: &str) {
        self.failing.lock().unwrap().insert(target.to_string());
    }

    pub fn fail_prepare(&self) {
        *self.fail_prepare.lock().unwrap() = true;
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.file(path).map(|bytes| String::from_utf8(bytes).unwrap())
    }

    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> Option<WebsiteSnapshot> {
        self.file(SNAPSHOT_FILE)
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    pub fn search_index(&self) -> Option<SearchIndex> {
        self.file(SEARCH_INDEX_FILE)
            .map(|bytes| SearchIndex::from_json(&bytes).unwrap())
    }

    pub fn feed(&self) -> Option<String> {
        self.text(FEED_FILE)
    }

    /// Overwrite a file behind the exporter's back
    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.store(path, bytes);
    }

    pub fn delete(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    fn store(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl OutputSink for MemorySite {
    async fn prepare(&self) -> io::Result<()> {
        if *self.fail_prepare.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        Ok(())
    }

    async fn write(&self, target_path: &str, bytes: &[u8]) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(target_path) {
            return Err(io::Error::other("disk full"));
        }
        self.store(target_path, bytes);
        Ok(())
    }

    async fn remove(&self, target_path: &str) -> io::Result<bool> {
        if self.failing.lock().unwrap().contains(target_path) {
            return Err(io::Error::other("device busy"));
        }
        Ok(self.files.lock().unwrap().remove(target_path).is_some())
    }
}

#[async_trait]
impl SiteStore for MemorySite {
    async fn read_snapshot(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.file(SNAPSHOT_FILE))
    }

    async fn read_search_index(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.file(SEARCH_INDEX_FILE))
    }

    async fn read_feed(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.file(FEED_FILE))
    }

    async fn persist_snapshot(&self, bytes: &[u8]) -> io::Result<()> {
        self.store(SNAPSHOT_FILE, bytes);
        Ok(())
    }

    async fn persist_search_index(&self, bytes: &[u8]) -> io::Result<()> {
        self.store(SEARCH_INDEX_FILE, bytes);
        Ok(())
    }

    async fn persist_feed(&self, bytes: &[u8]) -> io::Result<()> {
        self.store(FEED_FILE, bytes);
        Ok(())
    }
}

pub fn options() -> ExportOptions {
    ExportOptions {
        site_name: "Garden".into(),
        site_url: "https://example.com".into(),
        ..ExportOptions::default()
    }
}

/// Export every source of `vault` into `site`
pub async fn export(vault: &MemoryVault, site: &MemorySite) -> ExportReport {
    export_with(vault, site, options(), &vault.identities()).await
}

pub async fn export_with(
    vault: &MemoryVault,
    site: &MemorySite,
    options: ExportOptions,
    files: &[SourceIdentity],
) -> ExportReport {
    Exporter::new(options, vault, &MarkupRenderer, site, site)
        .run(files)
        .await
        .expect("export succeeds")
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}
