//! Source documents: link shorthand resolution and vault access.

use crate::path::{normalize_separators, split_extension};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_types::SourceIdentity;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Turns vault-style link shorthand into a source path
pub trait SourceResolver: Send + Sync {
    /// Resolve `link` (no `#hash`, no `?query`) written in the document at
    /// `from` to the vault-relative path of an existing source
    fn resolve_source_path(&self, link: &str, from: &str) -> Option<String>;
}

/// Read access to source documents
#[async_trait]
pub trait SourceProvider: SourceResolver {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    async fn stat(&self, path: &str) -> io::Result<SourceIdentity>;
}

/// Known source paths, used to resolve links without touching the disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultPaths {
    paths: BTreeSet<String>,
}

impl VaultPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|path| normalize_separators(path.as_ref()))
                .collect(),
        }
    }

    pub fn insert(&mut self, path: &str) {
        self.paths.insert(normalize_separators(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn find(&self, candidate: &str, from_dir: &str) -> Option<String> {
        if let Some(relative) = join_relative(from_dir, candidate) {
            if self.paths.contains(&relative) {
                return Some(relative);
            }
        }

        let rooted = join_relative("", candidate)?;
        if self.paths.contains(&rooted) {
            return Some(rooted);
        }

        // Shortest path ending in the link wins, case-insensitively
        let wanted = rooted.to_lowercase();
        let suffix = format!("/{wanted}");
        self.paths
            .iter()
            .filter(|path| {
                let lower = path.to_lowercase();
                lower == wanted || lower.ends_with(&suffix)
            })
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .cloned()
    }
}

impl SourceResolver for VaultPaths {
    fn resolve_source_path(&self, link: &str, from: &str) -> Option<String> {
        let link = link.trim().replace("%20", " ");
        let link = link.split(['#', '?']).next().unwrap_or_default();
        let link = normalize_separators(link);
        if link.is_empty() {
            return None;
        }

        let from = normalize_separators(from);
        let from_dir = from.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        let mut candidates = Vec::with_capacity(2);
        if split_extension(&link).1.is_some() {
            candidates.push(link.clone());
        }
        if !link.to_lowercase().ends_with(".md") {
            candidates.push(format!("{link}.md"));
        }

        candidates
            .iter()
            .find_map(|candidate| self.find(candidate, from_dir))
    }
}

/// Join a relative link onto a directory, folding `.` and `..`
///
/// Returns `None` when `..` climbs above the vault root.
fn join_relative(dir: &str, link: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(link.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn compile_ignore_patterns(patterns: &[String]) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pat in patterns {
        match Regex::new(pat) {
            Ok(re) => compiled.push(re),
            Err(err) => tracing::warn!("Invalid ignore pattern '{}': {}", pat, err),
        }
    }
    compiled
}

fn identity_from_metadata(path: String, metadata: &Metadata) -> SourceIdentity {
    let modified_time = metadata
        .modified()
        .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
        .unwrap_or(0);
    SourceIdentity::new(path, modified_time, metadata.len() as i64)
}

/// A vault directory on disk
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    sources: Vec<SourceIdentity>,
    paths: VaultPaths,
}

impl FsVault {
    /// Scan a vault directory
    ///
    /// Hidden files and directories are skipped, as are vault-relative paths
    /// matching any of `ignore_patterns`.
    pub fn open(root: impl Into<PathBuf>, ignore_patterns: &[String]) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("vault directory not found: {}", root.display()),
            ));
        }

        let ignores = compile_ignore_patterns(ignore_patterns);
        let mut sources = Vec::new();

        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if ignores.iter().any(|re| re.is_match(&rel)) {
                tracing::debug!("Ignoring {} due to ignore_patterns", rel);
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => sources.push(identity_from_metadata(rel, &metadata)),
                Err(err) => tracing::warn!("Failed to stat {}: {}", rel, err),
            }
        }

        tracing::debug!("Found {} sources in {}", sources.len(), root.display());
        let paths = VaultPaths::new(sources.iter().map(|s| s.path.as_str()));

        Ok(Self {
            root,
            sources,
            paths,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every source found by the scan, sorted by path
    pub fn sources(&self) -> &[SourceIdentity] {
        &self.sources
    }

    fn full_path(&self, path: &str) -> io::Result<PathBuf> {
        let rel = join_relative("", path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path escapes the vault: {path}"),
            )
        })?;
        Ok(self.root.join(rel))
    }
}

impl SourceResolver for FsVault {
    fn resolve_source_path(&self, link: &str, from: &str) -> Option<String> {
        self.paths.resolve_source_path(link, from)
    }
}

#[async_trait]
impl SourceProvider for FsVault {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.full_path(path)?).await
    }

    async fn stat(&self, path: &str) -> io::Result<SourceIdentity> {
        let metadata = tokio::fs::metadata(self.full_path(path)?).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file: {path}"),
            ));
        }
        Ok(identity_from_metadata(normalize_separators(path), &metadata))
    }
}
