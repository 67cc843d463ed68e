//! Destinations: where artifacts are written and run state is kept.

use async_trait::async_trait;
use folio_types::WebsiteSnapshot;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Directory holding site metadata next to the exported pages
pub const LIBRARY_DIR: &str = "site-lib";
pub const SNAPSHOT_FILE: &str = "site-lib/metadata.json";
pub const SEARCH_INDEX_FILE: &str = "site-lib/search-index.json";
pub const FEED_FILE: &str = "site-lib/rss.xml";

/// Sink for exported artifacts
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Make the destination ready for writes
    async fn prepare(&self) -> io::Result<()>;

    async fn write(&self, target_path: &str, bytes: &[u8]) -> io::Result<()>;

    /// Delete a previously written artifact
    ///
    /// Returns `Ok(false)` when there was nothing to delete.
    async fn remove(&self, target_path: &str) -> io::Result<bool>;
}

/// Run state persisted between exports
///
/// Reads return `Ok(None)` when nothing has been persisted yet.
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn read_snapshot(&self) -> io::Result<Option<Vec<u8>>>;

    async fn read_search_index(&self) -> io::Result<Option<Vec<u8>>>;

    async fn read_feed(&self) -> io::Result<Option<Vec<u8>>>;

    async fn persist_snapshot(&self, bytes: &[u8]) -> io::Result<()>;

    async fn persist_search_index(&self, bytes: &[u8]) -> io::Result<()>;

    async fn persist_feed(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Join a relative target path onto a root, refusing anything that could
/// land outside it
fn contained_path(root: &Path, target_path: &str) -> io::Result<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in target_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("target path escapes the destination: {target_path}"),
                ))
            }
            other => path.push(other),
        }
    }
    if path == root {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty target path",
        ));
    }
    Ok(path)
}

/// Write through a temporary file in the same directory, then rename
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// An output directory on disk
#[derive(Debug, Clone)]
pub struct FsSite {
    root: PathBuf,
}

impl FsSite {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, target_path: &str) -> io::Result<PathBuf> {
        contained_path(&self.root, target_path)
    }

    async fn persist_library_file(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(name)?;
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(io::Error::other)?
    }

    /// Delete every file recorded in `snapshot` plus the library files
    ///
    /// Directories left empty are removed as well. Returns the number of files
    /// deleted.
    pub async fn purge(&self, snapshot: &WebsiteSnapshot) -> io::Result<usize> {
        let mut removed = 0;
        let mut dirs = BTreeSet::new();

        let targets = snapshot
            .known_targets()
            .into_iter()
            .chain([SNAPSHOT_FILE, SEARCH_INDEX_FILE, FEED_FILE].map(String::from));

        for target in targets {
            let path = match self.path_for(&target) {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!("Skipping {}: {}", target, err);
                    continue;
                }
            };
            if remove_if_exists(&path).await? {
                removed += 1;
                tracing::debug!("Removed {}", path.display());
            }
            if let Some(parent) = path.parent() {
                dirs.insert(parent.to_path_buf());
            }
        }

        // Deepest first so parents empty out before they are visited
        let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in dirs {
            self.remove_empty_dirs(&dir).await;
        }

        Ok(removed)
    }

    async fn remove_empty_dirs(&self, start: &Path) {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk
            if tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    /// Forget run state so the next export starts cold
    pub async fn clear_cache(&self) -> io::Result<()> {
        for name in [SNAPSHOT_FILE, SEARCH_INDEX_FILE] {
            if remove_if_exists(&self.path_for(name)?).await? {
                tracing::info!("Removed {}", name);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OutputSink for FsSite {
    async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(LIBRARY_DIR)).await
    }

    async fn write(&self, target_path: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(target_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await
    }

    async fn remove(&self, target_path: &str) -> io::Result<bool> {
        let path = self.path_for(target_path)?;
        let removed = remove_if_exists(&path).await?;
        if let Some(parent) = path.parent() {
            self.remove_empty_dirs(parent).await;
        }
        Ok(removed)
    }
}

#[async_trait]
impl SiteStore for FsSite {
    async fn read_snapshot(&self) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.path_for(SNAPSHOT_FILE)?).await
    }

    async fn read_search_index(&self) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.path_for(SEARCH_INDEX_FILE)?).await
    }

    async fn read_feed(&self) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.path_for(FEED_FILE)?).await
    }

    async fn persist_snapshot(&self, bytes: &[u8]) -> io::Result<()> {
        self.persist_library_file(SNAPSHOT_FILE, bytes).await
    }

    async fn persist_search_index(&self, bytes: &[u8]) -> io::Result<()> {
        self.persist_library_file(SEARCH_INDEX_FILE, bytes).await
    }

    async fn persist_feed(&self, bytes: &[u8]) -> io::Result<()> {
        self.persist_library_file(FEED_FILE, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contained_path() {
        let root = Path::new("/site");
        assert_eq!(
            contained_path(root, "notes/a.html").unwrap(),
            PathBuf::from("/site/notes/a.html")
        );
        assert_eq!(
            contained_path(root, "/./a.html").unwrap(),
            PathBuf::from("/site/a.html")
        );
        assert!(contained_path(root, "../etc/passwd").is_err());
        assert!(contained_path(root, "").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let site = FsSite::new(dir.path());

        site.prepare().await.unwrap();
        assert!(dir.path().join(LIBRARY_DIR).is_dir());
        assert_eq!(site.read_snapshot().await.unwrap(), None);

        site.write("notes/a.html", b"<p>a</p>").await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("notes/a.html")).unwrap(),
            b"<p>a</p>"
        );

        site.persist_snapshot(b"{}").await.unwrap();
        site.persist_snapshot(b"{\"version\":1}").await.unwrap();
        assert_eq!(
            site.read_snapshot().await.unwrap().as_deref(),
            Some(&b"{\"version\":1}"[..])
        );
    }

    #[tokio::test]
    async fn test_purge_removes_files_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let site = FsSite::new(dir.path());
        site.prepare().await.unwrap();
        site.write("notes/deep/a.html", b"a").await.unwrap();
        site.write("b.html", b"b").await.unwrap();
        site.write("keep/other.txt", b"x").await.unwrap();
        site.persist_snapshot(b"{}").await.unwrap();

        let mut snapshot = WebsiteSnapshot::new(0);
        snapshot.all_files.insert("notes/deep/a.html".into());
        snapshot.all_files.insert("b.html".into());
        snapshot.all_files.insert("gone.html".into());

        let removed = site.purge(&snapshot).await.unwrap();
        assert_eq!(removed, 3);
        assert!(!dir.path().join("notes").exists());
        assert!(dir.path().join("keep/other.txt").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_clear_cache_keeps_feed() {
        let dir = tempfile::tempdir().unwrap();
        let site = FsSite::new(dir.path());
        site.persist_snapshot(b"{}").await.unwrap();
        site.persist_search_index(b"{}").await.unwrap();
        site.persist_feed(b"<rss/>").await.unwrap();

        site.clear_cache().await.unwrap();
        assert_eq!(site.read_snapshot().await.unwrap(), None);
        assert_eq!(site.read_search_index().await.unwrap(), None);
        assert!(site.read_feed().await.unwrap().is_some());
        // clearing twice is fine
        site.clear_cache().await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let site = FsSite::new(dir.path());
        site.write("notes/deep/a.html", b"a").await.unwrap();
        site.write("notes/b.html", b"b").await.unwrap();

        assert!(site.remove("notes/deep/a.html").await.unwrap());
        assert!(!dir.path().join("notes/deep").exists());
        assert!(dir.path().join("notes/b.html").exists());

        assert!(site.remove("notes/b.html").await.unwrap());
        assert!(!dir.path().join("notes").exists());
        assert!(dir.path().exists());

        assert!(!site.remove("notes/b.html").await.unwrap());
        assert!(site.remove("../outside.html").await.is_err());
    }
}
