//! Incremental export index.
//!
//! Holds the snapshot of the previous completed run and builds the next one:
//! artifacts are registered and classified against the previous run, pages
//! are recorded once rendered and linked, and `finalize` produces the
//! snapshot, search index and feed that get persisted.

use crate::anchors::DocumentAnchors;
use crate::artifact::{Artifact, ArtifactKind, WebpageArtifact};
use crate::config::ExportOptions;
use crate::feed::{merge_feed, parse_feed, FeedItem};
use crate::links::TargetLookup;
use crate::models::Diagnostic;
use crate::search::{SearchEntry, SearchIndex};
use folio_types::{WebsiteSnapshot, SNAPSHOT_VERSION};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// How an artifact compares to the previous run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    New,
    Updated,
    Unchanged,
}

impl Classification {
    /// Needs rendering or copying this run
    pub fn is_dirty(&self) -> bool {
        !matches!(self, Classification::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Updated => "updated",
            Classification::Unchanged => "unchanged",
        }
    }
}

/// Target paths by change class; the four sets are disjoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportDiff {
    pub new: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ExportDiff {
    pub fn has_changes(&self) -> bool {
        !(self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }
}

/// Result of finalizing a run, ready to persist
#[derive(Debug, Clone)]
pub struct FinalizedSite {
    pub snapshot: WebsiteSnapshot,
    /// `None` when search is disabled
    pub search_index: Option<SearchIndex>,
    /// `None` when the feed is disabled
    pub feed: Option<Vec<FeedItem>>,
    pub diff: ExportDiff,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ExportIndex {
    options: ExportOptions,
    previous: Option<WebsiteSnapshot>,
    current: WebsiteSnapshot,

    classified: HashMap<String, Classification>,
    new: BTreeSet<String>,
    updated: BTreeSet<String>,
    unchanged: BTreeSet<String>,
    deleted: BTreeSet<String>,
    /// Attachments of unchanged pages that were not registered themselves
    protected: BTreeSet<String>,
    /// Unchanged pages re-rendered only to restore their search entry
    reindexed: BTreeSet<String>,

    owners: HashMap<String, String>,
    source_to_webpage: HashMap<String, String>,
    source_to_attachment: HashMap<String, String>,
    anchors: HashMap<String, DocumentAnchors>,

    search: SearchIndex,
    /// Entries replaced this run, for restoring on discard
    replaced_search: HashMap<String, Option<SearchEntry>>,
    feed_items: BTreeMap<String, (i64, FeedItem)>,
    diagnostics: Vec<Diagnostic>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ExportIndex {
    /// Start a run from whatever the destination had persisted
    ///
    /// Unreadable state is not an error: a bad snapshot means a cold start and
    /// a bad search index means a fresh one, each reported as a warning.
    pub fn load(
        options: ExportOptions,
        snapshot_bytes: Option<&[u8]>,
        search_bytes: Option<&[u8]>,
    ) -> Self {
        let mut diagnostics = Vec::new();

        let previous = snapshot_bytes.and_then(|bytes| {
            match serde_json::from_slice::<WebsiteSnapshot>(bytes) {
                Ok(snapshot) if snapshot.version > SNAPSHOT_VERSION => {
                    warn!(
                        "Snapshot version {} is newer than supported {}, starting cold",
                        snapshot.version, SNAPSHOT_VERSION
                    );
                    diagnostics.push(Diagnostic::warning(
                        "snapshot.version",
                        format!("Unsupported snapshot version {}", snapshot.version),
                    ));
                    None
                }
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!("Failed to parse snapshot, starting cold: {}", err);
                    diagnostics.push(Diagnostic::warning(
                        "snapshot.corrupt",
                        format!("Failed to parse snapshot: {err}"),
                    ));
                    None
                }
            }
        });

        let search = match search_bytes {
            Some(bytes) if options.enable_search => match SearchIndex::from_json(bytes) {
                Ok(index) => index,
                Err(err) => {
                    warn!("Failed to parse search index, rebuilding: {}", err);
                    diagnostics.push(Diagnostic::warning(
                        "search.corrupt",
                        format!("Failed to parse search index: {err}"),
                    ));
                    SearchIndex::new()
                }
            },
            _ => SearchIndex::new(),
        };

        let mut current = previous
            .clone()
            .unwrap_or_else(|| WebsiteSnapshot::new(now_millis()));
        current.version = SNAPSHOT_VERSION;
        current.site_name = options.site_name.clone();
        current.base_url = options.site_url.clone();
        current.export_root = options.export_root().to_string();

        let deleted = previous
            .as_ref()
            .map(WebsiteSnapshot::known_targets)
            .unwrap_or_default();

        let anchors = previous
            .iter()
            .flat_map(|snapshot| snapshot.webpages.iter())
            .map(|(target, page)| (target.clone(), DocumentAnchors::from_recorded(&page.headers)))
            .collect();

        match &previous {
            Some(snapshot) => debug!("Loaded snapshot with {} files", snapshot.file_info.len()),
            None => debug!("No previous snapshot, cold start"),
        }

        Self {
            options,
            previous,
            current,
            classified: HashMap::new(),
            new: BTreeSet::new(),
            updated: BTreeSet::new(),
            unchanged: BTreeSet::new(),
            deleted,
            protected: BTreeSet::new(),
            reindexed: BTreeSet::new(),
            owners: HashMap::new(),
            source_to_webpage: HashMap::new(),
            source_to_attachment: HashMap::new(),
            anchors,
            search,
            replaced_search: HashMap::new(),
            feed_items: BTreeMap::new(),
            diagnostics,
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn previous(&self) -> Option<&WebsiteSnapshot> {
        self.previous.as_ref()
    }

    /// The snapshot being built
    pub fn current(&self) -> &WebsiteSnapshot {
        &self.current
    }

    pub fn is_cold_start(&self) -> bool {
        self.previous.is_none()
    }

    /// Register an artifact and classify it against the previous run
    ///
    /// Registering the same target again returns the first classification.
    pub fn register(&mut self, artifact: &Artifact) -> Classification {
        let target = artifact.target_path.as_str();
        if let Some(existing) = self.classified.get(target) {
            return *existing;
        }

        self.deleted.remove(target);
        self.protected.remove(target);

        let previous = self.previous.as_ref().and_then(|p| p.file(target));
        let previous_created = previous
            .map(|prev| prev.created_time)
            .filter(|time| *time != 0);
        let mut reindex = false;
        let classification = match (previous, &artifact.source) {
            (Some(prev), Some(source))
                if prev.source_path == source.path && !prev.is_stale(source) =>
            {
                reindex = self.lacks_search_entry(target);
                if reindex {
                    Classification::Updated
                } else {
                    Classification::Unchanged
                }
            }
            (Some(_), _) => Classification::Updated,
            (None, _) => Classification::New,
        };
        if reindex {
            debug!("{} has no search entry, rendering it again", target);
            self.reindexed.insert(target.to_string());
        }

        match classification {
            Classification::Unchanged => {
                self.unchanged.insert(target.to_string());
                self.refresh_tree_position(artifact);
                self.protect_attachments_of(target);
            }
            Classification::New | Classification::Updated => {
                let created = previous_created.unwrap_or_else(now_millis);
                self.current
                    .file_info
                    .insert(target.to_string(), artifact.file_data(created));
                if classification == Classification::New {
                    self.new.insert(target.to_string());
                } else {
                    self.updated.insert(target.to_string());
                }
            }
        }

        if let Some(source) = artifact.source_path() {
            self.owners.insert(target.to_string(), source.to_string());
            let lookup = match artifact.kind {
                ArtifactKind::Webpage => &mut self.source_to_webpage,
                ArtifactKind::Attachment => &mut self.source_to_attachment,
            };
            lookup.insert(source.to_string(), target.to_string());
        }

        debug!("Registered {} as {:?}", target, classification);
        self.classified.insert(target.to_string(), classification);
        classification
    }

    /// A page published last run whose search entry was lost
    fn lacks_search_entry(&self, target: &str) -> bool {
        self.options.enable_search
            && self
                .previous
                .as_ref()
                .is_some_and(|previous| previous.webpages.contains_key(target))
            && self.search.get(target).is_none()
    }

    fn refresh_tree_position(&mut self, artifact: &Artifact) {
        if let Some(file) = self.current.file_info.get_mut(&artifact.target_path) {
            file.show_in_tree = artifact.show_in_tree;
            file.tree_order = artifact.tree_order;
        }
    }

    fn protect_attachments_of(&mut self, target: &str) {
        let Some(page) = self.previous.as_ref().and_then(|p| p.webpage(target)) else {
            return;
        };
        for attachment in &page.attachments {
            if !self.classified.contains_key(attachment) {
                self.deleted.remove(attachment);
                self.protected.insert(attachment.clone());
            }
        }
    }

    pub fn classification(&self, target_path: &str) -> Option<Classification> {
        self.classified.get(target_path).copied()
    }

    /// Source that claimed a target this run
    pub fn target_owner(&self, target_path: &str) -> Option<&str> {
        self.owners.get(target_path).map(String::as_str)
    }

    pub fn record_anchors(&mut self, target_path: &str, anchors: DocumentAnchors) {
        self.anchors.insert(target_path.to_string(), anchors);
    }

    pub fn anchors_for(&self, target_path: &str) -> Option<&DocumentAnchors> {
        self.anchors.get(target_path)
    }

    /// Target exported from a source this run
    pub fn artifact_for_source(&self, source_path: &str, prefer_attachment: bool) -> Option<&str> {
        let (first, second) = if prefer_attachment {
            (&self.source_to_attachment, &self.source_to_webpage)
        } else {
            (&self.source_to_webpage, &self.source_to_attachment)
        };
        first
            .get(source_path)
            .or_else(|| second.get(source_path))
            .map(String::as_str)
    }

    /// Store a rendered, linked page
    pub fn record_webpage(&mut self, page: &WebpageArtifact) {
        let target = page.target_path().to_string();
        let created = self
            .current
            .file_info
            .get(&target)
            .map(|file| file.created_time)
            .filter(|time| *time != 0)
            .unwrap_or_else(now_millis);

        let data = page.webpage_data(created);
        self.current.file_info.insert(target.clone(), data.file.clone());
        self.current.webpages.insert(target.clone(), data);

        if self.options.enable_search {
            let replaced = self.search.get(&target).cloned();
            self.replaced_search.entry(target.clone()).or_insert(replaced);
            self.search.upsert(SearchEntry::from_page(page));
        }

        // Re-rendering an unchanged page does not republish it
        if self.options.enable_rss && !self.reindexed.contains(&target) {
            let modified = page
                .artifact
                .source
                .as_ref()
                .map(|source| source.modified_time)
                .unwrap_or_default();
            let item = FeedItem::for_page(
                page,
                &self.options.site_url,
                self.options.author_name.as_deref(),
            );
            self.feed_items.insert(target, (modified, item));
        }
    }

    /// Drop this run's version of an artifact after it failed
    ///
    /// A target known to the previous run falls back to its previous record
    /// and counts as unchanged; a new one disappears from the run.
    pub fn discard(&mut self, target_path: &str) {
        self.new.remove(target_path);
        self.updated.remove(target_path);
        self.reindexed.remove(target_path);
        self.feed_items.remove(target_path);

        match self.replaced_search.remove(target_path) {
            Some(Some(entry)) => self.search.upsert(entry),
            Some(None) => {
                self.search.remove(target_path);
            }
            None => {}
        }

        let previous_file = self
            .previous
            .as_ref()
            .and_then(|p| p.file(target_path))
            .cloned();
        let previous_page = self
            .previous
            .as_ref()
            .and_then(|p| p.webpage(target_path))
            .cloned();

        match previous_file {
            Some(file) => {
                self.current.file_info.insert(target_path.to_string(), file);
                match previous_page {
                    Some(page) => {
                        self.anchors.insert(
                            target_path.to_string(),
                            DocumentAnchors::from_recorded(&page.headers),
                        );
                        self.current.webpages.insert(target_path.to_string(), page);
                    }
                    None => {
                        self.current.webpages.remove(target_path);
                    }
                }
                self.unchanged.insert(target_path.to_string());
                self.classified
                    .insert(target_path.to_string(), Classification::Unchanged);
            }
            None => {
                self.current.file_info.remove(target_path);
                self.current.webpages.remove(target_path);
                self.anchors.remove(target_path);
                self.search.remove(target_path);
                self.classified.remove(target_path);
                self.source_to_webpage
                    .retain(|_, target| target.as_str() != target_path);
                self.source_to_attachment
                    .retain(|_, target| target.as_str() != target_path);
            }
        }

        debug!("Discarded {}", target_path);
    }

    /// Make every published file resolvable without running an export
    pub fn adopt_published(&mut self) {
        for (target, file) in &self.current.file_info {
            if file.source_path.is_empty() {
                continue;
            }
            self.owners.insert(target.clone(), file.source_path.clone());
            let lookup = if self.current.webpages.contains_key(target) {
                &mut self.source_to_webpage
            } else {
                &mut self.source_to_attachment
            };
            lookup.insert(file.source_path.clone(), target.clone());
        }
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    pub fn diff(&self) -> ExportDiff {
        let mut unchanged = self.unchanged.clone();
        unchanged.extend(
            self.protected
                .iter()
                .filter(|target| !self.classified.contains_key(*target))
                .cloned(),
        );

        ExportDiff {
            new: self.new.clone(),
            updated: self.updated.clone(),
            unchanged,
            deleted: self.deleted.clone(),
        }
    }

    /// Close the run and produce everything that gets persisted
    ///
    /// `existing_feed` is the published feed; its items survive unless their
    /// page was deleted or re-published this run.
    pub fn finalize(self, existing_feed: Option<&[u8]>) -> FinalizedSite {
        let diff = self.diff();
        let Self {
            options,
            previous,
            current: mut snapshot,
            deleted,
            mut search,
            feed_items,
            mut diagnostics,
            ..
        } = self;

        for target in &deleted {
            snapshot.file_info.remove(target);
            snapshot.webpages.remove(target);
            search.remove(target);
        }
        snapshot
            .webpages
            .retain(|target, _| snapshot.file_info.contains_key(target));

        let existing: BTreeSet<String> = snapshot.file_info.keys().cloned().collect();
        for page in snapshot.webpages.values_mut() {
            page.links.retain(|target| existing.contains(target));
            page.attachments.retain(|target| existing.contains(target));
        }

        // Backlinks are derived from links, never carried over
        for file in snapshot.file_info.values_mut() {
            file.backlinks.clear();
        }
        for (from, page) in &snapshot.webpages {
            for to in page.links.iter().filter(|to| *to != from) {
                if let Some(file) = snapshot.file_info.get_mut(to) {
                    file.backlinks.insert(from.clone());
                }
            }
        }
        for (target, page) in snapshot.webpages.iter_mut() {
            if let Some(file) = snapshot.file_info.get(target) {
                page.file = file.clone();
            }
        }

        snapshot.all_files = existing;
        snapshot.attachments = snapshot
            .file_info
            .keys()
            .filter(|target| !snapshot.webpages.contains_key(*target))
            .cloned()
            .collect();
        snapshot.shown_in_tree = snapshot
            .file_info
            .iter()
            .filter(|(_, file)| file.show_in_tree)
            .map(|(target, _)| target.clone())
            .collect();

        let mut source_to_target = BTreeMap::new();
        for (target, file) in &snapshot.file_info {
            if file.source_path.is_empty() {
                continue;
            }
            if snapshot.webpages.contains_key(target) {
                source_to_target.insert(file.source_path.clone(), target.clone());
            } else {
                source_to_target
                    .entry(file.source_path.clone())
                    .or_insert_with(|| target.clone());
            }
        }
        snapshot.source_to_target = source_to_target;
        snapshot.modified_time = now_millis();

        let search_index = options.enable_search.then(|| {
            search
                .entries
                .retain(|target, _| snapshot.webpages.contains_key(target));
            search
        });

        let feed = options.enable_rss.then(|| {
            let existing_items = match existing_feed.map(parse_feed) {
                Some(Ok(items)) => items,
                Some(Err(err)) => {
                    warn!("Failed to read published feed, starting a new one: {}", err);
                    diagnostics.push(Diagnostic::warning(
                        "feed.corrupt",
                        format!("Failed to read published feed: {err}"),
                    ));
                    Vec::new()
                }
                None => Vec::new(),
            };

            // Items are keyed by source path; map deleted targets back
            let mut deleted_guids = deleted.clone();
            if let Some(previous) = &previous {
                deleted_guids.extend(
                    deleted
                        .iter()
                        .filter_map(|target| previous.file(target))
                        .filter(|file| !file.source_path.is_empty())
                        .map(|file| file.source_path.clone()),
                );
            }

            let mut new_items: Vec<(i64, FeedItem)> = feed_items.into_values().collect();
            new_items.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.guid.cmp(&b.1.guid)));
            let new_items = new_items.into_iter().map(|(_, item)| item).collect();

            merge_feed(existing_items, new_items, &deleted_guids)
        });

        info!(
            "Finalized export: {} new, {} updated, {} unchanged, {} deleted",
            diff.new.len(),
            diff.updated.len(),
            diff.unchanged.len(),
            diff.deleted.len()
        );

        FinalizedSite {
            snapshot,
            search_index,
            feed,
            diff,
            diagnostics,
        }
    }
}

impl TargetLookup for ExportIndex {
    fn target_for_source(&self, source_path: &str, prefer_attachment: bool) -> Option<String> {
        self.artifact_for_source(source_path, prefer_attachment)
            .map(str::to_string)
    }

    fn anchors_for(&self, target_path: &str) -> Option<&DocumentAnchors> {
        ExportIndex::anchors_for(self, target_path)
    }
}
