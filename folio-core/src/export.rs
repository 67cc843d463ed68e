//! Export orchestration.
//!
//! A run classifies every source against the previous export, renders what
//! changed, resolves links once every page's anchors are known, writes the
//! output and persists the new run state. Nothing is persisted unless the
//! whole run gets that far.

use crate::anchors::DocumentAnchors;
use crate::artifact::{Artifact, ArtifactData, ArtifactKind, WebpageArtifact};
use crate::config::ExportOptions;
use crate::feed::{render_feed, FeedChannel};
use crate::index::{Classification, ExportDiff, ExportIndex, FinalizedSite};
use crate::links::{is_passthrough, LinkContext, LinkResolver, ResolvedLink};
use crate::models::Diagnostic;
use crate::path::{is_convertible, longest_common_root, with_collision_suffix, PathAssigner};
use crate::render::{DocumentRenderer, RenderedDocument};
use crate::rewrite::{apply_heading_ids, rewrite_links};
use crate::source::SourceProvider;
use crate::store::{OutputSink, SiteStore};
use folio_types::{DocumentType, SourceIdentity, WebsiteSnapshot};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to prepare destination: {0}")]
    Destination(#[source] io::Error),

    #[error("Export cancelled")]
    Cancelled,

    #[error("Failed to persist {what}: {source}")]
    Persist {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One source as it would be exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedArtifact {
    pub source: String,
    pub target: String,
    pub kind: ArtifactKind,
    pub classification: Classification,
}

/// What a run would do, without rendering or writing anything
#[derive(Debug, Clone, Serialize)]
pub struct ExportPlan {
    pub export_root: String,
    pub artifacts: Vec<PlannedArtifact>,
    pub diff: ExportDiff,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub snapshot: WebsiteSnapshot,
    pub diff: ExportDiff,
    pub diagnostics: Vec<Diagnostic>,
    /// Files written to the destination this run
    pub written: usize,
    /// Files of deleted sources removed from the destination
    pub removed: usize,
}

/// A page rendered in the first pass, waiting for link resolution
struct RenderedPage {
    artifact: Artifact,
    document: RenderedDocument,
    anchors: DocumentAnchors,
}

struct PendingWrite {
    target: String,
    source_path: Option<String>,
    data: ArtifactData,
}

/// Export root for a set of sources: the configured one, or the deepest
/// directory they all share
pub fn export_root_for(options: &ExportOptions, files: &[SourceIdentity]) -> String {
    match &options.export_root {
        Some(_) => options.export_root().to_string(),
        None => {
            let paths: Vec<&str> = files.iter().map(|file| file.path.as_str()).collect();
            longest_common_root(&paths)
        }
    }
}

fn kind_for(source: &SourceIdentity) -> ArtifactKind {
    match source.extension() {
        Some(ext) if is_convertible(&ext) => ArtifactKind::Webpage,
        _ => ArtifactKind::Attachment,
    }
}

/// First target at or after `target` that no other source has claimed
fn free_target(index: &ExportIndex, target: &str, source_path: &str) -> String {
    let mut candidate = target.to_string();
    let mut n = 1;
    while index
        .target_owner(&candidate)
        .is_some_and(|owner| owner != source_path)
    {
        candidate = with_collision_suffix(target, n);
        n += 1;
    }
    if n > 1 {
        debug!("{} collides, exporting {} as {}", target, source_path, candidate);
    }
    candidate
}

fn soft_read(
    result: io::Result<Option<Vec<u8>>>,
    what: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Vec<u8>> {
    match result {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Failed to read {}: {}", what, err);
            diagnostics.push(Diagnostic::warning(
                "store.read_failed",
                format!("Failed to read {what}: {err}"),
            ));
            None
        }
    }
}

/// Load the previous run and register every source with it
///
/// Sources are taken in path order so collision suffixes come out the same
/// on every run.
async fn start_run(
    options: &ExportOptions,
    store: &dyn SiteStore,
    files: &[SourceIdentity],
) -> (ExportIndex, Vec<Artifact>) {
    let options = options.with_export_root(export_root_for(options, files));

    let mut diagnostics = Vec::new();
    let snapshot = soft_read(store.read_snapshot().await, "snapshot", &mut diagnostics);
    let search = if options.enable_search {
        soft_read(store.read_search_index().await, "search index", &mut diagnostics)
    } else {
        None
    };

    let assigner = PathAssigner::new(&options);
    let mut index = ExportIndex::load(options, snapshot.as_deref(), search.as_deref());
    for diagnostic in diagnostics {
        index.push_diagnostic(diagnostic);
    }

    let mut files = files.to_vec();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    let mut artifacts = Vec::with_capacity(files.len());
    for source in files {
        let kind = kind_for(&source);
        let target = assigner.assign(&source, kind, None);
        let target = free_target(&index, &target, &source.path);
        let artifact = Artifact::shell(source, target, kind);
        index.register(&artifact);
        artifacts.push(artifact);
    }

    (index, artifacts)
}

/// Classify `files` against what the destination last published
pub async fn plan_export(
    options: &ExportOptions,
    store: &dyn SiteStore,
    files: &[SourceIdentity],
) -> ExportPlan {
    let (index, artifacts) = start_run(options, store, files).await;

    let artifacts = artifacts
        .into_iter()
        .filter_map(|artifact| {
            let classification = index.classification(&artifact.target_path)?;
            Some(PlannedArtifact {
                source: artifact.source_path().unwrap_or_default().to_string(),
                target: artifact.target_path,
                kind: artifact.kind,
                classification,
            })
        })
        .collect();

    ExportPlan {
        export_root: index.options().export_root().to_string(),
        artifacts,
        diff: index.diff(),
        diagnostics: index.diagnostics().to_vec(),
    }
}

/// Record a per-artifact failure and roll the artifact back
fn fail_artifact(
    index: &mut ExportIndex,
    target: &str,
    source_path: Option<&str>,
    code: &str,
    message: String,
) {
    error!("{}: {}", target, message);
    index.discard(target);
    let mut diagnostic = Diagnostic::error(code, message).with_context(target);
    if let Some(source_path) = source_path {
        diagnostic = diagnostic.with_source(source_path);
    }
    index.push_diagnostic(diagnostic);
}

pub struct Exporter<'a> {
    options: ExportOptions,
    sources: &'a dyn SourceProvider,
    renderer: &'a dyn DocumentRenderer,
    output: &'a dyn OutputSink,
    store: &'a dyn SiteStore,
    cancel: CancellationToken,
}

impl<'a> Exporter<'a> {
    pub fn new(
        options: ExportOptions,
        sources: &'a dyn SourceProvider,
        renderer: &'a dyn DocumentRenderer,
        output: &'a dyn OutputSink,
        store: &'a dyn SiteStore,
    ) -> Self {
        Self {
            options,
            sources,
            renderer,
            output,
            store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run before its next document
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn plan(&self, files: &[SourceIdentity]) -> ExportPlan {
        plan_export(&self.options, self.store, files).await
    }

    fn check_cancelled(&self) -> Result<(), ExportError> {
        if self.cancel.is_cancelled() {
            info!("Export cancelled, keeping the previous snapshot");
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    /// Export `files` and persist the result
    pub async fn run(&self, files: &[SourceIdentity]) -> Result<ExportReport, ExportError> {
        let (mut index, artifacts) = start_run(&self.options, self.store, files).await;
        let options = index.options().clone();
        let assigner = PathAssigner::new(&options);

        let planned = index.diff();
        info!(
            "Exporting {} sources (root '{}'): {} new, {} updated, {} deleted",
            artifacts.len(),
            options.export_root(),
            planned.new.len(),
            planned.updated.len(),
            planned.deleted.len()
        );

        self.output.prepare().await.map_err(ExportError::Destination)?;

        let mut pending = Vec::new();
        let pages = self.render_pass(&mut index, artifacts, &mut pending).await?;
        info!("Rendered {} pages", pages.len());

        for page in &pages {
            self.check_cancelled()?;
            self.register_embeds(&mut index, &assigner, page, &mut pending).await;
        }

        self.check_cancelled()?;
        for mut page in self.link_pass(&mut index, &options, pages) {
            index.record_webpage(&page);
            pending.push(PendingWrite {
                target: page.target_path().to_string(),
                source_path: page.artifact.source_path().map(str::to_string),
                data: ArtifactData::Text(std::mem::take(&mut page.body)),
            });
        }

        self.check_cancelled()?;
        let written = self.write_pass(&mut index, &options, pending).await;

        self.check_cancelled()?;
        let existing_feed = if options.enable_rss {
            let mut diagnostics = Vec::new();
            let feed = soft_read(self.store.read_feed().await, "feed", &mut diagnostics);
            for diagnostic in diagnostics {
                index.push_diagnostic(diagnostic);
            }
            feed
        } else {
            None
        };

        let site = index.finalize(existing_feed.as_deref());
        self.persist(&options, &site).await?;

        let FinalizedSite {
            snapshot,
            diff,
            mut diagnostics,
            ..
        } = site;

        let removed = if options.delete_old_files {
            self.remove_deleted(&diff, &mut diagnostics).await
        } else {
            0
        };
        info!("Export complete: {} files written, {} removed", written, removed);

        Ok(ExportReport {
            snapshot,
            diff,
            diagnostics,
            written,
            removed,
        })
    }

    /// Render changed pages and read changed attachments
    async fn render_pass(
        &self,
        index: &mut ExportIndex,
        artifacts: Vec<Artifact>,
        pending: &mut Vec<PendingWrite>,
    ) -> Result<Vec<RenderedPage>, ExportError> {
        let mut pages = Vec::new();

        for artifact in artifacts {
            let dirty = index
                .classification(&artifact.target_path)
                .is_some_and(|classification| classification.is_dirty());
            if !dirty {
                continue;
            }
            let Some(source) = artifact.source.clone() else {
                continue;
            };
            self.check_cancelled()?;

            let bytes = match self.sources.read(&source.path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    fail_artifact(
                        index,
                        &artifact.target_path,
                        Some(&source.path),
                        "source.read_failed",
                        format!("Failed to read {}: {}", source.path, err),
                    );
                    continue;
                }
            };

            match artifact.kind {
                ArtifactKind::Attachment => pending.push(PendingWrite {
                    target: artifact.target_path.clone(),
                    source_path: Some(source.path.clone()),
                    data: ArtifactData::Bytes(bytes),
                }),
                ArtifactKind::Webpage => match self.renderer.render(&source, &bytes).await {
                    Ok(document) => {
                        let anchors = DocumentAnchors::build(
                            document
                                .headings
                                .iter()
                                .map(|heading| (heading.text.as_str(), heading.level)),
                        );
                        index.record_anchors(&artifact.target_path, anchors.clone());
                        debug!("Rendered {} -> {}", source.path, artifact.target_path);
                        pages.push(RenderedPage {
                            artifact,
                            document,
                            anchors,
                        });
                    }
                    Err(err) => fail_artifact(
                        index,
                        &artifact.target_path,
                        Some(&source.path),
                        "render.failed",
                        format!("Failed to render {}: {}", source.path, err),
                    ),
                },
            }
        }

        Ok(pages)
    }

    /// Register embedded resources that were not part of the source list
    async fn register_embeds(
        &self,
        index: &mut ExportIndex,
        assigner: &PathAssigner,
        page: &RenderedPage,
        pending: &mut Vec<PendingWrite>,
    ) {
        let from = page.artifact.source_path().unwrap_or_default();

        for link in page.document.links.iter().filter(|link| link.is_embed) {
            let raw = link.raw.trim();
            if raw.is_empty() || raw.starts_with('#') || is_passthrough(raw) {
                continue;
            }
            let path = raw.split(['#', '?']).next().unwrap_or_default();

            let Some(source_path) = self.sources.resolve_source_path(path, from) else {
                warn!("Embedded resource '{}' in {} not found", raw, from);
                index.push_diagnostic(
                    Diagnostic::warning(
                        "attachment.missing",
                        format!("Embedded resource not found: {raw}"),
                    )
                    .with_source(from),
                );
                continue;
            };
            if index.artifact_for_source(&source_path, true).is_some() {
                continue;
            }

            let identity = match self.sources.stat(&source_path).await {
                Ok(identity) => identity,
                Err(err) => {
                    warn!("Failed to stat embedded resource {}: {}", source_path, err);
                    index.push_diagnostic(
                        Diagnostic::warning(
                            "attachment.missing",
                            format!("Embedded resource unavailable: {source_path}: {err}"),
                        )
                        .with_source(from),
                    );
                    continue;
                }
            };

            let target = assigner.assign(&identity, ArtifactKind::Attachment, None);
            let target = free_target(index, &target, &source_path);
            let artifact = Artifact::shell(identity, target, ArtifactKind::Attachment)
                .with_tree(false, 0);

            if !index.register(&artifact).is_dirty() {
                continue;
            }
            match self.sources.read(&source_path).await {
                Ok(bytes) => pending.push(PendingWrite {
                    target: artifact.target_path.clone(),
                    source_path: Some(source_path),
                    data: ArtifactData::Bytes(bytes),
                }),
                Err(err) => fail_artifact(
                    index,
                    &artifact.target_path,
                    Some(&source_path),
                    "source.read_failed",
                    format!("Failed to read {}: {}", source_path, err),
                ),
            }
        }
    }

    /// Resolve links and rewrite bodies; every page's anchors are known here
    fn link_pass(
        &self,
        index: &mut ExportIndex,
        options: &ExportOptions,
        pages: Vec<RenderedPage>,
    ) -> Vec<WebpageArtifact> {
        let mut finished = Vec::with_capacity(pages.len());
        let mut diagnostics = Vec::new();

        {
            let resolver = LinkResolver::new(options, self.sources, &*index);

            for page in pages {
                let RenderedPage {
                    artifact,
                    document,
                    anchors,
                } = page;
                let source = artifact.source.clone();
                let source_path = artifact.source_path().unwrap_or_default().to_string();
                let target = artifact.target_path.clone();
                let doc = LinkContext {
                    source_path: &source_path,
                    target_path: &target,
                    anchors: &anchors,
                };

                let mut webpage = WebpageArtifact::new(artifact);
                let mut resolved: HashMap<String, ResolvedLink> = HashMap::new();
                for link in &document.links {
                    if resolved.contains_key(&link.raw) {
                        continue;
                    }
                    let result = resolver.resolve(&link.raw, &doc, link.is_embed);
                    // missing embeds were reported when registering them
                    if result.unresolved && !(link.is_embed && result.target.is_none()) {
                        diagnostics.push(
                            Diagnostic::warning(
                                "link.unresolved",
                                format!("Unresolved link '{}'", link.raw),
                            )
                            .with_source(source_path.as_str())
                            .with_context(result.href.as_str()),
                        );
                    }
                    if let Some(linked) = &result.target {
                        if link.is_embed {
                            webpage.attachments.insert(linked.clone());
                        } else if *linked != target {
                            webpage.links.insert(linked.clone());
                        }
                    }
                    resolved.insert(link.raw.clone(), result);
                }

                let ids: Vec<String> = anchors.ids().map(str::to_string).collect();
                let body = apply_heading_ids(&document.body, &ids);
                webpage.body = rewrite_links(&body, &resolved);

                if let Some(source) = &source {
                    webpage.title = document.title_or_file_stem(source);
                }
                if document.document_type != DocumentType::Attachment {
                    webpage.artifact.document_type = document.document_type;
                }
                webpage.icon = document.icon.unwrap_or_default();
                webpage.description = document.description.unwrap_or_default();
                webpage.author = document.author.unwrap_or_default();
                webpage.tags = document.tags;
                webpage.aliases = document.aliases;
                webpage.headings = anchors.headings().to_vec();

                finished.push(webpage);
            }
        }

        if !diagnostics.is_empty() {
            warn!("{} unresolved links", diagnostics.len());
        }
        for diagnostic in diagnostics {
            index.push_diagnostic(diagnostic);
        }
        finished
    }

    /// Write every pending artifact; failures roll the artifact back
    async fn write_pass(
        &self,
        index: &mut ExportIndex,
        options: &ExportOptions,
        pending: Vec<PendingWrite>,
    ) -> usize {
        let output = self.output;
        let mut results: Vec<(PendingWrite, io::Result<()>)> = stream::iter(pending)
            .map(move |write| async move {
                let result = output.write(&write.target, write.data.as_bytes()).await;
                (write, result)
            })
            .buffer_unordered(options.write_concurrency.max(1))
            .collect()
            .await;
        results.sort_by(|a, b| a.0.target.cmp(&b.0.target));

        let mut written = 0;
        for (write, result) in results {
            match result {
                Ok(()) => {
                    written += 1;
                    debug!("Wrote {}", write.target);
                }
                Err(err) => fail_artifact(
                    index,
                    &write.target,
                    write.source_path.as_deref(),
                    "write.failed",
                    format!("Failed to write {}: {}", write.target, err),
                ),
            }
        }
        written
    }

    /// Delete files of targets the new snapshot no longer lists
    ///
    /// Only called once the new snapshot is persisted.
    async fn remove_deleted(
        &self,
        diff: &ExportDiff,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> usize {
        let mut removed = 0;
        for target in &diff.deleted {
            match self.output.remove(target).await {
                Ok(true) => {
                    removed += 1;
                    debug!("Removed {}", target);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("Failed to remove {}: {}", target, err);
                    diagnostics.push(
                        Diagnostic::warning(
                            "delete.failed",
                            format!("Failed to remove {target}: {err}"),
                        )
                        .with_context(target.as_str()),
                    );
                }
            }
        }
        removed
    }

    /// Search index and feed first, snapshot last: a snapshot on disk means
    /// everything it describes was persisted
    async fn persist(
        &self,
        options: &ExportOptions,
        site: &FinalizedSite,
    ) -> Result<(), ExportError> {
        if let Some(search) = &site.search_index {
            let bytes = search.to_json()?;
            self.store
                .persist_search_index(&bytes)
                .await
                .map_err(|source| ExportError::Persist {
                    what: "search index",
                    source,
                })?;
        }

        if let Some(items) = &site.feed {
            let channel = FeedChannel {
                title: options.site_name.clone(),
                link: options.site_url.clone(),
                description: options.site_description.clone(),
            };
            let xml = render_feed(&channel, items, chrono::Utc::now());
            self.store
                .persist_feed(xml.as_bytes())
                .await
                .map_err(|source| ExportError::Persist {
                    what: "feed",
                    source,
                })?;
        }

        let snapshot = serde_json::to_vec_pretty(&site.snapshot)?;
        self.store
            .persist_snapshot(&snapshot)
            .await
            .map_err(|source| ExportError::Persist {
                what: "snapshot",
                source,
            })?;

        debug!("Persisted snapshot with {} files", site.snapshot.file_info.len());
        Ok(())
    }
}
