//! # folio-core
//!
//! Core library for folio, an incremental static-site exporter.
//!
//! This crate decides which source documents changed since the last export,
//! assigns stable output paths, resolves links and heading anchors across
//! documents, and keeps the snapshot, search index and feed of the exported
//! site consistent between runs. Rendering documents to HTML is left to a
//! [`DocumentRenderer`] supplied by the caller.

pub mod anchors;
pub mod artifact;
pub mod config;
pub mod export;
pub mod feed;
pub mod index;
pub mod links;
pub mod models;
pub mod path;
pub mod render;
pub mod rewrite;
pub mod search;
pub mod slug;
pub mod source;
pub mod store;

pub use anchors::{DocumentAnchors, HeadingNode};
pub use artifact::{Artifact, ArtifactData, ArtifactKind, WebpageArtifact};
pub use config::{Config, ConfigError, ExportOptions};
pub use export::{plan_export, ExportError, ExportPlan, ExportReport, Exporter, PlannedArtifact};
pub use feed::{FeedChannel, FeedItem};
pub use index::{Classification, ExportDiff, ExportIndex, FinalizedSite};
pub use links::{LinkContext, LinkResolver, ResolvedLink, TargetLookup};
pub use models::{Diagnostic, DiagnosticSeverity};
pub use path::PathAssigner;
pub use render::{DocumentRenderer, RenderError, RenderedDocument, RenderedHeading, RenderedLink};
pub use search::{SearchEntry, SearchHit, SearchIndex};
pub use slug::slugify;
pub use source::{FsVault, SourceProvider, SourceResolver, VaultPaths};
pub use store::{FsSite, OutputSink, SiteStore};
