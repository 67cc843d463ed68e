//! Link classification and resolution.

use crate::anchors::DocumentAnchors;
use crate::config::ExportOptions;
use crate::path::{extension_of, PathAssigner};
use crate::source::SourceResolver;
use regex::Regex;
use std::sync::OnceLock;

static EXTERNAL_LINK: OnceLock<Regex> = OnceLock::new();

fn external_link() -> &'static Regex {
    EXTERNAL_LINK.get_or_init(|| Regex::new(r"^\w+:(//|\\\\)").expect("scheme pattern is valid"))
}

/// Links that are emitted exactly as written
pub fn is_passthrough(link: &str) -> bool {
    let lower = link.to_lowercase();
    link.starts_with('?')
        || lower.starts_with("data:")
        || lower.starts_with("mailto:")
        || (external_link().is_match(link) && !lower.starts_with("app://"))
}

/// Outcome of resolving one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// Value to emit in the rewritten attribute
    pub href: String,
    /// Some part of the link could not be matched
    pub unresolved: bool,
    /// Target path of the exported file the link points to, if any
    pub target: Option<String>,
}

impl ResolvedLink {
    fn resolved(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            unresolved: false,
            target: None,
        }
    }

    fn unresolved(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            unresolved: true,
            target: None,
        }
    }

    fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Lookups the resolver needs from the current run
pub trait TargetLookup {
    /// Target path of the artifact exported from a source
    fn target_for_source(&self, source_path: &str, prefer_attachment: bool) -> Option<String>;

    /// Anchors of an exported page
    fn anchors_for(&self, target_path: &str) -> Option<&DocumentAnchors>;
}

/// The document a link was written in
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    pub source_path: &'a str,
    pub target_path: &'a str,
    pub anchors: &'a DocumentAnchors,
}

pub struct LinkResolver<'a, S: ?Sized> {
    relative_header_links: bool,
    paths: PathAssigner,
    sources: &'a S,
    targets: &'a dyn TargetLookup,
}

impl<'a, S: SourceResolver + ?Sized> LinkResolver<'a, S> {
    pub fn new(options: &ExportOptions, sources: &'a S, targets: &'a dyn TargetLookup) -> Self {
        Self {
            relative_header_links: options.relative_header_links,
            paths: PathAssigner::new(options),
            sources,
            targets,
        }
    }

    /// Resolve a raw link found in `doc`
    ///
    /// `prefer_attachment` picks the attachment over the page when a source
    /// was exported as both, which is what embeds want.
    pub fn resolve(
        &self,
        raw: &str,
        doc: &LinkContext<'_>,
        prefer_attachment: bool,
    ) -> ResolvedLink {
        let link = raw.trim();
        if link.is_empty() {
            return ResolvedLink::unresolved("");
        }
        if is_passthrough(link) {
            return ResolvedLink::resolved(raw);
        }

        if let Some(hash) = link.strip_prefix('#') {
            return match doc.anchors.resolve(hash) {
                Some(id) if self.relative_header_links => ResolvedLink::resolved(format!("#{id}")),
                Some(id) => ResolvedLink::resolved(format!("{}#{id}", doc.target_path))
                    .with_target(doc.target_path),
                None => ResolvedLink::unresolved(raw),
            };
        }

        let (path, hash) = match link.split_once('#') {
            Some((path, hash)) => (path, Some(hash)),
            None => (link, None),
        };
        let path = path.split('?').next().unwrap_or_default();
        let raw_hash = hash.map(|h| format!("#{h}")).unwrap_or_default();

        let target = self
            .sources
            .resolve_source_path(path, doc.source_path)
            .and_then(|source| self.targets.target_for_source(&source, prefer_attachment));

        let Some(target) = target else {
            tracing::debug!("Unresolved link '{}' in {}", raw, doc.source_path);
            return ResolvedLink::unresolved(format!(
                "{}{raw_hash}",
                self.paths.guess_page_path(path)
            ));
        };

        let is_page = extension_of(&target).is_some_and(|ext| ext == "html");
        match hash {
            Some(hash) if is_page && !hash.trim().is_empty() => {
                let resolved = self
                    .targets
                    .anchors_for(&target)
                    .and_then(|anchors| anchors.resolve(hash));
                match resolved {
                    Some(id) => {
                        ResolvedLink::resolved(format!("{target}#{id}")).with_target(target)
                    }
                    None => {
                        tracing::debug!("Unresolved anchor '#{}' into {}", hash, target);
                        ResolvedLink::unresolved(format!("{target}{raw_hash}")).with_target(target)
                    }
                }
            }
            _ => ResolvedLink::resolved(format!("{target}{raw_hash}")).with_target(target),
        }
    }
}
