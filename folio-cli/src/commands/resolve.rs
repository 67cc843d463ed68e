//! Resolve a link against the last export.

use super::{load_config, require_snapshot};
use crate::json;
use anyhow::{bail, Result};
use folio_core::{ExportIndex, FsSite, LinkContext, LinkResolver, VaultPaths};
use std::path::Path;

pub async fn resolve_link(
    config_path: &Path,
    link: &str,
    from: &str,
    embed: bool,
    as_json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let site = FsSite::new(config.output_dir());
    let (bytes, snapshot) = require_snapshot(&site).await?;

    let options = config
        .export_options()
        .with_export_root(snapshot.export_root.clone());
    let mut index = ExportIndex::load(options, Some(bytes.as_slice()), None);
    index.adopt_published();

    let sources = VaultPaths::new(
        snapshot
            .file_info
            .values()
            .map(|file| file.source_path.as_str())
            .filter(|path| !path.is_empty()),
    );

    let Some(target) = index.artifact_for_source(from, false).map(str::to_string) else {
        bail!("{} is not part of the last export", from);
    };
    let anchors = index.anchors_for(&target).cloned().unwrap_or_default();
    let doc = LinkContext {
        source_path: from,
        target_path: &target,
        anchors: &anchors,
    };

    let resolver = LinkResolver::new(index.options(), &sources, &index);
    let resolved = resolver.resolve(link, &doc, embed);

    if as_json {
        return json::print(
            "link.resolved",
            json::ResolveData {
                link,
                from,
                href: &resolved.href,
                target: resolved.target.as_deref(),
                unresolved: resolved.unresolved,
            },
        );
    }

    if resolved.unresolved {
        println!("{} (unresolved)", resolved.href);
    } else {
        println!("{}", resolved.href);
    }

    Ok(())
}
