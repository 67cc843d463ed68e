//! Destructive maintenance of the destination directory.

use super::{load_config, read_snapshot};
use anyhow::{bail, Context, Result};
use folio_core::FsSite;
use folio_types::WebsiteSnapshot;
use std::path::Path;

/// Delete every file recorded by the last export
pub async fn purge(config_path: &Path, yes: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let site = FsSite::new(config.output_dir());

    if !yes {
        bail!("Refusing to purge {:?} without --yes", site.root());
    }

    let snapshot = match read_snapshot(&site).await? {
        Some((_, snapshot)) => snapshot,
        None => {
            tracing::warn!("No snapshot in {:?}, removing library files only", site.root());
            WebsiteSnapshot::default()
        }
    };

    let removed = site
        .purge(&snapshot)
        .await
        .with_context(|| format!("Failed to purge {:?}", site.root()))?;
    println!("Removed {} files from {:?}", removed, site.root());

    Ok(())
}

/// Delete the snapshot and search index; the next export starts cold
pub async fn clear_cache(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let site = FsSite::new(config.output_dir());

    site.clear_cache()
        .await
        .with_context(|| format!("Failed to clear cache in {:?}", site.root()))?;
    println!("Cleared export cache in {:?}", site.root());

    Ok(())
}
