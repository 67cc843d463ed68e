//! CLI command implementations.

pub mod plan;
pub mod purge;
pub mod resolve;
pub mod search;
pub mod status;

pub use plan::plan;
pub use purge::{clear_cache, purge};
pub use resolve::resolve_link;
pub use search::search_site;
pub use status::status;

use anyhow::{Context, Result};
use folio_core::{Config, FsSite, SiteStore};
use folio_types::WebsiteSnapshot;
use std::path::Path;

fn load_config(config_path: &Path) -> Result<Config> {
    Config::from_file(config_path).context("Failed to load configuration")
}

/// Snapshot of the last export, if the destination has one
async fn read_snapshot(site: &FsSite) -> Result<Option<(Vec<u8>, WebsiteSnapshot)>> {
    let Some(bytes) = site
        .read_snapshot()
        .await
        .with_context(|| format!("Failed to read snapshot in {:?}", site.root()))?
    else {
        return Ok(None);
    };
    let snapshot = serde_json::from_slice(&bytes).context("Failed to parse snapshot")?;
    Ok(Some((bytes, snapshot)))
}

async fn require_snapshot(site: &FsSite) -> Result<(Vec<u8>, WebsiteSnapshot)> {
    read_snapshot(site).await?.with_context(|| {
        format!(
            "No export found in {:?}. Export the site before running this command.",
            site.root()
        )
    })
}
