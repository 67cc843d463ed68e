//! Search command implementation

use super::load_config;
use crate::json;
use anyhow::{Context, Result};
use folio_core::{FsSite, SearchHit, SearchIndex, SiteStore};
use std::path::Path;

/// Search the exported site's index
pub async fn search_site(
    config_path: &Path,
    query: &str,
    limit: usize,
    as_json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let site = FsSite::new(config.output_dir());

    let bytes = site
        .read_search_index()
        .await
        .context("Failed to read search index")?
        .with_context(|| {
            format!(
                "Search index not found in {:?}. Export the site with search enabled first.",
                site.root()
            )
        })?;
    let index = SearchIndex::from_json(&bytes).context("Failed to parse search index")?;

    let hits = index.search(query, usize::MAX);
    let shown = &hits[..hits.len().min(limit)];

    if as_json {
        return json::print(
            "search.results",
            json::SearchData {
                query,
                limit,
                total: hits.len(),
                results: shown,
            },
        );
    }

    if hits.is_empty() {
        println!("No results found for '{}'", query);
        return Ok(());
    }

    println!("Found {} results for '{}':\n", hits.len(), query);
    for hit in shown {
        print_hit(hit);
    }
    if hits.len() > limit {
        println!("  ... and {} more results", hits.len() - limit);
    }

    Ok(())
}

fn print_hit(hit: &SearchHit) {
    println!("{}", hit.title);
    println!("  {}", hit.path);
    if !hit.snippet.is_empty() {
        println!("  {}", hit.snippet);
    }
    println!();
}
