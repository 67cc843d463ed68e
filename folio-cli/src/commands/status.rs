//! Summary of the last export.

use super::{load_config, require_snapshot};
use crate::json;
use anyhow::Result;
use chrono::DateTime;
use folio_core::feed::parse_feed;
use folio_core::{FsSite, SearchIndex, SiteStore};
use std::path::Path;

fn timestamp(millis: i64) -> Option<String> {
    if millis == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis).map(|time| time.to_rfc3339())
}

pub async fn status(config_path: &Path, as_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let site = FsSite::new(config.output_dir());
    let (_, snapshot) = require_snapshot(&site).await?;

    // Unreadable library files are reported as absent
    let search_entries = match site.read_search_index().await {
        Ok(Some(bytes)) => SearchIndex::from_json(&bytes).ok().map(|index| index.len()),
        _ => None,
    };
    let feed_items = match site.read_feed().await {
        Ok(Some(bytes)) => parse_feed(&bytes).ok().map(|items| items.len()),
        _ => None,
    };

    let data = json::StatusData {
        site_name: snapshot.site_name.clone(),
        export_root: snapshot.export_root.clone(),
        base_url: snapshot.base_url.clone(),
        pages: snapshot.webpages.len(),
        attachments: snapshot.attachments.len(),
        files: snapshot.all_files.len(),
        shown_in_tree: snapshot.shown_in_tree.len(),
        created: timestamp(snapshot.created_time),
        modified: timestamp(snapshot.modified_time),
        search_entries,
        feed_items,
    };

    if as_json {
        return json::print("export.status", data);
    }

    let name = if data.site_name.is_empty() {
        "(unnamed site)"
    } else {
        data.site_name.as_str()
    };
    println!("{} in {:?}", name, site.root());
    println!(
        "  {} files: {} pages, {} attachments ({} shown in tree)",
        data.files, data.pages, data.attachments, data.shown_in_tree
    );
    if let Some(modified) = &data.modified {
        println!("  last export: {}", modified);
    }
    match data.search_entries {
        Some(count) => println!("  search index: {} entries", count),
        None => println!("  search index: none"),
    }
    match data.feed_items {
        Some(count) => println!("  feed: {} items", count),
        None => println!("  feed: none"),
    }

    Ok(())
}
