//! RSS 2.0 feed: reading the published feed, merging, writing.

use crate::artifact::WebpageArtifact;
use crate::search::{create_snippet, html_to_text};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid feed XML: {0}")]
    Xml(String),

    #[error("Not an RSS document")]
    NotRss,
}

/// One `<item>` of the feed; `guid` is the source path of the page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub description: String,
    pub pub_date: String,
    pub author: String,
}

impl FeedItem {
    pub fn for_page(page: &WebpageArtifact, site_url: &str, default_author: Option<&str>) -> Self {
        let description = if page.description.trim().is_empty() {
            create_snippet(&html_to_text(&page.body), 200)
        } else {
            page.description.clone()
        };
        let author = if page.author.is_empty() {
            default_author.unwrap_or_default().to_string()
        } else {
            page.author.clone()
        };
        let modified = page
            .artifact
            .source
            .as_ref()
            .map(|source| source.modified_time)
            .unwrap_or_default();

        Self {
            title: page.title.clone(),
            link: join_url(site_url, page.target_path()),
            guid: page
                .artifact
                .source_path()
                .unwrap_or(page.target_path())
                .to_string(),
            description,
            pub_date: rfc2822_from_millis(modified),
            author,
        }
    }
}

/// Channel-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedChannel {
    pub title: String,
    pub link: String,
    pub description: String,
}

pub fn rfc2822_from_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc2822()
}

/// Join a site URL and a relative path with exactly one `/`
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}/{path}")
    }
}

/// Read the items of a published feed
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, FeedError> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut seen_rss = false;
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Vec<u8>> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"rss" | b"channel" => seen_rss = true,
                    b"item" => current = Some(FeedItem::default()),
                    _ if current.is_some() => {
                        field = Some(name);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(te)) => {
                if field.is_some() {
                    let unescaped = te.unescape().map_err(|e| FeedError::Xml(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                } else if let (Some(item), Some(open)) = (current.as_mut(), field.as_deref()) {
                    if open == name.as_ref() {
                        let value = std::mem::take(&mut text);
                        match open {
                            b"title" => item.title = value,
                            b"link" => item.link = value,
                            b"guid" => item.guid = value,
                            b"description" => item.description = value,
                            b"pubDate" => item.pub_date = value,
                            b"author" => item.author = value,
                            _ => {}
                        }
                        field = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !seen_rss {
        return Err(FeedError::NotRss);
    }
    Ok(items)
}

/// Combine this run's items with the published ones
///
/// Published items whose guid is in `deleted` or reappears in `new_items`
/// are dropped; the result lists new items first.
pub fn merge_feed(
    existing: Vec<FeedItem>,
    new_items: Vec<FeedItem>,
    deleted: &BTreeSet<String>,
) -> Vec<FeedItem> {
    let fresh: HashSet<&str> = new_items.iter().map(|item| item.guid.as_str()).collect();
    let kept: Vec<FeedItem> = existing
        .into_iter()
        .filter(|item| !deleted.contains(&item.guid) && !fresh.contains(item.guid.as_str()))
        .collect();

    let mut merged = new_items;
    merged.extend(kept);
    merged
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Write an RSS 2.0 document
pub fn render_feed(channel: &FeedChannel, items: &[FeedItem], built_at: DateTime<Utc>) -> String {
    let mut items_xml = String::new();
    for item in items {
        let author = if item.author.is_empty() {
            String::new()
        } else {
            format!("\n      <author>{}</author>", escape_xml(&item.author))
        };
        items_xml.push_str(&format!(
            r#"
    <item>
      <title>{}</title>
      <link>{}</link>
      <guid isPermaLink="false">{}</guid>
      <description>{}</description>
      <pubDate>{}</pubDate>{}
    </item>"#,
            escape_xml(&item.title),
            escape_xml(&item.link),
            escape_xml(&item.guid),
            escape_xml(&item.description),
            escape_xml(&item.pub_date),
            author,
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    <generator>folio</generator>
    <lastBuildDate>{}</lastBuildDate>
    <ttl>60</ttl>{}
  </channel>
</rss>
"#,
        escape_xml(&channel.title),
        escape_xml(&channel.link),
        escape_xml(&channel.description),
        built_at.to_rfc2822(),
        items_xml
    )
}
