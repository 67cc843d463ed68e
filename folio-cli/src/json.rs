//! Envelope and payloads for `--json` output.

use folio_core::{Diagnostic, ExportDiff, PlannedArtifact, SearchHit};
use serde::Serialize;

pub const SCHEMA_VERSION: &str = "folio-v1";

/// Standard envelope for machine-consumable responses.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub schema_version: &'static str,
    pub kind: &'static str,
    pub data: T,
}

pub fn envelope<T>(kind: &'static str, data: T) -> Envelope<T> {
    Envelope {
        schema_version: SCHEMA_VERSION,
        kind,
        data,
    }
}

pub fn print<T: Serialize>(kind: &'static str, data: T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&envelope(kind, data))?);
    Ok(())
}

#[derive(Serialize)]
pub struct PlanData<'a> {
    pub export_root: &'a str,
    pub artifacts: &'a [PlannedArtifact],
    pub diff: &'a ExportDiff,
    pub diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
pub struct StatusData {
    pub site_name: String,
    pub export_root: String,
    pub base_url: String,
    pub pages: usize,
    pub attachments: usize,
    pub files: usize,
    pub shown_in_tree: usize,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub search_entries: Option<usize>,
    pub feed_items: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchData<'a> {
    pub query: &'a str,
    pub limit: usize,
    pub total: usize,
    pub results: &'a [SearchHit],
}

#[derive(Serialize)]
pub struct ResolveData<'a> {
    pub link: &'a str,
    pub from: &'a str,
    pub href: &'a str,
    pub target: Option<&'a str>,
    pub unresolved: bool,
}
