//! Dry-run classification of the vault against the last export.

use super::load_config;
use crate::json;
use anyhow::{Context, Result};
use folio_core::{plan_export, Classification, FsSite, FsVault};
use std::path::Path;

pub async fn plan(config_path: &Path, as_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let vault_dir = config.vault_dir();
    let vault = FsVault::open(&vault_dir, &config.ignore_patterns)
        .with_context(|| format!("Failed to scan vault {:?}", vault_dir))?;
    let site = FsSite::new(config.output_dir());

    let plan = plan_export(&config.export_options(), &site, vault.sources()).await;

    if as_json {
        return json::print(
            "export.plan",
            json::PlanData {
                export_root: &plan.export_root,
                artifacts: &plan.artifacts,
                diff: &plan.diff,
                diagnostics: &plan.diagnostics,
            },
        );
    }

    let root = if plan.export_root.is_empty() {
        "(vault root)"
    } else {
        plan.export_root.as_str()
    };
    println!("Export root: {}", root);

    for artifact in &plan.artifacts {
        if artifact.classification == Classification::Unchanged {
            continue;
        }
        println!(
            "  {:<9} {} -> {}",
            artifact.classification.as_str(),
            artifact.source,
            artifact.target
        );
    }
    for target in &plan.diff.deleted {
        println!("  {:<9} {}", "deleted", target);
    }
    for diagnostic in &plan.diagnostics {
        println!("  {}", diagnostic);
    }

    println!(
        "{} new, {} updated, {} unchanged, {} deleted",
        plan.diff.new.len(),
        plan.diff.updated.len(),
        plan.diff.unchanged.len(),
        plan.diff.deleted.len()
    );

    Ok(())
}
