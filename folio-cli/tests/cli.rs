use assert_cmd::Command;
use folio_core::{SearchEntry, SearchIndex};
use folio_types::{DocumentType, FileData, HeadingData, WebpageData, WebsiteSnapshot};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const CONFIG: &str = r#"
site:
  name: "Garden"
  url: "https://example.com"
paths:
  vault: "vault"
  output: "site"
"#;

fn folio(dir: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("folio")?;
    cmd.current_dir(dir);
    Ok(cmd)
}

fn workspace() -> Result<TempDir, Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("folio.yml"), CONFIG)?;

    let vault = dir.path().join("vault");
    fs::create_dir_all(vault.join("pics"))?;
    fs::write(vault.join("A.md"), "See [[B#Intro]]")?;
    fs::write(vault.join("B.md"), "# Intro\nHello")?;
    fs::write(vault.join("pics/photo.png"), [0u8, 1, 2])?;
    Ok(dir)
}

fn page(source: &str, title: &str, headings: &[(&str, u8)]) -> WebpageData {
    WebpageData {
        file: FileData {
            created_time: 1_700_000_000_000,
            modified_time: 1_700_000_000_000,
            source_size: 10,
            source_path: source.to_string(),
            export_path: String::new(),
            show_in_tree: true,
            document_type: DocumentType::Markdown,
            ..FileData::default()
        },
        title: title.to_string(),
        headers: headings
            .iter()
            .map(|(heading, level)| HeadingData {
                heading: heading.to_string(),
                level: *level,
                id: String::new(),
            })
            .collect(),
        ..WebpageData::default()
    }
}

/// Lay down what a finished export of the workspace vault looks like
fn publish(dir: &Path) -> TestResult {
    let site = dir.join("site");
    fs::create_dir_all(site.join("site-lib"))?;

    let mut snapshot = WebsiteSnapshot::new(1_700_000_000_000);
    snapshot.site_name = "Garden".to_string();
    snapshot.base_url = "https://example.com".to_string();
    for (target, data) in [
        ("a.html", page("A.md", "A", &[])),
        ("b.html", page("B.md", "B", &[("Intro", 1)])),
    ] {
        snapshot.file_info.insert(target.to_string(), data.file.clone());
        snapshot.all_files.insert(target.to_string());
        snapshot.shown_in_tree.insert(target.to_string());
        snapshot
            .source_to_target
            .insert(data.file.source_path.clone(), target.to_string());
        snapshot.webpages.insert(target.to_string(), data);
        fs::write(site.join(target), "<html></html>")?;
    }
    fs::write(
        site.join("site-lib/metadata.json"),
        serde_json::to_vec_pretty(&snapshot)?,
    )?;

    let mut index = SearchIndex::new();
    index.upsert(SearchEntry {
        path: "b.html".to_string(),
        title: "B".to_string(),
        aliases: Vec::new(),
        headers: vec!["Intro".to_string()],
        tags: vec!["greeting".to_string()],
        content: "Intro Hello".to_string(),
        snippet: "Intro Hello".to_string(),
        content_hash: String::new(),
    });
    fs::write(site.join("site-lib/search-index.json"), index.to_json()?)?;
    Ok(())
}

fn json_output(cmd: &mut Command) -> Result<Value, Box<dyn std::error::Error>> {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    Ok(serde_json::from_str(&stdout)?)
}

#[test]
fn plan_json_lists_every_source_as_new() -> TestResult {
    let dir = workspace()?;

    let value = json_output(folio(dir.path())?.args(["plan", "--json"]))?;
    assert_eq!(value["schema_version"], "folio-v1");
    assert_eq!(value["kind"], "export.plan");

    let artifacts = value["data"]["artifacts"].as_array().expect("artifacts array");
    let mut targets: Vec<&str> = artifacts
        .iter()
        .map(|a| a["target"].as_str().expect("target"))
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["a.html", "b.html", "pics/photo.png"]);
    assert!(artifacts.iter().all(|a| a["classification"] == "new"));
    Ok(())
}

#[test]
fn plan_text_summarizes_counts() -> TestResult {
    let dir = workspace()?;

    folio(dir.path())?
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("new       A.md -> a.html"))
        .stdout(predicate::str::contains("3 new, 0 updated, 0 unchanged, 0 deleted"));
    Ok(())
}

#[test]
fn missing_config_is_reported() -> TestResult {
    let dir = tempdir()?;

    folio(dir.path())?
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}

#[test]
fn status_before_any_export_fails() -> TestResult {
    let dir = workspace()?;

    folio(dir.path())?
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No export found"));
    Ok(())
}

#[test]
fn status_reports_published_site() -> TestResult {
    let dir = workspace()?;
    publish(dir.path())?;

    let value = json_output(folio(dir.path())?.args(["status", "--json"]))?;
    assert_eq!(value["kind"], "export.status");
    let data = &value["data"];
    assert_eq!(data["site_name"], "Garden");
    assert_eq!(data["pages"], 2);
    assert_eq!(data["files"], 2);
    assert_eq!(data["search_entries"], 1);
    assert!(data["feed_items"].is_null());
    assert!(data["created"].as_str().expect("created").starts_with("2023-11-14"));
    Ok(())
}

#[test]
fn search_finds_published_pages() -> TestResult {
    let dir = workspace()?;
    publish(dir.path())?;

    let value = json_output(folio(dir.path())?.args(["search", "greeting", "--json"]))?;
    assert_eq!(value["kind"], "search.results");
    assert_eq!(value["data"]["total"], 1);
    assert_eq!(value["data"]["results"][0]["path"], "b.html");

    folio(dir.path())?
        .args(["search", "nothing-matches"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results found"));
    Ok(())
}

#[test]
fn search_without_index_fails() -> TestResult {
    let dir = workspace()?;

    folio(dir.path())?
        .args(["search", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Search index not found"));
    Ok(())
}

#[test]
fn resolve_uses_published_anchors() -> TestResult {
    let dir = workspace()?;
    publish(dir.path())?;

    folio(dir.path())?
        .args(["resolve", "B#Intro", "--from", "A.md"])
        .assert()
        .success()
        .stdout(predicate::str::diff("b.html#intro_0\n"));

    let value = json_output(folio(dir.path())?.args([
        "resolve", "B#Missing", "--from", "A.md", "--json",
    ]))?;
    assert_eq!(value["kind"], "link.resolved");
    assert_eq!(value["data"]["unresolved"], true);
    assert_eq!(value["data"]["target"], "b.html");

    folio(dir.path())?
        .args(["resolve", "B", "--from", "Nope.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not part of the last export"));
    Ok(())
}

#[test]
fn purge_requires_confirmation() -> TestResult {
    let dir = workspace()?;
    publish(dir.path())?;
    let site = dir.path().join("site");

    folio(dir.path())?
        .arg("purge")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    assert!(site.join("a.html").exists());

    folio(dir.path())?
        .args(["purge", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 4 files"));
    assert!(!site.join("a.html").exists());
    assert!(!site.join("site-lib").exists());
    Ok(())
}

#[test]
fn clear_cache_forces_cold_start() -> TestResult {
    let dir = workspace()?;
    publish(dir.path())?;
    let site = dir.path().join("site");

    folio(dir.path())?.arg("clear-cache").assert().success();
    assert!(!site.join("site-lib/metadata.json").exists());
    assert!(site.join("a.html").exists());

    folio(dir.path())?
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No export found"));
    Ok(())
}
