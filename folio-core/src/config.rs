//! Configuration parsing and export options.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Immutable options for one export run
///
/// Built once from [`Config`] (or by hand) and passed by reference into the
/// path assigner, link resolver, index and exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Lowercase and hyphenate output paths
    #[serde(default = "default_true")]
    pub slugify_paths: bool,

    /// Emit `#id` for same-page anchors instead of `page.html#id`
    #[serde(default)]
    pub relative_header_links: bool,

    /// Source directory stripped from every output path. Computed from the
    /// exported files when unset.
    #[serde(default)]
    pub export_root: Option<String>,

    #[serde(default)]
    pub site_name: String,

    #[serde(default)]
    pub site_url: String,

    #[serde(default)]
    pub author_name: Option<String>,

    #[serde(default)]
    pub site_description: String,

    #[serde(default = "default_true")]
    pub enable_rss: bool,

    #[serde(default = "default_true")]
    pub enable_search: bool,

    /// Remove files of deleted sources from the destination
    #[serde(default = "default_true")]
    pub delete_old_files: bool,

    /// Upper bound on concurrent artifact writes
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
}

fn default_true() -> bool {
    true
}

fn default_write_concurrency() -> usize {
    16
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            slugify_paths: true,
            relative_header_links: false,
            export_root: None,
            site_name: String::new(),
            site_url: String::new(),
            author_name: None,
            site_description: String::new(),
            enable_rss: true,
            enable_search: true,
            delete_old_files: true,
            write_concurrency: default_write_concurrency(),
        }
    }
}

impl ExportOptions {
    /// Same options with the export root fixed
    pub fn with_export_root(&self, root: impl Into<String>) -> Self {
        Self {
            export_root: Some(root.into()),
            ..self.clone()
        }
    }

    /// Configured export root without surrounding slashes ("" when unset)
    pub fn export_root(&self) -> &str {
        self.export_root
            .as_deref()
            .map(|root| root.trim_matches('/'))
            .unwrap_or("")
    }
}

/// Main configuration struct matching the folio.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    pub paths: PathsConfig,

    #[serde(default)]
    pub export: ExportSection,

    /// Regular expressions matched against vault-relative paths
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub vault: PathBuf,
    pub output: PathBuf,
}

/// The `export:` section of folio.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default = "default_true")]
    pub slugify_paths: bool,

    #[serde(default)]
    pub relative_header_links: bool,

    #[serde(default)]
    pub export_root: Option<String>,

    #[serde(default = "default_true")]
    pub rss: bool,

    #[serde(default = "default_true")]
    pub search: bool,

    #[serde(default = "default_true")]
    pub delete_old_files: bool,

    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            slugify_paths: true,
            relative_header_links: false,
            export_root: None,
            rss: true,
            search: true,
            delete_old_files: true,
            write_concurrency: default_write_concurrency(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        if config.export.write_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.write_concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Get the vault directory, resolved relative to config file
    pub fn vault_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.vault)
    }

    /// Get the output directory, resolved relative to config file
    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.output)
    }

    /// Options for an export run described by this config
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            slugify_paths: self.export.slugify_paths,
            relative_header_links: self.export.relative_header_links,
            export_root: self.export.export_root.clone(),
            site_name: self.site.name.clone(),
            site_url: self.site.url.clone(),
            author_name: self.site.author.clone(),
            site_description: self.site.description.clone(),
            enable_rss: self.export.rss,
            enable_search: self.export.search,
            delete_old_files: self.export.delete_old_files,
            write_concurrency: self.export.write_concurrency,
        }
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(parent) = self.config_path.as_deref().and_then(Path::parent) {
            parent.join(path)
        } else {
            path.to_path_buf()
        }
    }
}
