//! Deterministic output paths for exported sources.

use crate::artifact::ArtifactKind;
use crate::config::ExportOptions;
use crate::slug::slugify_if;
use folio_types::SourceIdentity;

/// Source extensions that render to a page
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["md", "canvas"];

pub fn is_convertible(extension: &str) -> bool {
    CONVERTIBLE_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Use `/` everywhere and drop empty, `.` and leading segments
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Split `dir/name.ext` into (`dir/name`, `Some("ext")`)
///
/// Dot-files such as `.obsidian` have no extension.
pub fn split_extension(path: &str) -> (&str, Option<&str>) {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(0) | None => (path, None),
        Some(dot) => {
            let dot = name_start + dot;
            let ext = &path[dot + 1..];
            if ext.is_empty() {
                (path, None)
            } else {
                (&path[..dot], Some(ext))
            }
        }
    }
}

/// Extension of a target path, lower-cased
pub fn extension_of(path: &str) -> Option<String> {
    split_extension(path).1.map(str::to_lowercase)
}

/// Replace (or add) the extension of a path
pub fn set_extension(path: &str, extension: &str) -> String {
    let (stem, _) = split_extension(path);
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

/// Insert `-{n}` before the extension, used when two sources claim one target
pub fn with_collision_suffix(path: &str, n: usize) -> String {
    match split_extension(path) {
        (stem, Some(ext)) => format!("{stem}-{n}.{ext}"),
        (stem, None) => format!("{stem}-{n}"),
    }
}

/// Longest directory prefix shared by every path, compared segment-wise
///
/// The file name never takes part, so a single file yields its parent
/// directory. Returns an empty string when nothing but the filesystem root
/// is shared.
pub fn longest_common_root<S: AsRef<str>>(paths: &[S]) -> String {
    let mut dirs = paths.iter().map(|path| {
        let normalized = normalize_separators(path.as_ref());
        let mut segments: Vec<String> = normalized.split('/').map(str::to_string).collect();
        segments.pop();
        segments
    });

    let Some(mut common) = dirs.next() else {
        return String::new();
    };
    for dir in dirs {
        let shared = common
            .iter()
            .zip(dir.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }

    common.join("/")
}

/// Maps source identities to relative, POSIX-style output paths
///
/// Pure function of its inputs and the options it was built from: the same
/// source always lands on the same target, which is what lets change
/// detection key on target paths across runs.
#[derive(Debug, Clone)]
pub struct PathAssigner {
    slugify_paths: bool,
    root_prefix: String,
}

impl PathAssigner {
    pub fn new(options: &ExportOptions) -> Self {
        let root = options.export_root();
        let root_prefix = if root.is_empty() {
            String::new()
        } else {
            format!(
                "{}/",
                slugify_if(&normalize_separators(root), options.slugify_paths)
            )
        };

        Self {
            slugify_paths: options.slugify_paths,
            root_prefix,
        }
    }

    /// Output path for a source
    ///
    /// `desired_extension` overrides the extension outright. Without it,
    /// convertible sources exported as pages become `.html`. Any `.html`
    /// target that is not the page itself gets a `-content` stem so it cannot
    /// shadow the page rendered from the same name.
    pub fn assign(
        &self,
        source: &SourceIdentity,
        kind: ArtifactKind,
        desired_extension: Option<&str>,
    ) -> String {
        let path = normalize_separators(&source.path);
        let (stem, extension) = split_extension(&path);

        let extension = match desired_extension {
            Some(ext) => Some(ext.trim_start_matches('.').to_string()),
            None => match extension {
                Some(ext) if kind == ArtifactKind::Webpage && is_convertible(ext) => {
                    Some("html".to_string())
                }
                other => other.map(str::to_string),
            },
        };

        let is_html = extension
            .as_deref()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
        let stem = if is_html && kind != ArtifactKind::Webpage {
            format!("{stem}-content")
        } else {
            stem.to_string()
        };

        let target = match extension.as_deref() {
            Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
            _ => stem,
        };

        self.strip_export_root(&slugify_if(&target, self.slugify_paths))
    }

    /// Remove the export root from the front of a path, at most once
    pub fn strip_export_root(&self, path: &str) -> String {
        if self.root_prefix.is_empty() {
            return path.to_string();
        }
        path.strip_prefix(&self.root_prefix)
            .unwrap_or(path)
            .to_string()
    }

    /// Best-effort target for a link whose source could not be found
    pub fn guess_page_path(&self, raw_path: &str) -> String {
        let path = normalize_separators(raw_path);
        set_extension(&slugify_if(&path, self.slugify_paths), "html")
    }
}
