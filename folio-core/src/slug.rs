//! Slug generation for output paths.

use regex::Regex;
use std::sync::OnceLock;

static HYPHEN_RUNS: OnceLock<Regex> = OnceLock::new();

fn hyphen_runs() -> &'static Regex {
    HYPHEN_RUNS.get_or_init(|| Regex::new(r"-{2,}").expect("hyphen pattern is valid"))
}

/// Convert a path or name to its web-style form
///
/// Rules:
/// - Lowercase
/// - Replace spaces with hyphens
/// - Collapse repeated hyphens
///
/// Path separators and extensions are left alone, so the function can be
/// applied to a whole relative path. Applying it twice gives the same result
/// as applying it once.
///
/// # Examples
///
/// ```
/// use folio_core::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("Notes/Rust  -  Safety.md"), "notes/rust-safety.md");
/// ```
pub fn slugify(input: &str) -> String {
    let lowercased = input.to_lowercase().replace(' ', "-");
    hyphen_runs().replace_all(&lowercased, "-").into_owned()
}

/// Slugify only when the site asks for web-style paths
pub fn slugify_if(input: &str, enabled: bool) -> String {
    if enabled {
        slugify(input)
    } else {
        input.to_string()
    }
}
