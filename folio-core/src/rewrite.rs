//! Attribute rewrites applied to rendered HTML bodies.
//!
//! These work on the tag level with regexes; the body itself is produced by
//! the renderer and is otherwise passed through untouched.

use crate::links::ResolvedLink;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Class of the element wrapping a transcluded document
pub const EMBED_CONTENT_CLASS: &str = "markdown-embed-content";

static TAG: OnceLock<Regex> = OnceLock::new();
static ID_ATTR: OnceLock<Regex> = OnceLock::new();
static CLASS_ATTR: OnceLock<Regex> = OnceLock::new();
static LINK_ATTR: OnceLock<Regex> = OnceLock::new();

fn tag() -> &'static Regex {
    TAG.get_or_init(|| {
        Regex::new(r"(?i)<(/?)([a-z][a-z0-9-]*)((?:\s[^>]*)?)>").expect("tag pattern is valid")
    })
}

fn id_attr() -> &'static Regex {
    ID_ATTR.get_or_init(|| {
        Regex::new(r#"(?i)\s+id\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("id pattern is valid")
    })
}

fn class_attr() -> &'static Regex {
    CLASS_ATTR.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|\s)class\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
            .expect("class pattern is valid")
    })
}

fn link_attr() -> &'static Regex {
    LINK_ATTR.get_or_init(|| {
        Regex::new(r#"\b(href|src)="([^"]*)""#).expect("link pattern is valid")
    })
}

fn has_class(attrs: &str, class: &str) -> bool {
    class_attr().captures_iter(attrs).any(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .any(|value| value.as_str().split_whitespace().any(|c| c == class))
    })
}

fn heading_level(name: &str) -> Option<u8> {
    match name.as_bytes() {
        [b'h', level @ b'1'..=b'6'] => Some(level - b'0'),
        _ => None,
    }
}

/// Escape text for use inside a double-quoted attribute
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Undo the entity escapes a renderer typically applies to attribute values
pub fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Set `id` on the n-th heading tag to `ids[n]`
///
/// Existing ids are replaced. Headings inside embedded content belong to
/// another document and are neither counted nor touched; headings beyond the
/// end of `ids` are left as they are.
pub fn apply_heading_ids(body: &str, ids: &[String]) -> String {
    let mut out = String::with_capacity(body.len() + ids.len() * 16);
    let mut copied = 0;
    let mut index = 0;
    // Tag name of the open embed element and how deeply it is nested
    let mut embed: Option<(String, usize)> = None;

    for caps in tag().captures_iter(body) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let attrs = &caps[3];
        let self_closing = attrs.trim_end().ends_with('/');

        if let Some((embed_name, depth)) = embed.as_mut() {
            if name == *embed_name && !self_closing {
                if closing {
                    *depth -= 1;
                } else {
                    *depth += 1;
                }
            }
            if *depth == 0 {
                embed = None;
            }
            continue;
        }
        if closing {
            continue;
        }
        if !self_closing && has_class(attrs, EMBED_CONTENT_CLASS) {
            embed = Some((name, 1));
            continue;
        }

        let Some(level) = heading_level(&name) else {
            continue;
        };
        if let Some(id) = ids.get(index) {
            let attrs = id_attr().replace_all(attrs, "");
            out.push_str(&body[copied..whole.start()]);
            out.push_str(&format!("<h{level}{attrs} id=\"{}\">", escape_attr(id)));
            copied = whole.end();
        }
        index += 1;
    }

    out.push_str(&body[copied..]);
    out
}

/// Replace `href`/`src` values with their resolved form
///
/// `links` is keyed by the raw link as the renderer produced it. Values not
/// in the map are left alone; unresolved links are marked with
/// `data-unresolved="true"`.
pub fn rewrite_links(body: &str, links: &HashMap<String, ResolvedLink>) -> String {
    link_attr()
        .replace_all(body, |caps: &Captures| {
            let raw = &caps[2];
            let resolved = links
                .get(raw)
                .or_else(|| links.get(unescape_attr(raw).as_str()));

            match resolved {
                Some(link) => {
                    let mut out = format!("{}=\"{}\"", &caps[1], escape_attr(&link.href));
                    if link.unresolved {
                        out.push_str(" data-unresolved=\"true\"");
                    }
                    out
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str, unresolved: bool) -> ResolvedLink {
        ResolvedLink {
            href: href.to_string(),
            unresolved,
            target: None,
        }
    }

    #[test]
    fn test_apply_heading_ids() {
        let body = r#"<h1>Intro</h1><p>x</p><H2 class="a" id="old">Setup</H2><h3>Extra</h3>"#;
        let ids = vec!["intro_0".to_string(), "setup_0".to_string()];
        let out = apply_heading_ids(body, &ids);

        assert_eq!(
            out,
            concat!(
                r#"<h1 id="intro_0">Intro</h1><p>x</p>"#,
                r#"<h2 class="a" id="setup_0">Setup</H2><h3>Extra</h3>"#,
            )
        );
    }

    #[test]
    fn test_heading_ids_skip_header_element() {
        let body = "<header><hr><h1>T</h1></header>";
        let out = apply_heading_ids(body, &["t_0".to_string()]);
        assert_eq!(out, r#"<header><hr><h1 id="t_0">T</h1></header>"#);
    }

    #[test]
    fn test_heading_ids_skip_embedded_content() {
        let body = concat!(
            "<h1>Top</h1>",
            r#"<div class="internal-embed markdown-embed-content">"#,
            "<div><h1>Other</h1></div><h2>Nested</h2>",
            "</div>",
            "<h2>After</h2>",
        );
        let ids = vec!["top_0".to_string(), "after_0".to_string()];
        let out = apply_heading_ids(body, &ids);

        assert_eq!(
            out,
            concat!(
                r#"<h1 id="top_0">Top</h1>"#,
                r#"<div class="internal-embed markdown-embed-content">"#,
                "<div><h1>Other</h1></div><h2>Nested</h2>",
                "</div>",
                r#"<h2 id="after_0">After</h2>"#,
            )
        );
    }

    #[test]
    fn test_has_class() {
        assert!(has_class(r#" class="a markdown-embed-content""#, EMBED_CONTENT_CLASS));
        assert!(has_class(" class=markdown-embed-content", EMBED_CONTENT_CLASS));
        assert!(!has_class(r#" class="markdown-embed""#, EMBED_CONTENT_CLASS));
        assert!(!has_class(r#" data-class="markdown-embed-content""#, EMBED_CONTENT_CLASS));
    }

    #[test]
    fn test_rewrite_links() {
        let mut links = HashMap::new();
        links.insert("B.md#Intro".to_string(), link("b.html#intro_0", false));
        links.insert("Missing".to_string(), link("missing.html", true));
        links.insert("a?x=1&y=2".to_string(), link("a?x=1&y=2", false));

        let body = concat!(
            r#"<a href="B.md#Intro">B</a> "#,
            r#"<a href="Missing">M</a> "#,
            r#"<img src="a?x=1&amp;y=2"> "#,
            r#"<a href="https://example.com">ext</a>"#
        );
        let out = rewrite_links(body, &links);

        assert!(out.contains(r#"<a href="b.html#intro_0">B</a>"#));
        assert!(out.contains(r#"<a href="missing.html" data-unresolved="true">M</a>"#));
        assert!(out.contains(r#"<img src="a?x=1&amp;y=2">"#));
        assert!(out.contains(r#"<a href="https://example.com">ext</a>"#));
    }

    #[test]
    fn test_escape_roundtrip() {
        let value = r#"a&b<"c">"#;
        assert_eq!(unescape_attr(&escape_attr(value)), value);
    }
}
