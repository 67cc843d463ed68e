//! Heading ids and anchor lookup within one document.
//!
//! Every heading gets an id of the form `{normalized}_{n}`, where `n` counts
//! earlier headings with the same normalized text. Splitting an id at its
//! last `_` recovers the pair, so ids never collide inside a document.
//!
//! Anchors such as `#Setup#Intro` are matched against the heading tree: the
//! first segment may sit anywhere, each following segment must be a
//! descendant of the previous match.

use folio_types::HeadingData;
use std::collections::HashMap;

/// Normalize heading text for comparison and id generation
///
/// Trims, lower-cases, turns spaces into `_`, drops `:` and collapses runs of
/// `_`.
pub fn normalize_heading(text: &str) -> String {
    let mut normalized = text.trim().to_lowercase().replace(' ', "_").replace(':', "");
    while normalized.contains("__") {
        normalized = normalized.replace("__", "_");
    }
    normalized
}

/// Per-document map from normalized heading text to the last index handed out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    last_index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the id for the next heading with this text
    pub fn assign(&mut self, text: &str) -> String {
        let normalized = normalize_heading(text);
        let index = match self.last_index.get(&normalized) {
            Some(previous) => previous + 1,
            None => 0,
        };
        self.last_index.insert(normalized.clone(), index);
        format!("{normalized}_{index}")
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.last_index.contains_key(normalized)
    }

    pub fn len(&self) -> usize {
        self.last_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_index.is_empty()
    }
}

/// Node of the heading tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingNode {
    pub text: String,
    pub level: u8,
    pub id: String,
    pub children: Vec<HeadingNode>,
}

impl HeadingNode {
    fn new(heading: &HeadingData) -> Self {
        Self {
            text: heading.heading.clone(),
            // Level 0 is reserved for the virtual root
            level: heading.level.max(1),
            id: heading.id.clone(),
            children: Vec::new(),
        }
    }
}

/// Nest flat headings by level
///
/// A heading becomes a child of the closest earlier heading with a smaller
/// level; headings with no such parent are roots.
pub fn build_heading_tree(headings: &[HeadingData]) -> Vec<HeadingNode> {
    let root = HeadingNode {
        text: String::new(),
        level: 0,
        id: String::new(),
        children: Vec::new(),
    };
    let mut stack = vec![root];

    for heading in headings {
        let node = HeadingNode::new(heading);
        close_until(&mut stack, node.level);
        stack.push(node);
    }
    close_until(&mut stack, 1);

    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn close_until(stack: &mut Vec<HeadingNode>, level: u8) {
    while stack.len() > 1 && stack.last().is_some_and(|top| top.level >= level) {
        if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(done);
            }
        }
    }
}

/// Assign ids to headings in document order
pub fn assign_heading_ids<'a, I>(headings: I) -> (HeaderMap, Vec<HeadingData>)
where
    I: IntoIterator<Item = (&'a str, u8)>,
{
    let mut map = HeaderMap::new();
    let assigned = headings
        .into_iter()
        .map(|(text, level)| HeadingData {
            heading: text.to_string(),
            level,
            id: map.assign(text),
        })
        .collect();
    (map, assigned)
}

/// Resolved anchors of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentAnchors {
    headings: Vec<HeadingData>,
    header_map: HeaderMap,
    tree: Vec<HeadingNode>,
}

impl DocumentAnchors {
    /// Assign ids to `(text, level)` pairs and index them
    pub fn build<'a, I>(headings: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u8)>,
    {
        let (header_map, headings) = assign_heading_ids(headings);
        let tree = build_heading_tree(&headings);
        Self {
            headings,
            header_map,
            tree,
        }
    }

    /// Rebuild from headings recorded by an earlier run
    ///
    /// Ids are recomputed from the heading order, which reproduces what the
    /// earlier run assigned.
    pub fn from_recorded(headers: &[HeadingData]) -> Self {
        Self::build(headers.iter().map(|h| (h.heading.as_str(), h.level)))
    }

    pub fn headings(&self) -> &[HeadingData] {
        &self.headings
    }

    pub fn tree(&self) -> &[HeadingNode] {
        &self.tree
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.headings.iter().map(|h| h.id.as_str())
    }

    /// Resolve an anchor path such as `Setup#Intro` or `#^abc` to an id
    pub fn resolve(&self, hash_path: &str) -> Option<String> {
        let parts: Vec<&str> = hash_path
            .split('#')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        let last = parts.last()?;

        if let Some(block) = last.strip_prefix('^') {
            return Some(format!("blockid-{block}"));
        }

        let wanted: Vec<String> = parts.iter().map(|part| normalize_heading(part)).collect();
        if let Some(id) = find_chain(&self.tree, &wanted) {
            return Some(id.to_string());
        }

        let normalized = wanted.last()?;
        self.header_map
            .contains(normalized)
            .then(|| format!("{normalized}_0"))
    }
}

/// Depth-first search for the first segment, then the rest below it
fn find_chain<'a>(nodes: &'a [HeadingNode], wanted: &[String]) -> Option<&'a str> {
    let (first, rest) = wanted.split_first()?;
    for node in nodes {
        if normalize_heading(&node.text) == *first {
            let found = if rest.is_empty() {
                Some(node.id.as_str())
            } else {
                find_chain(&node.children, rest)
            };
            if found.is_some() {
                return found;
            }
        }
        if let Some(id) = find_chain(&node.children, wanted) {
            return Some(id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn sample() -> DocumentAnchors {
        DocumentAnchors::build([
            ("Intro", 1),
            ("Setup", 1),
            ("Intro", 2),
            ("Details", 3),
            ("Usage", 1),
            ("Intro", 2),
        ])
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading("  Getting Started "), "getting_started");
        assert_eq!(normalize_heading("Note: A  B"), "note_a_b");
        assert_eq!(normalize_heading("a _ b"), "a_b");
    }

    #[test]
    fn test_duplicate_headings_get_increasing_ids() {
        let anchors = sample();
        let ids: Vec<&str> = anchors.ids().collect();
        assert_eq!(
            ids,
            vec!["intro_0", "setup_0", "intro_1", "details_0", "usage_0", "intro_2"]
        );
    }

    #[test]
    fn test_heading_tree_shape() {
        let anchors = sample();
        let tree = anchors.tree();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree[1].text, "Setup");
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(tree[1].children[0].id, "intro_1");
        assert_eq!(tree[1].children[0].children[0].id, "details_0");
        assert_eq!(tree[2].children[0].id, "intro_2");
    }

    #[test]
    fn test_level_skips_attach_to_nearest_parent() {
        let (_, headings) = assign_heading_ids([("A", 3), ("B", 1), ("C", 4), ("D", 2)]);
        let tree = build_heading_tree(&headings);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1].children.len(), 2);
        assert_eq!(tree[1].children[0].text, "C");
        assert_eq!(tree[1].children[1].text, "D");
    }

    #[test]
    fn test_hierarchical_resolution() {
        let anchors = sample();
        assert_eq!(anchors.resolve("Intro").as_deref(), Some("intro_0"));
        assert_eq!(anchors.resolve("Setup#Intro").as_deref(), Some("intro_1"));
        assert_eq!(anchors.resolve("#Usage#Intro").as_deref(), Some("intro_2"));
        assert_eq!(anchors.resolve("Setup#Details").as_deref(), Some("details_0"));
    }

    #[test]
    fn test_chain_backtracks_over_candidates() {
        let anchors = DocumentAnchors::build([("Part", 1), ("Other", 2), ("Part", 1), ("Goal", 2)]);
        assert_eq!(anchors.resolve("Part#Goal").as_deref(), Some("goal_0"));
    }

    #[test]
    fn test_fallback_to_first_occurrence() {
        let anchors = sample();
        // No "Usage" > "Setup" chain exists, last segment still matches
        assert_eq!(anchors.resolve("Usage#Setup").as_deref(), Some("setup_0"));
        assert_eq!(anchors.resolve("Missing"), None);
    }

    #[test]
    fn test_block_reference() {
        let anchors = sample();
        assert_eq!(anchors.resolve("^abc123").as_deref(), Some("blockid-abc123"));
        assert_eq!(anchors.resolve("Intro#^x").as_deref(), Some("blockid-x"));
    }

    #[test]
    fn test_empty_anchor() {
        let anchors = sample();
        assert_eq!(anchors.resolve(""), None);
        assert_eq!(anchors.resolve("##"), None);
        assert_eq!(DocumentAnchors::default().resolve("Intro"), None);
    }

    #[test]
    fn test_from_recorded_reproduces_ids() {
        let anchors = sample();
        let rebuilt = DocumentAnchors::from_recorded(anchors.headings());
        assert_eq!(rebuilt, anchors);
    }

    proptest! {
        #[test]
        fn heading_ids_are_unique(
            headings in proptest::collection::vec(("[a-c _:]{0,6}", 1u8..=6), 0..40)
        ) {
            let anchors = DocumentAnchors::build(headings.iter().map(|(t, l)| (t.as_str(), *l)));
            let mut seen = HashSet::new();
            for id in anchors.ids() {
                prop_assert!(seen.insert(id.to_string()), "duplicate id {}", id);
            }
        }

        #[test]
        fn resolve_never_panics(
            headings in proptest::collection::vec(("[a-c #^]{0,6}", 0u8..=7), 0..20),
            query in ".{0,30}"
        ) {
            let anchors = DocumentAnchors::build(headings.iter().map(|(t, l)| (t.as_str(), *l)));
            let _ = anchors.resolve(&query);
        }
    }
}
