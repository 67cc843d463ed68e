//! Page-level search index persisted next to the exported site.

use crate::artifact::WebpageArtifact;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

pub const SEARCH_INDEX_VERSION: u32 = 1;

const SNIPPET_CHARS: usize = 200;

const STOP_WORDS: &[&str] = &[
    "a", "about", "actually", "almost", "also", "although", "always", "am", "an", "and", "any",
    "are", "as", "at", "be", "became", "become", "but", "by", "can", "could", "did", "do", "does",
    "each", "either", "else", "for", "from", "had", "has", "have", "hence", "how", "i", "if", "in",
    "is", "it", "its", "just", "may", "maybe", "me", "might", "mine", "must", "my", "neither",
    "nor", "not", "of", "oh", "ok", "when", "where", "whereas", "wherever", "whenever", "whether",
    "which", "while", "who", "whom", "whoever", "whose", "why", "will", "with", "within",
    "without", "would", "yes", "yet", "you", "your",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Heading texts, minus a leading H1 that repeats the title
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Plain text content
    #[serde(default)]
    pub content: String,
    /// First ~200 chars for preview
    #[serde(default)]
    pub snippet: String,
    /// Hash of the content (for change detection)
    #[serde(default)]
    pub content_hash: String,
}

impl SearchEntry {
    pub fn from_page(page: &WebpageArtifact) -> Self {
        let content = html_to_text(&page.body);

        let mut headings = page.headings.iter().peekable();
        if headings
            .peek()
            .is_some_and(|h| h.level == 1 && h.heading.trim() == page.title.trim())
        {
            headings.next();
        }

        Self {
            path: page.target_path().to_string(),
            title: page.title.clone(),
            aliases: page.aliases.clone(),
            headers: headings.map(|h| h.heading.clone()).collect(),
            tags: page.tags.clone(),
            snippet: create_snippet(&content, SNIPPET_CHARS),
            content_hash: compute_content_hash(&content),
            content,
        }
    }
}

/// A search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub snippet: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, SearchEntry>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self {
            version: SEARCH_INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Insert or replace the entry for a page
    pub fn upsert(&mut self, entry: SearchEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<SearchEntry> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&SearchEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank entries against a free-text query
    ///
    /// Each query term scores 3 in the title, 2 in headers, aliases or
    /// tags and 1 in the path or content. Ties go to the smaller path.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .values()
            .filter_map(|entry| {
                let score = score_entry(entry, &terms);
                (score > 0).then(|| SearchHit {
                    path: entry.path.clone(),
                    title: entry.title.clone(),
                    snippet: entry.snippet.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits.truncate(limit);
        hits
    }
}

fn score_entry(entry: &SearchEntry, terms: &HashSet<String>) -> u32 {
    let fields: [(u32, HashSet<String>); 6] = [
        (3, token_set(&entry.title)),
        (2, token_set(&entry.headers.join(" "))),
        (2, token_set(&entry.aliases.join(" "))),
        (2, token_set(&entry.tags.join(" "))),
        (1, token_set(&entry.path.replace(['/', '-', '_', '.'], " "))),
        (1, token_set(&entry.content)),
    ];

    terms
        .iter()
        .map(|term| {
            fields
                .iter()
                .filter(|(_, tokens)| tokens.contains(term))
                .map(|(weight, _)| weight)
                .sum::<u32>()
        })
        .sum()
}

fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Lower-cased Unicode words with stop words removed
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Strip tags and decode the common entities
pub fn html_to_text(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            result.push(' '); // Add space where tags were
        } else if ch == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag {
            result.push(ch);
        }
    }

    result
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn create_snippet(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    // Find last space within limit
    let truncated: String = chars[..max_chars].iter().collect();
    if let Some(last_space) = truncated.rfind(' ') {
        format!("{}...", &truncated[..last_space])
    } else {
        format!("{}...", truncated)
    }
}

fn compute_content_hash(text: &str) -> String {
    blake3::hash(text.trim().as_bytes()).to_hex().to_string()
}
