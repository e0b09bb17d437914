use crate::config::MetricTable;
use crate::document::Document;
use crate::numeric::format_groupings;
use crate::schema::{truncate_chars, MetricKey};
use log::debug;

/// Snippets shorter than this match too many pages to be useful.
const MIN_SNIPPET_CHARS: usize = 10;

/// Prefix lengths tried when an oracle snippet drifts from the page text.
const SNIPPET_PREFIXES: [usize; 3] = [160, 120, 80];

/// Collapses whitespace runs to single spaces, expands the ellipsis
/// character and trims.
pub fn normalize_whitespace(s: &str) -> String {
    s.replace('…', "...")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Descending prefixes of an already-normalized snippet: the whole string,
/// then its first 160/120/80 characters where it is longer than that.
pub fn snippet_prefixes(snippet: &str, lengths: &[usize]) -> Vec<String> {
    let total = snippet.chars().count();
    let mut prefixes = vec![snippet.to_string()];
    for &len in lengths {
        if total > len {
            prefixes.push(truncate_chars(snippet, len).to_string());
        }
    }
    prefixes
}

pub struct TextMatcher<'a> {
    table: &'a MetricTable,
}

impl<'a> TextMatcher<'a> {
    pub fn new(table: &'a MetricTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &MetricTable {
        self.table
    }

    /// Keyword and anchor gating of a page for one metric.
    ///
    /// A PAT snippet that talks about owners / attributable profit is only
    /// allowed on a page that does too, so the group-level profit line is not
    /// cited in its place.
    pub fn page_satisfies_metric(&self, key: MetricKey, page_text: &str, snippet: &str) -> bool {
        let text = normalize_whitespace(page_text).to_lowercase();

        let keywords = self.table.keywords(key);
        if !keywords.is_empty() && !keywords.iter().any(|k| text.contains(&k.to_lowercase())) {
            return false;
        }

        let anchors = self.table.anchors(key);
        if !anchors.is_empty() && !anchors.iter().any(|a| text.contains(&a.to_lowercase())) {
            return false;
        }

        if key == MetricKey::Pat {
            let snippet = normalize_whitespace(snippet).to_lowercase();
            let wants_owners = snippet.contains("owners") || snippet.contains("attributable");
            let has_owners = text.contains("owners") || text.contains("attributable");
            if wants_owners && !has_owners {
                return false;
            }
        }

        true
    }

    /// First gated page containing the snippet, or one of its prefixes, verbatim.
    pub fn find_page_by_snippet(
        &self,
        document: &dyn Document,
        key: MetricKey,
        snippet: &str,
    ) -> Option<u32> {
        let snippet = normalize_whitespace(snippet);
        if snippet.chars().count() < MIN_SNIPPET_CHARS {
            return None;
        }
        let prefixes = snippet_prefixes(&snippet, &SNIPPET_PREFIXES);

        for page in 1..=document.page_count() {
            let Some(page_text) = document.page_text(page) else {
                continue;
            };
            if !self.page_satisfies_metric(key, page_text, &snippet) {
                continue;
            }
            let text = normalize_whitespace(page_text);
            if prefixes.iter().any(|p| text.contains(p.as_str())) {
                debug!("{}: snippet matched on page {}", key, page);
                return Some(page);
            }
        }
        None
    }

    /// First gated page containing any printed rendering of `value`.
    pub fn find_page_by_number(
        &self,
        document: &dyn Document,
        key: MetricKey,
        value: f64,
    ) -> Option<u32> {
        if value == 0.0 {
            return None;
        }
        let candidates = format_groupings(value);

        for page in 1..=document.page_count() {
            let Some(page_text) = document.page_text(page) else {
                continue;
            };
            if !self.page_satisfies_metric(key, page_text, "") {
                continue;
            }
            if let Some(hit) = candidates.iter().find(|c| page_text.contains(c.as_str())) {
                debug!("{}: value {} matched as '{}' on page {}", key, value, hit, page);
                return Some(page);
            }
        }
        None
    }
}
