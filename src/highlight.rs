use crate::config::MetricTable;
use crate::document::{AnnotatableDocument, Rect};
use crate::error::Result;
use crate::matcher::{normalize_whitespace, snippet_prefixes};
use crate::numeric::highlight_candidates;
use crate::schema::{MetricKey, YearRecord};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

const SNIPPET_PREFIXES: [usize; 3] = [140, 100, 70];
const MAX_BAND_MATCHES: usize = 6;
const BAND_ABOVE: f64 = 12.0;
const BAND_BELOW: f64 = 14.0;
const LABEL_X: f64 = 36.0;
const LABEL_Y: f64 = 36.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HighlightFailure {
    InvalidPage { metric: MetricKey },
    NotFound { metric: MetricKey, page: u32 },
}

impl fmt::Display for HighlightFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightFailure::InvalidPage { metric } => write!(f, "{}: invalid page", metric),
            HighlightFailure::NotFound { metric, page } => {
                write!(f, "{}: not found on page {}", metric, page)
            }
        }
    }
}

/// Marks every cited metric on its page of an annotatable copy.
///
/// Lookup order per metric: snippet and its prefixes, printed renderings of
/// the value, then a band around the first metric keyword found.
pub struct Highlighter<'a> {
    table: &'a MetricTable,
}

impl<'a> Highlighter<'a> {
    pub fn new(table: &'a MetricTable) -> Self {
        Self { table }
    }

    pub fn highlight_record(
        &self,
        document: &mut dyn AnnotatableDocument,
        record: &YearRecord,
    ) -> Vec<HighlightFailure> {
        let page_count = document.page_count();
        let mut failures = Vec::new();

        for key in MetricKey::ALL {
            let metric = record.metric(key);
            let page = metric.source.page;
            if !metric.source.has_valid_page(page_count) {
                failures.push(HighlightFailure::InvalidPage { metric: key });
                continue;
            }

            match self.highlight_metric(document, page, key, &metric.source.snippet, metric.value) {
                Ok(true) => {}
                Ok(false) => failures.push(HighlightFailure::NotFound { metric: key, page }),
                Err(e) => {
                    warn!("Highlighting {} on page {} failed: {}", key, page, e);
                    failures.push(HighlightFailure::NotFound { metric: key, page });
                }
            }

            let label = format!(
                "{} • {} • {}",
                record.year_label,
                key,
                normalize_whitespace(&metric.source.section)
            );
            if let Err(e) = document.insert_text(page, LABEL_X, LABEL_Y, &label) {
                debug!("Label for {} on page {} skipped: {}", key, page, e);
            }
        }

        failures
    }

    /// Returns whether anything was highlighted for the metric.
    fn highlight_metric(
        &self,
        document: &mut dyn AnnotatableDocument,
        page: u32,
        key: MetricKey,
        snippet: &str,
        value: f64,
    ) -> Result<bool> {
        let snippet = normalize_whitespace(snippet);
        if !snippet.is_empty() {
            for query in snippet_prefixes(&snippet, &SNIPPET_PREFIXES) {
                if highlight_all(document, page, &query)? {
                    return Ok(true);
                }
            }
        }

        for candidate in highlight_candidates(value) {
            if highlight_all(document, page, &candidate)? {
                return Ok(true);
            }
        }

        self.highlight_keyword_band(document, page, key)
    }

    fn highlight_keyword_band(
        &self,
        document: &mut dyn AnnotatableDocument,
        page: u32,
        key: MetricKey,
    ) -> Result<bool> {
        let Some(bounds) = document.page_bounds(page) else {
            return Ok(false);
        };

        for keyword in self.table.keywords(key) {
            let rects = document.search_for(page, keyword);
            if rects.is_empty() {
                continue;
            }
            for rect in rects.into_iter().take(MAX_BAND_MATCHES) {
                let band = Rect::new(
                    rect.x0,
                    (rect.y0 - BAND_ABOVE).max(0.0),
                    bounds.x1,
                    (rect.y1 + BAND_BELOW).min(bounds.y1),
                );
                document.add_highlight(page, band)?;
            }
            return Ok(true);
        }
        Ok(false)
    }
}

fn highlight_all(document: &mut dyn AnnotatableDocument, page: u32, query: &str) -> Result<bool> {
    let rects = document.search_for(page, query);
    if rects.is_empty() {
        return Ok(false);
    }
    for rect in rects {
        document.add_highlight(page, rect)?;
    }
    Ok(true)
}
