use crate::config::MetricTable;
use crate::document::Document;
use crate::matcher::TextMatcher;
use crate::schema::{MetricKey, MetricValue, YearRecord};
use log::debug;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Snippet,
    Number,
}

/// Result of checking one citation page against the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// The cited page was already inside the document.
    Valid { page: u32 },
    Resolved { from: u32, to: u32, method: MatchMethod },
    /// No page matched; the citation page is reset to 0.
    Unresolved { from: u32 },
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved { .. })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Valid { page } => write!(f, "page {} ok", page),
            Resolution::Resolved { from, to, .. } => write!(f, "page {} -> {}", from, to),
            Resolution::Unresolved { from } => write!(f, "page {} unresolved", from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairEntry {
    pub metric: MetricKey,
    pub resolution: Resolution,
}

impl fmt::Display for RepairEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.resolution)
    }
}

/// Fixes citation pages that are missing or point outside the document.
pub struct PageRepairer<'a> {
    matcher: TextMatcher<'a>,
}

impl<'a> PageRepairer<'a> {
    pub fn new(table: &'a MetricTable) -> Self {
        Self {
            matcher: TextMatcher::new(table),
        }
    }

    /// Repairs every metric of the record whose page is invalid. Metrics that
    /// already cite a valid page are not reported.
    pub fn repair_sources(&self, document: &dyn Document, record: &mut YearRecord) -> Vec<RepairEntry> {
        let page_count = document.page_count();
        let mut entries = Vec::new();

        for key in MetricKey::ALL {
            let metric = record.metric_mut(key);
            if metric.source.has_valid_page(page_count) {
                continue;
            }
            let fallback = metric.value;
            let resolution = self.repair_single_source(document, key, metric, fallback);
            debug!("{} {}: {}", record.year_label, key, resolution);
            entries.push(RepairEntry {
                metric: key,
                resolution,
            });
        }

        entries
    }

    /// Same resolution for one stand-alone metric, e.g. a re-extracted value
    /// that is not part of a record yet. `fallback_value` drives the numeric
    /// search when the snippet does not match.
    pub fn repair_single_source(
        &self,
        document: &dyn Document,
        key: MetricKey,
        metric: &mut MetricValue,
        fallback_value: f64,
    ) -> Resolution {
        let from = metric.source.page;
        if metric.source.has_valid_page(document.page_count()) {
            return Resolution::Valid { page: from };
        }

        let found = self
            .matcher
            .find_page_by_snippet(document, key, &metric.source.snippet)
            .map(|page| (page, MatchMethod::Snippet))
            .or_else(|| {
                self.matcher
                    .find_page_by_number(document, key, fallback_value)
                    .map(|page| (page, MatchMethod::Number))
            });

        match found {
            Some((to, method)) => {
                metric.source.page = to;
                Resolution::Resolved { from, to, method }
            }
            None => {
                metric.source.page = 0;
                Resolution::Unresolved { from }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;
    use crate::schema::SourceRef;

    fn ten_page_document() -> TextDocument {
        let mut pages: Vec<String> = (1..=10).map(|i| format!("Page {} narrative", i)).collect();
        pages[6] = "Consolidated Statement of Profit and Loss\nRevenue from operations 1,234,567".to_string();
        TextDocument::from_pages(pages)
    }

    #[test]
    fn test_missing_page_resolved_by_number() {
        let table = MetricTable::default();
        let repairer = PageRepairer::new(&table);
        let doc = ten_page_document();

        let mut record = YearRecord::default();
        record.revenue = MetricValue::new(1234567.0, SourceRef::new(0, "", ""));

        let entries = repairer.repair_sources(&doc, &mut record);
        assert_eq!(record.revenue.source.page, 7);

        let revenue = entries.iter().find(|e| e.metric == MetricKey::Revenue).unwrap();
        assert_eq!(
            revenue.resolution,
            Resolution::Resolved {
                from: 0,
                to: 7,
                method: MatchMethod::Number
            }
        );
        assert_eq!(revenue.resolution.to_string(), "page 0 -> 7");
    }

    #[test]
    fn test_snippet_takes_precedence_over_number() {
        let table = MetricTable::default();
        let repairer = PageRepairer::new(&table);
        let doc = TextDocument::from_pages([
            "Revenue highlights 500",
            "Revenue from operations for the year 500",
        ]);

        let mut metric = MetricValue::new(
            500.0,
            SourceRef::new(42, "P&L", "Revenue from operations for the year 500"),
        );
        let resolution = repairer.repair_single_source(&doc, MetricKey::Revenue, &mut metric, 500.0);
        assert_eq!(
            resolution,
            Resolution::Resolved {
                from: 42,
                to: 2,
                method: MatchMethod::Snippet
            }
        );
    }

    #[test]
    fn test_unresolved_resets_page() {
        let table = MetricTable::default();
        let repairer = PageRepairer::new(&table);
        let doc = ten_page_document();

        let mut record = YearRecord::default();
        record.ebitda = MetricValue::new(777.0, SourceRef::new(99, "", "EBITDA for the year 777"));

        let entries = repairer.repair_sources(&doc, &mut record);
        let ebitda = entries.iter().find(|e| e.metric == MetricKey::Ebitda).unwrap();
        assert_eq!(ebitda.resolution, Resolution::Unresolved { from: 99 });
        assert_eq!(ebitda.resolution.to_string(), "page 99 unresolved");
        assert_eq!(record.ebitda.source.page, 0);
    }

    #[test]
    fn test_valid_pages_are_left_alone() {
        let table = MetricTable::default();
        let repairer = PageRepairer::new(&table);
        let doc = ten_page_document();

        let mut record = YearRecord::default();
        for key in MetricKey::ALL {
            record.metric_mut(key).source.page = 3;
        }
        assert!(repairer.repair_sources(&doc, &mut record).is_empty());
        assert_eq!(record.revenue.source.page, 3);

        let mut metric = MetricValue::new(1.0, SourceRef::new(5, "", ""));
        assert_eq!(
            repairer.repair_single_source(&doc, MetricKey::Eps, &mut metric, 1.0),
            Resolution::Valid { page: 5 }
        );
    }
}
