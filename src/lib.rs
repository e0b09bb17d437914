//! # Annual Report Reconciler
//!
//! Repairs and cross-checks financial figures that an external extraction
//! oracle (an AI document reader) pulled out of annual reports.
//!
//! ## Core Concepts
//!
//! - **Citations**: every metric carries a page/section/snippet claim that is
//!   checked against the report's own text layer and repaired when it points
//!   nowhere
//! - **Scale correction**: figures reported in base currency units instead of
//!   crores/millions are rescaled
//! - **Targeted re-extraction**: EPS and net worth are re-queried when they look
//!   unreliable, and a replacement is only accepted when its snippet passes
//!   stricter gates
//! - **Cross-year validation**: growth, margins, EPS continuity and implied share
//!   count are compared across consecutive years
//!
//! ## Example
//!
//! ```rust,ignore
//! use annual_report_reconciler::*;
//! use std::path::Path;
//!
//! let reconciler = Reconciler::new(my_oracle, ReconcileConfig::default())?;
//! let path = Path::new("annual_report_2024.pdf");
//! let document = TextDocument::from_pdf(path)?;
//!
//! let outcome = reconciler.process_document(path, &document)?;
//! for finding in reconciler.validate(&outcome.into_records()).findings {
//!     println!("{}", finding);
//! }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod highlight;
pub mod ingestion;
pub mod matcher;
pub mod numeric;
pub mod oracle;
pub mod reextract;
pub mod repair;
pub mod schema;
pub mod units;
pub mod utils;
pub mod validator;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::{MetricSpec, MetricTable, ReconcileConfig, ScaleConfig, ValidationConfig};
pub use document::{AnnotatableDocument, Annotation, Document, Rect, TextDocument};
pub use error::{ReconcileError, Result};
pub use highlight::{HighlightFailure, Highlighter};
pub use ingestion::*;
pub use matcher::{normalize_whitespace, TextMatcher};
pub use oracle::{
    parse_oracle_json, response_schema, EpsResponse, ExtractionOracle, MetricsResponse,
    OracleMetric, OracleSource, PageLocatorResponse, RetryPolicy, SingleMetricResponse,
    YearsResponse,
};
pub use reextract::{
    merge_reextracted_citations, needs_eps_fix, needs_networth_fix, ReextractionOutcome,
    ReextractionReport, ReextractionTarget, TargetedReextractor,
};
pub use repair::{MatchMethod, PageRepairer, RepairEntry, Resolution};
pub use schema::*;
pub use units::normalize_units;
pub use validator::{CheckKind, CrossYearValidator, Finding, Severity, ValidationReport};

use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Everything that happened to one fiscal year on its way to a reconciled
/// record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearOutcome {
    pub record: YearRecord,
    /// Metrics divided down because they looked like base currency units.
    pub rescaled: Vec<MetricKey>,
    /// At most one citation repair per metric. A metric replaced by
    /// re-extraction reports the replacement's citation.
    pub repairs: Vec<RepairEntry>,
    pub reextractions: Vec<ReextractionReport>,
}

impl YearOutcome {
    pub fn unresolved(&self) -> impl Iterator<Item = &RepairEntry> {
        self.repairs.iter().filter(|r| r.resolution.is_unresolved())
    }

    pub fn accepted_reextractions(&self) -> impl Iterator<Item = &ReextractionReport> {
        self.reextractions.iter().filter(|r| r.outcome.is_accepted())
    }
}

/// One report's result. Comparative statements yield one entry per fiscal
/// year column, in the order the oracle returned them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOutcome {
    pub years: Vec<YearOutcome>,
}

impl DocumentOutcome {
    pub fn records(&self) -> impl Iterator<Item = &YearRecord> {
        self.years.iter().map(|y| &y.record)
    }

    pub fn into_records(self) -> Vec<YearRecord> {
        self.years.into_iter().map(|y| y.record).collect()
    }
}

pub struct Reconciler<O: ExtractionOracle> {
    oracle: O,
    config: ReconcileConfig,
}

impl<O: ExtractionOracle> Reconciler<O> {
    pub fn new(oracle: O, config: ReconcileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { oracle, config })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Extracts, rescales, repairs and re-extracts one report, once per
    /// fiscal year the oracle returned.
    ///
    /// Only a failure of the main extraction call is returned as an error;
    /// every later step degrades to "no change" and is reported in the outcome.
    pub fn process_document(&self, source: &Path, document: &dyn Document) -> Result<DocumentOutcome> {
        info!(
            "Processing {} ({} pages)",
            source.display(),
            document.page_count()
        );

        let mut responses = self.extract_metrics(source, document)?.into_years();
        if responses.is_empty() {
            warn!("No fiscal year in the extraction for {}", source.display());
            responses.push(MetricsResponse::default());
        }
        if responses.len() > 1 {
            info!("{}: {} fiscal years reported", source.display(), responses.len());
        }

        let years = responses
            .into_iter()
            .map(|response| self.process_year(source, document, response))
            .collect();
        Ok(DocumentOutcome { years })
    }

    fn process_year(&self, source: &Path, document: &dyn Document, response: MetricsResponse) -> YearOutcome {
        let mut record = year_record_from_response(response);

        let rescaled = normalize_units(&mut record, &self.config.scale);
        if !rescaled.is_empty() {
            debug!("{}: rescaled {:?}", record.year_label, rescaled);
        }

        let repairer = PageRepairer::new(&self.config.metrics);
        let mut repairs = repairer.repair_sources(document, &mut record);
        let fixed = repairs.iter().filter(|r| r.resolution.is_resolved()).count();
        if fixed > 0 {
            info!("{}: repaired {} citation pages", record.year_label, fixed);
        }

        let reextractor = TargetedReextractor::new(&self.config);
        let mut reextractions = vec![
            reextractor.repair_eps(&self.oracle, source, document, &mut record),
            reextractor.repair_networth(&self.oracle, source, document, &mut record),
        ];
        merge_reextracted_citations(&mut repairs, &reextractions);

        reextractions.push(reextractor.attach_pat_attributable(
            &self.oracle,
            source,
            document,
            &mut record,
        ));

        info!(
            "{}: {} of {} metrics filled, {} unresolved citations",
            record.year_label,
            record.filled_metric_count(),
            MetricKey::ALL.len(),
            repairs.iter().filter(|r| r.resolution.is_unresolved()).count()
        );

        YearOutcome {
            record,
            rescaled,
            repairs,
            reextractions,
        }
    }

    /// Two-step extraction: locate the statement pages, then extract with the
    /// located pages as focus. Falls back to a whole-document extraction when
    /// location finds nothing or the focused call fails.
    fn extract_metrics(&self, source: &Path, document: &dyn Document) -> Result<YearsResponse> {
        let focus = match self.oracle.locate_pages(source) {
            Ok(located) => located.focus_pages(document.page_count()),
            Err(e) => {
                warn!("Page location failed for {}: {}", source.display(), e);
                Vec::new()
            }
        };

        if focus.is_empty() {
            return self.oracle.extract_metrics(source, &[]);
        }

        debug!("Focus pages for {}: {:?}", source.display(), focus);
        match self.oracle.extract_metrics(source, &focus) {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(
                    "Focused extraction failed for {} ({}); retrying on the full document",
                    source.display(),
                    e
                );
                self.oracle.extract_metrics(source, &[])
            }
        }
    }

    /// Processes reports one after another. A failing report does not stop
    /// the others.
    pub fn process_batch<D, F>(
        &self,
        sources: &[PathBuf],
        mut open: F,
    ) -> Vec<(PathBuf, Result<DocumentOutcome>)>
    where
        D: Document,
        F: FnMut(&Path) -> Result<D>,
    {
        sources
            .iter()
            .map(|source| {
                let outcome = open(source).and_then(|document| self.process_document(source, &document));
                if let Err(e) = &outcome {
                    warn!("Skipping {}: {}", source.display(), e);
                }
                (source.clone(), outcome)
            })
            .collect()
    }

    pub fn validate(&self, years: &[YearRecord]) -> ValidationReport {
        validate_years(years, &self.config)
    }

    pub fn highlight(
        &self,
        document: &mut dyn AnnotatableDocument,
        record: &YearRecord,
    ) -> Vec<HighlightFailure> {
        let failures = Highlighter::new(&self.config.metrics).highlight_record(document, record);
        for failure in &failures {
            debug!("{}: highlight {}", record.year_label, failure);
        }
        failures
    }
}

/// Runs every cross-year check over the records, ordered by year label.
pub fn validate_years(years: &[YearRecord], config: &ReconcileConfig) -> ValidationReport {
    let report = CrossYearValidator::new(&config.validation, &config.scale).validate(years);
    info!(
        "Validated {} years: {} findings, {} warnings",
        years.len(),
        report.findings.len(),
        report.warnings().count()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOracle {
        metrics: YearsResponse,
        locate_fails: bool,
    }

    impl ExtractionOracle for FixedOracle {
        fn locate_pages(&self, _source: &Path) -> Result<PageLocatorResponse> {
            if self.locate_fails {
                return Err(ReconcileError::OracleFailed("locator offline".to_string()));
            }
            Ok(PageLocatorResponse {
                income_statement_pages: vec![2],
                ..Default::default()
            })
        }

        fn extract_metrics(&self, _source: &Path, focus_pages: &[u32]) -> Result<YearsResponse> {
            if !focus_pages.is_empty() && focus_pages != [1, 2, 3] {
                return Err(ReconcileError::OracleFailed(format!(
                    "unexpected focus {:?}",
                    focus_pages
                )));
            }
            Ok(self.metrics.clone())
        }

        fn extract_eps(&self, _source: &Path, _year_label: &str) -> Result<EpsResponse> {
            Err(ReconcileError::OracleFailed("no eps".to_string()))
        }

        fn extract_networth(&self, _source: &Path, year_label: &str) -> Result<SingleMetricResponse> {
            if year_label == "2023" {
                return Ok(parse_oracle_json(
                    r#"{"value": 700, "source": {"page": 99, "section": "BS", "snippet": "Total equity 700"}}"#,
                ));
            }
            Ok(SingleMetricResponse::default())
        }

        fn extract_pat_attributable(&self, _source: &Path, _year_label: &str) -> Result<SingleMetricResponse> {
            Ok(parse_oracle_json(
                r#"{"value": "42", "source": {"page": 2, "section": "P&L", "snippet": "Owners of the Company 42"}}"#,
            ))
        }
    }

    fn metrics() -> YearsResponse {
        parse_oracle_json(
            r#"```json
            {"year_label": "FY2024", "year_end": "31 March 2024",
             "revenue": {"value": 12000000000, "source": {"page": 9, "section": "P&L", "snippet": "Revenue from operations 1,200"}},
             "pat": {"value": 50, "source": {"page": 2, "section": "P&L", "snippet": "Profit for the year 50"}}}
            ```"#,
        )
    }

    fn document() -> TextDocument {
        TextDocument::from_pages([
            "Chairman's letter",
            "Statement of Profit and Loss\nRevenue from operations 1,200\nProfit for the year 50\nAttributable to Owners of the Company 42",
            "Balance sheet",
        ])
    }

    #[test]
    fn test_process_document_end_to_end() {
        let oracle = FixedOracle {
            metrics: metrics(),
            locate_fails: false,
        };
        let reconciler = Reconciler::new(oracle, ReconcileConfig::default()).unwrap();
        let doc = document();

        let outcome = reconciler
            .process_document(Path::new("report.pdf"), &doc)
            .unwrap();
        assert_eq!(outcome.years.len(), 1);
        let outcome = &outcome.years[0];

        assert_eq!(outcome.record.year_label, "2024");
        assert_eq!(outcome.rescaled, vec![MetricKey::Revenue]);
        assert!((outcome.record.revenue.value - 1200.0).abs() < 1e-9);
        assert_eq!(outcome.record.revenue.source.page, 2);
        assert_eq!(outcome.record.pat_attrib_value(), 42.0);

        let targets: Vec<ReextractionTarget> =
            outcome.reextractions.iter().map(|r| r.target).collect();
        assert_eq!(
            targets,
            vec![
                ReextractionTarget::Eps,
                ReextractionTarget::Networth,
                ReextractionTarget::PatAttributable
            ]
        );
        assert!(matches!(
            outcome.reextractions[0].outcome,
            ReextractionOutcome::Unavailable { .. }
        ));
        assert!(matches!(
            outcome.reextractions[1].outcome,
            ReextractionOutcome::Rejected { .. }
        ));
        assert_eq!(outcome.accepted_reextractions().count(), 1);
    }

    #[test]
    fn test_locator_failure_falls_back_to_full_extraction() {
        let oracle = FixedOracle {
            metrics: metrics(),
            locate_fails: true,
        };
        let reconciler = Reconciler::new(oracle, ReconcileConfig::default()).unwrap();
        let outcome = reconciler
            .process_document(Path::new("report.pdf"), &document())
            .unwrap();
        assert_eq!(outcome.years[0].record.pat.value, 50.0);
    }

    #[test]
    fn test_empty_extraction_degrades_to_one_zero_year() {
        let oracle = FixedOracle {
            metrics: YearsResponse::default(),
            locate_fails: false,
        };
        let reconciler = Reconciler::new(oracle, ReconcileConfig::default()).unwrap();
        let outcome = reconciler
            .process_document(Path::new("report.pdf"), &document())
            .unwrap();
        assert_eq!(outcome.years.len(), 1);
        assert_eq!(outcome.years[0].record.filled_metric_count(), 0);
    }

    #[test]
    fn test_comparative_years_keep_one_repair_entry_per_metric() {
        let oracle = FixedOracle {
            metrics: parse_oracle_json(
                r#"[{"year_label": "FY2024", "pat": {"value": 50, "source": {"page": 2, "snippet": "Profit for the year 50"}}},
                    {"year_label": "FY2023", "networth": {"value": 650, "source": {"page": 99, "snippet": "Other equity 650"}}}]"#,
            ),
            locate_fails: false,
        };
        let reconciler = Reconciler::new(oracle, ReconcileConfig::default()).unwrap();
        let outcome = reconciler
            .process_document(Path::new("report.pdf"), &document())
            .unwrap();

        let labels: Vec<&str> = outcome.records().map(|r| r.year_label.as_str()).collect();
        assert_eq!(labels, vec!["2024", "2023"]);

        let prior = &outcome.years[1];
        assert_eq!(prior.record.networth.value, 700.0);
        assert!(prior.reextractions[1].outcome.is_accepted());
        let networth_entries: Vec<&RepairEntry> = prior
            .repairs
            .iter()
            .filter(|r| r.metric == MetricKey::Networth)
            .collect();
        assert_eq!(networth_entries.len(), 1);
        assert_eq!(
            networth_entries[0].resolution,
            Resolution::Unresolved { from: 99 }
        );
        for key in MetricKey::ALL {
            assert!(prior.repairs.iter().filter(|r| r.metric == key).count() <= 1);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ReconcileConfig::default();
        config.scale.crore_to_base = 0.0;
        let oracle = FixedOracle {
            metrics: YearsResponse::default(),
            locate_fails: false,
        };
        assert!(matches!(
            Reconciler::new(oracle, config),
            Err(ReconcileError::InvalidConfig(_))
        ));
    }
}
