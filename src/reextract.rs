use crate::config::ReconcileConfig;
use crate::document::Document;
use crate::matcher::normalize_whitespace;
use crate::oracle::{EpsResponse, ExtractionOracle, SingleMetricResponse};
use crate::repair::{PageRepairer, RepairEntry, Resolution};
use crate::schema::{EpsBasis, EpsScope, MetricKey, MetricValue, YearRecord};
use crate::units::{rescale_currency, rescale_eps};
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReextractionTarget {
    Eps,
    Networth,
    PatAttributable,
}

impl ReextractionTarget {
    /// The record metric an accepted candidate overwrites. Attributable
    /// profit is attached alongside PAT and overwrites nothing.
    pub fn replaced_metric(&self) -> Option<MetricKey> {
        match self {
            ReextractionTarget::Eps => Some(MetricKey::Eps),
            ReextractionTarget::Networth => Some(MetricKey::Networth),
            ReextractionTarget::PatAttributable => None,
        }
    }
}

impl fmt::Display for ReextractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReextractionTarget::Eps => "eps",
            ReextractionTarget::Networth => "networth",
            ReextractionTarget::PatAttributable => "pat_attrib_owners",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReextractionOutcome {
    /// The existing value passed its checks; the oracle was not asked.
    NotNeeded,
    Accepted { value: f64, citation: Resolution },
    /// The candidate failed gating; the original value is kept.
    Rejected { reason: String },
    /// The oracle call failed; the original value is kept.
    Unavailable { reason: String },
}

impl ReextractionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ReextractionOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReextractionReport {
    pub target: ReextractionTarget,
    pub outcome: ReextractionOutcome,
}

/// Replaces the citation entries of every metric overwritten by an accepted
/// re-extraction with the candidate's own resolution, so each metric is
/// reported at most once.
pub fn merge_reextracted_citations(repairs: &mut Vec<RepairEntry>, reextractions: &[ReextractionReport]) {
    for report in reextractions {
        let (Some(metric), ReextractionOutcome::Accepted { citation, .. }) =
            (report.target.replaced_metric(), &report.outcome)
        else {
            continue;
        };
        repairs.retain(|entry| entry.metric != metric);
        if !matches!(citation, Resolution::Valid { .. }) {
            repairs.push(RepairEntry {
                metric,
                resolution: citation.clone(),
            });
        }
    }
}

fn lower_snippet(snippet: &str) -> String {
    normalize_whitespace(snippet).to_lowercase()
}

pub fn snippet_has_total_equity(snippet: &str) -> bool {
    lower_snippet(snippet).contains("total equity")
}

/// "Equity share capital" or "other equity": a balance sheet line that is
/// only a component of net worth.
pub fn snippet_looks_like_components(snippet: &str) -> bool {
    let s = lower_snippet(snippet);
    s.contains("equity share capital") || s.contains("other equity")
}

pub fn eps_snippet_names_basis(snippet: &str) -> bool {
    let s = lower_snippet(snippet);
    s.contains("basic") || s.contains("diluted")
}

pub fn eps_snippet_is_diluted_only(snippet: &str) -> bool {
    let s = lower_snippet(snippet);
    s.contains("diluted") && !s.contains("basic")
}

/// EPS needs a focused re-query when it is missing, carries no basis label,
/// or is labelled diluted without basic.
pub fn needs_eps_fix(record: &YearRecord) -> bool {
    let snippet = &record.eps.source.snippet;
    record.eps.value <= 0.0
        || !eps_snippet_names_basis(snippet)
        || eps_snippet_is_diluted_only(snippet)
}

/// Net worth needs a focused re-query when it is missing or the citation is
/// not the Total Equity line.
pub fn needs_networth_fix(record: &YearRecord) -> bool {
    let snippet = &record.networth.source.snippet;
    record.networth.value <= 0.0
        || (snippet_looks_like_components(snippet) && !snippet_has_total_equity(snippet))
        || !snippet_has_total_equity(snippet)
}

/// Focused re-extraction of the fields the full extraction gets wrong most
/// often. Replacements are only accepted after stricter gating than the
/// original value had to pass.
pub struct TargetedReextractor<'a> {
    config: &'a ReconcileConfig,
    repairer: PageRepairer<'a>,
}

impl<'a> TargetedReextractor<'a> {
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self {
            config,
            repairer: PageRepairer::new(&config.metrics),
        }
    }

    pub fn repair_eps(
        &self,
        oracle: &dyn ExtractionOracle,
        source: &Path,
        document: &dyn Document,
        record: &mut YearRecord,
    ) -> ReextractionReport {
        let outcome = if !needs_eps_fix(record) {
            ReextractionOutcome::NotNeeded
        } else {
            info!(
                "{}: EPS missing, unlabelled or diluted-only; re-querying EPS",
                record.year_label
            );
            match oracle.extract_eps(source, &record.year_label) {
                Ok(response) => self.apply_eps_response(document, record, response),
                Err(e) => unavailable(ReextractionTarget::Eps, &record.year_label, e),
            }
        };
        report(ReextractionTarget::Eps, &record.year_label, outcome)
    }

    /// Gates an EPS-only response and, when it passes, replaces the record's
    /// EPS together with its basis and scope.
    pub fn apply_eps_response(
        &self,
        document: &dyn Document,
        record: &mut YearRecord,
        response: EpsResponse,
    ) -> ReextractionOutcome {
        let raw_value = response.value;
        let basis = EpsBasis::from_label(&response.basis);
        let scope = EpsScope::from_label(&response.scope);

        let mut candidate = MetricValue::new(rescale_eps(raw_value, &self.config.scale), response.source.into());
        let fallback = candidate.value;
        let citation = self
            .repairer
            .repair_single_source(document, MetricKey::Eps, &mut candidate, fallback);

        if raw_value <= 0.0 {
            return rejected(format!("non-positive EPS {}", raw_value));
        }

        let snippet = lower_snippet(&candidate.source.snippet);
        if !snippet.contains("basic") && !snippet.contains("diluted") {
            return rejected("snippet names neither basic nor diluted EPS".to_string());
        }

        match scope {
            EpsScope::Total if !snippet.contains("continuing and discontinued") => {
                return rejected(
                    "total scope without 'continuing and discontinued' in snippet".to_string(),
                );
            }
            EpsScope::Continuing if !snippet.contains("continuing") => {
                return rejected("continuing scope without 'continuing' in snippet".to_string());
            }
            _ => {}
        }

        let value = candidate.value;
        record.eps = candidate;
        record.eps_basis = basis;
        record.eps_scope = scope;
        ReextractionOutcome::Accepted { value, citation }
    }

    pub fn repair_networth(
        &self,
        oracle: &dyn ExtractionOracle,
        source: &Path,
        document: &dyn Document,
        record: &mut YearRecord,
    ) -> ReextractionReport {
        let outcome = if !needs_networth_fix(record) {
            ReextractionOutcome::NotNeeded
        } else {
            info!(
                "{}: net worth missing or not the Total Equity line; re-querying net worth",
                record.year_label
            );
            match oracle.extract_networth(source, &record.year_label) {
                Ok(response) => self.apply_networth_response(document, record, response),
                Err(e) => unavailable(ReextractionTarget::Networth, &record.year_label, e),
            }
        };
        report(ReextractionTarget::Networth, &record.year_label, outcome)
    }

    pub fn apply_networth_response(
        &self,
        document: &dyn Document,
        record: &mut YearRecord,
        response: SingleMetricResponse,
    ) -> ReextractionOutcome {
        let mut candidate: MetricValue = response.into();
        candidate.value = rescale_currency(candidate.value, &self.config.scale);
        let fallback = candidate.value;
        let citation =
            self.repairer
                .repair_single_source(document, MetricKey::Networth, &mut candidate, fallback);

        if candidate.value <= 0.0 {
            return rejected(format!("non-positive net worth {}", candidate.value));
        }
        if !snippet_has_total_equity(&candidate.source.snippet) {
            return rejected("snippet does not contain 'total equity'".to_string());
        }

        let value = candidate.value;
        record.networth = candidate;
        ReextractionOutcome::Accepted { value, citation }
    }

    /// Always attempted. The result is attached as a derived field and never
    /// replaces the primary PAT figure.
    pub fn attach_pat_attributable(
        &self,
        oracle: &dyn ExtractionOracle,
        source: &Path,
        document: &dyn Document,
        record: &mut YearRecord,
    ) -> ReextractionReport {
        let outcome = match oracle.extract_pat_attributable(source, &record.year_label) {
            Ok(response) => self.apply_pat_attributable_response(document, record, response),
            Err(e) => unavailable(ReextractionTarget::PatAttributable, &record.year_label, e),
        };
        report(ReextractionTarget::PatAttributable, &record.year_label, outcome)
    }

    pub fn apply_pat_attributable_response(
        &self,
        document: &dyn Document,
        record: &mut YearRecord,
        response: SingleMetricResponse,
    ) -> ReextractionOutcome {
        let mut candidate: MetricValue = response.into();
        candidate.value = rescale_currency(candidate.value, &self.config.scale);
        if candidate.value <= 0.0 {
            return rejected(format!(
                "non-positive attributable profit {}",
                candidate.value
            ));
        }

        let fallback = candidate.value;
        let citation = self
            .repairer
            .repair_single_source(document, MetricKey::Pat, &mut candidate, fallback);
        let value = candidate.value;
        record.pat_attrib_owners = Some(candidate);
        ReextractionOutcome::Accepted { value, citation }
    }
}

fn rejected(reason: String) -> ReextractionOutcome {
    ReextractionOutcome::Rejected { reason }
}

fn unavailable(
    target: ReextractionTarget,
    year_label: &str,
    error: crate::error::ReconcileError,
) -> ReextractionOutcome {
    warn!("{}: {} re-query failed (non-fatal): {}", year_label, target, error);
    ReextractionOutcome::Unavailable {
        reason: error.to_string(),
    }
}

fn report(
    target: ReextractionTarget,
    year_label: &str,
    outcome: ReextractionOutcome,
) -> ReextractionReport {
    match &outcome {
        ReextractionOutcome::Accepted { value, citation } => {
            info!("{}: {} replaced with {} ({})", year_label, target, value, citation)
        }
        ReextractionOutcome::Rejected { reason } => {
            info!("{}: {} candidate rejected: {}", year_label, target, reason)
        }
        _ => {}
    }
    ReextractionReport { target, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;
    use crate::oracle::OracleSource;
    use crate::schema::SourceRef;

    fn document() -> TextDocument {
        TextDocument::from_pages([
            "Notes to accounts",
            "Earnings per equity share (face value 1 each)\nBasic EPS: 5.20, Continuing and Discontinued operations\nDiluted 5.10",
            "Consolidated Balance Sheet\nEquity share capital 100\nOther equity 800\nTotal equity 900",
            "Profit for the year 500\nProfit attributable to Owners of the Company 480",
        ])
    }

    fn source(page: u32, snippet: &str) -> OracleSource {
        OracleSource {
            page,
            section: String::new(),
            snippet: snippet.to_string(),
        }
    }

    fn record_with_eps(value: f64, snippet: &str) -> YearRecord {
        YearRecord {
            year_label: "2024".to_string(),
            eps: MetricValue::new(value, SourceRef::new(2, "", snippet)),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_keeps_one_entry_per_metric() {
        let mut repairs = vec![
            RepairEntry {
                metric: MetricKey::Revenue,
                resolution: Resolution::Unresolved { from: 40 },
            },
            RepairEntry {
                metric: MetricKey::Eps,
                resolution: Resolution::Unresolved { from: 99 },
            },
            RepairEntry {
                metric: MetricKey::Networth,
                resolution: Resolution::Unresolved { from: 77 },
            },
        ];
        let reextractions = vec![
            ReextractionReport {
                target: ReextractionTarget::Eps,
                outcome: ReextractionOutcome::Accepted {
                    value: 5.2,
                    citation: Resolution::Unresolved { from: 0 },
                },
            },
            ReextractionReport {
                target: ReextractionTarget::Networth,
                outcome: ReextractionOutcome::Accepted {
                    value: 900.0,
                    citation: Resolution::Valid { page: 3 },
                },
            },
            ReextractionReport {
                target: ReextractionTarget::PatAttributable,
                outcome: ReextractionOutcome::Accepted {
                    value: 480.0,
                    citation: Resolution::Unresolved { from: 0 },
                },
            },
        ];

        merge_reextracted_citations(&mut repairs, &reextractions);

        assert_eq!(
            repairs,
            vec![
                RepairEntry {
                    metric: MetricKey::Revenue,
                    resolution: Resolution::Unresolved { from: 40 },
                },
                RepairEntry {
                    metric: MetricKey::Eps,
                    resolution: Resolution::Unresolved { from: 0 },
                },
            ]
        );
    }

    #[test]
    fn test_rejected_candidate_keeps_original_entry() {
        let mut repairs = vec![RepairEntry {
            metric: MetricKey::Eps,
            resolution: Resolution::Unresolved { from: 99 },
        }];
        let before = repairs.clone();
        merge_reextracted_citations(
            &mut repairs,
            &[ReextractionReport {
                target: ReextractionTarget::Eps,
                outcome: ReextractionOutcome::Rejected {
                    reason: "no basis".to_string(),
                },
            }],
        );
        assert_eq!(repairs, before);
    }

    #[test]
    fn test_needs_eps_fix() {
        assert!(needs_eps_fix(&record_with_eps(5.2, "Diluted EPS: 5.20")));
        assert!(needs_eps_fix(&record_with_eps(0.0, "Basic EPS: 5.20")));
        assert!(needs_eps_fix(&record_with_eps(5.2, "EPS 5.20")));
        assert!(!needs_eps_fix(&record_with_eps(5.2, "Basic and Diluted EPS 5.20")));
        assert!(!needs_eps_fix(&record_with_eps(5.2, "Basic EPS: 5.20")));
    }

    #[test]
    fn test_needs_networth_fix() {
        let mut record = YearRecord::default();
        record.networth = MetricValue::new(800.0, SourceRef::new(3, "", "Other equity 800"));
        assert!(needs_networth_fix(&record));

        record.networth = MetricValue::new(900.0, SourceRef::new(3, "", "Total Equity 900"));
        assert!(!needs_networth_fix(&record));

        record.networth = MetricValue::new(0.0, SourceRef::new(3, "", "Total Equity 0"));
        assert!(needs_networth_fix(&record));
    }

    #[test]
    fn test_eps_replacement_accepted() {
        let config = ReconcileConfig::default();
        let reextractor = TargetedReextractor::new(&config);
        let doc = document();
        let mut record = record_with_eps(5.1, "Diluted EPS: 5.10");

        let outcome = reextractor.apply_eps_response(
            &doc,
            &mut record,
            EpsResponse {
                value: 5.2,
                basis: "basic".to_string(),
                scope: "total".to_string(),
                source: source(0, "Basic EPS: 5.20, Continuing and Discontinued operations"),
            },
        );

        assert!(outcome.is_accepted());
        assert_eq!(record.eps.value, 5.2);
        assert_eq!(record.eps.source.page, 2);
        assert_eq!(record.eps_basis, EpsBasis::Basic);
        assert_eq!(record.eps_scope, EpsScope::Total);
    }

    #[test]
    fn test_eps_replacement_rejected_without_scope_phrase() {
        let config = ReconcileConfig::default();
        let reextractor = TargetedReextractor::new(&config);
        let doc = document();
        let mut record = record_with_eps(5.1, "Diluted EPS: 5.10");
        let before = record.clone();

        let outcome = reextractor.apply_eps_response(
            &doc,
            &mut record,
            EpsResponse {
                value: 5.2,
                basis: "basic".to_string(),
                scope: "total".to_string(),
                source: source(2, "Basic EPS: 5.20"),
            },
        );

        assert!(matches!(outcome, ReextractionOutcome::Rejected { .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn test_eps_continuing_scope() {
        let config = ReconcileConfig::default();
        let reextractor = TargetedReextractor::new(&config);
        let doc = document();
        let mut record = record_with_eps(0.0, "");

        let outcome = reextractor.apply_eps_response(
            &doc,
            &mut record,
            EpsResponse {
                value: 4.8,
                basis: "diluted".to_string(),
                scope: "continuing".to_string(),
                source: source(2, "Diluted EPS from continuing operations 4.80"),
            },
        );
        assert!(outcome.is_accepted());
        assert_eq!(record.eps_basis, EpsBasis::Diluted);
        assert_eq!(record.eps_scope, EpsScope::Continuing);
    }

    #[test]
    fn test_eps_rescaled_before_acceptance() {
        let config = ReconcileConfig::default();
        let reextractor = TargetedReextractor::new(&config);
        let doc = document();
        let mut record = record_with_eps(0.0, "");

        let outcome = reextractor.apply_eps_response(
            &doc,
            &mut record,
            EpsResponse {
                value: 52_000_000.0,
                basis: String::new(),
                scope: String::new(),
                source: source(2, "Basic EPS: 5.20, Continuing and Discontinued operations"),
            },
        );
        assert!(outcome.is_accepted());
        assert!((record.eps.value - 5.2).abs() < 1e-9);
        assert_eq!(record.eps_basis, EpsBasis::Basic);
    }

    #[test]
    fn test_networth_gating() {
        let config = ReconcileConfig::default();
        let reextractor = TargetedReextractor::new(&config);
        let doc = document();

        let mut record = YearRecord::default();
        record.networth = MetricValue::new(800.0, SourceRef::new(3, "", "Other equity 800"));

        let outcome = reextractor.apply_networth_response(
            &doc,
            &mut record,
            SingleMetricResponse {
                value: 100.0,
                source: source(3, "Equity share capital 100"),
            },
        );
        assert!(matches!(outcome, ReextractionOutcome::Rejected { .. }));
        assert_eq!(record.networth.value, 800.0);

        let outcome = reextractor.apply_networth_response(
            &doc,
            &mut record,
            SingleMetricResponse {
                value: 9_000_000_000.0,
                source: source(0, "Total equity 900"),
            },
        );
        assert!(outcome.is_accepted());
        assert_eq!(record.networth.value, 900.0);
        assert_eq!(record.networth.source.page, 3);
    }

    #[test]
    fn test_pat_attributable_is_derived_only() {
        let config = ReconcileConfig::default();
        let reextractor = TargetedReextractor::new(&config);
        let doc = document();

        let mut record = YearRecord::default();
        record.pat = MetricValue::new(500.0, SourceRef::new(4, "", "Profit for the year 500"));

        let outcome = reextractor.apply_pat_attributable_response(
            &doc,
            &mut record,
            SingleMetricResponse {
                value: 480.0,
                source: source(77, "Profit attributable to Owners of the Company 480"),
            },
        );
        assert!(outcome.is_accepted());
        assert_eq!(record.pat.value, 500.0);
        let attrib = record.pat_attrib_owners.as_ref().unwrap();
        assert_eq!(attrib.value, 480.0);
        assert_eq!(attrib.source.page, 4);

        let mut empty = YearRecord::default();
        let outcome = reextractor.apply_pat_attributable_response(
            &doc,
            &mut empty,
            SingleMetricResponse::default(),
        );
        assert!(matches!(outcome, ReextractionOutcome::Rejected { .. }));
        assert!(empty.pat_attrib_owners.is_none());
    }
}
