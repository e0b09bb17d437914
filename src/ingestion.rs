use crate::config::ScaleConfig;
use crate::error::Result;
use crate::numeric::group_western;
use crate::oracle::MetricsResponse;
use crate::schema::{MetricKey, YearRecord};
use crate::utils::resolve_year_label;
use crate::validator::{implied_shares, sorted_by_year};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Builds the record for one report from a full-metric extraction.
///
/// Values are taken as returned; scale correction and citation repair run
/// afterwards in the pipeline.
pub fn year_record_from_response(response: MetricsResponse) -> YearRecord {
    YearRecord {
        year_label: resolve_year_label(&response.year_label, &response.year_end),
        year_end: response.year_end.trim().to_string(),
        revenue: response.revenue.into(),
        ebitda: response.ebitda.into(),
        pat: response.pat.into(),
        eps: response.eps.into(),
        networth: response.networth.into(),
        total_assets: response.total_assets.into(),
        ..Default::default()
    }
}

/// A record together with the report it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourcedYear {
    pub source_document: PathBuf,
    pub record: YearRecord,
}

/// Merges records sharing a year label, e.g. when two reports cover the same
/// fiscal year. Per metric the first non-zero value wins; the source document
/// follows whichever record has more filled metrics. Output keeps first-seen
/// order.
pub fn dedupe_years(years: Vec<SourcedYear>) -> Vec<SourcedYear> {
    let mut merged: Vec<SourcedYear> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for year in years {
        let Some(at) = index.get(&year.record.year_label).copied() else {
            index.insert(year.record.year_label.clone(), merged.len());
            merged.push(year);
            continue;
        };

        let existing = &mut merged[at];
        let incoming_filled = year.record.filled_metric_count();
        let existing_filled = existing.record.filled_metric_count();

        for key in MetricKey::ALL {
            if existing.record.metric(key).value == 0.0 && year.record.metric(key).value != 0.0 {
                existing.record.set_metric(key, year.record.metric(key).clone());
                if key == MetricKey::Eps {
                    existing.record.eps_basis = year.record.eps_basis;
                    existing.record.eps_scope = year.record.eps_scope;
                }
            }
        }
        if existing.record.pat_attrib_value() <= 0.0 && year.record.pat_attrib_value() > 0.0 {
            existing.record.pat_attrib_owners = year.record.pat_attrib_owners.clone();
        }
        if existing.record.year_end.is_empty() {
            existing.record.year_end = year.record.year_end.clone();
        }
        if incoming_filled > existing_filled {
            existing.source_document = year.source_document;
        }
    }

    merged
}

/// The combined output of a multi-report run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialsReport {
    #[serde(default)]
    pub company: String,

    #[serde(default)]
    #[schemars(description = "Currency and scale of the figures, as detected from the documents")]
    pub currency: String,

    #[serde(default)]
    pub years: Vec<YearRecord>,
}

impl FinancialsReport {
    /// Years are stored sorted by label.
    pub fn new(company: impl Into<String>, currency: impl Into<String>, years: Vec<YearRecord>) -> Self {
        let years = sorted_by_year(&years).into_iter().cloned().collect();
        Self {
            company: company.into(),
            currency: currency.into(),
            years,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Pipe-separated table, one row per year. Currency figures are
    /// multiplied by `unit_multiplier` (1e6 for figures in millions) and
    /// grouped with commas; EPS is printed to 2 decimals.
    pub fn table_text(&self, unit_multiplier: f64) -> String {
        let mut columns = vec!["year_label"];
        columns.extend(MetricKey::ALL.iter().map(|k| k.as_str()));
        let header = columns.join(" | ");

        let mut lines = vec![header.clone(), "-".repeat(header.len())];
        for year in &self.years {
            let mut cells = vec![year.year_label.clone()];
            for key in MetricKey::ALL {
                let value = year.metric(key).value;
                let cell = if value == 0.0 {
                    "0".to_string()
                } else if key == MetricKey::Eps {
                    format!("{:.2}", value)
                } else {
                    group_western((value * unit_multiplier) as i64)
                };
                cells.push(cell);
            }
            lines.push(cells.join(" | "));
        }
        lines.join("\n")
    }
}

/// One line per year with the implied share count, or a note that it
/// cannot be derived.
pub fn implied_share_summary(years: &[YearRecord], scale: &ScaleConfig) -> Vec<String> {
    sorted_by_year(years)
        .into_iter()
        .map(|year| {
            let pat = year.pat_attrib_value();
            let eps = year.eps.value;
            if pat <= 0.0 || eps <= 0.0 {
                return format!(
                    "{}: missing PAT attributable to owners or EPS; skipping implied shares.",
                    year.year_label
                );
            }
            let shares = implied_shares(pat, eps, scale);
            format!(
                "{}: PAT_for_EPS={}cr, EPS={} ({},{}) => implied shares ~ {:.3}B",
                year.year_label,
                pat,
                eps,
                year.eps_basis.as_str(),
                year.eps_scope.as_str(),
                shares / 1e9
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleMetric, OracleSource};
    use crate::schema::{EpsBasis, EpsScope, MetricValue, SourceRef};

    fn metric(value: f64) -> MetricValue {
        MetricValue::new(value, SourceRef::new(1, "", ""))
    }

    fn sourced(path: &str, label: &str, revenue: f64, pat: f64, eps: f64) -> SourcedYear {
        SourcedYear {
            source_document: PathBuf::from(path),
            record: YearRecord {
                year_label: label.to_string(),
                revenue: metric(revenue),
                pat: metric(pat),
                eps: metric(eps),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_year_record_from_response() {
        let response = MetricsResponse {
            year_label: "FY 2023-24".to_string(),
            year_end: " 31 March 2024 ".to_string(),
            revenue: OracleMetric {
                value: 1500.0,
                source: OracleSource {
                    page: 12,
                    section: "Statement of Profit and Loss".to_string(),
                    snippet: "x".repeat(250),
                },
            },
            ..Default::default()
        };

        let record = year_record_from_response(response);
        assert_eq!(record.year_label, "2024");
        assert_eq!(record.year_end, "31 March 2024");
        assert_eq!(record.revenue.value, 1500.0);
        assert_eq!(record.revenue.source.page, 12);
        assert_eq!(record.revenue.source.snippet.chars().count(), 200);
        assert_eq!(record.ebitda.value, 0.0);
        assert!(record.pat_attrib_owners.is_none());
    }

    #[test]
    fn test_year_label_from_year_end_when_label_missing() {
        let response = MetricsResponse {
            year_end: "As at 31 March 2022".to_string(),
            ..Default::default()
        };
        assert_eq!(year_record_from_response(response).year_label, "2022");
    }

    #[test]
    fn test_dedupe_prefers_non_zero_metrics() {
        let mut second = sourced("b.pdf", "2024", 0.0, 90.0, 4.5);
        second.record.eps_basis = EpsBasis::Basic;
        second.record.eps_scope = EpsScope::Continuing;
        second.record.networth = metric(800.0);
        second.record.pat_attrib_owners = Some(metric(85.0));

        let years = vec![
            sourced("a.pdf", "2024", 1000.0, 0.0, 0.0),
            sourced("a.pdf", "2023", 900.0, 70.0, 3.5),
            second,
        ];
        let merged = dedupe_years(years);
        assert_eq!(merged.len(), 2);

        let y2024 = &merged[0];
        assert_eq!(y2024.record.revenue.value, 1000.0);
        assert_eq!(y2024.record.pat.value, 90.0);
        assert_eq!(y2024.record.eps.value, 4.5);
        assert_eq!(y2024.record.eps_scope, EpsScope::Continuing);
        assert_eq!(y2024.record.networth.value, 800.0);
        assert_eq!(y2024.record.pat_attrib_value(), 85.0);
        // b.pdf filled 3 metrics against 1 from a.pdf.
        assert_eq!(y2024.source_document, PathBuf::from("b.pdf"));
        assert_eq!(merged[1].record.year_label, "2023");
    }

    #[test]
    fn test_dedupe_keeps_first_non_zero() {
        let merged = dedupe_years(vec![
            sourced("a.pdf", "2024", 1000.0, 80.0, 4.0),
            sourced("b.pdf", "2024", 1100.0, 0.0, 0.0),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].record.revenue.value, 1000.0);
        assert_eq!(merged[0].source_document, PathBuf::from("a.pdf"));
    }

    #[test]
    fn test_report_sorted_and_table_text() {
        let report = FinancialsReport::new(
            "Acme Industries",
            "INR crore",
            vec![
                sourced("a.pdf", "2024", 26914.0, 1200.0, 12.35).record,
                sourced("a.pdf", "2023", 25000.0, 0.0, 0.0).record,
            ],
        );
        assert_eq!(report.years[0].year_label, "2023");

        let table = report.table_text(1_000_000.0);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(
            lines[0],
            "year_label | revenue | ebitda | pat | eps | networth | total_assets"
        );
        assert_eq!(lines[1].len(), lines[0].len());
        assert_eq!(lines[2], "2023 | 25,000,000,000 | 0 | 0 | 0 | 0 | 0");
        assert_eq!(
            lines[3],
            "2024 | 26,914,000,000 | 0 | 1,200,000,000 | 12.35 | 0 | 0"
        );

        let parsed = FinancialsReport::from_json_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_implied_share_summary() {
        let scale = ScaleConfig::default();
        let mut with_pat = sourced("a.pdf", "2024", 0.0, 0.0, 10.0).record;
        with_pat.pat_attrib_owners = Some(metric(1000.0));
        with_pat.eps_basis = EpsBasis::Basic;
        with_pat.eps_scope = EpsScope::Total;
        let without = sourced("a.pdf", "2023", 0.0, 0.0, 9.0).record;

        let lines = implied_share_summary(&[with_pat, without], &scale);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("2023: missing"));
        assert_eq!(
            lines[1],
            "2024: PAT_for_EPS=1000cr, EPS=10 (basic,total) => implied shares ~ 1.000B"
        );
    }
}
