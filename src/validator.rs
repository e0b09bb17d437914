//! Year-over-year plausibility checks over reconciled records.
//!
//! Every check is read-only and reports through [`Finding`]s; nothing here
//! fails or stops the other checks.

use crate::config::{ScaleConfig, ValidationConfig};
use crate::matcher::normalize_whitespace;
use crate::schema::YearRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static DECIMAL_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\.\d+\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Info,
    Warn,
}

impl Severity {
    fn tag(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Yoy,
    Margin,
    PatEps,
    EpsBasis,
}

impl CheckKind {
    fn tag(&self) -> &'static str {
        match self {
            CheckKind::Yoy => "YoY",
            CheckKind::Margin => "Margin",
            CheckKind::PatEps => "PAT/EPS",
            CheckKind::EpsBasis => "EPS BASIS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub check: CheckKind,
    pub message: String,
}

impl Finding {
    fn new(severity: Severity, check: CheckKind, message: String) -> Self {
        Self {
            severity,
            check,
            message,
        }
    }

    fn warn(check: CheckKind, message: String) -> Self {
        Self::new(Severity::Warn, check, message)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<4} [{}] {}",
            self.severity.tag(),
            self.check.tag(),
            self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warn)
    }

    pub fn by_check(&self, check: CheckKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.check == check)
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }
}

/// Shares outstanding implied by attributable profit (crore scale) and EPS.
/// 0 when either input is non-positive.
pub fn implied_shares(pat_attrib: f64, eps: f64, scale: &ScaleConfig) -> f64 {
    if pat_attrib <= 0.0 || eps <= 0.0 {
        return 0.0;
    }
    pat_attrib * scale.crore_to_base / eps
}

/// The second decimal number in an EPS snippet, read as the prior-year EPS
/// printed next to the current one.
pub fn eps_snippet_prior_value(snippet: &str) -> Option<f64> {
    let snippet = normalize_whitespace(snippet);
    DECIMAL_NUMBER
        .find_iter(&snippet)
        .nth(1)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn growth(prev: f64, curr: f64) -> Option<f64> {
    if prev == 0.0 {
        None
    } else {
        Some((curr - prev) / prev)
    }
}

fn in_band(value: f64, band: (f64, f64)) -> bool {
    band.0 <= value && value <= band.1
}

/// Records ordered by year label; ties keep their input order.
pub fn sorted_by_year(years: &[YearRecord]) -> Vec<&YearRecord> {
    let mut sorted: Vec<&YearRecord> = years.iter().collect();
    sorted.sort_by(|a, b| a.year_label.cmp(&b.year_label));
    sorted
}

pub struct CrossYearValidator<'a> {
    config: &'a ValidationConfig,
    scale: &'a ScaleConfig,
}

impl<'a> CrossYearValidator<'a> {
    pub fn new(config: &'a ValidationConfig, scale: &'a ScaleConfig) -> Self {
        Self { config, scale }
    }

    /// Runs the growth/margin, EPS basis and implied share count checks, in
    /// that order.
    pub fn validate(&self, years: &[YearRecord]) -> ValidationReport {
        let mut findings = self.run_yoy_checks(years);
        findings.extend(self.run_eps_basis_checks(years));
        findings.extend(self.run_share_count_checks(years));
        ValidationReport { findings }
    }

    pub fn run_yoy_checks(&self, years: &[YearRecord]) -> Vec<Finding> {
        let sorted = sorted_by_year(years);
        let mut findings = Vec::new();

        for pair in sorted.windows(2) {
            let (a, b) = (pair[0], pair[1]);

            for (name, prev, curr, limit) in [
                (
                    "Revenue",
                    a.revenue.value,
                    b.revenue.value,
                    self.config.revenue_growth_limit,
                ),
                (
                    "EBITDA",
                    a.ebitda.value,
                    b.ebitda.value,
                    self.config.ebitda_growth_limit,
                ),
                ("PAT", a.pat.value, b.pat.value, self.config.pat_growth_limit),
            ] {
                if let Some(g) = growth(prev, curr) {
                    if g.abs() > limit {
                        findings.push(Finding::warn(
                            CheckKind::Yoy,
                            format!(
                                "{} {}->{} looks large: {:.1}%",
                                name,
                                a.year_label,
                                b.year_label,
                                g * 100.0
                            ),
                        ));
                    }
                }
            }

            let revenue = b.revenue.value;
            if revenue != 0.0 {
                let ebitda_margin = b.ebitda.value / revenue;
                let pat_margin = b.pat.value / revenue;
                if !in_band(ebitda_margin, self.config.ebitda_margin_band) {
                    findings.push(Finding::warn(
                        CheckKind::Margin,
                        format!(
                            "EBITDA margin {} odd: {:.1}%",
                            b.year_label,
                            ebitda_margin * 100.0
                        ),
                    ));
                }
                if !in_band(pat_margin, self.config.pat_margin_band) {
                    findings.push(Finding::warn(
                        CheckKind::Margin,
                        format!("PAT margin {} odd: {:.1}%", b.year_label, pat_margin * 100.0),
                    ));
                }
            }
        }

        findings
    }

    fn implied_shares_for(&self, record: &YearRecord) -> f64 {
        implied_shares(record.pat_attrib_value(), record.eps.value, self.scale)
    }

    fn expected_multiplier(&self, ratio: f64) -> Option<f64> {
        let tol = self.config.multiplier_tolerance;
        self.config
            .expected_share_multipliers
            .iter()
            .copied()
            .find(|m| m * (1.0 - tol) <= ratio && ratio <= m * (1.0 + tol))
    }

    /// Implied share count continuity. Only profit attributable to owners is
    /// used; there is no fallback to the group profit for the year.
    pub fn run_share_count_checks(&self, years: &[YearRecord]) -> Vec<Finding> {
        let rows: Vec<(&str, f64)> = sorted_by_year(years)
            .into_iter()
            .map(|y| (y.year_label.as_str(), self.implied_shares_for(y)))
            .collect();
        let mut findings = Vec::new();

        for pair in rows.windows(2) {
            let ((y0, s0), (y1, s1)) = (pair[0], pair[1]);
            if s0 <= 0.0 || s1 <= 0.0 {
                findings.push(Finding::warn(
                    CheckKind::PatEps,
                    format!(
                        "Missing/zero PAT attributable to owners OR EPS for {} or {}; cannot validate implied shares. (No fallback to Profit-for-year.)",
                        y0, y1
                    ),
                ));
                continue;
            }

            let ratio = s1 / s0;
            if let Some(expected) = self.expected_multiplier(ratio) {
                findings.push(Finding::new(
                    Severity::Info,
                    CheckKind::PatEps,
                    format!(
                        "Implied shares {}->{} ≈ {:.2}x (expected ~{}x). (~{:.3}B -> {:.3}B shares)",
                        y0,
                        y1,
                        ratio,
                        expected,
                        s0 / 1e9,
                        s1 / 1e9
                    ),
                ));
                continue;
            }

            let change = (s1 - s0).abs() / s0;
            if change > self.config.share_change_warn {
                findings.push(Finding::warn(
                    CheckKind::PatEps,
                    format!(
                        "Implied shares changed {}->{} by {:.1}% (ratio {:.2}x). Check EPS type/units/PAT basis.",
                        y0,
                        y1,
                        change * 100.0,
                        ratio
                    ),
                ));
            } else {
                findings.push(Finding::new(
                    Severity::Ok,
                    CheckKind::PatEps,
                    format!("Implied shares {}->{} changed {:.1}%.", y0, y1, change * 100.0),
                ));
            }
        }

        findings
    }

    /// True when the implied share count roughly doubled (or moved within
    /// the configured split band) between the two years.
    pub fn is_share_base_change(&self, prev: &YearRecord, curr: &YearRecord) -> bool {
        let s0 = self.implied_shares_for(prev);
        let s1 = self.implied_shares_for(curr);
        if s0 <= 0.0 || s1 <= 0.0 {
            return false;
        }
        in_band(s1 / s0, self.config.split_band)
    }

    /// Compares the prior-year EPS echoed in each year's EPS snippet with the
    /// EPS extracted from the prior year's own report.
    pub fn run_eps_basis_checks(&self, years: &[YearRecord]) -> Vec<Finding> {
        let sorted = sorted_by_year(years);
        let mut findings = Vec::new();

        for pair in sorted.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);

            // Prior-year EPS is restated after a split.
            if self.is_share_base_change(prev, curr) {
                continue;
            }

            let prev_eps = prev.eps.value;
            let Some(prior_in_curr) = eps_snippet_prior_value(&curr.eps.source.snippet) else {
                continue;
            };
            if prev_eps > 0.0
                && (prior_in_curr - prev_eps).abs() / prev_eps > self.config.eps_prior_tolerance
            {
                findings.push(Finding::warn(
                    CheckKind::EpsBasis,
                    format!(
                        "{} EPS snippet shows prior-year EPS ~{}, but extracted {} EPS is {}. Likely different EPS row/basis.",
                        curr.year_label, prior_in_curr, prev.year_label, prev_eps
                    ),
                ));
            }
        }

        findings
    }
}
