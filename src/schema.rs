use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum citation snippet length, in characters.
pub const MAX_SNIPPET_CHARS: usize = 200;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    #[schemars(description = "Total revenue / income from operations for the year")]
    Revenue,

    #[schemars(description = "Earnings before interest, tax, depreciation and amortisation")]
    Ebitda,

    #[schemars(description = "Profit after tax for the year")]
    Pat,

    #[schemars(description = "Earnings per equity share, in native currency per share")]
    Eps,

    #[schemars(description = "Total equity (net worth) from the balance sheet")]
    Networth,

    #[schemars(description = "Total assets from the balance sheet")]
    TotalAssets,
}

impl MetricKey {
    pub const ALL: [MetricKey; 6] = [
        MetricKey::Revenue,
        MetricKey::Ebitda,
        MetricKey::Pat,
        MetricKey::Eps,
        MetricKey::Networth,
        MetricKey::TotalAssets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Revenue => "revenue",
            MetricKey::Ebitda => "ebitda",
            MetricKey::Pat => "pat",
            MetricKey::Eps => "eps",
            MetricKey::Networth => "networth",
            MetricKey::TotalAssets => "total_assets",
        }
    }

    /// Currency-scaled metrics. EPS is per share and rescaled on its own threshold.
    pub fn is_scale_sensitive(&self) -> bool {
        !matches!(self, MetricKey::Eps)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the document a value was claimed to be found.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SourceRef {
    #[serde(default)]
    #[schemars(description = "Physical 1-based PDF page number. 0 means unknown.")]
    pub page: u32,

    #[serde(default)]
    #[schemars(description = "Statement or section label, e.g. 'Consolidated Balance Sheet'")]
    pub section: String,

    #[serde(default)]
    #[schemars(description = "Short excerpt (at most 200 characters) containing the number")]
    pub snippet: String,
}

impl SourceRef {
    pub fn new(page: u32, section: impl Into<String>, snippet: impl Into<String>) -> Self {
        let snippet: String = snippet.into();
        Self {
            page,
            section: section.into(),
            snippet: truncate_chars(&snippet, MAX_SNIPPET_CHARS).to_string(),
        }
    }

    /// A page that can be dereferenced in a document with `page_count` pages.
    pub fn has_valid_page(&self, page_count: u32) -> bool {
        self.page >= 1 && self.page <= page_count
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MetricValue {
    #[serde(default)]
    pub value: f64,

    #[serde(default)]
    pub source: SourceRef,
}

impl MetricValue {
    pub fn new(value: f64, source: SourceRef) -> Self {
        Self { value, source }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EpsBasis {
    Basic,
    Diluted,
    #[default]
    Unknown,
}

impl EpsBasis {
    /// Anything that is not explicitly diluted is read as basic.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("diluted") {
            EpsBasis::Diluted
        } else {
            EpsBasis::Basic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpsBasis::Basic => "basic",
            EpsBasis::Diluted => "diluted",
            EpsBasis::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EpsScope {
    /// Continuing and discontinued operations.
    Total,
    Continuing,
    #[default]
    Unknown,
}

impl EpsScope {
    /// An empty label means total, matching the EPS prompt's fallback.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "" | "total" => EpsScope::Total,
            "continuing" => EpsScope::Continuing,
            _ => EpsScope::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpsScope::Total => "total",
            EpsScope::Continuing => "continuing",
            EpsScope::Unknown => "unknown",
        }
    }
}

/// All reconciled figures for one fiscal year of one report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct YearRecord {
    #[serde(default)]
    #[schemars(description = "Fiscal year, normalized to a 4-digit year when possible")]
    pub year_label: String,

    #[serde(default)]
    pub year_end: String,

    #[serde(default)]
    pub revenue: MetricValue,

    #[serde(default)]
    pub ebitda: MetricValue,

    #[serde(default)]
    pub pat: MetricValue,

    #[serde(default)]
    pub eps: MetricValue,

    #[serde(default)]
    pub networth: MetricValue,

    #[serde(default)]
    pub total_assets: MetricValue,

    #[serde(default)]
    #[schemars(
        description = "Profit attributable to owners of the parent. Used only for implied share count checks."
    )]
    pub pat_attrib_owners: Option<MetricValue>,

    #[serde(default)]
    pub eps_basis: EpsBasis,

    #[serde(default)]
    pub eps_scope: EpsScope,
}

impl YearRecord {
    pub fn metric(&self, key: MetricKey) -> &MetricValue {
        match key {
            MetricKey::Revenue => &self.revenue,
            MetricKey::Ebitda => &self.ebitda,
            MetricKey::Pat => &self.pat,
            MetricKey::Eps => &self.eps,
            MetricKey::Networth => &self.networth,
            MetricKey::TotalAssets => &self.total_assets,
        }
    }

    pub fn metric_mut(&mut self, key: MetricKey) -> &mut MetricValue {
        match key {
            MetricKey::Revenue => &mut self.revenue,
            MetricKey::Ebitda => &mut self.ebitda,
            MetricKey::Pat => &mut self.pat,
            MetricKey::Eps => &mut self.eps,
            MetricKey::Networth => &mut self.networth,
            MetricKey::TotalAssets => &mut self.total_assets,
        }
    }

    pub fn set_metric(&mut self, key: MetricKey, metric: MetricValue) {
        *self.metric_mut(key) = metric;
    }

    /// Positive attributable profit, or 0 when missing.
    pub fn pat_attrib_value(&self) -> f64 {
        self.pat_attrib_owners
            .as_ref()
            .map(|m| m.value)
            .filter(|v| *v > 0.0)
            .unwrap_or(0.0)
    }

    /// Number of metrics carrying a non-zero value.
    pub fn filled_metric_count(&self) -> usize {
        MetricKey::ALL
            .iter()
            .filter(|k| self.metric(**k).value != 0.0)
            .count()
    }
}

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
