use crate::error::{ReconcileError, Result};
use crate::schema::MetricKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Evidence that a metric genuinely appears on a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MetricSpec {
    #[schemars(description = "Phrases of which at least one must occur on the page (case-insensitive)")]
    pub keywords: Vec<String>,

    #[serde(default)]
    #[schemars(
        description = "Stricter context. When non-empty, at least one anchor must also occur on the page."
    )]
    pub anchors: Vec<String>,
}

impl MetricSpec {
    pub fn new(keywords: &[&str], anchors: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            anchors: anchors.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct MetricTable(BTreeMap<MetricKey, MetricSpec>);

impl MetricTable {
    pub fn new(specs: BTreeMap<MetricKey, MetricSpec>) -> Self {
        Self(specs)
    }

    pub fn spec(&self, key: MetricKey) -> Option<&MetricSpec> {
        self.0.get(&key)
    }

    pub fn keywords(&self, key: MetricKey) -> &[String] {
        self.0.get(&key).map(|s| s.keywords.as_slice()).unwrap_or(&[])
    }

    pub fn anchors(&self, key: MetricKey) -> &[String] {
        self.0.get(&key).map(|s| s.anchors.as_slice()).unwrap_or(&[])
    }

    pub fn insert(&mut self, key: MetricKey, spec: MetricSpec) {
        self.0.insert(key, spec);
    }
}

impl Default for MetricTable {
    fn default() -> Self {
        let mut specs = BTreeMap::new();
        specs.insert(
            MetricKey::Revenue,
            MetricSpec::new(
                &[
                    "Value of Sales",
                    "Sales & Services",
                    "Revenue",
                    "Total income",
                    "Income",
                    "Total Revenue",
                ],
                &[],
            ),
        );
        specs.insert(
            MetricKey::Ebitda,
            MetricSpec::new(
                &[
                    "EBITDA",
                    "EBDIT",
                    "Earnings Before Depreciation",
                    "Operating EBITDA",
                    "Operating Income",
                    "Operating income",
                    "Income from operations",
                ],
                &[],
            ),
        );
        specs.insert(
            MetricKey::Pat,
            MetricSpec::new(
                &[
                    "PROFIT AFTER TAX",
                    "Profit after tax",
                    "PAT",
                    "Profit for the year",
                    "Net Profit",
                    "Net profit",
                    "Net Income",
                    "Net income",
                ],
                &["owners", "attributable"],
            ),
        );
        specs.insert(
            MetricKey::Eps,
            MetricSpec::new(
                &[
                    "Earnings Per Equity Share",
                    "Basic (in",
                    "EPS",
                    "Earnings per share",
                    "Diluted",
                ],
                &["earnings per equity share", "basic", "diluted"],
            ),
        );
        specs.insert(
            MetricKey::Networth,
            MetricSpec::new(
                &[
                    "Total Equity",
                    "Total equity",
                    "Total Equity attributable",
                    "Equity",
                    "Net worth",
                    "Shareholders' funds",
                    "Stockholders' Equity",
                ],
                &["total equity"],
            ),
        );
        specs.insert(
            MetricKey::TotalAssets,
            MetricSpec::new(&["Total Assets", "Assets"], &[]),
        );
        Self(specs)
    }
}

/// Currency scale heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ScaleConfig {
    #[schemars(description = "Divisor bringing a raw currency figure into crore scale")]
    pub crore_to_base: f64,

    #[schemars(description = "Currency values at or above this are taken as reported in base units")]
    pub wrong_scale_threshold: f64,

    #[schemars(description = "EPS values above this are taken as mis-scaled")]
    pub eps_wrong_scale_threshold: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            crore_to_base: 10_000_000.0,
            wrong_scale_threshold: 1e9,
            eps_wrong_scale_threshold: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ValidationConfig {
    pub revenue_growth_limit: f64,
    pub ebitda_growth_limit: f64,
    pub pat_growth_limit: f64,

    #[schemars(description = "Inclusive [low, high] band for EBITDA / revenue")]
    pub ebitda_margin_band: (f64, f64),

    #[schemars(description = "Inclusive [low, high] band for PAT / revenue")]
    pub pat_margin_band: (f64, f64),

    #[schemars(
        description = "Year-over-year implied share count ratios that are expected (e.g. 2.0 for a 2-for-1 split). Only these are recognised."
    )]
    pub expected_share_multipliers: Vec<f64>,

    #[schemars(description = "Relative tolerance around each expected multiplier")]
    pub multiplier_tolerance: f64,

    #[schemars(description = "Relative change in implied share count that triggers a warning")]
    pub share_change_warn: f64,

    #[schemars(
        description = "Inclusive ratio band treated as a share base change when comparing EPS rows"
    )]
    pub split_band: (f64, f64),

    #[schemars(description = "Relative tolerance for the prior-year EPS echoed in a snippet")]
    pub eps_prior_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            revenue_growth_limit: 0.35,
            ebitda_growth_limit: 0.50,
            pat_growth_limit: 0.60,
            ebitda_margin_band: (0.05, 0.35),
            pat_margin_band: (0.02, 0.20),
            expected_share_multipliers: vec![2.0],
            multiplier_tolerance: 0.25,
            share_change_warn: 0.12,
            split_band: (1.7, 2.3),
            eps_prior_tolerance: 0.10,
        }
    }
}

/// Static configuration loaded once and passed to every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ReconcileConfig {
    pub metrics: MetricTable,
    pub scale: ScaleConfig,
    pub validation: ValidationConfig,
}

impl ReconcileConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ReconcileConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        for key in MetricKey::ALL {
            if self.metrics.keywords(key).is_empty() {
                return Err(ReconcileError::InvalidConfig(format!(
                    "metric '{}' has no keywords",
                    key
                )));
            }
        }

        if self.scale.crore_to_base <= 0.0 {
            return Err(ReconcileError::InvalidConfig(format!(
                "crore_to_base must be positive, got {}",
                self.scale.crore_to_base
            )));
        }

        let v = &self.validation;
        for (name, band) in [
            ("ebitda_margin_band", v.ebitda_margin_band),
            ("pat_margin_band", v.pat_margin_band),
            ("split_band", v.split_band),
        ] {
            if band.0 > band.1 {
                return Err(ReconcileError::InvalidConfig(format!(
                    "{} lower bound {} exceeds upper bound {}",
                    name, band.0, band.1
                )));
            }
        }

        if let Some(m) = v.expected_share_multipliers.iter().find(|m| **m <= 0.0) {
            return Err(ReconcileError::InvalidConfig(format!(
                "expected share multiplier must be positive, got {}",
                m
            )));
        }

        if !(0.0..1.0).contains(&v.multiplier_tolerance) {
            return Err(ReconcileError::InvalidConfig(format!(
                "multiplier_tolerance must be in [0, 1), got {}",
                v.multiplier_tolerance
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_cover_every_metric() {
        let config = ReconcileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.metrics.anchors(MetricKey::Revenue).len(), 0);
        assert_eq!(config.metrics.anchors(MetricKey::Networth), ["total equity"]);
        assert_eq!(config.scale.crore_to_base, 10_000_000.0);
        assert_eq!(config.validation.expected_share_multipliers, vec![2.0]);
    }

    #[test]
    fn test_partial_json_overrides_defaults() {
        let config = ReconcileConfig::from_json_str(
            r#"{ "validation": { "expected_share_multipliers": [2.0, 3.0], "revenue_growth_limit": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.validation.expected_share_multipliers, vec![2.0, 3.0]);
        assert_eq!(config.validation.revenue_growth_limit, 0.5);
        assert_eq!(config.validation.pat_growth_limit, 0.60);
        assert_eq!(config.metrics, MetricTable::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = ReconcileConfig::from_json_str(r#"{ "scale": { "crore_to_base": 0.0 } }"#);
        assert!(matches!(err, Err(ReconcileError::InvalidConfig(_))));

        let err = ReconcileConfig::from_json_str(
            r#"{ "validation": { "split_band": [2.3, 1.7] } }"#,
        );
        assert!(matches!(err, Err(ReconcileError::InvalidConfig(_))));

        let err = ReconcileConfig::from_json_str(r#"{ "metrics": { "eps": { "keywords": [] } } }"#);
        assert!(matches!(err, Err(ReconcileError::InvalidConfig(_))));
    }
}
