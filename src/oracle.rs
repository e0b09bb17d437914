//! Contract with the external document-reading service.
//!
//! Nothing the service returns is trusted: every response type deserializes
//! leniently (missing fields default, numbers may arrive as strings, pages as
//! floats) and consumers gate the values before using them.

use crate::error::{ReconcileError, Result};
use crate::numeric::safe_number;
use crate::schema::{MetricValue, SourceRef};
use crate::utils::clean_json_output;
use log::warn;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

pub trait ExtractionOracle {
    /// Pages holding the income statement, balance sheet and EPS table.
    fn locate_pages(&self, source: &Path) -> Result<PageLocatorResponse>;

    /// Full metric extraction, one entry per fiscal year column the report
    /// presents. `focus_pages` narrows the search when non-empty.
    fn extract_metrics(&self, source: &Path, focus_pages: &[u32]) -> Result<YearsResponse>;

    /// The targeted calls below ask for the figure of one fiscal year, so a
    /// comparative report's prior-year column is not refilled with the
    /// current year's value.
    fn extract_eps(&self, source: &Path, year_label: &str) -> Result<EpsResponse>;

    fn extract_networth(&self, source: &Path, year_label: &str) -> Result<SingleMetricResponse>;

    fn extract_pat_attributable(
        &self,
        source: &Path,
        year_label: &str,
    ) -> Result<SingleMetricResponse>;
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(safe_number(&value))
}

fn lenient_page<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(page_from_value(&value))
}

fn lenient_pages<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .iter()
            .map(page_from_value)
            .filter(|p| *p > 0)
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_struct<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn page_from_value(value: &Value) -> u32 {
    let page = safe_number(value).trunc();
    if page >= 1.0 && page <= u32::MAX as f64 {
        page as u32
    } else {
        0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct OracleSource {
    #[serde(default, deserialize_with = "lenient_page")]
    #[schemars(description = "Physical PDF page index, 1-based. 0 if not found.")]
    pub page: u32,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(description = "Statement or section the value was read from")]
    pub section: String,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(description = "Excerpt of at most 200 characters containing the number")]
    pub snippet: String,
}

impl From<OracleSource> for SourceRef {
    fn from(source: OracleSource) -> Self {
        SourceRef::new(source.page, source.section, source.snippet)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct OracleMetric {
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(description = "Value in the document's own scale. 0 if not clearly present.")]
    pub value: f64,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub source: OracleSource,
}

impl From<OracleMetric> for MetricValue {
    fn from(metric: OracleMetric) -> Self {
        MetricValue::new(metric.value, metric.source.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PageLocatorResponse {
    #[serde(default, deserialize_with = "lenient_pages")]
    pub income_statement_pages: Vec<u32>,

    #[serde(default, deserialize_with = "lenient_pages")]
    pub balance_sheet_pages: Vec<u32>,

    #[serde(default, deserialize_with = "lenient_pages")]
    pub eps_pages: Vec<u32>,
}

impl PageLocatorResponse {
    /// Located pages plus their neighbours, since statements often spill
    /// onto the next page. Sorted, deduplicated and clamped to the document.
    pub fn focus_pages(&self, page_count: u32) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .income_statement_pages
            .iter()
            .chain(&self.balance_sheet_pages)
            .chain(&self.eps_pages)
            .flat_map(|&p| [p.saturating_sub(1), p, p.saturating_add(1)])
            .filter(|p| *p >= 1 && *p <= page_count)
            .collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MetricsResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(description = "Fiscal year as a 4-digit number, e.g. \"2024\"")]
    pub year_label: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub year_end: String,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub revenue: OracleMetric,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub ebitda: OracleMetric,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub pat: OracleMetric,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub eps: OracleMetric,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub networth: OracleMetric,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub total_assets: OracleMetric,
}

/// Years returned by a full extraction. Accepts a single year object, an
/// array of them, or an object wrapping the array under `years`. Entries that
/// are not objects are dropped; malformed objects degrade to empty years.
#[derive(Debug, Clone, Default, Serialize, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct YearsResponse(pub Vec<MetricsResponse>);

impl YearsResponse {
    pub fn into_years(self) -> Vec<MetricsResponse> {
        self.0
    }
}

impl<'de> Deserialize<'de> for YearsResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("years") {
                Some(Value::Array(items)) => items,
                Some(_) => Vec::new(),
                None => vec![Value::Object(map)],
            },
            _ => Vec::new(),
        };
        Ok(Self(
            items
                .into_iter()
                .filter(Value::is_object)
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EpsResponse {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: f64,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(description = "\"basic\" or \"diluted\"")]
    pub basis: String,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(description = "\"total\" (continuing and discontinued) or \"continuing\"")]
    pub scope: String,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub source: OracleSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SingleMetricResponse {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: f64,

    #[serde(default, deserialize_with = "lenient_struct")]
    pub source: OracleSource,
}

impl From<SingleMetricResponse> for MetricValue {
    fn from(response: SingleMetricResponse) -> Self {
        MetricValue::new(response.value, response.source.into())
    }
}

/// Parses raw oracle output. Markdown fences and chatter around the JSON
/// object are stripped; anything still unparseable degrades to the default
/// (zero values, empty citations) so downstream repair can flag the gap.
pub fn parse_oracle_json<T: DeserializeOwned + Default>(raw: &str) -> T {
    let cleaned = clean_json_output(raw);
    match serde_json::from_str::<T>(&cleaned) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                "Malformed oracle response ({}); using empty {}",
                e,
                std::any::type_name::<T>()
            );
            T::default()
        }
    }
}

/// JSON schema for a response type in the flattened form the Gemini
/// `responseSchema` field accepts: no `$schema`, no `definitions`, no `$ref`.
pub fn response_schema<T: JsonSchema>() -> serde_json::Result<Value> {
    let root = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&root)?;
    let definitions = value
        .as_object_mut()
        .and_then(|o| o.remove("definitions"))
        .unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    inline_refs(&mut value, &definitions);
    Ok(value)
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let name = reference.trim_start_matches("#/definitions/");
                if let Some(def) = definitions.get(name) {
                    let mut resolved = def.clone();
                    inline_refs(&mut resolved, definitions);
                    *value = resolved;
                    return;
                }
            }
            // schemars wraps described refs in a single-element allOf.
            if let Some(Value::Array(all_of)) = map.get("allOf") {
                if all_of.len() == 1 {
                    let mut inner = all_of[0].clone();
                    inline_refs(&mut inner, definitions);
                    map.remove("allOf");
                    if let Value::Object(inner_map) = inner {
                        for (k, v) in inner_map {
                            map.entry(k).or_insert(v);
                        }
                    }
                }
            }
            map.remove("title");
            for child in map.values_mut() {
                inline_refs(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

/// Bounded retry for transient transport failures. Delays grow as
/// `base_delay * 2^(attempt - 1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay * 2u32.pow(exponent)
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempts are used
    /// up. Only [`ReconcileError::is_transient`] failures are retried.
    pub fn run<T>(&self, label: &str, mut op: impl FnMut(usize) -> Result<T>) -> Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{}: transient failure on attempt {}/{} ({}); retrying in {:?}",
                        label, attempt, max_attempts, e, delay
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(ReconcileError::RetriesExhausted {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
