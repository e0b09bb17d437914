use crate::config::ScaleConfig;
use crate::numeric::is_likely_wrong_scale;
use crate::schema::{MetricKey, YearRecord};
use log::debug;

/// Brings a currency figure reported in base units back to crore scale.
/// Values below the threshold are returned unchanged.
pub fn rescale_currency(value: f64, scale: &ScaleConfig) -> f64 {
    if value != 0.0 && is_likely_wrong_scale(value, scale) {
        value / scale.crore_to_base
    } else {
        value
    }
}

/// EPS counterpart of [`rescale_currency`], with its own threshold.
pub fn rescale_eps(value: f64, scale: &ScaleConfig) -> f64 {
    if value > scale.eps_wrong_scale_threshold {
        value / scale.crore_to_base
    } else {
        value
    }
}

/// Rescales every metric of the record in place and returns the keys that
/// changed.
///
/// This cannot tell a genuinely huge figure from a scale error; a company
/// reporting more than 1e9 crore would be divided down as well.
pub fn normalize_units(record: &mut YearRecord, scale: &ScaleConfig) -> Vec<MetricKey> {
    let mut rescaled = Vec::new();

    for key in MetricKey::ALL {
        let before = record.metric(key).value;
        let after = if key.is_scale_sensitive() {
            rescale_currency(before, scale)
        } else {
            rescale_eps(before, scale)
        };

        if after != before {
            debug!("{} {}: rescaled {} -> {}", record.year_label, key, before, after);
            record.metric_mut(key).value = after;
            rescaled.push(key);
        }
    }

    rescaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MetricValue, SourceRef};

    fn record_with(key: MetricKey, value: f64) -> YearRecord {
        let mut record = YearRecord {
            year_label: "2024".to_string(),
            ..Default::default()
        };
        record.set_metric(key, MetricValue::new(value, SourceRef::default()));
        record
    }

    #[test]
    fn test_large_values_are_divided_by_crore() {
        let scale = ScaleConfig::default();
        for v in [1e9, 4.2e12, 9.99e15] {
            let mut record = record_with(MetricKey::Revenue, v);
            let changed = normalize_units(&mut record, &scale);
            assert_eq!(changed, vec![MetricKey::Revenue]);
            assert!((record.revenue.value - v / 10_000_000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let scale = ScaleConfig::default();
        let mut record = record_with(MetricKey::TotalAssets, 3.5e12);
        normalize_units(&mut record, &scale);
        let once = record.total_assets.value;
        let changed = normalize_units(&mut record, &scale);
        assert!(changed.is_empty());
        assert_eq!(record.total_assets.value, once);
    }

    #[test]
    fn test_eps_uses_its_own_threshold() {
        let scale = ScaleConfig::default();
        let mut record = record_with(MetricKey::Eps, 9_999.0);
        assert!(normalize_units(&mut record, &scale).is_empty());

        let mut record = record_with(MetricKey::Eps, 520_000_000.0);
        normalize_units(&mut record, &scale);
        assert!((record.eps.value - 52.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_and_negative_values_untouched() {
        let scale = ScaleConfig::default();
        let mut record = record_with(MetricKey::Pat, -2e12);
        assert!(normalize_units(&mut record, &scale).is_empty());
        assert_eq!(record.pat.value, -2e12);
        assert_eq!(rescale_currency(0.0, &scale), 0.0);
    }
}
