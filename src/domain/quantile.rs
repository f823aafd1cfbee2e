//! Rolling nearest-rank quantiles.
//!
//! The quantile rule selects an element of the sorted sample; it never
//! interpolates between values:
//!
//! ```text
//! pos = lerp(-0.5, n - 0.5, p)
//! q   = sorted[max(floor(pos), 0)]
//! ```

use std::collections::BTreeMap;

use crate::domain::indicator::IndicatorSeries;

/// Percentiles for which rolling quantile series are materialised.
pub const PERCENTILES: [f64; 6] = [0.05, 0.15, 0.25, 0.75, 0.85, 0.95];

/// Quantile series keyed by percentile label, then by indicator name.
pub type QuantileIndicators = BTreeMap<String, IndicatorSeries>;

/// Two-decimal label used as the key for a percentile, e.g. `"0.75"`.
pub fn percentile_label(percentile: f64) -> String {
    format!("{:.2}", percentile)
}

pub fn lerp(v0: f64, v1: f64, t: f64) -> f64 {
    (1.0 - t) * v0 + t * v1
}

fn quantile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = lerp(-0.5, n as f64 - 0.5, percentile);
            let index = pos.floor().max(0.0) as usize;
            sorted[index.min(n - 1)]
        }
    }
}

/// Nearest-rank quantile of `sample`. Empty samples yield NaN.
pub fn calculate_quantile(sample: &[f64], percentile: f64) -> f64 {
    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_of_sorted(&sorted, percentile)
}

/// Rolling quantiles for every entry of `percentiles` at once, sorting each
/// window a single time. Output is indexed like `percentiles`.
pub fn rolling_quantiles(series: &[f64], percentiles: &[f64], window: usize) -> Vec<Vec<f64>> {
    let count = series.len().saturating_sub(window);
    let mut out: Vec<Vec<f64>> = percentiles
        .iter()
        .map(|_| Vec::with_capacity(count))
        .collect();
    let mut sorted = Vec::with_capacity(window.min(series.len()));

    for i in 0..count {
        sorted.clear();
        sorted.extend_from_slice(&series[i..i + window]);
        sorted.sort_by(f64::total_cmp);
        for (values, &p) in out.iter_mut().zip(percentiles) {
            values.push(quantile_of_sorted(&sorted, p));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One sort per window and percentile.
    fn quantile_series(series: &[f64], percentile: f64, window: usize) -> Vec<f64> {
        let count = series.len().saturating_sub(window);
        (0..count)
            .map(|i| calculate_quantile(&series[i..i + window], percentile))
            .collect()
    }

    #[test]
    fn labels_use_two_decimals() {
        let labels: Vec<String> = PERCENTILES.iter().map(|&p| percentile_label(p)).collect();
        assert_eq!(labels, vec!["0.05", "0.15", "0.25", "0.75", "0.85", "0.95"]);
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(-0.5, 9.5, 0.0), -0.5);
        assert_eq!(lerp(-0.5, 9.5, 1.0), 9.5);
    }

    #[test]
    fn empty_sample_is_nan() {
        assert!(calculate_quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn single_element_is_returned() {
        assert_eq!(calculate_quantile(&[7.0], 0.95), 7.0);
    }

    #[test]
    fn nearest_rank_selection() {
        let sample = [5.0, 1.0, 4.0, 2.0, 3.0, 8.0, 7.0, 6.0];
        // n = 8: pos = -0.5 + 8p
        assert_eq!(calculate_quantile(&sample, 0.05), 1.0); // floor(-0.1) -> 0
        assert_eq!(calculate_quantile(&sample, 0.25), 2.0); // floor(1.5) = 1
        assert_eq!(calculate_quantile(&sample, 0.75), 6.0); // floor(5.5) = 5
        assert_eq!(calculate_quantile(&sample, 0.95), 8.0); // floor(7.1) = 7
    }

    #[test]
    fn low_percentile_clamps_to_first() {
        let sample = [3.0, 1.0, 2.0];
        // pos = -0.5 + 0.03 < 0
        assert_eq!(calculate_quantile(&sample, 0.01), 1.0);
    }

    #[test]
    fn does_not_interpolate() {
        let sample = [0.0, 100.0];
        let q = calculate_quantile(&sample, 0.6);
        assert!(q == 0.0 || q == 100.0);
    }

    #[test]
    fn quantile_series_length() {
        let series: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let q = quantile_series(&series, 0.95, 4);
        assert_eq!(q.len(), 6);
        assert_eq!(q[0], 3.0);
    }

    #[test]
    fn rolling_matches_single_percentile_path() {
        let series: Vec<f64> = (0..25).map(|i| ((i * 7) % 11) as f64).collect();
        let all = rolling_quantiles(&series, &PERCENTILES, 5);
        for (values, &p) in all.iter().zip(PERCENTILES.iter()) {
            assert_eq!(values, &quantile_series(&series, p, 5));
        }
    }

    #[test]
    fn rolling_with_window_beyond_series_is_empty() {
        let all = rolling_quantiles(&[1.0, 2.0, 3.0], &PERCENTILES, usize::MAX);
        assert!(all.iter().all(|values| values.is_empty()));
    }
}
