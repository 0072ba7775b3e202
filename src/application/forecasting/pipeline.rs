//! Feature derivation, min-max scaling and lookback windowing.
//!
//! The feature space is fixed at two columns: the daily close and a
//! sentiment placeholder that is always zero in this version. The scaler is
//! fit once per ticker at training time and reused verbatim at inference;
//! refitting would silently shift the scale between training and prediction.

use crate::domain::types::PriceSeries;
use ndarray::{Array1, Array2, Array3, s};
use serde::{Deserialize, Serialize};

/// Number of feature columns: close price + sentiment placeholder.
pub const FEATURE_COLS: usize = 2;

/// Index of the close-price column within the feature space.
pub const CLOSE_COL: usize = 0;

/// Builds the n×2 feature matrix [close, 0.0] in chronological order.
pub fn feature_matrix(series: &PriceSeries) -> Array2<f64> {
    let mut matrix = Array2::zeros((series.len(), FEATURE_COLS));
    for (i, point) in series.iter().enumerate() {
        matrix[[i, CLOSE_COL]] = point.close;
        // Sentiment column stays at its constant 0.0 placeholder.
    }
    matrix
}

/// Column-wise min-max normalization into [0, 1], bound to the statistics
/// observed at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(matrix: &Array2<f64>) -> Self {
        let cols = matrix.ncols();
        let mut min = vec![f64::INFINITY; cols];
        let mut max = vec![f64::NEG_INFINITY; cols];
        for row in matrix.rows() {
            for (c, &v) in row.iter().enumerate() {
                min[c] = min[c].min(v);
                max[c] = max[c].max(v);
            }
        }
        for c in 0..cols {
            if !min[c].is_finite() {
                min[c] = 0.0;
            }
            if !max[c].is_finite() {
                max[c] = 0.0;
            }
        }
        Self { min, max }
    }

    pub fn fit_transform(matrix: &Array2<f64>) -> (Array2<f64>, Self) {
        let scaler = Self::fit(matrix);
        let scaled = scaler.transform(matrix);
        (scaled, scaler)
    }

    /// Scales each column into [0, 1]. A degenerate column (max == min)
    /// maps to 0.0 everywhere, which keeps the constant sentiment column
    /// inert.
    pub fn transform(&self, matrix: &Array2<f64>) -> Array2<f64> {
        let mut scaled = matrix.clone();
        for (c, mut col) in scaled.columns_mut().into_iter().enumerate() {
            let range = self.max[c] - self.min[c];
            if range.abs() < f64::EPSILON {
                col.fill(0.0);
            } else {
                col.mapv_inplace(|v| (v - self.min[c]) / range);
            }
        }
        scaled
    }

    /// Recovers an unscaled closing price from one predicted scaled value.
    ///
    /// The omitted sentiment column is padded with zero before inversion;
    /// the padding value cannot leak into the recovered close because the
    /// inverse is applied per column.
    pub fn inverse_close(&self, scaled_close: f64) -> f64 {
        let range = self.max[CLOSE_COL] - self.min[CLOSE_COL];
        if range.abs() < f64::EPSILON {
            return self.min[CLOSE_COL];
        }
        scaled_close * range + self.min[CLOSE_COL]
    }

    /// Full inverse transform of one scaled feature row.
    pub fn inverse_row(&self, scaled: &[f64]) -> Vec<f64> {
        scaled
            .iter()
            .enumerate()
            .map(|(c, &v)| {
                let range = self.max[c] - self.min[c];
                if range.abs() < f64::EPSILON {
                    self.min[c]
                } else {
                    v * range + self.min[c]
                }
            })
            .collect()
    }
}

/// Emits every (lookback window, next-step scaled close) pair.
///
/// For each index `i` in `lookback..n` the window holds rows
/// `i - lookback .. i` and the target is the scaled close at row `i`,
/// giving exactly `n - lookback` pairs. Series shorter than
/// `lookback + 1` rows produce empty output.
pub fn make_windows(scaled: &Array2<f64>, lookback: usize) -> (Array3<f64>, Array1<f64>) {
    let n = scaled.nrows();
    if n < lookback + 1 {
        return (
            Array3::zeros((0, lookback, FEATURE_COLS)),
            Array1::zeros(0),
        );
    }

    let samples = n - lookback;
    let mut windows = Array3::zeros((samples, lookback, FEATURE_COLS));
    let mut targets = Array1::zeros(samples);
    for i in lookback..n {
        let sample = i - lookback;
        windows
            .slice_mut(s![sample, .., ..])
            .assign(&scaled.slice(s![i - lookback..i, ..]));
        targets[sample] = scaled[[i, CLOSE_COL]];
    }
    (windows, targets)
}

/// The final `lookback` rows, i.e. the window the next-day prediction is
/// made from. `None` when the series is too short.
pub fn latest_window(scaled: &Array2<f64>, lookback: usize) -> Option<Array2<f64>> {
    let n = scaled.nrows();
    if n < lookback {
        return None;
    }
    Some(scaled.slice(s![n - lookback.., ..]).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PricePoint;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect()
    }

    #[test]
    fn feature_matrix_is_two_columns_with_zero_sentiment() {
        let m = feature_matrix(&series(&[10.0, 11.0, 12.0]));
        assert_eq!(m.shape(), &[3, 2]);
        assert_eq!(m[[1, CLOSE_COL]], 11.0);
        for i in 0..3 {
            assert_eq!(m[[i, 1]], 0.0);
        }
    }

    #[test]
    fn scaling_maps_observed_range_to_unit_interval() {
        let m = feature_matrix(&series(&[10.0, 20.0, 15.0]));
        let (scaled, _) = MinMaxScaler::fit_transform(&m);
        assert!((scaled[[0, CLOSE_COL]] - 0.0).abs() < 1e-12);
        assert!((scaled[[1, CLOSE_COL]] - 1.0).abs() < 1e-12);
        assert!((scaled[[2, CLOSE_COL]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn scaler_round_trips_within_tolerance() {
        let m = feature_matrix(&series(&[103.7, 98.2, 120.4, 111.1, 99.9]));
        let (scaled, scaler) = MinMaxScaler::fit_transform(&m);
        for i in 0..m.nrows() {
            let row: Vec<f64> = scaled.row(i).to_vec();
            let back = scaler.inverse_row(&row);
            assert!((back[CLOSE_COL] - m[[i, CLOSE_COL]]).abs() < 1e-9);
        }
    }

    #[test]
    fn inverse_close_ignores_the_padded_sentiment_column() {
        let m = feature_matrix(&series(&[50.0, 150.0]));
        let (_, scaler) = MinMaxScaler::fit_transform(&m);
        assert!((scaler.inverse_close(0.5) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_column_does_not_divide_by_zero() {
        let m = feature_matrix(&series(&[42.0, 42.0, 42.0]));
        let (scaled, scaler) = MinMaxScaler::fit_transform(&m);
        for i in 0..3 {
            assert_eq!(scaled[[i, CLOSE_COL]], 0.0);
        }
        assert_eq!(scaler.inverse_close(0.0), 42.0);
    }

    #[test]
    fn windowing_yields_exactly_n_minus_lookback_pairs() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let m = feature_matrix(&series(&closes));
        let (scaled, _) = MinMaxScaler::fit_transform(&m);
        let (windows, targets) = make_windows(&scaled, 7);

        assert_eq!(windows.shape(), &[23, 7, 2]);
        assert_eq!(targets.len(), 23);

        // Each window ends immediately before its target's row.
        for sample in 0..23 {
            let window_last = windows[[sample, 6, CLOSE_COL]];
            let expected = scaled[[sample + 6, CLOSE_COL]];
            assert!((window_last - expected).abs() < 1e-12);
            assert!((targets[sample] - scaled[[sample + 7, CLOSE_COL]]).abs() < 1e-12);
        }
    }

    #[test]
    fn short_series_produce_no_windows() {
        let m = feature_matrix(&series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]));
        let (scaled, _) = MinMaxScaler::fit_transform(&m);
        let (windows, targets) = make_windows(&scaled, 7);
        assert_eq!(windows.shape()[0], 0);
        assert_eq!(targets.len(), 0);
    }

    #[test]
    fn latest_window_takes_the_final_rows() {
        let closes: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let m = feature_matrix(&series(&closes));
        let (scaled, _) = MinMaxScaler::fit_transform(&m);

        let window = latest_window(&scaled, 7).unwrap();
        assert_eq!(window.shape(), &[7, 2]);
        assert!((window[[6, CLOSE_COL]] - scaled[[9, CLOSE_COL]]).abs() < 1e-12);

        assert!(latest_window(&scaled.slice(s![..5, ..]).to_owned(), 7).is_none());
    }

    #[test]
    fn scaler_serializes_and_restores() {
        let m = feature_matrix(&series(&[10.0, 30.0]));
        let (_, scaler) = MinMaxScaler::fit_transform(&m);
        let json = serde_json::to_string(&scaler).unwrap();
        let restored: MinMaxScaler = serde_json::from_str(&json).unwrap();
        assert!((restored.inverse_close(0.5) - 20.0).abs() < 1e-9);
    }
}
