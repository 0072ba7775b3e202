//! Per-ticker recurrent forecast model.
//!
//! Two stacked LSTM layers (64 units, the first returning the full sequence,
//! the second only its final state), dropout 0.2 after each, then a dense
//! projection to 32 and a single-unit output. Trained with mean squared
//! error under AdamW for a fixed number of epochs, with no early stopping
//! and no validation split. Input per sample is a `(lookback, 2)` scaled
//! window; output is the scaled next-day close.

use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{
    AdamW, LSTM, LSTMConfig, Linear, Module, Optimizer, ParamsAdamW, RNN, VarBuilder, VarMap,
    linear, lstm, ops,
};
use ndarray::{Array1, Array2, Array3};
use rand::seq::SliceRandom;
use std::path::Path;
use tracing::debug;

const HIDDEN_UNITS: usize = 64;
const DENSE_UNITS: usize = 32;
const DROPOUT_RATE: f32 = 0.2;
const LEARNING_RATE: f64 = 1e-3;

struct ForecastNet {
    lstm1: LSTM,
    lstm2: LSTM,
    dense: Linear,
    output: Linear,
}

impl ForecastNet {
    fn new(vb: VarBuilder, features: usize) -> candle_core::Result<Self> {
        let lstm1 = lstm(features, HIDDEN_UNITS, LSTMConfig::default(), vb.pp("lstm1"))?;
        let lstm2 = lstm(
            HIDDEN_UNITS,
            HIDDEN_UNITS,
            LSTMConfig::default(),
            vb.pp("lstm2"),
        )?;
        let dense = linear(HIDDEN_UNITS, DENSE_UNITS, vb.pp("dense"))?;
        let output = linear(DENSE_UNITS, 1, vb.pp("output"))?;
        Ok(Self {
            lstm1,
            lstm2,
            dense,
            output,
        })
    }

    /// Forward pass over a `(batch, lookback, features)` tensor, producing
    /// `(batch, 1)` scaled predictions. Dropout only fires while training.
    fn forward(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let states = self.lstm1.seq(xs)?;
        let mut seq = self.lstm1.states_to_tensor(&states)?;
        if train {
            seq = ops::dropout(&seq, DROPOUT_RATE)?;
        }

        let states = self.lstm2.seq(&seq)?;
        let last = states
            .last()
            .ok_or_else(|| candle_core::Error::Msg("empty lookback sequence".to_string()))?;
        let mut hidden = last.h().clone();
        if train {
            hidden = ops::dropout(&hidden, DROPOUT_RATE)?;
        }

        let projected = self.dense.forward(&hidden)?;
        self.output.forward(&projected)
    }
}

/// A trainable, serializable forecast model bound to one lookback shape.
pub struct ForecastModel {
    net: ForecastNet,
    varmap: VarMap,
    device: Device,
    look_back: usize,
}

impl ForecastModel {
    pub fn new(look_back: usize) -> Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = ForecastNet::new(vb, super::pipeline::FEATURE_COLS)
            .context("Failed to build forecast network")?;
        Ok(Self {
            net,
            varmap,
            device,
            look_back,
        })
    }

    pub fn look_back(&self) -> usize {
        self.look_back
    }

    /// Runs `epochs` full passes over the windowed dataset in shuffled
    /// mini-batches. Fails on an empty dataset instead of panicking inside
    /// tensor construction.
    pub fn fit(
        &mut self,
        windows: &Array3<f64>,
        targets: &Array1<f64>,
        epochs: usize,
        batch_size: usize,
    ) -> Result<()> {
        let samples = windows.shape()[0];
        if samples == 0 || targets.len() != samples {
            anyhow::bail!("no training windows available");
        }

        let xs = self.windows_to_tensor(windows)?;
        let ys = Tensor::from_vec(
            targets.iter().map(|&t| t as f32).collect::<Vec<f32>>(),
            (samples, 1),
            &self.device,
        )?;

        let params = ParamsAdamW {
            lr: LEARNING_RATE,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;

        let mut rng = rand::rng();
        let mut order: Vec<u32> = (0..samples as u32).collect();

        for epoch in 0..epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0f32;
            let mut batches = 0usize;

            for chunk in order.chunks(batch_size) {
                let idx = Tensor::from_vec(chunk.to_vec(), chunk.len(), &self.device)?;
                let xb = xs.index_select(&idx, 0)?;
                let yb = ys.index_select(&idx, 0)?;

                let predictions = self.net.forward(&xb, true)?;
                let loss = candle_nn::loss::mse(&predictions, &yb)?;
                optimizer.backward_step(&loss)?;

                epoch_loss += loss.to_scalar::<f32>()?;
                batches += 1;
            }

            debug!(
                "Epoch {}/{}: mse = {:.6}",
                epoch + 1,
                epochs,
                epoch_loss / batches.max(1) as f32
            );
        }

        Ok(())
    }

    /// Single-step inference on one `(lookback, 2)` scaled window.
    pub fn predict_next(&self, window: &Array2<f64>) -> Result<f64> {
        if window.nrows() != self.look_back {
            anyhow::bail!(
                "window has {} rows, model expects {}",
                window.nrows(),
                self.look_back
            );
        }
        let flat: Vec<f32> = window.iter().map(|&v| v as f32).collect();
        let xs = Tensor::from_vec(
            flat,
            (1, self.look_back, super::pipeline::FEATURE_COLS),
            &self.device,
        )?;
        let prediction = self.net.forward(&xs, false)?;
        Ok(prediction.i((0, 0))?.to_scalar::<f32>()? as f64)
    }

    pub fn save_weights(&self, path: &Path) -> Result<()> {
        self.varmap
            .save(path)
            .with_context(|| format!("Failed to save model weights to {:?}", path))
    }

    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.varmap
            .load(path)
            .with_context(|| format!("Failed to load model weights from {:?}", path))
    }

    fn windows_to_tensor(&self, windows: &Array3<f64>) -> Result<Tensor> {
        let shape = windows.shape();
        let flat: Vec<f32> = windows.iter().map(|&v| v as f32).collect();
        Ok(Tensor::from_vec(
            flat,
            (shape[0], shape[1], shape[2]),
            &self.device,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::forecasting::pipeline::{
        MinMaxScaler, feature_matrix, latest_window, make_windows,
    };
    use crate::domain::types::PricePoint;
    use chrono::NaiveDate;

    fn synthetic_series(len: usize) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        (0..len)
            .map(|i| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                close: 100.0 + (i as f64 * 0.25).sin() * 5.0 + i as f64 * 0.05,
            })
            .collect()
    }

    #[test]
    fn untrained_model_still_predicts_a_finite_value() {
        let series = synthetic_series(30);
        let (scaled, _) = MinMaxScaler::fit_transform(&feature_matrix(&series));
        let window = latest_window(&scaled, 7).unwrap();

        let model = ForecastModel::new(7).unwrap();
        let prediction = model.predict_next(&window).unwrap();
        assert!(prediction.is_finite());
    }

    #[test]
    fn fit_runs_and_reduces_to_a_usable_model() {
        let series = synthetic_series(40);
        let (scaled, _) = MinMaxScaler::fit_transform(&feature_matrix(&series));
        let (windows, targets) = make_windows(&scaled, 7);

        let mut model = ForecastModel::new(7).unwrap();
        model.fit(&windows, &targets, 2, 16).unwrap();

        let window = latest_window(&scaled, 7).unwrap();
        let prediction = model.predict_next(&window).unwrap();
        assert!(prediction.is_finite());
    }

    #[test]
    fn fit_on_empty_windows_errors_instead_of_panicking() {
        let mut model = ForecastModel::new(7).unwrap();
        let windows = Array3::zeros((0, 7, 2));
        let targets = Array1::zeros(0);
        assert!(model.fit(&windows, &targets, 1, 16).is_err());
    }

    #[test]
    fn wrong_window_shape_is_rejected() {
        let model = ForecastModel::new(7).unwrap();
        let window = Array2::zeros((5, 2));
        assert!(model.predict_next(&window).is_err());
    }

    #[test]
    fn inference_is_deterministic_without_dropout() {
        let series = synthetic_series(30);
        let (scaled, _) = MinMaxScaler::fit_transform(&feature_matrix(&series));
        let window = latest_window(&scaled, 7).unwrap();

        let model = ForecastModel::new(7).unwrap();
        let a = model.predict_next(&window).unwrap();
        let b = model.predict_next(&window).unwrap();
        assert_eq!(a, b);
    }
}
