//! Disk persistence for trained models and their paired scalers.
//!
//! One weights artifact and one scaler artifact per ticker, named from the
//! upper-cased symbol under a single directory. The artifacts are owned by
//! this store; the orchestrator only borrows a loaded pair for the duration
//! of one request.

use crate::application::forecasting::model::ForecastModel;
use crate::application::forecasting::pipeline::MinMaxScaler;
use crate::domain::errors::ForecastError;
use crate::domain::types::normalize_ticker;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// True when both artifacts of the pair are present on disk.
    pub fn exists(&self, ticker: &str) -> bool {
        let ticker = normalize_ticker(ticker);
        self.existing_weights_path(&ticker).is_some() && self.scaler_path(&ticker).exists()
    }

    pub fn save(
        &self,
        ticker: &str,
        model: &ForecastModel,
        scaler: &MinMaxScaler,
    ) -> Result<()> {
        let ticker = normalize_ticker(ticker);
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create model directory {:?}", self.dir))?;

        let weights_path = self.weights_path(&ticker);
        model.save_weights(&weights_path)?;

        let scaler_path = self.scaler_path(&ticker);
        let json = serde_json::to_string(scaler).context("Failed to serialize scaler")?;
        fs::write(&scaler_path, json)
            .with_context(|| format!("Failed to write scaler to {:?}", scaler_path))?;

        info!("Persisted model and scaler for {} under {:?}", ticker, self.dir);
        Ok(())
    }

    /// Loads the persisted pair for a ticker.
    ///
    /// Weights are tried against an ordered list of filename conventions:
    /// the canonical one first, then a legacy alias kept as a
    /// backward-compatibility shim for artifacts written before the naming
    /// settled. Corrupt or shape-incompatible artifacts surface as
    /// [`ForecastError::ModelLoadFailed`].
    pub fn load(
        &self,
        ticker: &str,
        look_back: usize,
    ) -> Result<(ForecastModel, MinMaxScaler), ForecastError> {
        let ticker = normalize_ticker(ticker);
        let load_err = |reason: String| ForecastError::ModelLoadFailed {
            ticker: ticker.clone(),
            reason,
        };

        let mut model = ForecastModel::new(look_back).map_err(|e| load_err(e.to_string()))?;

        let mut loaded = false;
        for path in self.weights_candidates(&ticker) {
            if !path.exists() {
                continue;
            }
            match model.load_weights(&path) {
                Ok(()) => {
                    loaded = true;
                    break;
                }
                Err(e) => {
                    warn!("Weights at {:?} failed to load: {}", path, e);
                }
            }
        }
        if !loaded {
            return Err(load_err("no loadable weights artifact".to_string()));
        }

        let scaler_path = self.scaler_path(&ticker);
        let json = fs::read_to_string(&scaler_path)
            .map_err(|e| load_err(format!("scaler read failed: {}", e)))?;
        let scaler: MinMaxScaler =
            serde_json::from_str(&json).map_err(|e| load_err(format!("scaler parse failed: {}", e)))?;

        Ok((model, scaler))
    }

    fn weights_path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}_model.safetensors", ticker))
    }

    fn weights_candidates(&self, ticker: &str) -> [PathBuf; 2] {
        [
            self.weights_path(ticker),
            // Legacy alias from before the `_model` suffix was adopted.
            self.dir.join(format!("{}.safetensors", ticker)),
        ]
    }

    fn existing_weights_path(&self, ticker: &str) -> Option<PathBuf> {
        self.weights_candidates(ticker)
            .into_iter()
            .find(|p| p.exists())
    }

    fn scaler_path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}_scaler.json", ticker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::forecasting::pipeline::{MinMaxScaler, feature_matrix};
    use crate::domain::types::PricePoint;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_store() -> ModelStore {
        let dir = std::env::temp_dir().join(format!(
            "stockcast-store-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        ModelStore::new(dir)
    }

    fn sample_scaler() -> MinMaxScaler {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series: Vec<PricePoint> = (0..12)
            .map(|i| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                close: 90.0 + i as f64,
            })
            .collect();
        MinMaxScaler::fit(&feature_matrix(&series))
    }

    #[test]
    fn missing_ticker_does_not_exist() {
        let store = temp_store();
        assert!(!store.exists("AAPL"));
        assert!(store.load("AAPL", 7).is_err());
    }

    #[test]
    fn save_then_load_round_trips_the_pair() {
        let store = temp_store();
        let model = ForecastModel::new(7).unwrap();
        let scaler = sample_scaler();

        store.save("AAPL", &model, &scaler).unwrap();
        assert!(store.exists("AAPL"));

        let (loaded_model, loaded_scaler) = store.load("AAPL", 7).unwrap();

        // Restored weights behave identically to the saved ones.
        let window = ndarray::Array2::from_shape_fn((7, 2), |(r, c)| {
            if c == 0 { 0.1 * r as f64 } else { 0.0 }
        });
        let before = model.predict_next(&window).unwrap();
        let after = loaded_model.predict_next(&window).unwrap();
        assert!((before - after).abs() < 1e-6);

        assert!((loaded_scaler.inverse_close(0.0) - scaler.inverse_close(0.0)).abs() < 1e-12);
    }

    #[test]
    fn ticker_key_is_case_insensitive() {
        let store = temp_store();
        let model = ForecastModel::new(7).unwrap();
        store.save("aapl", &model, &sample_scaler()).unwrap();

        assert!(store.exists("AAPL"));
        assert!(store.exists("aapl"));
        assert!(store.load("AAPL", 7).is_ok());
    }

    #[test]
    fn legacy_weights_alias_is_still_loadable() {
        let store = temp_store();
        let model = ForecastModel::new(7).unwrap();
        store.save("MSFT", &model, &sample_scaler()).unwrap();

        // Simulate an artifact written under the pre-rename convention.
        let canonical = store.dir.join("MSFT_model.safetensors");
        let legacy = store.dir.join("MSFT.safetensors");
        fs::rename(&canonical, &legacy).unwrap();

        assert!(store.exists("MSFT"));
        assert!(store.load("MSFT", 7).is_ok());
    }

    #[test]
    fn corrupt_scaler_is_a_load_error() {
        let store = temp_store();
        let model = ForecastModel::new(7).unwrap();
        store.save("TSLA", &model, &sample_scaler()).unwrap();
        fs::write(store.dir.join("TSLA_scaler.json"), b"not json").unwrap();

        assert!(matches!(
            store.load("TSLA", 7),
            Err(ForecastError::ModelLoadFailed { .. })
        ));
    }
}
