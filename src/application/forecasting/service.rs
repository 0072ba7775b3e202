//! Prediction orchestrator.
//!
//! Ties the acquirer, pipeline, model and store together for one request:
//! train-on-first-use behind a per-ticker lock, then always re-fetch the
//! freshest series for inference, even immediately after training, so a
//! prediction never runs on a stale snapshot. A persisted model is reused
//! indefinitely and never retrained as the series grows; that staleness is a
//! documented property of the lifecycle, not something to silently repair.

use crate::application::forecasting::model::ForecastModel;
use crate::application::forecasting::pipeline::{
    MinMaxScaler, feature_matrix, latest_window, make_windows,
};
use crate::config::ForecastSettings;
use crate::domain::calendar::resolve_trading_day;
use crate::domain::errors::ForecastError;
use crate::domain::ports::MarketDataAcquirer;
use crate::domain::types::{Prediction, PriceSeries, normalize_ticker};
use crate::infrastructure::model_store::ModelStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

pub struct PredictionService {
    acquirer: Arc<dyn MarketDataAcquirer>,
    store: ModelStore,
    settings: ForecastSettings,
    /// One async mutex per ticker, guarding the check-then-train-then-save
    /// sequence so concurrent first requests cannot double-train or race
    /// the artifact writes.
    training_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PredictionService {
    pub fn new(
        acquirer: Arc<dyn MarketDataAcquirer>,
        store: ModelStore,
        settings: ForecastSettings,
    ) -> Self {
        Self {
            acquirer,
            store,
            settings,
            training_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the full prediction flow for one `(ticker, date)` request.
    pub async fn predict(&self, ticker: &str, date_str: &str) -> Result<Prediction, ForecastError> {
        let ticker = normalize_ticker(ticker);

        self.ensure_model(&ticker).await?;

        let (model, scaler) = self.store.load(&ticker, self.settings.look_back)?;

        // Unconditional re-fetch: inference always uses the most current
        // series rather than whatever the training pass downloaded.
        let series = self.fetch(&ticker).await?;

        let look_back = model.look_back();
        let ticker_for_task = ticker.clone();
        let predicted_price = tokio::task::spawn_blocking(move || {
            infer_next_close(&model, &scaler, &series, look_back, &ticker_for_task)
        })
        .await
        .map_err(|e| ForecastError::ModelLoadFailed {
            ticker: ticker.clone(),
            reason: format!("inference task failed: {}", e),
        })??;

        let market_date = resolve_trading_day(date_str)?;

        Ok(Prediction {
            ticker,
            requested_date: date_str.to_string(),
            market_date,
            predicted_price: (predicted_price * 100.0).round() / 100.0,
        })
    }

    /// Trains and persists a model for `ticker` unless one already exists.
    async fn ensure_model(&self, ticker: &str) -> Result<(), ForecastError> {
        let lock = self.training_lock(ticker);
        let _guard = lock.lock().await;

        if self.store.exists(ticker) {
            return Ok(());
        }

        info!("No persisted model for {}, training on first use", ticker);
        let series = self.fetch(ticker).await?;

        let settings = self.settings.clone();
        let store = self.store.clone();
        let ticker_owned = ticker.to_string();
        tokio::task::spawn_blocking(move || train_and_persist(&store, &ticker_owned, &series, &settings))
            .await
            .map_err(|e| ForecastError::TrainingFailed {
                ticker: ticker.to_string(),
                reason: format!("training task failed: {}", e),
            })?
    }

    async fn fetch(&self, ticker: &str) -> Result<PriceSeries, ForecastError> {
        let series = match self.acquirer.fetch_daily_closes(ticker).await {
            Ok(series) => series,
            Err(e) => {
                warn!("Acquirer fault for {}: {}", ticker, e);
                Vec::new()
            }
        };
        if series.is_empty() {
            return Err(ForecastError::DataUnavailable {
                ticker: ticker.to_string(),
            });
        }
        Ok(series)
    }

    fn training_lock(&self, ticker: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .training_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(ticker.to_string()).or_default().clone()
    }
}

fn train_and_persist(
    store: &ModelStore,
    ticker: &str,
    series: &PriceSeries,
    settings: &ForecastSettings,
) -> Result<(), ForecastError> {
    let training_failed = |reason: String| ForecastError::TrainingFailed {
        ticker: ticker.to_string(),
        reason,
    };

    let (scaled, scaler) = MinMaxScaler::fit_transform(&feature_matrix(series));
    let (windows, targets) = make_windows(&scaled, settings.look_back);
    if windows.shape()[0] == 0 {
        return Err(training_failed(format!(
            "{} rows is not enough history for a {}-day lookback",
            series.len(),
            settings.look_back
        )));
    }

    let mut model =
        ForecastModel::new(settings.look_back).map_err(|e| training_failed(e.to_string()))?;
    model
        .fit(
            &windows,
            &targets,
            settings.train_epochs,
            settings.batch_size,
        )
        .map_err(|e| training_failed(e.to_string()))?;

    store
        .save(ticker, &model, &scaler)
        .map_err(|e| training_failed(format!("persist failed: {}", e)))?;
    Ok(())
}

fn infer_next_close(
    model: &ForecastModel,
    scaler: &MinMaxScaler,
    series: &PriceSeries,
    look_back: usize,
    ticker: &str,
) -> Result<f64, ForecastError> {
    let scaled = scaler.transform(&feature_matrix(series));
    let window = latest_window(&scaled, look_back).ok_or_else(|| ForecastError::DataUnavailable {
        ticker: ticker.to_string(),
    })?;
    let scaled_close = model
        .predict_next(&window)
        .map_err(|e| ForecastError::ModelLoadFailed {
            ticker: ticker.to_string(),
            reason: format!("inference failed: {}", e),
        })?;
    Ok(scaler.inverse_close(scaled_close))
}
