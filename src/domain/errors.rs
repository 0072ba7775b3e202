use thiserror::Error;

/// Errors surfaced by the prediction pipeline.
///
/// Every variant maps to a well-formed error response; callers never see a
/// raw panic or a provider-level failure directly.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDate { input: String },

    #[error("Invalid ticker format (AAPL, TSLA, MSFT...)")]
    InvalidTicker { input: String },

    #[error("No stock data available for {ticker}")]
    DataUnavailable { ticker: String },

    #[error("Unable to train model for {ticker}: {reason}")]
    TrainingFailed { ticker: String, reason: String },

    #[error("Failed to load persisted model for {ticker}: {reason}")]
    ModelLoadFailed { ticker: String, reason: String },
}
