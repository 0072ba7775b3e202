use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily observation: the trading date and its closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Chronologically ordered daily closes for one ticker, no duplicate dates.
///
/// An empty series is the domain-level signal that acquisition failed; it is
/// not an error by itself.
pub type PriceSeries = Vec<PricePoint>;

/// Normalizes a ticker symbol to its canonical upper-cased form.
///
/// The canonical form is the sole key for model and scaler persistence, so
/// every entry point must pass through here before touching the store.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// The outcome of one successful prediction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub ticker: String,
    /// The date string as the caller sent it.
    pub requested_date: String,
    /// Nearest valid trading day on or after the requested date.
    pub market_date: NaiveDate,
    /// Currency units, rounded to 2 decimals.
    pub predicted_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_ticker(" aapl "), "AAPL");
        assert_eq!(normalize_ticker("MSFT"), "MSFT");
    }
}
