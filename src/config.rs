use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;

/// Transport settings for the market-data client.
///
/// Scoped to the acquirer that receives it; nothing here is ever installed
/// process-wide. `accept_invalid_certs` reproduces the relaxed TLS posture
/// some networks need for the primary download path and applies only to the
/// clients built from this config.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            accept_invalid_certs: false,
        }
    }
}

/// Hyperparameters and sizing for the per-ticker forecast model.
#[derive(Debug, Clone)]
pub struct ForecastSettings {
    pub look_back: usize,
    pub train_epochs: usize,
    pub batch_size: usize,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            look_back: 7,
            train_epochs: 20,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub model_dir: PathBuf,
    pub history_start: NaiveDate,
    pub yahoo_base_url: String,
    pub yahoo_fallback_url: String,
    pub transport: TransportConfig,
    pub forecast: ForecastSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5001".to_string());

        let model_dir = PathBuf::from(env::var("MODEL_DIR").unwrap_or_else(|_| "model".to_string()));

        let history_start_str =
            env::var("HISTORY_START").unwrap_or_else(|_| "2020-01-01".to_string());
        let history_start = NaiveDate::parse_from_str(&history_start_str, "%Y-%m-%d")
            .context("Failed to parse HISTORY_START")?;

        let yahoo_base_url = env::var("YAHOO_BASE_URL")
            .unwrap_or_else(|_| "https://query1.finance.yahoo.com".to_string());
        let yahoo_fallback_url = env::var("YAHOO_FALLBACK_URL")
            .unwrap_or_else(|_| "https://query2.finance.yahoo.com".to_string());

        let timeout_secs = env::var("FETCH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("Failed to parse FETCH_TIMEOUT_SECS")?;

        let connect_timeout_secs = env::var("FETCH_CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .context("Failed to parse FETCH_CONNECT_TIMEOUT_SECS")?;

        let accept_invalid_certs = env::var("YAHOO_ACCEPT_INVALID_CERTS")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let look_back = env::var("LOOK_BACK")
            .unwrap_or_else(|_| "7".to_string())
            .parse::<usize>()
            .context("Failed to parse LOOK_BACK")?;

        let train_epochs = env::var("TRAIN_EPOCHS")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<usize>()
            .context("Failed to parse TRAIN_EPOCHS")?;

        let batch_size = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "16".to_string())
            .parse::<usize>()
            .context("Failed to parse BATCH_SIZE")?;

        if look_back == 0 {
            anyhow::bail!("LOOK_BACK must be at least 1");
        }
        if batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            bind_addr,
            model_dir,
            history_start,
            yahoo_base_url,
            yahoo_fallback_url,
            transport: TransportConfig {
                timeout_secs,
                connect_timeout_secs,
                accept_invalid_certs,
            },
            forecast: ForecastSettings {
                look_back,
                train_epochs,
                batch_size,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_service() {
        let forecast = ForecastSettings::default();
        assert_eq!(forecast.look_back, 7);
        assert_eq!(forecast.train_epochs, 20);
        assert_eq!(forecast.batch_size, 16);

        let transport = TransportConfig::default();
        assert!(!transport.accept_invalid_certs);
        assert_eq!(transport.timeout_secs, 30);
    }
}
