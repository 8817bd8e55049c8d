use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub data: Data,
    pub database: Database,
    pub helius: Helius,
    pub weighted_ranking: WeightedRanking,
    pub model: Model,
    pub observability: Option<Observability>,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Data {
    pub dir: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct Helius {
    pub api_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub rate_limit_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WeightedRanking {
    pub roi_weight: f64,
    pub trading_frequency_weight: f64,
    pub sharpe_ratio_weight: f64,
    pub loss_ratio_weight: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Model {
    pub n_trees: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Observability {
    pub prometheus_port: Option<u16>,
}

impl Data {
    pub fn wallet_list_path(&self) -> PathBuf {
        Path::new(&self.dir).join("top_traders_account_numbers.csv")
    }

    pub fn transactions_path(&self) -> PathBuf {
        Path::new(&self.dir).join("wallet_data.csv")
    }

    pub fn balances_path(&self) -> PathBuf {
        Path::new(&self.dir).join("portfolio_data.csv")
    }

    pub fn features_path(&self) -> PathBuf {
        Path::new(&self.dir).join("wallet_features.csv")
    }

    pub fn clean_features_path(&self) -> PathBuf {
        Path::new(&self.dir).join("wallet_features_clean.csv")
    }

    pub fn rankings_path(&self) -> PathBuf {
        Path::new(&self.dir).join("wallet_rankings.csv")
    }

    pub fn predictions_path(&self) -> PathBuf {
        Path::new(&self.dir).join("wallet_predictions.csv")
    }
}

impl Config {
    /// Load from `RANKER_CONFIG` if set, otherwise `config/default.toml`.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("RANKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn prometheus_port(&self) -> Option<u16> {
        self.observability.as_ref().and_then(|o| o.prometheus_port)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
