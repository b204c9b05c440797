use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_PIP_VALUES: &[(&str, f64)] = &[
    ("XAUUSD", 10.0),
    ("EURUSD", 10.0),
    ("GBPUSD", 10.0),
    ("USDJPY", 9.09),
];

pub const DEFAULT_TP_SPLIT: [f64; 3] = [0.40, 0.30, 0.30];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Paper,
    Rest,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "paper" => Some(BackendKind::Paper),
            "rest" => Some(BackendKind::Rest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Execution
    pub backend: String,
    pub dry_run: bool,
    pub broker_rest_url: Option<String>,
    pub broker_token: Option<String>,

    // Account & risk
    pub account_balance: f64,
    pub risk_percent: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub default_volume: f64,
    pub min_stop_distance: f64,
    pub max_stop_distance_pct: f64,

    // Instrument math
    pub pip_size: f64,
    pub lot_step: f64,
    pub pip_values: HashMap<String, f64>,
    pub default_pip_value: f64,
    pub symbols_file: Option<String>,

    // Position management
    pub tp_split: Vec<f64>,
    pub poll_interval_secs: u64,
    pub position_closed_tolerance: f64,

    // Message source
    pub chat_label: String,

    // Logging & health
    pub log_dir: String,
    pub log_level: String,
    pub health_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: "paper".to_string(),
            dry_run: true,
            broker_rest_url: None,
            broker_token: None,
            account_balance: 10_000.0,
            risk_percent: 1.0,
            min_volume: 0.01,
            max_volume: 1.0,
            default_volume: 0.01,
            min_stop_distance: 0.01,
            max_stop_distance_pct: 10.0,
            pip_size: 0.01,
            lot_step: 0.01,
            pip_values: DEFAULT_PIP_VALUES
                .iter()
                .map(|(s, v)| (s.to_string(), *v))
                .collect(),
            default_pip_value: 10.0,
            symbols_file: None,
            tp_split: DEFAULT_TP_SPLIT.to_vec(),
            poll_interval_secs: 5,
            position_closed_tolerance: 0.001,
            chat_label: "stdin".to_string(),
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
            health_file: "logs/health.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let env_f64 = |key: &str, default: f64| -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        let env_opt = |key: &str| -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.trim().is_empty())
        };

        let pip_values = env_opt("PIP_VALUES")
            .map(|raw| parse_pip_values(&raw))
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults.pip_values);

        let log_dir = env("LOG_DIR", &defaults.log_dir);

        let tp_split = env_opt("TP_SPLIT")
            .and_then(|raw| parse_split(&raw))
            .unwrap_or(defaults.tp_split);

        Config {
            backend: env("TRADING_BACKEND", "paper").to_lowercase(),
            dry_run: matches!(
                env("DRY_RUN", "true").to_lowercase().as_str(),
                "1" | "true" | "yes"
            ),
            broker_rest_url: env_opt("BROKER_REST_URL"),
            broker_token: env_opt("BROKER_TOKEN"),
            account_balance: env_f64("ACCOUNT_BALANCE", defaults.account_balance),
            risk_percent: env_f64("RISK_PERCENT", defaults.risk_percent),
            min_volume: env_f64("MIN_VOLUME", defaults.min_volume),
            max_volume: env_f64("MAX_VOLUME", defaults.max_volume),
            default_volume: env_f64("DEFAULT_VOLUME", defaults.default_volume),
            min_stop_distance: env_f64("MIN_STOP_DISTANCE", defaults.min_stop_distance),
            max_stop_distance_pct: env_f64("MAX_STOP_DISTANCE_PCT", defaults.max_stop_distance_pct),
            pip_size: env_f64("PIP_SIZE", defaults.pip_size),
            lot_step: env_f64("LOT_STEP", defaults.lot_step),
            pip_values,
            default_pip_value: env_f64("DEFAULT_PIP_VALUE", defaults.default_pip_value),
            symbols_file: env_opt("SYMBOLS_FILE"),
            tp_split,
            poll_interval_secs: env("POLL_INTERVAL_SECS", "5")
                .parse()
                .unwrap_or(defaults.poll_interval_secs),
            position_closed_tolerance: env_f64(
                "POSITION_CLOSED_TOLERANCE",
                defaults.position_closed_tolerance,
            ),
            chat_label: env("CHAT_LABEL", &defaults.chat_label),
            log_level: env("LOG_LEVEL", &defaults.log_level),
            health_file: env("HEALTH_FILE", &format!("{}/health.txt", log_dir)),
            log_dir,
        }
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        BackendKind::parse(&self.backend)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Rejects settings the engines cannot work with.
    pub fn validate(&self) -> Result<()> {
        match self.backend_kind() {
            None => bail!(
                "Invalid TRADING_BACKEND: {}. Must be 'paper' or 'rest'",
                self.backend
            ),
            Some(BackendKind::Rest)
                if !self.dry_run
                    && (self.broker_rest_url.is_none() || self.broker_token.is_none()) =>
            {
                bail!("rest backend selected but BROKER_REST_URL and BROKER_TOKEN are not set")
            }
            _ => {}
        }

        if self.min_volume > self.max_volume {
            bail!(
                "MIN_VOLUME {} exceeds MAX_VOLUME {}",
                self.min_volume,
                self.max_volume
            );
        }
        if self.pip_size <= 0.0 {
            bail!("PIP_SIZE must be positive, got {}", self.pip_size);
        }
        if self.lot_step <= 0.0 {
            bail!("LOT_STEP must be positive, got {}", self.lot_step);
        }
        if self.tp_split.is_empty() || self.tp_split.iter().any(|p| *p <= 0.0) {
            bail!("TP_SPLIT must hold positive fractions, got {:?}", self.tp_split);
        }
        let total: f64 = self.tp_split.iter().sum();
        if total > 1.0 + 1e-9 {
            bail!("TP_SPLIT sums to {:.3}, above 1.0", total);
        }

        Ok(())
    }
}

/// Parses `XAUUSD=10,USDJPY=9.09`; malformed pairs are skipped.
pub fn parse_pip_values(raw: &str) -> HashMap<String, f64> {
    raw.split(',')
        .filter_map(|pair| {
            let (symbol, value) = pair.split_once('=')?;
            let value: f64 = value.trim().parse().ok()?;
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() {
                return None;
            }
            Some((symbol, value))
        })
        .collect()
}

/// Parses `0.4,0.3,0.3`. Any bad entry discards the whole list.
pub fn parse_split(raw: &str) -> Option<Vec<f64>> {
    let parts: Option<Vec<f64>> = raw.split(',').map(|p| p.trim().parse().ok()).collect();
    parts.filter(|v| !v.is_empty())
}
