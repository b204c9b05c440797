use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::Config;

const KNOWN_SYMBOLS: &[&str] = &["XAUUSD", "EURUSD", "GBPUSD", "USDJPY", "BTCUSD", "ETHUSD"];
const ALIASES: &[(&str, &str)] = &[("GOLD", "XAUUSD"), ("XAU", "XAUUSD")];

/// Broker-side limits for one instrument, as exported from the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDetails {
    pub name: String,
    #[serde(default = "default_volume_min")]
    pub volume_min: f64,
    #[serde(default = "default_volume_max")]
    pub volume_max: f64,
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,
}

fn default_volume_min() -> f64 {
    0.01
}
fn default_volume_max() -> f64 {
    100.0
}
fn default_volume_step() -> f64 {
    0.01
}

#[derive(Debug, Deserialize)]
struct SymbolsFile {
    #[serde(default)]
    symbols: Vec<SymbolDetails>,
}

/// Symbol lookup service shared by the parser and the risk engine.
///
/// Built once at startup and passed to whoever needs it.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    /// Upper-case token -> canonical symbol. Canonical names map to themselves.
    tokens: HashMap<String, String>,
    pip_values: HashMap<String, f64>,
    default_pip_value: f64,
    default_lot_step: f64,
    details: HashMap<String, SymbolDetails>,
}

impl SymbolRegistry {
    pub fn new(cfg: &Config) -> Self {
        let mut registry = Self {
            tokens: HashMap::new(),
            pip_values: cfg.pip_values.clone(),
            default_pip_value: cfg.default_pip_value,
            default_lot_step: cfg.lot_step,
            details: HashMap::new(),
        };

        for symbol in KNOWN_SYMBOLS {
            registry.add_symbol(symbol);
        }
        for symbol in cfg.pip_values.keys() {
            registry.add_symbol(symbol);
        }
        for (alias, canonical) in ALIASES {
            registry.add_alias(alias, canonical);
        }

        registry
    }

    pub fn add_symbol(&mut self, symbol: &str) {
        let canonical = symbol.to_uppercase();
        self.tokens.insert(canonical.clone(), canonical);
    }

    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        let canonical = canonical.to_uppercase();
        self.add_symbol(&canonical);
        self.tokens.insert(alias.to_uppercase(), canonical);
    }

    /// Loads the `{"symbols": [...]}` details file. Returns how many entries were read.
    pub fn load_details(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read symbol details {}", path.display()))?;
        let file: SymbolsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse symbol details {}", path.display()))?;

        let count = file.symbols.len();
        for details in file.symbols {
            self.details.insert(details.name.to_uppercase(), details);
        }
        info!("Loaded {} symbol details from {}", count, path.display());
        Ok(count)
    }

    /// Canonical symbol for a token found in text (case-insensitive).
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.tokens.get(&token.to_uppercase()).map(String::as_str)
    }

    /// Every recognised token, longest first so alternations prefer "XAUUSD" over "XAU".
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.tokens.keys().map(String::as_str).collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        tokens
    }

    /// Monetary value of one pip per lot; falls back to the generic constant.
    pub fn pip_value(&self, symbol: &str) -> f64 {
        self.pip_values
            .get(&symbol.to_uppercase())
            .copied()
            .unwrap_or(self.default_pip_value)
    }

    pub fn lot_step(&self, symbol: &str) -> f64 {
        self.details(symbol)
            .map(|d| d.volume_step)
            .filter(|step| *step > 0.0)
            .unwrap_or(self.default_lot_step)
    }

    /// (min, max) volume the broker accepts, when the details file lists the symbol.
    pub fn volume_limits(&self, symbol: &str) -> Option<(f64, f64)> {
        self.details(symbol).map(|d| (d.volume_min, d.volume_max))
    }

    pub fn details(&self, symbol: &str) -> Option<&SymbolDetails> {
        self.details.get(&symbol.to_uppercase())
    }
}
