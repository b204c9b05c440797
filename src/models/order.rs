use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{OrderType, Side};

/// Characters of the source message kept on the order for audit logs.
const RAW_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    pub signal_time: DateTime<Utc>,
    #[serde(default)]
    pub pip_count: Option<u32>,
    #[serde(default)]
    pub raw_excerpt: String,
}

impl OrderMetadata {
    pub fn new(signal_time: DateTime<Utc>, pip_count: Option<u32>, raw_text: &str) -> Self {
        Self {
            signal_time,
            pip_count,
            raw_excerpt: raw_text.chars().take(RAW_EXCERPT_CHARS).collect(),
        }
    }
}

/// Executable order handed to the backend. Built once, never mutated after
/// placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub volume: f64,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profits: Vec<f64>,
    pub metadata: OrderMetadata,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:.2} lots",
            self.symbol, self.side, self.order_type, self.volume
        )?;
        if let Some(price) = self.price {
            write!(f, " @ {:.2}", price)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStatus {
    Filled,
    Pending,
}

/// What the backend reports back after `place_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: String,
    pub status: FillStatus,
    /// Executed price; `None` when the broker did not report one.
    #[serde(default)]
    pub price: Option<f64>,
    /// Executed volume; 0.0 when the broker did not report one.
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub free_margin: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}
