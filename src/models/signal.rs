use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Side;

/// Number of take-profit labels (TP1..TP4) a message can carry.
pub const TP_SLOTS: usize = 4;

/// Entry zone quoted by a signal. Always stored low <= high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: Decimal,
    pub high: Decimal,
}

impl PriceRange {
    /// Builds a range from two bounds written in either order.
    pub fn new(a: Decimal, b: Decimal) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    pub fn contains(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }

    pub fn midpoint(&self) -> Decimal {
        (self.low + self.high) / Decimal::TWO
    }
}

/// One TP slot of a signal.
///
/// `Open` means the label was present with the literal "open" (let the
/// position run), which is different from the label not appearing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "price", rename_all = "lowercase")]
pub enum TakeProfitLevel {
    #[default]
    Absent,
    Open,
    Price(Decimal),
}

impl TakeProfitLevel {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            TakeProfitLevel::Price(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, TakeProfitLevel::Absent)
    }
}

/// Trade intent extracted from one inbound message. Fields the parser could
/// not find stay `None`; check [`Signal::is_valid`] before acting on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Option<String>,
    pub market_price: Option<Decimal>,
    pub buy_range: Option<PriceRange>,
    pub sell_range: Option<PriceRange>,
    pub take_profits: [TakeProfitLevel; TP_SLOTS],
    pub stop_loss: Option<Decimal>,
    pub pip_count: Option<u32>,
    pub side: Option<Side>,
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn empty(raw_text: &str) -> Self {
        Self {
            symbol: None,
            market_price: None,
            buy_range: None,
            sell_range: None,
            take_profits: [TakeProfitLevel::Absent; TP_SLOTS],
            stop_loss: None,
            pip_count: None,
            side: None,
            raw_text: raw_text.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Symbol, side and at least one price reference are required.
    pub fn is_valid(&self) -> bool {
        self.symbol.is_some()
            && self.side.is_some()
            && (self.market_price.is_some() || self.buy_range.is_some() || self.sell_range.is_some())
    }

    /// The range matching the resolved side, if any.
    pub fn side_range(&self) -> Option<PriceRange> {
        match self.side? {
            Side::Buy => self.buy_range,
            Side::Sell => self.sell_range,
        }
    }

    /// Market price when quoted, otherwise the midpoint of the side's range.
    pub fn entry_price(&self) -> Option<Decimal> {
        self.market_price
            .or_else(|| self.side_range().map(|r| r.midpoint()))
    }

    /// Numeric TP levels in ladder order, skipping absent and open slots.
    pub fn take_profit_prices(&self) -> Vec<Decimal> {
        self.take_profits.iter().filter_map(|tp| tp.price()).collect()
    }

    pub fn first_take_profit(&self) -> Option<Decimal> {
        self.take_profits.iter().find_map(|tp| tp.price())
    }
}
