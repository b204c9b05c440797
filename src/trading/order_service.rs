use rust_decimal::prelude::ToPrimitive;
use tracing::{info, warn};

use crate::core::decision::{decide, resolve_entry};
use crate::core::risk::{RiskManager, DEFAULT_RR_RATIOS};
use crate::error::TradeError;
use crate::models::{Order, Side, Signal};

/// Fraction of the entry price used for a stop when an order has none.
const FALLBACK_STOP_FRACTION: f64 = 0.01;

/// Turns valid signals into sized, risk-checked orders.
pub struct OrderService {
    risk: RiskManager,
    dry_run: bool,
}

impl OrderService {
    pub fn new(risk: RiskManager, dry_run: bool) -> Self {
        Self { risk, dry_run }
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    pub fn create_order(&self, signal: &Signal) -> Result<Order, TradeError> {
        if !signal.is_valid() {
            return Err(TradeError::InvalidSignal(missing_fields(signal)));
        }

        let symbol = signal.symbol.as_deref().unwrap_or_default();
        let side = signal.side.map(|s| s.to_string()).unwrap_or_default();
        let no_entry = || TradeError::NoEntryPrice {
            symbol: symbol.to_string(),
            side: side.clone(),
        };

        let (_, entry) = resolve_entry(signal).ok_or_else(no_entry)?;
        let volume = self.risk.calculate_position_size(
            symbol,
            entry.to_f64(),
            signal.stop_loss.and_then(|sl| sl.to_f64()),
            self.risk.pip_size(),
        );

        let order = decide(signal, volume).ok_or_else(no_entry)?;
        self.risk.validate(&order)?;

        info!(
            "Order created: {} SL={} TPs={:?}",
            order,
            order
                .stop_loss
                .map(|sl| format!("{:.2}", sl))
                .unwrap_or_else(|| "none".to_string()),
            order.take_profits
        );
        Ok(order)
    }

    /// Fills a missing stop 1% away from price and missing targets from
    /// reward multiples of the stop distance.
    pub fn enrich(&self, mut order: Order) -> Order {
        let Some(price) = order.price else {
            return order;
        };

        if order.stop_loss.is_none() {
            let offset = price * FALLBACK_STOP_FRACTION;
            let sl = match order.side {
                Side::Buy => price - offset,
                Side::Sell => price + offset,
            };
            warn!("{}: no stop loss, using {:.2}", order.symbol, sl);
            order.stop_loss = Some((sl * 100.0).round() / 100.0);
        }

        if order.take_profits.is_empty() {
            if let Some(sl) = order.stop_loss {
                order.take_profits =
                    self.risk
                        .suggest_take_profits(price, sl, order.side, &DEFAULT_RR_RATIOS);
                info!(
                    "{}: no targets, suggested {:?}",
                    order.symbol, order.take_profits
                );
            }
        }

        order
    }

    pub fn should_execute(&self, _order: &Order) -> bool {
        !self.dry_run
    }
}

fn missing_fields(signal: &Signal) -> String {
    let mut missing = Vec::new();
    if signal.symbol.is_none() {
        missing.push("symbol");
    }
    if signal.side.is_none() {
        missing.push("side");
    }
    if signal.market_price.is_none() && signal.buy_range.is_none() && signal.sell_range.is_none() {
        missing.push("price");
    }
    format!("missing {}", missing.join(", "))
}
