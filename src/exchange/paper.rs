use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::core::symbols::SymbolRegistry;
use crate::exchange::ExecutionBackend;
use crate::models::{AccountInfo, FillStatus, Order, OrderFill, Side};

const VOLUME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct PaperPosition {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

#[derive(Debug, Default)]
struct PaperState {
    prices: HashMap<String, f64>,
    positions: HashMap<String, PaperPosition>,
    balance: f64,
    order_counter: u64,
}

/// In-memory broker. Orders fill immediately at their quoted price (or the
/// last known price for market orders without one); prices only move when
/// [`PaperBackend::set_price`] is called.
pub struct PaperBackend {
    state: Mutex<PaperState>,
    symbols: SymbolRegistry,
    pip_size: f64,
}

impl PaperBackend {
    pub fn new(cfg: &Config) -> Self {
        Self {
            state: Mutex::new(PaperState {
                balance: cfg.account_balance,
                ..Default::default()
            }),
            symbols: SymbolRegistry::new(cfg),
            pip_size: cfg.pip_size,
        }
    }

    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.state
            .lock()
            .await
            .prices
            .insert(symbol.to_uppercase(), price);
    }

    pub async fn position(&self, position_id: &str) -> Option<PaperPosition> {
        self.state.lock().await.positions.get(position_id).cloned()
    }

    pub async fn open_positions(&self) -> usize {
        self.state.lock().await.positions.len()
    }

    /// Account currency P&L of `volume` lots moved from `entry` to `exit`.
    fn pnl(&self, pos: &PaperPosition, exit: f64, volume: f64) -> f64 {
        let diff = match pos.side {
            Side::Buy => exit - pos.entry_price,
            Side::Sell => pos.entry_price - exit,
        };
        diff / self.pip_size * self.symbols.pip_value(&pos.symbol) * volume
    }
}

#[async_trait]
impl ExecutionBackend for PaperBackend {
    fn name(&self) -> &str {
        "paper"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<()> {
        let state = self.state.lock().await;
        info!("Paper backend ready, balance {:.2}", state.balance);
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderFill> {
        if order.volume <= 0.0 {
            bail!("Order volume must be positive, got {}", order.volume);
        }

        let mut state = self.state.lock().await;
        let key = order.symbol.to_uppercase();
        let fill_price = order
            .price
            .or_else(|| state.prices.get(&key).copied())
            .with_context(|| format!("No price available for {}", order.symbol))?;
        state.prices.entry(key).or_insert(fill_price);

        state.order_counter += 1;
        let order_id = format!("paper-{}", state.order_counter);
        state.positions.insert(
            order_id.clone(),
            PaperPosition {
                symbol: order.symbol.clone(),
                side: order.side,
                entry_price: fill_price,
                volume: order.volume,
                stop_loss: order.stop_loss,
                take_profit: order.take_profits.first().copied(),
            },
        );

        info!("[PAPER] Filled {} as {}", order, order_id);
        Ok(OrderFill {
            order_id,
            status: FillStatus::Filled,
            price: Some(fill_price),
            volume: order.volume,
        })
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        self.state
            .lock()
            .await
            .prices
            .get(&symbol.to_uppercase())
            .copied()
            .with_context(|| format!("No price for {}", symbol))
    }

    async fn close_position_partial(&self, position_id: &str, volume: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        let pos = state
            .positions
            .get(position_id)
            .cloned()
            .with_context(|| format!("Unknown position {}", position_id))?;

        if volume <= 0.0 || volume > pos.volume + VOLUME_EPSILON {
            bail!(
                "Cannot close {} lots of position {} holding {}",
                volume,
                position_id,
                pos.volume
            );
        }

        let exit = state
            .prices
            .get(&pos.symbol.to_uppercase())
            .copied()
            .unwrap_or(pos.entry_price);
        let pnl = self.pnl(&pos, exit, volume);
        state.balance += pnl;

        let remaining = pos.volume - volume;
        if remaining <= VOLUME_EPSILON {
            state.positions.remove(position_id);
        } else if let Some(p) = state.positions.get_mut(position_id) {
            p.volume = remaining;
        }

        info!(
            "[PAPER] Closed {:.2} lots of {} @ {:.2}, P&L {:.2}",
            volume, position_id, exit, pnl
        );
        Ok(())
    }

    async fn modify_stop_loss(&self, position_id: &str, stop_loss: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        let pos = state
            .positions
            .get_mut(position_id)
            .with_context(|| format!("Unknown position {}", position_id))?;
        pos.stop_loss = Some(stop_loss);
        info!("[PAPER] Stop loss of {} moved to {:.2}", position_id, stop_loss);
        Ok(())
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        let state = self.state.lock().await;
        let unrealized: f64 = state
            .positions
            .values()
            .map(|p| {
                let price = state
                    .prices
                    .get(&p.symbol.to_uppercase())
                    .copied()
                    .unwrap_or(p.entry_price);
                self.pnl(p, price, p.volume)
            })
            .sum();

        Ok(AccountInfo {
            balance: state.balance,
            equity: state.balance + unrealized,
            margin: 0.0,
            free_margin: state.balance + unrealized,
            currency: "USD".to_string(),
        })
    }

    async fn shutdown(&self) {
        let state = self.state.lock().await;
        info!(
            "Paper backend stopped with {} open positions, balance {:.2}",
            state.positions.len(),
            state.balance
        );
    }
}
