use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::config::Config;
use crate::core::signal_parser::SignalParser;
use crate::core::symbols::SymbolRegistry;
use crate::exchange::ExecutionBackend;
use crate::models::{AccountInfo, FillStatus, Order, OrderFill, OrderMetadata, OrderType, Side};

/// A Config suitable for testing: paper backend, no credentials, temp log dir.
pub fn default_test_config() -> Config {
    let dir = std::env::temp_dir().join("signal-trader-tests");
    Config {
        log_dir: dir.to_string_lossy().to_string(),
        health_file: dir.join("health.txt").to_string_lossy().to_string(),
        ..Config::default()
    }
}

pub fn test_parser() -> SignalParser {
    SignalParser::new(SymbolRegistry::new(&default_test_config())).unwrap()
}

/// XAUUSD market buy, 0.1 lots @ 2682, SL 2670, TPs 2690/2700.
pub fn sample_order() -> Order {
    let signal_time = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    Order {
        symbol: "XAUUSD".to_string(),
        side: Side::Buy,
        order_type: OrderType::Market,
        volume: 0.1,
        price: Some(2682.0),
        stop_loss: Some(2670.0),
        take_profits: vec![2690.0, 2700.0],
        metadata: OrderMetadata::new(signal_time, None, "XAUUSD Buy"),
    }
}

#[derive(Default)]
struct FakeState {
    price: Option<f64>,
    fail_closes: bool,
    fail_stop_changes: bool,
    pending_fills: bool,
    closes: Vec<(String, f64)>,
    stop_changes: Vec<(String, f64)>,
}

/// Single-price backend with switchable failures, for monitor tests.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn set_price(&self, price: f64) {
        self.state.lock().unwrap().price = Some(price);
    }

    /// Report placed orders as resting instead of filled.
    pub fn fill_pending(&self, pending: bool) {
        self.state.lock().unwrap().pending_fills = pending;
    }

    pub fn fail_closes(&self, fail: bool) {
        self.state.lock().unwrap().fail_closes = fail;
    }

    pub fn fail_stop_changes(&self, fail: bool) {
        self.state.lock().unwrap().fail_stop_changes = fail;
    }

    pub fn closes(&self) -> Vec<(String, f64)> {
        self.state.lock().unwrap().closes.clone()
    }

    pub fn stop_changes(&self) -> Vec<(String, f64)> {
        self.state.lock().unwrap().stop_changes.clone()
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderFill> {
        let status = if self.state.lock().unwrap().pending_fills {
            FillStatus::Pending
        } else {
            FillStatus::Filled
        };
        Ok(OrderFill {
            order_id: "fake-1".to_string(),
            status,
            price: order.price,
            volume: order.volume,
        })
    }

    async fn get_current_price(&self, _symbol: &str) -> Result<f64> {
        match self.state.lock().unwrap().price {
            Some(p) => Ok(p),
            None => bail!("no price"),
        }
    }

    async fn close_position_partial(&self, position_id: &str, volume: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_closes {
            bail!("close rejected");
        }
        state.closes.push((position_id.to_string(), volume));
        Ok(())
    }

    async fn modify_stop_loss(&self, position_id: &str, stop_loss: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_stop_changes {
            bail!("stop change rejected");
        }
        state.stop_changes.push((position_id.to_string(), stop_loss));
        Ok(())
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        Ok(AccountInfo {
            balance: 10_000.0,
            equity: 10_000.0,
            margin: 0.0,
            free_margin: 10_000.0,
            currency: "USD".to_string(),
        })
    }

    async fn shutdown(&self) {}
}
