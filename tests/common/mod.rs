use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use signal_trader::config::Config;
use signal_trader::exchange::ExecutionBackend;
use signal_trader::models::{AccountInfo, FillStatus, Order, OrderFill};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Place(Order),
    Close(String, f64),
    StopLoss(String, f64),
}

#[derive(Default)]
struct MockState {
    prices: HashMap<String, f64>,
    calls: Vec<Call>,
    fill_volume: Option<f64>,
    balance: f64,
    fail_orders: bool,
    fail_closes: bool,
    fail_stop_changes: bool,
    order_counter: u64,
}

/// A mock broker that records every call and fails on demand.
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                balance: 10_000.0,
                ..Default::default()
            }),
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.state
            .lock()
            .unwrap()
            .prices
            .insert(symbol.to_string(), price);
    }

    pub fn set_balance(&self, balance: f64) {
        self.state.lock().unwrap().balance = balance;
    }

    /// Report this volume on fills instead of the requested one.
    pub fn set_fill_volume(&self, volume: f64) {
        self.state.lock().unwrap().fill_volume = Some(volume);
    }

    pub fn fail_orders(&self, fail: bool) {
        self.state.lock().unwrap().fail_orders = fail;
    }

    pub fn fail_closes(&self, fail: bool) {
        self.state.lock().unwrap().fail_closes = fail;
    }

    pub fn fail_stop_changes(&self, fail: bool) {
        self.state.lock().unwrap().fail_stop_changes = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn closed_volumes(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Close(_, v) => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn stop_losses(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StopLoss(_, sl) => Some(sl),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ExecutionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderFill> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Place(order.clone()));
        if state.fail_orders {
            bail!("order rejected by mock broker");
        }
        state.order_counter += 1;
        Ok(OrderFill {
            order_id: format!("mock-{}", state.order_counter),
            status: FillStatus::Filled,
            price: order.price,
            volume: state.fill_volume.unwrap_or(order.volume),
        })
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        match self.state.lock().unwrap().prices.get(symbol) {
            Some(p) => Ok(*p),
            None => bail!("no quote for {}", symbol),
        }
    }

    async fn close_position_partial(&self, position_id: &str, volume: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_closes {
            bail!("close rejected by mock broker");
        }
        state.calls.push(Call::Close(position_id.to_string(), volume));
        Ok(())
    }

    async fn modify_stop_loss(&self, position_id: &str, stop_loss: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_stop_changes {
            bail!("stop change rejected by mock broker");
        }
        state
            .calls
            .push(Call::StopLoss(position_id.to_string(), stop_loss));
        Ok(())
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        let balance = self.state.lock().unwrap().balance;
        Ok(AccountInfo {
            balance,
            equity: balance,
            margin: 0.0,
            free_margin: balance,
            currency: "USD".to_string(),
        })
    }

    async fn shutdown(&self) {}
}

/// Paper-mode config with dry run off so orders reach the backend.
pub fn live_test_config() -> Config {
    Config {
        dry_run: false,
        ..Config::default()
    }
}
