pub mod paper;
pub mod rest;

pub use paper::PaperBackend;
pub use rest::RestBackend;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::models::{AccountInfo, Order, OrderFill};

/// Broker capability set the trading core depends on.
///
/// Methods take `&self` so one backend can be shared by every position monitor.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    async fn initialize(&self) -> Result<()>;
    async fn place_order(&self, order: &Order) -> Result<OrderFill>;
    async fn get_current_price(&self, symbol: &str) -> Result<f64>;
    async fn close_position_partial(&self, position_id: &str, volume: f64) -> Result<()>;
    async fn modify_stop_loss(&self, position_id: &str, stop_loss: f64) -> Result<()>;
    async fn get_account_info(&self) -> Result<AccountInfo>;
    async fn shutdown(&self);
}

/// Picks the backend variant named in the config. Called once at startup.
pub fn build_backend(cfg: &Config) -> Result<Arc<dyn ExecutionBackend>> {
    match cfg.backend_kind() {
        Some(BackendKind::Paper) => Ok(Arc::new(PaperBackend::new(cfg))),
        Some(BackendKind::Rest) => Ok(Arc::new(RestBackend::new(cfg)?)),
        None => bail!("Unknown trading backend: {}", cfg.backend),
    }
}
