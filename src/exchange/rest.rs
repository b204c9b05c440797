use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::exchange::ExecutionBackend;
use crate::models::{AccountInfo, FillStatus, Order, OrderFill};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderPayload<'a> {
    symbol: &'a str,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    volume: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<f64>,
    /// Brokers on this API take a single target; the rest of the ladder is
    /// realised by partial closes.
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<f64>,
}

impl<'a> OrderPayload<'a> {
    fn from_order(order: &'a Order) -> Self {
        Self {
            symbol: &order.symbol,
            side: order.side.as_str().to_uppercase(),
            order_type: order.order_type.to_string().to_uppercase(),
            volume: order.volume,
            price: order.price,
            stop_loss: order.stop_loss,
            take_profit: order.take_profits.first().copied(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(alias = "orderId", alias = "positionId")]
    id: serde_json::Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "executionPrice")]
    price: Option<f64>,
    #[serde(default, alias = "filledVolume")]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    #[serde(default)]
    balance: f64,
    #[serde(default)]
    equity: f64,
    #[serde(default)]
    margin: f64,
    #[serde(default)]
    free_margin: f64,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ClosePayload {
    volume: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopLossPayload {
    stop_loss: f64,
}

/// Thin JSON-over-HTTP broker adapter with bearer authentication.
pub struct RestBackend {
    client: Client,
    base_url: Option<String>,
    token: Option<String>,
    last_request: Mutex<Option<Instant>>,
    initialized: AtomicBool,
}

impl RestBackend {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: cfg
                .broker_rest_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            token: cfg.broker_token.clone(),
            last_request: Mutex::new(None),
            initialized: AtomicBool::new(false),
        })
    }

    async fn rate_limit(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    fn url(&self, path: &str) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .context("BROKER_REST_URL is not set")?;
        Ok(format!("{}{}", base, path))
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            bail!("REST backend not initialized");
        }
        Ok(())
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        self.rate_limit().await;

        let token = self.token.as_deref().unwrap_or_default();
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to {}", what))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Broker API error {} ({}): {}", status, what, body);
        }
        Ok(resp)
    }

    async fn fetch_account(&self) -> Result<AccountInfo> {
        let resp = self
            .send(self.client.get(self.url("/account")?), "fetch account")
            .await?;
        let data: AccountResponse = resp
            .json()
            .await
            .context("Failed to parse account response")?;

        Ok(AccountInfo {
            balance: data.balance,
            equity: data.equity,
            margin: data.margin,
            free_margin: data.free_margin,
            currency: data.currency.unwrap_or_else(|| "USD".to_string()),
        })
    }
}

#[async_trait]
impl ExecutionBackend for RestBackend {
    fn name(&self) -> &str {
        "rest"
    }

    fn is_available(&self) -> bool {
        self.base_url.is_some() && self.token.is_some()
    }

    async fn initialize(&self) -> Result<()> {
        if !self.is_available() {
            bail!("REST backend not configured (BROKER_REST_URL / BROKER_TOKEN)");
        }
        let account = self
            .fetch_account()
            .await
            .context("REST backend connection test failed")?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "REST backend initialized, balance {:.2} {}",
            account.balance, account.currency
        );
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderFill> {
        self.ensure_initialized()?;

        let payload = OrderPayload::from_order(order);
        let resp = self
            .send(
                self.client.post(self.url("/orders")?).json(&payload),
                "place order",
            )
            .await?;
        let data: OrderResponse = resp
            .json()
            .await
            .context("Failed to parse order response")?;

        let order_id = match data.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let status = match data.status.as_deref().map(str::to_lowercase).as_deref() {
            Some("pending") | Some("accepted") | Some("working") => FillStatus::Pending,
            _ => FillStatus::Filled,
        };

        info!("Order {} placed as {}", order, order_id);
        Ok(OrderFill {
            order_id,
            status,
            price: data.price,
            volume: data.volume.unwrap_or(0.0),
        })
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        self.ensure_initialized()?;

        let resp = self
            .send(
                self.client
                    .get(self.url(&format!("/symbols/{}/price", symbol))?),
                "fetch price",
            )
            .await?;
        let data: PriceResponse = resp
            .json()
            .await
            .context("Failed to parse price response")?;

        data.bid
            .or(data.ask)
            .with_context(|| format!("No price for {} in response", symbol))
    }

    async fn close_position_partial(&self, position_id: &str, volume: f64) -> Result<()> {
        self.ensure_initialized()?;

        self.send(
            self.client
                .post(self.url(&format!("/positions/{}/close", position_id))?)
                .json(&ClosePayload { volume }),
            "close position",
        )
        .await?;
        info!("Closed {:.2} lots of position {}", volume, position_id);
        Ok(())
    }

    async fn modify_stop_loss(&self, position_id: &str, stop_loss: f64) -> Result<()> {
        self.ensure_initialized()?;

        self.send(
            self.client
                .patch(self.url(&format!("/positions/{}", position_id))?)
                .json(&StopLossPayload { stop_loss }),
            "modify stop loss",
        )
        .await?;
        info!("Stop loss of position {} set to {:.2}", position_id, stop_loss);
        Ok(())
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        self.ensure_initialized()?;
        self.fetch_account().await.map_err(|e| {
            error!("Failed to get account info: {:#}", e);
            e
        })
    }

    async fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        info!("REST backend connection closed");
    }
}
