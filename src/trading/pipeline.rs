use std::sync::Arc;
use tracing::{info, warn};

use crate::core::signal_parser::SignalParser;
use crate::error::TradeError;
use crate::exchange::ExecutionBackend;
use crate::feed::InboundMessage;
use crate::models::{FillStatus, Order, OrderFill};
use crate::trading::monitor::PositionMonitor;
use crate::trading::order_service::OrderService;
use crate::trading::position_manager::PositionManager;

/// What became of one inbound message that produced an order.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    DryRun(Order),
    Executed {
        order: Order,
        fill: OrderFill,
        tracked: bool,
    },
}

/// parse -> order -> execute -> track, one message at a time.
pub struct SignalPipeline {
    parser: SignalParser,
    orders: OrderService,
    backend: Arc<dyn ExecutionBackend>,
    positions: Arc<PositionManager>,
    monitor: PositionMonitor,
}

impl SignalPipeline {
    pub fn new(
        parser: SignalParser,
        orders: OrderService,
        backend: Arc<dyn ExecutionBackend>,
        positions: Arc<PositionManager>,
        monitor: PositionMonitor,
    ) -> Self {
        Self {
            parser,
            orders,
            backend,
            positions,
            monitor,
        }
    }

    pub fn positions(&self) -> &Arc<PositionManager> {
        &self.positions
    }

    pub fn monitor(&self) -> &PositionMonitor {
        &self.monitor
    }

    pub fn orders(&self) -> &OrderService {
        &self.orders
    }

    /// Handles one message. Errors describe why it was skipped; none of
    /// them should stop the caller's loop.
    pub async fn handle_message(&mut self, msg: &InboundMessage) -> Result<Outcome, TradeError> {
        info!("Message from {} ({} chars)", msg.chat, msg.text.chars().count());

        let signal = self.parser.parse(&msg.text);
        if signal.is_valid() {
            info!(
                "Signal: {} {} market={:?} SL={:?} TPs={}",
                signal.symbol.as_deref().unwrap_or("?"),
                signal.side.map(|s| s.to_string()).unwrap_or_default(),
                signal.market_price,
                signal.stop_loss,
                signal.take_profit_prices().len()
            );
        } else {
            warn!("Incomplete signal from {}", msg.chat);
        }

        let order = self.orders.create_order(&signal)?;

        if !self.orders.should_execute(&order) {
            info!("[DRY RUN] Would place {}", order);
            return Ok(Outcome::DryRun(order));
        }

        if !self.backend.is_available() {
            return Err(TradeError::BackendUnavailable(
                self.backend.name().to_string(),
            ));
        }

        let fill = self
            .backend
            .place_order(&order)
            .await
            .map_err(TradeError::execution)?;
        info!("Order {} executed: {:?}", fill.order_id, fill.status);

        let tracked = self.track(&order, &fill);
        self.refresh_balance().await;

        Ok(Outcome::Executed {
            order,
            fill,
            tracked,
        })
    }

    /// Filled orders with a multi-level ladder get a managed position and a
    /// monitor.
    fn track(&self, order: &Order, fill: &OrderFill) -> bool {
        if order.take_profits.len() <= 1 {
            return false;
        }
        if fill.status != FillStatus::Filled {
            info!(
                "Order {} is {:?} at the broker, not managing its ladder",
                fill.order_id, fill.status
            );
            return false;
        }
        let Some(entry) = fill.price.or(order.price) else {
            warn!("Order {} has no entry price, not tracking", fill.order_id);
            return false;
        };

        self.positions
            .add_position(&fill.order_id, order, entry, fill.volume);
        self.monitor.spawn(&fill.order_id);
        info!(
            "Position {} tracked with {} TP levels",
            fill.order_id,
            order.take_profits.len()
        );
        true
    }

    async fn refresh_balance(&mut self) {
        match self.backend.get_account_info().await {
            Ok(account) => self
                .orders
                .risk_mut()
                .update_account_balance(account.balance),
            Err(e) => warn!("Could not refresh account balance: {:#}", e),
        }
    }

    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
        self.backend.shutdown().await;
    }
}
