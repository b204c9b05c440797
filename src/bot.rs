use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use signal_trader::config::Config;
use signal_trader::error::TradeError;
use signal_trader::exchange::ExecutionBackend;
use signal_trader::feed::{InboundMessage, MessageSource};
use signal_trader::health::{HealthFile, HealthStatus};
use signal_trader::trading::{Outcome, SignalPipeline};

pub struct SignalBot {
    pipeline: SignalPipeline,
    backend: Arc<dyn ExecutionBackend>,
    source: Box<dyn MessageSource>,
    health: HealthFile,
    dry_run: bool,
    handled: u64,
    executed: u64,
}

impl SignalBot {
    pub fn new(
        cfg: &Config,
        pipeline: SignalPipeline,
        backend: Arc<dyn ExecutionBackend>,
        source: Box<dyn MessageSource>,
    ) -> Self {
        info!("{}", "=".repeat(60));
        info!("Signal trader starting up");
        info!(
            "Mode: {}",
            if cfg.dry_run { "DRY RUN" } else { "LIVE TRADING" }
        );
        info!("Backend: {}", backend.name());
        info!(
            "Risk: {}% of {:.2}, volume [{}, {}]",
            cfg.risk_percent, cfg.account_balance, cfg.min_volume, cfg.max_volume
        );
        info!(
            "TP split: {:?}, poll every {}s",
            cfg.tp_split,
            cfg.poll_interval().as_secs()
        );
        info!("Listening on: {}", cfg.chat_label);
        info!("{}", "=".repeat(60));

        Self {
            pipeline,
            backend,
            source,
            health: HealthFile::new(&cfg.health_file),
            dry_run: cfg.dry_run,
            handled: 0,
            executed: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.set_health(HealthStatus::Starting);

        if let Err(e) = self.backend.initialize().await {
            if !self.dry_run {
                error!("Backend {} failed to initialize: {:#}", self.backend.name(), e);
                self.set_health(HealthStatus::Error);
                return Err(e);
            }
            warn!("Backend {} not initialized ({:#}), continuing in dry-run", self.backend.name(), e);
        }

        self.set_health(HealthStatus::Running);
        info!("Bot is now running. Press Ctrl+C to stop.");

        loop {
            let next = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received");
                    None
                }
                msg = self.source.next_message() => {
                    if msg.is_none() {
                        info!("Message source exhausted");
                    }
                    msg
                }
            };
            let Some(msg) = next else {
                break;
            };
            self.handle(msg).await;
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle(&mut self, msg: InboundMessage) {
        self.handled += 1;
        match self.pipeline.handle_message(&msg).await {
            Ok(Outcome::DryRun(order)) => info!("Dry-run order: {}", order),
            Ok(Outcome::Executed { order, fill, tracked }) => {
                self.executed += 1;
                info!(
                    "Executed {} as {}{}",
                    order,
                    fill.order_id,
                    if tracked { " (managed)" } else { "" }
                );
            }
            Err(e @ TradeError::InvalidSignal(_)) => info!("Skipped message: {}", e),
            Err(e) => warn!("Message not executed: {}", e),
        }
        self.set_health(HealthStatus::Running);
    }

    fn set_health(&self, status: HealthStatus) {
        if let Err(e) = self.health.update(status) {
            warn!("Health file update failed: {:#}", e);
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        let open = self.pipeline.positions().len();
        if open > 0 {
            warn!("{} managed positions left open at the broker", open);
        }
        self.pipeline.shutdown().await;
        self.set_health(HealthStatus::Stopped);
        info!(
            "Handled {} messages, executed {} orders",
            self.handled, self.executed
        );
        info!("Goodbye!");
    }
}
