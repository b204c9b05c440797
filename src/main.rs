mod bot;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use signal_trader::config::Config;
use signal_trader::core::risk::RiskManager;
use signal_trader::core::signal_parser::SignalParser;
use signal_trader::core::symbols::SymbolRegistry;
use signal_trader::exchange::build_backend;
use signal_trader::feed::LineSource;
use signal_trader::trading::{OrderService, PositionManager, PositionMonitor, SignalPipeline};

use crate::bot::SignalBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    cfg.validate()?;
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("Failed to create log dir {}", cfg.log_dir))?;

    let mut symbols = SymbolRegistry::new(&cfg);
    if let Some(path) = &cfg.symbols_file {
        if let Err(e) = symbols.load_details(Path::new(path)) {
            warn!("Symbol details not loaded: {:#}", e);
        }
    }

    let backend = build_backend(&cfg)?;
    let positions = Arc::new(PositionManager::new(&cfg, symbols.clone()));
    let monitor = PositionMonitor::new(positions.clone(), backend.clone(), cfg.poll_interval());
    let pipeline = SignalPipeline::new(
        SignalParser::new(symbols.clone())?,
        OrderService::new(RiskManager::new(&cfg, symbols), cfg.dry_run),
        backend.clone(),
        positions,
        monitor,
    );

    let source = LineSource::new(&cfg.chat_label, BufReader::new(tokio::io::stdin()));

    let mut bot = SignalBot::new(&cfg, pipeline, backend, Box::new(source));
    bot.run().await?;

    Ok(())
}
