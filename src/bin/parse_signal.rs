use anyhow::{Context, Result};
use serde_json::json;
use std::io::Read;
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

use signal_trader::config::Config;
use signal_trader::core::risk::RiskManager;
use signal_trader::core::signal_parser::SignalParser;
use signal_trader::core::symbols::SymbolRegistry;
use signal_trader::trading::OrderService;

/// Prints the parsed signal and the order it would produce as JSON.
///
/// Usage: parse-signal [--enrich] [TEXT...]   (reads stdin when TEXT is omitted)
fn main() -> Result<()> {
    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let mut enrich = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--enrich" => enrich = true,
            _ => words.push(arg),
        }
    }

    let text = if words.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read signal from stdin")?;
        buf
    } else {
        words.join(" ")
    };

    let mut symbols = SymbolRegistry::new(&cfg);
    if let Some(path) = &cfg.symbols_file {
        symbols.load_details(Path::new(path))?;
    }

    let parser = SignalParser::new(symbols.clone())?;
    let orders = OrderService::new(RiskManager::new(&cfg, symbols), true);

    let signal = parser.parse(&text);
    let report = match orders.create_order(&signal) {
        Ok(order) => {
            let order = if enrich { orders.enrich(order) } else { order };
            json!({ "valid": signal.is_valid(), "signal": signal, "order": order })
        }
        Err(e) => json!({ "valid": signal.is_valid(), "signal": signal, "error": e.to_string() }),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
