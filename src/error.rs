use thiserror::Error;

use crate::core::risk::RiskRejection;

/// Why an inbound message did not turn into an executed order.
///
/// None of these stop the bot; the message is skipped and logged.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("No entry price derivable for {symbol} {side}")]
    NoEntryPrice { symbol: String, side: String },

    #[error("Order rejected by risk checks: {0}")]
    RejectedByRisk(#[from] RiskRejection),

    #[error("Execution backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl TradeError {
    pub fn execution(err: anyhow::Error) -> Self {
        TradeError::Execution(format!("{:#}", err))
    }
}
