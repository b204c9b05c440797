pub mod monitor;
pub mod order_service;
pub mod pipeline;
pub mod position_manager;

pub use monitor::{PollOutcome, PositionMonitor, PositionPoller};
pub use order_service::OrderService;
pub use pipeline::{Outcome, SignalPipeline};
pub use position_manager::{ManagedPosition, PositionManager, TpAction};
