pub mod order;
pub mod side;
pub mod signal;

pub use order::{AccountInfo, FillStatus, Order, OrderFill, OrderMetadata};
pub use side::{OrderType, PositionState, Side};
pub use signal::{PriceRange, Signal, TakeProfitLevel, TP_SLOTS};
