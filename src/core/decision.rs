use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::{Order, OrderMetadata, OrderType, Signal};

/// Order type and price for a signal, or `None` when no price is derivable.
///
/// A market price inside the side's range means "enter now"; a range
/// without that means a limit at its midpoint; a bare market price is a
/// market order.
pub fn resolve_entry(signal: &Signal) -> Option<(OrderType, Decimal)> {
    match (signal.market_price, signal.side_range()) {
        (Some(market), Some(range)) if range.contains(market) => Some((OrderType::Market, market)),
        (_, Some(range)) => Some((OrderType::Limit, range.midpoint())),
        (Some(market), None) => Some((OrderType::Market, market)),
        (None, None) => None,
    }
}

/// Combines a signal with a sized volume into an executable order.
///
/// Stop loss and numeric take-profit levels are copied through unchanged.
pub fn decide(signal: &Signal, volume: f64) -> Option<Order> {
    let symbol = signal.symbol.clone()?;
    let side = signal.side?;
    let (order_type, price) = resolve_entry(signal)?;

    Some(Order {
        symbol,
        side,
        order_type,
        volume,
        price: price.to_f64(),
        stop_loss: signal.stop_loss.and_then(|sl| sl.to_f64()),
        take_profits: signal
            .take_profit_prices()
            .iter()
            .filter_map(|tp| tp.to_f64())
            .collect(),
        metadata: OrderMetadata::new(signal.timestamp, signal.pip_count, &signal.raw_text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriceRange, Side, TakeProfitLevel};
    use crate::test_helpers::test_parser;
    use rust_decimal_macros::dec;

    fn buy_signal() -> Signal {
        let mut s = Signal::empty("XAUUSD Buy now: 2680 - 2685");
        s.symbol = Some("XAUUSD".to_string());
        s.side = Some(Side::Buy);
        s.buy_range = Some(PriceRange::new(dec!(2680), dec!(2685)));
        s
    }

    #[test]
    fn market_inside_range_is_market_order() {
        let text = "XAUUSD Buy now: 2680 - 2685, Market price: 2682, TP1: 2690, TP2: 2700, SL: 2670";
        let signal = test_parser().parse(text);
        let order = decide(&signal, 0.1).unwrap();
        assert_eq!(order.symbol, "XAUUSD");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.price, Some(2682.0));
        assert_eq!(order.take_profits, vec![2690.0, 2700.0]);
        assert_eq!(order.stop_loss, Some(2670.0));
        assert_eq!(order.volume, 0.1);
    }

    #[test]
    fn market_outside_range_is_limit_at_midpoint() {
        let text = "XAUUSD Buy now: 2680 - 2685, Market price: 2690, TP1: 2690, TP2: 2700, SL: 2670";
        let signal = test_parser().parse(text);
        let order = decide(&signal, 0.1).unwrap();
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price, Some(2682.5));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let mut s = buy_signal();
        s.market_price = Some(dec!(2685));
        assert_eq!(decide(&s, 0.1).unwrap().order_type, OrderType::Market);
        s.market_price = Some(dec!(2680));
        assert_eq!(decide(&s, 0.1).unwrap().order_type, OrderType::Market);
    }

    #[test]
    fn range_without_market_price_is_limit() {
        let order = decide(&buy_signal(), 0.05).unwrap();
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price, Some(2682.5));
    }

    #[test]
    fn bare_market_price_is_market_order() {
        let mut s = buy_signal();
        s.buy_range = None;
        s.market_price = Some(dec!(2001.5));
        let order = decide(&s, 0.1).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.price, Some(2001.5));
    }

    #[test]
    fn other_side_range_is_ignored() {
        let mut s = buy_signal();
        s.buy_range = None;
        s.sell_range = Some(PriceRange::new(dec!(2050), dec!(2055)));
        assert!(decide(&s, 0.1).is_none());

        s.market_price = Some(dec!(2052));
        let order = decide(&s, 0.1).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.price, Some(2052.0));
    }

    #[test]
    fn missing_symbol_or_side_yields_nothing() {
        let mut s = buy_signal();
        s.symbol = None;
        assert!(decide(&s, 0.1).is_none());

        let mut s = buy_signal();
        s.side = None;
        assert!(decide(&s, 0.1).is_none());
    }

    #[test]
    fn open_targets_are_not_copied() {
        let mut s = buy_signal();
        s.take_profits = [
            TakeProfitLevel::Price(dec!(2690)),
            TakeProfitLevel::Open,
            TakeProfitLevel::Absent,
            TakeProfitLevel::Absent,
        ];
        assert_eq!(decide(&s, 0.1).unwrap().take_profits, vec![2690.0]);
    }

    #[test]
    fn decide_is_idempotent() {
        let text = "GOLD Sell now: 2055 - 2050 Market price: 2049 TP1: 2040 TP2: 2030 TP3: 2020 SL: 2060";
        let signal = test_parser().parse(text);
        let a = decide(&signal, 0.2);
        let b = decide(&signal, 0.2);
        assert!(a.is_some());
        assert_eq!(a, b);
    }
}
