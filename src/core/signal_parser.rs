use anyhow::Result;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::core::normalize::normalize_text;
use crate::core::symbols::SymbolRegistry;
use crate::models::{PriceRange, Side, Signal, TakeProfitLevel, TP_SLOTS};

const NUMBER: &str = r"[0-9]+(?:\.[0-9]+)?";

/// Turns free-form signal text into a [`Signal`].
///
/// Parsing never fails: anything that cannot be extracted is left unset.
pub struct SignalParser {
    registry: SymbolRegistry,
    symbol_re: Regex,
    market_price_re: Regex,
    buy_range_re: Regex,
    sell_range_re: Regex,
    take_profit_res: Vec<Regex>,
    stop_loss_re: Regex,
    pip_re: Regex,
    side_re: Regex,
}

impl SignalParser {
    pub fn new(registry: SymbolRegistry) -> Result<Self> {
        let alternation = registry
            .tokens()
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");

        let take_profit_res = (1..=TP_SLOTS)
            .map(|i| Regex::new(&format!(r"(?i)Tp{}[\s:\-]*({}|open)", i, NUMBER)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            symbol_re: Regex::new(&format!(r"(?i)\b({})\b", alternation))?,
            market_price_re: Regex::new(&format!(r"(?i)Market\s*price\s*[:\-]\s*({})", NUMBER))?,
            buy_range_re: Regex::new(&range_pattern("Buy"))?,
            sell_range_re: Regex::new(&range_pattern("Sell"))?,
            take_profit_res,
            // SL and SI are look-alikes in channel posts
            stop_loss_re: Regex::new(&format!(r"(?i)\bS[LI]\b\s*[:\-]?\s*({})", NUMBER))?,
            pip_re: Regex::new(r"(?i)(\d+)\s*pip")?,
            side_re: Regex::new(r"(?i)\b(buy|sell)\b")?,
            registry,
        })
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn parse(&self, text: &str) -> Signal {
        let normalized = normalize_text(text);
        let mut signal = Signal::empty(text);

        signal.symbol = self.extract_symbol(&normalized);
        signal.market_price = self.extract_market_price(&normalized);
        signal.buy_range = extract_range(&self.buy_range_re, &normalized);
        signal.sell_range = extract_range(&self.sell_range_re, &normalized);
        signal.take_profits = self.extract_take_profits(&normalized);
        signal.stop_loss = self.extract_stop_loss(&normalized);
        signal.pip_count = self.extract_pip_count(&normalized);
        signal.side = self.resolve_side(&normalized, &signal);

        debug!(
            "Parsed signal: symbol={:?} side={:?} valid={}",
            signal.symbol,
            signal.side,
            signal.is_valid()
        );

        signal
    }

    fn extract_symbol(&self, text: &str) -> Option<String> {
        let token = self.symbol_re.captures(text)?.get(1)?.as_str();
        self.registry.resolve(token).map(str::to_string)
    }

    fn extract_market_price(&self, text: &str) -> Option<Decimal> {
        capture_decimal(&self.market_price_re, text)
    }

    fn extract_take_profits(&self, text: &str) -> [TakeProfitLevel; TP_SLOTS] {
        let mut levels = [TakeProfitLevel::Absent; TP_SLOTS];
        for (slot, re) in levels.iter_mut().zip(&self.take_profit_res) {
            let Some(value) = re.captures(text).and_then(|c| c.get(1)) else {
                continue;
            };
            let value = value.as_str();
            *slot = if value.eq_ignore_ascii_case("open") {
                TakeProfitLevel::Open
            } else {
                match value.parse::<Decimal>() {
                    Ok(p) => TakeProfitLevel::Price(p),
                    Err(_) => TakeProfitLevel::Absent,
                }
            };
        }
        levels
    }

    fn extract_stop_loss(&self, text: &str) -> Option<Decimal> {
        capture_decimal(&self.stop_loss_re, text)
    }

    fn extract_pip_count(&self, text: &str) -> Option<u32> {
        self.pip_re.captures(text)?.get(1)?.as_str().parse().ok()
    }

    /// A quoted range decides the side (sell first); otherwise the first
    /// standalone buy/sell keyword.
    fn resolve_side(&self, text: &str, signal: &Signal) -> Option<Side> {
        if signal.sell_range.is_some() {
            return Some(Side::Sell);
        }
        if signal.buy_range.is_some() {
            return Some(Side::Buy);
        }
        let word = self.side_re.captures(text)?.get(1)?.as_str();
        Side::from_keyword(word)
    }
}

fn range_pattern(label: &str) -> String {
    // hyphen, en dash and em dash all separate the two bounds
    format!(
        r"(?i){}\s*(?:now)?\s*[:\-]\s*({})\s*[-–—]\s*({})",
        label, NUMBER, NUMBER
    )
}

fn capture_decimal(re: &Regex, text: &str) -> Option<Decimal> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn extract_range(re: &Regex, text: &str) -> Option<PriceRange> {
    let caps = re.captures(text)?;
    let a: Decimal = caps.get(1)?.as_str().parse().ok()?;
    let b: Decimal = caps.get(2)?.as_str().parse().ok()?;
    Some(PriceRange::new(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_parser;
    use rust_decimal_macros::dec;

    #[test]
    fn gold_aliases_map_to_xauusd() {
        let parser = test_parser();
        for symbol in ["XAUUSD", "GOLD", "XAU", "gold"] {
            let s = parser.parse(&format!("{} Market price: 2000", symbol));
            assert_eq!(s.symbol.as_deref(), Some("XAUUSD"), "alias {}", symbol);
        }
    }

    #[test]
    fn forex_symbols_are_recognised() {
        let parser = test_parser();
        for symbol in ["EURUSD", "GBPUSD", "USDJPY", "BTCUSD", "ETHUSD"] {
            let s = parser.parse(&format!("{} Buy: 1.1000", symbol));
            assert_eq!(s.symbol.as_deref(), Some(symbol));
            assert_eq!(s.side, Some(Side::Buy));
        }
    }

    #[test]
    fn first_symbol_in_text_wins() {
        let s = test_parser().parse("EURUSD looks weak, GOLD Buy now: 2680 - 2685");
        assert_eq!(s.symbol.as_deref(), Some("EURUSD"));
    }

    #[test]
    fn no_symbol_means_invalid() {
        let s = test_parser().parse("Just some random text, Buy now: 100 - 110");
        assert!(s.symbol.is_none());
        assert!(!s.is_valid());
    }

    #[test]
    fn symbol_must_be_a_whole_word() {
        let s = test_parser().parse("XAUUSDT Buy Market price: 2000");
        assert!(s.symbol.is_none());
    }

    #[test]
    fn full_buy_signal() {
        let text = "XAUUSD Buy now: 2680 - 2685, Market price: 2682, TP1: 2690, TP2: 2700, SL: 2670";
        let s = test_parser().parse(text);
        assert_eq!(s.symbol.as_deref(), Some("XAUUSD"));
        assert_eq!(s.side, Some(Side::Buy));
        assert_eq!(s.buy_range, Some(PriceRange::new(dec!(2680), dec!(2685))));
        assert_eq!(s.sell_range, None);
        assert_eq!(s.market_price, Some(dec!(2682)));
        assert_eq!(s.take_profits[0], TakeProfitLevel::Price(dec!(2690)));
        assert_eq!(s.take_profits[1], TakeProfitLevel::Price(dec!(2700)));
        assert!(s.take_profits[2].is_absent());
        assert!(s.take_profits[3].is_absent());
        assert_eq!(s.stop_loss, Some(dec!(2670)));
        assert_eq!(s.raw_text, text);
        assert!(s.is_valid());
    }

    #[test]
    fn multiline_signal_with_targets_and_pips() {
        let text = "
        🟢 XAUUSD (Scalp)

        Market price: 2685.50

        Buy now: 2685 - 2680

        🎯 Targets:
        TP1: 2690
        TP2: 2695
        TP3: 2700
        TP4: open

        🛑 SL: 2675 (100 pip)
        ";
        let s = test_parser().parse(text);
        assert_eq!(s.market_price, Some(dec!(2685.50)));
        assert_eq!(s.buy_range, Some(PriceRange::new(dec!(2680), dec!(2685))));
        assert_eq!(
            s.take_profits,
            [
                TakeProfitLevel::Price(dec!(2690)),
                TakeProfitLevel::Price(dec!(2695)),
                TakeProfitLevel::Price(dec!(2700)),
                TakeProfitLevel::Open,
            ]
        );
        assert_eq!(s.stop_loss, Some(dec!(2675)));
        assert_eq!(s.pip_count, Some(100));
        assert_eq!(s.side, Some(Side::Buy));
    }

    #[test]
    fn open_target_differs_from_missing_target() {
        let s = test_parser().parse("XAUUSD TP1: 2000 TP2: open TP4: 2020");
        assert_eq!(s.take_profits[0], TakeProfitLevel::Price(dec!(2000)));
        assert_eq!(s.take_profits[1], TakeProfitLevel::Open);
        assert_eq!(s.take_profits[2], TakeProfitLevel::Absent);
        assert_eq!(s.take_profits[3], TakeProfitLevel::Price(dec!(2020)));
    }

    #[test]
    fn sell_range_accepts_dashes_in_either_order() {
        let parser = test_parser();
        for text in [
            "XAUUSD Sell now: 2050 - 2055",
            "XAUUSD Sell now: 2055 – 2050",
            "XAUUSD sell now : 2055—2050",
        ] {
            let s = parser.parse(text);
            assert_eq!(
                s.sell_range,
                Some(PriceRange::new(dec!(2050), dec!(2055))),
                "{}",
                text
            );
            assert_eq!(s.side, Some(Side::Sell));
        }
    }

    #[test]
    fn sell_range_beats_buy_keyword() {
        let text = "Don't Buy now!\nXAUUSD\nSell now: 2050 - 2055";
        let s = test_parser().parse(text);
        assert!(s.buy_range.is_none());
        assert_eq!(s.side, Some(Side::Sell));
    }

    #[test]
    fn both_ranges_resolve_to_sell() {
        let s = test_parser().parse("XAUUSD Buy now: 2000 - 2005 Sell now: 2050 - 2055");
        assert!(s.buy_range.is_some());
        assert!(s.sell_range.is_some());
        assert_eq!(s.side, Some(Side::Sell));
    }

    #[test]
    fn keyword_side_uses_first_occurrence() {
        let s = test_parser().parse("GOLD SELL now, do not buy. Market price: 2000");
        assert_eq!(s.side, Some(Side::Sell));
        assert!(s.sell_range.is_none());
    }

    #[test]
    fn stop_loss_label_variants() {
        let parser = test_parser();
        for sl in ["SL: 2000", "SI: 2000", "Sl: 2000", "sl - 2000", "SL 2000"] {
            let s = parser.parse(&format!("XAUUSD {}", sl));
            assert_eq!(s.stop_loss, Some(dec!(2000)), "{}", sl);
        }
    }

    #[test]
    fn persian_digits_and_keywords() {
        let text = "
        XAUUSD
        Market price : ۴۱۱۲
        فروش now : ۴۱۱۲ - ۴۱۰۷
        Tp1 : ۴۱۲۰
        SL : ۴۱۰۱.۵۰
        ";
        let s = test_parser().parse(text);
        assert_eq!(s.market_price, Some(dec!(4112)));
        assert_eq!(s.sell_range, Some(PriceRange::new(dec!(4107), dec!(4112))));
        assert_eq!(s.take_profits[0], TakeProfitLevel::Price(dec!(4120)));
        assert_eq!(s.stop_loss, Some(dec!(4101.50)));
        assert_eq!(s.side, Some(Side::Sell));
    }

    #[test]
    fn minimal_signal_leaves_other_fields_unset() {
        let s = test_parser().parse("XAUUSD Buy: 2680");
        assert_eq!(s.symbol.as_deref(), Some("XAUUSD"));
        assert_eq!(s.side, Some(Side::Buy));
        assert!(s.market_price.is_none());
        assert!(s.stop_loss.is_none());
        assert!(s.buy_range.is_none());
        // no price reference at all
        assert!(!s.is_valid());
    }

    #[test]
    fn empty_text_parses_to_empty_signal() {
        let s = test_parser().parse("");
        assert_eq!(s.symbol, None);
        assert_eq!(s.side, None);
        assert!(s.take_profits.iter().all(|tp| tp.is_absent()));
    }
}
