use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::symbols::SymbolRegistry;
use crate::models::{Order, Side};

/// Entry/stop gaps below this are treated as "no stop" to avoid dividing by zero.
const MIN_PRICE_DISTANCE: f64 = 0.0001;

/// Reward multiples of the stop distance used when a signal carries no targets.
pub const DEFAULT_RR_RATIOS: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

/// Why an order failed the pre-trade checks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskRejection {
    #[error("Volume {volume} below minimum {min}")]
    VolumeBelowMin { volume: f64, min: f64 },

    #[error("Volume {volume} above maximum {max}")]
    VolumeAboveMax { volume: f64, max: f64 },

    #[error("Stop loss too tight: {distance:.5} < {min}")]
    StopTooTight { distance: f64, min: f64 },
}

pub struct RiskManager {
    account_balance: f64,
    risk_percent: f64,
    min_volume: f64,
    max_volume: f64,
    default_volume: f64,
    min_stop_distance: f64,
    max_stop_distance_pct: f64,
    pip_size: f64,
    symbols: SymbolRegistry,
}

impl RiskManager {
    pub fn new(cfg: &Config, symbols: SymbolRegistry) -> Self {
        info!(
            "Risk manager: balance={:.2} risk={}% volume=[{}, {}]",
            cfg.account_balance, cfg.risk_percent, cfg.min_volume, cfg.max_volume
        );
        Self {
            account_balance: cfg.account_balance,
            risk_percent: cfg.risk_percent,
            min_volume: cfg.min_volume,
            max_volume: cfg.max_volume,
            default_volume: cfg.default_volume,
            min_stop_distance: cfg.min_stop_distance,
            max_stop_distance_pct: cfg.max_stop_distance_pct,
            pip_size: cfg.pip_size,
            symbols,
        }
    }

    pub fn account_balance(&self) -> f64 {
        self.account_balance
    }

    pub fn pip_size(&self) -> f64 {
        self.pip_size
    }

    pub fn update_account_balance(&mut self, balance: f64) {
        info!(
            "Account balance updated: {:.2} -> {:.2}",
            self.account_balance, balance
        );
        self.account_balance = balance;
    }

    /// Config limits narrowed by the broker's per-symbol limits when known.
    fn volume_limits(&self, symbol: &str) -> (f64, f64) {
        match self.symbols.volume_limits(symbol) {
            Some((lo, hi)) => {
                let min = self.min_volume.max(lo);
                let max = self.max_volume.min(hi);
                if min <= max {
                    (min, max)
                } else {
                    (self.min_volume, self.max_volume)
                }
            }
            None => (self.min_volume, self.max_volume),
        }
    }

    /// Lots such that hitting the stop loses `risk_percent` of the balance.
    ///
    /// Falls back to the default volume when there is no usable stop distance.
    pub fn calculate_position_size(
        &self,
        symbol: &str,
        entry: Option<f64>,
        stop_loss: Option<f64>,
        pip_size: f64,
    ) -> f64 {
        let (entry, stop_loss) = match (entry, stop_loss) {
            (Some(e), Some(s)) => (e, s),
            _ => {
                warn!(
                    "{}: entry or stop loss missing, using default volume {}",
                    symbol, self.default_volume
                );
                return self.default_volume;
            }
        };

        let distance = (entry - stop_loss).abs();
        if !distance.is_finite() || distance < MIN_PRICE_DISTANCE || pip_size <= 0.0 {
            warn!(
                "{}: stop distance {:.5} unusable, using default volume {}",
                symbol, distance, self.default_volume
            );
            return self.default_volume;
        }

        let risk_amount = self.account_balance * self.risk_percent / 100.0;
        let pip_distance = distance / pip_size;
        let pip_value = self.symbols.pip_value(symbol);
        if pip_value.is_nan() || pip_value <= 0.0 {
            warn!(
                "{}: invalid pip value {}, using default volume {}",
                symbol, pip_value, self.default_volume
            );
            return self.default_volume;
        }
        let raw_volume = risk_amount / (pip_distance * pip_value);
        if !raw_volume.is_finite() {
            warn!(
                "{}: raw volume {} not finite, using default volume {}",
                symbol, raw_volume, self.default_volume
            );
            return self.default_volume;
        }

        let (min, max) = self.volume_limits(symbol);
        let step = self.symbols.lot_step(symbol);
        let volume = round_to_step(raw_volume.clamp(min, max), step).clamp(min, max);

        info!(
            "{}: risk {:.2} over {:.1} pips @ {}/pip -> {:.2} lots (raw {:.4})",
            symbol, risk_amount, pip_distance, pip_value, volume, raw_volume
        );
        volume
    }

    /// Pre-trade checks. Missing or very wide stops only warn.
    pub fn validate(&self, order: &Order) -> Result<(), RiskRejection> {
        let (min, max) = self.volume_limits(&order.symbol);
        if order.volume < min {
            return Err(RiskRejection::VolumeBelowMin {
                volume: order.volume,
                min,
            });
        }
        if order.volume > max {
            return Err(RiskRejection::VolumeAboveMax {
                volume: order.volume,
                max,
            });
        }

        match (order.stop_loss, order.price) {
            (None, _) => warn!("{}: order has no stop loss", order.symbol),
            (Some(sl), Some(price)) => {
                let distance = (price - sl).abs();
                if distance < self.min_stop_distance {
                    return Err(RiskRejection::StopTooTight {
                        distance,
                        min: self.min_stop_distance,
                    });
                }
                if price > 0.0 && distance > price * self.max_stop_distance_pct / 100.0 {
                    warn!(
                        "{}: stop loss {:.2} is more than {}% from entry {:.2}",
                        order.symbol, sl, self.max_stop_distance_pct, price
                    );
                }
            }
            (Some(_), None) => {}
        }

        Ok(())
    }

    pub fn risk_reward_ratio(&self, entry: f64, stop_loss: f64, take_profit: f64) -> Option<f64> {
        let risk = (entry - stop_loss).abs();
        if risk == 0.0 {
            return None;
        }
        let reward = (take_profit - entry).abs();
        Some(round2(reward / risk))
    }

    /// Targets at the given multiples of the stop distance.
    pub fn suggest_take_profits(
        &self,
        entry: f64,
        stop_loss: f64,
        side: Side,
        ratios: &[f64],
    ) -> Vec<f64> {
        let risk = (entry - stop_loss).abs();
        ratios
            .iter()
            .map(|r| match side {
                Side::Buy => round2(entry + risk * r),
                Side::Sell => round2(entry - risk * r),
            })
            .collect()
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Rounds to a multiple of `step`, trimming float noise.
fn round_to_step(volume: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return round2(volume);
    }
    ((volume / step).round() * step * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{default_test_config, sample_order};

    fn manager() -> RiskManager {
        let cfg = default_test_config();
        RiskManager::new(&cfg, SymbolRegistry::new(&cfg))
    }

    #[test]
    fn default_volume_without_usable_stop() {
        let rm = manager();
        assert_eq!(rm.calculate_position_size("XAUUSD", Some(2680.0), None, 0.01), 0.01);
        assert_eq!(rm.calculate_position_size("XAUUSD", None, Some(2670.0), 0.01), 0.01);
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2680.0), 0.01),
            0.01
        );
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2680.00005), 0.01),
            0.01
        );
    }

    #[test]
    fn unusable_pip_value_falls_back_to_default() {
        let mut cfg = default_test_config();
        cfg.default_volume = 0.05;
        cfg.pip_values.insert("XAUUSD".to_string(), 0.0);
        let rm = RiskManager::new(&cfg, SymbolRegistry::new(&cfg));
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2670.0), 0.01),
            0.05
        );

        cfg.pip_values.insert("XAUUSD".to_string(), f64::NAN);
        let rm = RiskManager::new(&cfg, SymbolRegistry::new(&cfg));
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2670.0), 0.01),
            0.05
        );

        cfg.pip_values.insert("XAUUSD".to_string(), 10.0);
        cfg.account_balance = f64::INFINITY;
        let rm = RiskManager::new(&cfg, SymbolRegistry::new(&cfg));
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2670.0), 0.01),
            0.05
        );
    }

    #[test]
    fn sizing_follows_risk_formula() {
        let rm = manager();
        // 10000 * 1% = 100 risk; 10.0 / 0.01 = 1000 pips; 100 / (1000 * 10) = 0.01
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2670.0), 0.01),
            0.01
        );
        // 0.5 price gap = 50 pips; 100 / (50 * 10) = 0.2
        assert_eq!(
            rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2679.5), 0.01),
            0.2
        );
    }

    #[test]
    fn sizing_is_clamped_into_limits() {
        let rm = manager();
        for (entry, stop) in [
            (2680.0, 2679.999),
            (2680.0, 2600.0),
            (1.1000, 1.0999),
            (100_000.0, 1.0),
            (2680.0, 2680.01),
        ] {
            let v = rm.calculate_position_size("XAUUSD", Some(entry), Some(stop), 0.01);
            assert!((0.01..=1.0).contains(&v), "{} for {}/{}", v, entry, stop);
        }
    }

    #[test]
    fn unknown_symbol_uses_default_pip_value() {
        let rm = manager();
        let known = rm.calculate_position_size("XAUUSD", Some(100.0), Some(99.5), 0.01);
        let unknown = rm.calculate_position_size("DOGEUSD", Some(100.0), Some(99.5), 0.01);
        assert_eq!(known, unknown);
    }

    #[test]
    fn validate_volume_bounds() {
        let rm = manager();
        let mut order = sample_order();
        assert!(rm.validate(&order).is_ok());

        order.volume = 0.001;
        assert!(matches!(
            rm.validate(&order),
            Err(RiskRejection::VolumeBelowMin { .. })
        ));

        order.volume = 5.0;
        assert!(matches!(
            rm.validate(&order),
            Err(RiskRejection::VolumeAboveMax { .. })
        ));
    }

    #[test]
    fn validate_stop_distance() {
        let rm = manager();
        let mut order = sample_order();
        order.stop_loss = Some(2682.005);
        assert!(matches!(
            rm.validate(&order),
            Err(RiskRejection::StopTooTight { .. })
        ));

        // missing or very wide stops only warn
        order.stop_loss = None;
        assert!(rm.validate(&order).is_ok());
        order.stop_loss = Some(1000.0);
        assert!(rm.validate(&order).is_ok());
    }

    #[test]
    fn risk_reward() {
        let rm = manager();
        assert_eq!(rm.risk_reward_ratio(2680.0, 2670.0, 2700.0), Some(2.0));
        assert_eq!(rm.risk_reward_ratio(2680.0, 2680.0, 2700.0), None);
    }

    #[test]
    fn suggested_targets_follow_side() {
        let rm = manager();
        assert_eq!(
            rm.suggest_take_profits(2680.0, 2670.0, Side::Buy, &DEFAULT_RR_RATIOS),
            vec![2690.0, 2700.0, 2710.0, 2720.0]
        );
        assert_eq!(
            rm.suggest_take_profits(2050.0, 2060.0, Side::Sell, &[1.0, 2.0]),
            vec![2040.0, 2030.0]
        );
    }

    #[test]
    fn balance_update_changes_sizing() {
        let mut rm = manager();
        let before = rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2679.5), 0.01);
        rm.update_account_balance(20_000.0);
        assert_eq!(rm.account_balance(), 20_000.0);
        let after = rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2679.5), 0.01);
        assert_eq!(after, before * 2.0);
    }

    #[test]
    fn symbol_lot_step_applies() {
        let cfg = default_test_config();
        let mut symbols = SymbolRegistry::new(&cfg);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"symbols":[{"name":"XAUUSD","volume_min":0.1,"volume_max":0.5,"volume_step":0.1}]}"#,
        )
        .unwrap();
        symbols.load_details(file.path()).unwrap();
        let rm = RiskManager::new(&cfg, symbols);

        // raw 0.2857 -> step 0.1
        let v = rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2679.65), 0.01);
        assert_eq!(v, 0.3);
        // raw 0.01 is lifted to the symbol minimum
        let v = rm.calculate_position_size("XAUUSD", Some(2680.0), Some(2670.0), 0.01);
        assert_eq!(v, 0.1);
    }
}
