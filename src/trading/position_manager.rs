use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::core::symbols::SymbolRegistry;
use crate::models::{Order, OrderMetadata, PositionState, Side};

/// A filled order whose take-profit ladder is realised by partial closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedPosition {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub initial_volume: f64,
    pub remaining_volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profits: Vec<f64>,
    pub tp_hit_count: usize,
    /// Stop the broker has not accepted yet; retried on each poll.
    #[serde(default)]
    pub pending_stop_loss: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub metadata: OrderMetadata,
}

impl ManagedPosition {
    pub fn state(&self) -> PositionState {
        match self.tp_hit_count {
            0 => PositionState::Open,
            1 => PositionState::Partial1,
            _ => PositionState::Partial2,
        }
    }

    /// Break-even after the first target, first target after the second,
    /// nothing once the position is about to be flat.
    pub fn next_stop_loss(&self, level: usize) -> Option<f64> {
        match level {
            0 => Some(self.entry_price),
            1 => Some(self.take_profits.first().copied().unwrap_or(self.entry_price)),
            _ => None,
        }
    }
}

/// One partial close the caller must carry out against the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TpAction {
    pub tp_level: usize,
    pub tp_price: f64,
    pub volume_to_close: f64,
    pub new_stop_loss: Option<f64>,
}

/// Concurrent table of managed positions keyed by position id.
///
/// Each entry is only mutated by the monitor task that owns it; everyone
/// else reads snapshots.
pub struct PositionManager {
    positions: DashMap<String, ManagedPosition>,
    tp_split: Vec<f64>,
    closed_tolerance: f64,
    symbols: SymbolRegistry,
}

impl PositionManager {
    pub fn new(cfg: &Config, symbols: SymbolRegistry) -> Self {
        Self::with_split(cfg.tp_split.clone(), cfg.position_closed_tolerance, symbols)
    }

    pub fn with_split(tp_split: Vec<f64>, closed_tolerance: f64, symbols: SymbolRegistry) -> Self {
        Self {
            positions: DashMap::new(),
            tp_split,
            closed_tolerance,
            symbols,
        }
    }

    /// Starts tracking a filled order. Percentages apply to the filled
    /// volume when the broker reports one.
    pub fn add_position(
        &self,
        position_id: &str,
        order: &Order,
        entry_price: f64,
        filled_volume: f64,
    ) -> ManagedPosition {
        let volume = if filled_volume > 0.0 {
            if (filled_volume - order.volume).abs() > self.closed_tolerance {
                warn!(
                    "Position {}: filled {:.2} lots of {:.2} requested, ladder uses the filled volume",
                    position_id, filled_volume, order.volume
                );
            }
            filled_volume
        } else {
            order.volume
        };

        let position = ManagedPosition {
            position_id: position_id.to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            entry_price,
            initial_volume: volume,
            remaining_volume: volume,
            stop_loss: order.stop_loss,
            take_profits: order.take_profits.clone(),
            tp_hit_count: 0,
            pending_stop_loss: None,
            opened_at: Utc::now(),
            metadata: order.metadata.clone(),
        };

        info!(
            "Position {} tracked: {} {} {:.2} lots @ {:.2}",
            position_id, position.symbol, position.side, volume, entry_price
        );
        if !position.take_profits.is_empty() {
            let levels: Vec<String> = position
                .take_profits
                .iter()
                .enumerate()
                .map(|(i, tp)| format!("TP{}={:.2}", i + 1, tp))
                .collect();
            info!("  TP levels: {}", levels.join(", "));
        }

        self.positions
            .insert(position_id.to_string(), position.clone());
        position
    }

    pub fn get(&self, position_id: &str) -> Option<ManagedPosition> {
        self.positions.get(position_id).map(|p| p.clone())
    }

    pub fn remove(&self, position_id: &str) -> Option<ManagedPosition> {
        let removed = self.positions.remove(position_id).map(|(_, p)| p);
        if removed.is_some() {
            info!("Position {} no longer managed", position_id);
        }
        removed
    }

    /// Every unhit level the price has reached, in ascending order.
    ///
    /// Volumes account for earlier actions in the same batch, so applying
    /// all of them in order never closes more than the remaining volume.
    /// Partial closes are floored to the symbol's lot step; a level whose
    /// share floors to zero only moves the stop.
    pub fn check_tp_hits(&self, position_id: &str, price: f64) -> Vec<TpAction> {
        let Some(pos) = self.get(position_id) else {
            return Vec::new();
        };
        let step = self.symbols.lot_step(&pos.symbol);

        let mut actions = Vec::new();
        let mut remaining = pos.remaining_volume;

        for (level, &tp_price) in pos.take_profits.iter().enumerate() {
            if level < pos.tp_hit_count || !pos.side.reached(price, tp_price) {
                continue;
            }
            if remaining <= self.closed_tolerance {
                break;
            }

            // the last split entry and anything past it take what is left
            let volume_to_close = if level + 1 >= self.tp_split.len() {
                remaining
            } else {
                floor_to_step(pos.initial_volume * self.tp_split[level], step).min(remaining)
            };
            remaining = round8(remaining - volume_to_close);

            info!(
                "TP{} hit for {}: price {:.2} {} {:.2}",
                level + 1,
                position_id,
                price,
                if pos.side == Side::Buy { ">=" } else { "<=" },
                tp_price
            );
            actions.push(TpAction {
                tp_level: level,
                tp_price,
                volume_to_close,
                new_stop_loss: pos.next_stop_loss(level),
            });
        }

        actions
    }

    /// Records a confirmed partial close. `new_stop_loss` is the stop the
    /// broker accepted, if any.
    ///
    /// Returns the resulting state, `Closed` once the position is flat and
    /// removed, or `None` if it was not tracked.
    pub fn update_after_partial_close(
        &self,
        position_id: &str,
        tp_level: usize,
        closed_volume: f64,
        new_stop_loss: Option<f64>,
    ) -> Option<PositionState> {
        let (state, remaining) = {
            let mut pos = self.positions.get_mut(position_id)?;
            pos.tp_hit_count = pos.tp_hit_count.max(tp_level + 1);
            pos.remaining_volume = round8(pos.remaining_volume - closed_volume).max(0.0);
            if let Some(sl) = new_stop_loss {
                pos.stop_loss = Some(sl);
                pos.pending_stop_loss = None;
            }
            (pos.state(), pos.remaining_volume)
        };

        match new_stop_loss {
            Some(sl) => info!(
                "Position {}: TP{} closed {:.2} lots, remaining {:.2}, SL {:.2}",
                position_id,
                tp_level + 1,
                closed_volume,
                remaining,
                sl
            ),
            None => info!(
                "Position {}: TP{} closed {:.2} lots, remaining {:.2}",
                position_id,
                tp_level + 1,
                closed_volume,
                remaining
            ),
        }

        if remaining <= self.closed_tolerance {
            self.remove(position_id);
            return Some(PositionState::Closed);
        }
        Some(state)
    }

    pub fn set_pending_stop_loss(&self, position_id: &str, stop_loss: f64) {
        if let Some(mut pos) = self.positions.get_mut(position_id) {
            pos.pending_stop_loss = Some(stop_loss);
        }
    }

    /// Stores a stop the broker has accepted and clears any pending one.
    pub fn apply_stop_loss(&self, position_id: &str, stop_loss: f64) {
        if let Some(mut pos) = self.positions.get_mut(position_id) {
            pos.stop_loss = Some(stop_loss);
            pos.pending_stop_loss = None;
        }
    }

    pub fn all_positions(&self) -> Vec<ManagedPosition> {
        self.positions.iter().map(|p| p.value().clone()).collect()
    }

    pub fn positions_for_symbol(&self, symbol: &str) -> Vec<ManagedPosition> {
        self.positions
            .iter()
            .filter(|p| p.symbol.eq_ignore_ascii_case(symbol))
            .map(|p| p.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn floor_to_step(volume: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return volume;
    }
    round8(((volume / step) + 1e-9).floor() * step)
}

fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}
