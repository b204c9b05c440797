use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exchange::ExecutionBackend;
use crate::models::PositionState;
use crate::trading::position_manager::PositionManager;

/// Result of one monitoring cycle for a position.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The position is gone; the task should stop.
    NotTracked,
    NoPrice,
    Idle,
    /// Levels confirmed this cycle; the position is still open.
    Advanced(Vec<usize>),
    /// A backend call failed at this level; it is retried next cycle.
    ActionFailed(usize),
    Closed,
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollOutcome::NotTracked | PollOutcome::Closed)
    }
}

/// Executes take-profit actions for tracked positions against the backend.
#[derive(Clone)]
pub struct PositionPoller {
    positions: Arc<PositionManager>,
    backend: Arc<dyn ExecutionBackend>,
}

impl PositionPoller {
    pub fn new(positions: Arc<PositionManager>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self { positions, backend }
    }

    /// One cycle: retry a pending stop, fetch the price, then carry out every
    /// hit level in ascending order. State only advances on confirmed calls.
    pub async fn poll_once(&self, position_id: &str) -> PollOutcome {
        let Some(pos) = self.positions.get(position_id) else {
            return PollOutcome::NotTracked;
        };

        if let Some(sl) = pos.pending_stop_loss {
            match self.backend.modify_stop_loss(position_id, sl).await {
                Ok(()) => {
                    info!("Position {}: pending SL {:.2} applied", position_id, sl);
                    self.positions.apply_stop_loss(position_id, sl);
                }
                Err(e) => warn!("Position {}: pending SL {:.2} still rejected: {:#}", position_id, sl, e),
            }
        }

        let price = match self.backend.get_current_price(&pos.symbol).await {
            Ok(p) => p,
            Err(e) => {
                debug!("Position {}: no price for {}: {:#}", position_id, pos.symbol, e);
                return PollOutcome::NoPrice;
            }
        };

        let actions = self.positions.check_tp_hits(position_id, price);
        if actions.is_empty() {
            return PollOutcome::Idle;
        }

        let mut advanced = Vec::with_capacity(actions.len());
        for action in actions {
            let level = action.tp_level;
            info!(
                "Position {}: TP{} @ {:.2} reached, closing {:.2} lots",
                position_id,
                level + 1,
                action.tp_price,
                action.volume_to_close
            );

            let close = if action.volume_to_close > 0.0 {
                self.backend
                    .close_position_partial(position_id, action.volume_to_close)
                    .await
            } else {
                info!(
                    "Position {}: TP{} share is below one lot step, moving the stop only",
                    position_id,
                    level + 1
                );
                Ok(())
            };
            if let Err(e) = close {
                warn!(
                    "Position {}: partial close at TP{} failed, will retry: {:#}",
                    position_id,
                    level + 1,
                    e
                );
                return PollOutcome::ActionFailed(level);
            }

            let accepted_stop = match action.new_stop_loss {
                Some(sl) => match self.backend.modify_stop_loss(position_id, sl).await {
                    Ok(()) => Some(sl),
                    Err(e) => {
                        warn!(
                            "Position {}: SL move to {:.2} failed, will retry: {:#}",
                            position_id, sl, e
                        );
                        None
                    }
                },
                None => None,
            };

            let state = self.positions.update_after_partial_close(
                position_id,
                level,
                action.volume_to_close,
                accepted_stop,
            );
            match (state, action.new_stop_loss) {
                (Some(PositionState::Closed), _) => {
                    info!("Position {} fully closed", position_id);
                    return PollOutcome::Closed;
                }
                (None, _) => return PollOutcome::NotTracked,
                (Some(_), Some(sl)) if accepted_stop.is_none() => {
                    self.positions.set_pending_stop_loss(position_id, sl);
                }
                _ => {}
            }
            advanced.push(level);
        }

        PollOutcome::Advanced(advanced)
    }
}

struct MonitorHandle {
    generation: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Cancelable polling tasks keyed by position id.
pub struct PositionMonitor {
    poller: PositionPoller,
    interval: Duration,
    tasks: Arc<DashMap<String, MonitorHandle>>,
    generations: AtomicU64,
}

impl PositionMonitor {
    pub fn new(
        positions: Arc<PositionManager>,
        backend: Arc<dyn ExecutionBackend>,
        interval: Duration,
    ) -> Self {
        Self {
            poller: PositionPoller::new(positions, backend),
            interval,
            tasks: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn poller(&self) -> &PositionPoller {
        &self.poller
    }

    /// Starts polling `position_id` every interval until it is closed,
    /// untracked or cancelled. A second call for a running id is a no-op.
    pub fn spawn(&self, position_id: &str) {
        if self.is_running(position_id) {
            return;
        }

        let (cancel, mut cancelled) = watch::channel(false);
        let poller = self.poller.clone();
        let interval = self.interval;
        let tasks = Arc::clone(&self.tasks);
        let id = position_id.to_string();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (registered_tx, registered) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            // the entry must exist before the task can remove it
            let _ = registered.await;
            info!("Monitoring position {} every {:?}", id, interval);
            loop {
                tokio::select! {
                    _ = cancelled.changed() => {
                        info!("Monitoring of position {} cancelled", id);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                let outcome = poller.poll_once(&id).await;
                debug!("Position {} poll: {:?}", id, outcome);
                if outcome.is_terminal() {
                    info!("Stopped monitoring position {}", id);
                    break;
                }
            }
            // a later spawn for the same id owns the entry once it replaces ours
            tasks.remove_if(&id, |_, t| t.generation == generation);
        });

        self.tasks.insert(
            position_id.to_string(),
            MonitorHandle {
                generation,
                cancel,
                handle,
            },
        );
        let _ = registered_tx.send(());
    }

    pub fn is_running(&self, position_id: &str) -> bool {
        self.tasks
            .get(position_id)
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn running(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| !t.handle.is_finished())
            .count()
    }

    pub fn cancel(&self, position_id: &str) -> bool {
        match self.tasks.get(position_id) {
            Some(t) => t.cancel.send(true).is_ok(),
            None => false,
        }
    }

    /// Cancels every task and waits for them to finish.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                let _ = task.cancel.send(true);
                handles.push(task.handle);
            }
        }
        let count = handles.len();
        for handle in handles {
            let _ = handle.await;
        }
        if count > 0 {
            info!("Stopped {} position monitors", count);
        }
    }
}
