//! Crash sweeper
//!
//! Periodic background loop that auto-settles games whose multiplier has
//! reached their crash point. Each tick works on a snapshot of the registry
//! and reloads every game from storage, so a stale registry entry costs one
//! read and nothing else.

use crate::errors::CrashError;
use crate::games::clock::{current_multiplier_capped, Clock};
use crate::games::registry::ActiveRegistry;
use crate::games::settlement::SettlementCoordinator;
use crate::games::types::StopReason;
use crate::metrics::EngineMetrics;
use crate::storage::SharedStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What one tick did
#[derive(Debug, Default)]
pub struct SweepReport {
    pub scanned: usize,
    /// Ids dropped from the registry because storage says they are done or gone
    pub pruned: Vec<u64>,
    /// Ids handed to the settlement coordinator
    pub dispatched: Vec<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl SweepReport {
    /// Wait for the settlements this tick dispatched
    pub async fn wait_settled(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Auto-crash task aborted: {}", e);
            }
        }
    }
}

pub struct CrashSweeper {
    store: SharedStore,
    registry: ActiveRegistry,
    coordinator: Arc<SettlementCoordinator>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    interval: Duration,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CrashSweeper {
    pub fn new(
        store: SharedStore,
        registry: ActiveRegistry,
        coordinator: Arc<SettlementCoordinator>,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            coordinator,
            clock,
            metrics,
            interval,
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Start the background loop once per process; later calls are no-ops.
    ///
    /// Returns true when this call started the loop. Must be called from
    /// inside a tokio runtime.
    pub fn ensure_started(self: &Arc<Self>) -> bool {
        // Flag and handle change together under the slot lock
        let Ok(mut slot) = self.handle.lock() else {
            return false;
        };
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let sweeper = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { sweeper.run().await }));
        true
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Abort the background loop; settlements already dispatched still finish.
    /// A later `ensure_started` starts a fresh loop.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
                info!("🛑 Crash sweeper stopped");
            }
            self.started.store(false, Ordering::Release);
        }
    }

    async fn run(self: Arc<Self>) {
        info!("🔄 Crash sweeper started ({}ms interval)", self.interval.as_millis());

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.sweep_once().await;
            if !report.dispatched.is_empty() {
                debug!(
                    "Sweep dispatched {} auto-crash settlement(s): {:?}",
                    report.dispatched.len(),
                    report.dispatched
                );
            }
        }
    }

    /// One pass over the registry snapshot
    pub async fn sweep_once(&self) -> SweepReport {
        let ids = self.registry.snapshot_ids();
        let mut report = SweepReport {
            scanned: ids.len(),
            ..Default::default()
        };
        self.metrics.record_sweep_tick(ids.len());

        if ids.is_empty() {
            return report;
        }

        let settings = match self.store.active_settings() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                warn!("No active game settings, skipping sweep of {} game(s)", ids.len());
                return report;
            }
            Err(e) => {
                warn!("Failed to load game settings during sweep: {}", e);
                return report;
            }
        };

        let now = self.clock.now();
        let cap = self.coordinator.display_cap();

        for game_id in ids {
            let game = match self.store.load_game(game_id) {
                Ok(Some(game)) if !game.is_settled => game,
                Ok(_) => {
                    self.registry.unregister(game_id);
                    report.pruned.push(game_id);
                    continue;
                }
                Err(e) => {
                    // Left registered; the next tick retries
                    warn!(game_id, "Failed to load game during sweep: {}", e);
                    continue;
                }
            };

            let current =
                current_multiplier_capped(game.created_at, settings.multiplier_speed, now, cap);
            if current < game.crash_point {
                continue;
            }

            self.registry.unregister(game_id);
            report.dispatched.push(game_id);

            let coordinator = Arc::clone(&self.coordinator);
            let registry = self.registry.clone();
            report.tasks.push(tokio::spawn(async move {
                match coordinator.settle(game.id, now, StopReason::AutoCrash).await {
                    Ok(result) => {
                        info!(
                            game_id = result.game_id,
                            multiplier = result.multiplier,
                            "💥 Game auto-crashed (crash point {:.2}x)",
                            result.crash_point
                        );
                    }
                    Err(CrashError::AlreadyCompleted(_)) => {}
                    Err(e) => {
                        error!(game_id = game.id, "Auto-crash failed, re-registering: {}", e);
                        registry.register(&game);
                    }
                }
            }));
        }

        report
    }
}
