//! Settlement coordinator
//!
//! Both trigger paths (player stop and crash sweep) go through
//! [`SettlementCoordinator::settle`]. The store flips the settlement flag and
//! writes the payout inside one atomic unit, so whichever caller reaches the
//! guard first wins and every other caller gets `AlreadyCompleted`.

use crate::errors::{CrashError, CrashResult};
use crate::games::clock::current_multiplier_capped;
use crate::games::types::{
    Game, GameSettings, GameStatus, LedgerKind, SettlementDecision, SettlementResult, StopReason,
};
use crate::metrics::EngineMetrics;
use crate::storage::{run_blocking, SharedStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Decide the terminal outcome of a game at `now`.
///
/// The multiplier is recomputed from the creation time rather than trusted
/// from the caller, and compared against the crash point stored on the game.
pub fn decide_outcome(
    game: &Game,
    settings: &GameSettings,
    now: DateTime<Utc>,
    display_cap: f64,
) -> SettlementDecision {
    let multiplier =
        current_multiplier_capped(game.created_at, settings.multiplier_speed, now, display_cap);

    if multiplier < game.crash_point {
        SettlementDecision {
            status: GameStatus::Won,
            multiplier,
            win_amount: game.bet_amount * multiplier,
            ledger_kind: LedgerKind::Win,
            description: format!("Game won with multiplier {:.2}x", multiplier),
        }
    } else {
        SettlementDecision {
            status: GameStatus::Lost,
            multiplier,
            win_amount: 0.0,
            ledger_kind: LedgerKind::Loss,
            description: format!("Game lost - crashed at multiplier {:.2}x", game.crash_point),
        }
    }
}

pub struct SettlementCoordinator {
    store: SharedStore,
    metrics: Arc<EngineMetrics>,
    display_cap: f64,
}

impl SettlementCoordinator {
    pub fn new(store: SharedStore, metrics: Arc<EngineMetrics>, display_cap: f64) -> Self {
        Self {
            store,
            metrics,
            display_cap,
        }
    }

    pub fn display_cap(&self) -> f64 {
        self.display_cap
    }

    /// Settle a game exactly once.
    ///
    /// The unit runs on the blocking pool and is not cancelled if the caller
    /// goes away after it started.
    pub async fn settle(
        &self,
        game_id: u64,
        now: DateTime<Utc>,
        reason: StopReason,
    ) -> CrashResult<SettlementResult> {
        let cap = self.display_cap;
        let outcome = run_blocking(&self.store, move |store| {
            store.settle_game(game_id, now, &mut |game, settings| {
                Ok(decide_outcome(game, settings, now, cap))
            })
        })
        .await;

        match outcome {
            Ok(settled) => {
                let game = settled.game;
                self.metrics.record_settlement(game.status, reason);
                info!(
                    game_id = game.id,
                    user_id = game.user_id,
                    reason = %reason,
                    multiplier = game.multiplier,
                    "🎯 Game settled: {} (payout {:.2})",
                    game.status,
                    game.win_amount
                );

                Ok(SettlementResult {
                    game_id: game.id,
                    user_id: game.user_id,
                    bet_amount: game.bet_amount,
                    multiplier: game.multiplier,
                    win_amount: game.win_amount,
                    status: game.status,
                    crash_point: game.crash_point,
                    stop_reason: reason,
                    balance: settled.balance,
                    currency: settled.currency,
                })
            }
            Err(CrashError::AlreadyCompleted(id)) => {
                self.metrics.record_race_lost();
                debug!(game_id = id, reason = %reason, "Game already settled, attempt ignored");
                Err(CrashError::AlreadyCompleted(id))
            }
            Err(e) => {
                if matches!(e, CrashError::Storage(_)) {
                    self.metrics.record_settlement_failure();
                }
                error!(game_id, reason = %reason, "❌ Settlement failed: {}", e);
                Err(e)
            }
        }
    }
}
