//! Player-facing game lifecycle
//!
//! [`GameService`] owns the registry, the settlement coordinator and the
//! sweeper, and exposes the operations the HTTP layer calls: start, stop,
//! status, active listing, crash info, history and settings.

use crate::config::EngineConfig;
use crate::errors::{CrashError, CrashResult};
use crate::games::clock::{
    crash_point_for, current_multiplier_capped, elapsed_seconds, time_to_crash, Clock,
};
use crate::games::registry::ActiveRegistry;
use crate::games::settlement::SettlementCoordinator;
use crate::games::sweeper::CrashSweeper;
use crate::games::types::{
    BalanceChange, Game, GameSettings, GameStatus, SettlementResult, StopReason,
};
use crate::metrics::EngineMetrics;
use crate::storage::{run_blocking, SharedStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Public projection of a game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameView {
    pub id: u64,
    pub bet_amount: f64,
    /// Live multiplier while in play, the recorded one once settled
    pub multiplier: f64,
    pub win_amount: f64,
    pub status: GameStatus,
    pub is_settled: bool,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl GameView {
    fn new(game: &Game, multiplier: f64) -> Self {
        Self {
            id: game.id,
            bet_amount: game.bet_amount,
            multiplier,
            win_amount: game.win_amount,
            status: game.status,
            is_settled: game.is_settled,
            created_at: game.created_at,
            settled_at: game.settled_at,
        }
    }
}

/// Outcome of a successful start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartedGame {
    pub game: GameView,
    pub balance: BalanceChange,
    pub currency: String,
}

/// One entry of the operator view of games in flight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveGameView {
    pub game_id: u64,
    pub user_id: u64,
    pub bet_amount: f64,
    pub current_multiplier: f64,
    pub crash_point: f64,
    pub elapsed_seconds: f64,
    /// Seconds until auto-crash at the current speed
    pub time_to_crash: f64,
    pub created_at: DateTime<Utc>,
}

/// Crash timing detail for a player's game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashInfo {
    pub game_id: u64,
    pub bet_amount: f64,
    pub current_multiplier: f64,
    pub crash_point: f64,
    pub multiplier_speed: f64,
    pub elapsed_seconds: f64,
    pub is_active: bool,
    /// Seconds until auto-crash; `None` once settled
    pub time_to_crash: Option<f64>,
}

/// Settings exposed to players
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsView {
    pub max_multiplier: f64,
    pub min_bet_amount: f64,
    pub max_bet_amount: f64,
    pub multiplier_speed: f64,
    pub display_cap: f64,
}

pub struct GameService {
    store: SharedStore,
    registry: ActiveRegistry,
    coordinator: Arc<SettlementCoordinator>,
    sweeper: Arc<CrashSweeper>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    config: EngineConfig,
}

impl GameService {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let registry = ActiveRegistry::new();
        let metrics = Arc::new(EngineMetrics::new());
        let coordinator = Arc::new(SettlementCoordinator::new(
            store.clone(),
            metrics.clone(),
            config.display_cap,
        ));
        let sweeper = Arc::new(CrashSweeper::new(
            store.clone(),
            registry.clone(),
            coordinator.clone(),
            clock.clone(),
            metrics.clone(),
            config.sweep_interval(),
        ));

        Self {
            store,
            registry,
            coordinator,
            sweeper,
            clock,
            metrics,
            config,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn registry(&self) -> &ActiveRegistry {
        &self.registry
    }

    pub fn sweeper(&self) -> &Arc<CrashSweeper> {
        &self.sweeper
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Start the background sweep if it is not running yet
    pub fn ensure_sweeper(&self) -> bool {
        self.sweeper.ensure_started()
    }

    /// Re-register every unsettled game found in storage
    pub fn recover_active_games(&self) -> CrashResult<usize> {
        let games = self.store.list_unsettled_games()?;
        for game in &games {
            self.registry.register(game);
        }
        if !games.is_empty() {
            info!("♻️  Recovered {} unsettled game(s) into the active registry", games.len());
        }
        Ok(games.len())
    }

    /// Place a bet and begin a game
    pub async fn start(&self, user_id: u64, bet_amount: f64) -> CrashResult<StartedGame> {
        if !bet_amount.is_finite() || bet_amount <= 0.0 {
            return Err(CrashError::validation("Bet amount must be a positive number"));
        }

        let user = self
            .store
            .load_user(user_id)?
            .ok_or_else(|| CrashError::not_found("User not found"))?;
        if user.is_banned() {
            return Err(CrashError::forbidden("User is banned"));
        }

        let settings = self.active_settings()?;
        if !settings.accepts_bet(bet_amount) {
            return Err(CrashError::validation(format!(
                "Bet amount must be between {:.2} and {:.2}",
                settings.min_bet_amount, settings.max_bet_amount
            )));
        }

        let crash_point = crash_point_for(&settings);
        let now = self.clock.now();
        let placed = run_blocking(&self.store, move |store| {
            store.place_bet(user_id, bet_amount, crash_point, now)
        })
        .await?;

        self.registry.register(&placed.game);
        self.metrics.record_game_started();
        self.sweeper.ensure_started();

        info!(
            game_id = placed.game.id,
            user_id,
            "🎲 Game started (bet {:.2}, crash point {:.2}x)",
            bet_amount,
            crash_point
        );

        Ok(StartedGame {
            game: GameView::new(&placed.game, placed.game.multiplier),
            balance: placed.balance,
            currency: placed.currency,
        })
    }

    /// Player-initiated stop
    pub async fn stop(&self, user_id: u64, game_id: u64) -> CrashResult<SettlementResult> {
        let game = self.owned_game(user_id, game_id)?;
        if game.is_settled {
            return Err(CrashError::AlreadyCompleted(game_id));
        }

        self.registry.unregister(game_id);

        match self
            .coordinator
            .settle(game_id, self.clock.now(), StopReason::ManualStop)
            .await
        {
            Ok(result) => Ok(result),
            Err(CrashError::AlreadyCompleted(id)) => Err(CrashError::AlreadyCompleted(id)),
            Err(e) => {
                // Still unsettled; hand it back to the sweep
                warn!(game_id, user_id, "Stop failed, re-registering: {}", e);
                self.registry.register(&game);
                Err(e)
            }
        }
    }

    /// A player's view of one game
    pub fn status(&self, user_id: u64, game_id: u64) -> CrashResult<GameView> {
        let game = self.owned_game(user_id, game_id)?;
        if game.is_settled {
            return Ok(GameView::new(&game, game.multiplier));
        }

        let settings = self.active_settings()?;
        let current = self.live_multiplier(&game, &settings, self.clock.now());
        Ok(GameView::new(&game, current))
    }

    /// Operator view of every game in flight
    pub fn list_active(&self) -> CrashResult<Vec<ActiveGameView>> {
        let settings = self.active_settings()?;
        let now = self.clock.now();
        let mut games = Vec::new();

        for game_id in self.registry.snapshot_ids() {
            let game = match self.store.load_game(game_id) {
                Ok(Some(game)) if !game.is_settled => game,
                Ok(_) => continue,
                Err(e) => {
                    warn!(game_id, "Skipping game in active listing: {}", e);
                    continue;
                }
            };
            let current = self.live_multiplier(&game, &settings, now);
            games.push(ActiveGameView {
                game_id: game.id,
                user_id: game.user_id,
                bet_amount: game.bet_amount,
                current_multiplier: current,
                crash_point: game.crash_point,
                elapsed_seconds: elapsed_seconds(game.created_at, now),
                time_to_crash: time_to_crash(current, game.crash_point, settings.multiplier_speed),
                created_at: game.created_at,
            });
        }

        Ok(games)
    }

    pub fn crash_info(&self, user_id: u64, game_id: u64) -> CrashResult<CrashInfo> {
        let game = self.owned_game(user_id, game_id)?;
        let settings = self.active_settings()?;
        let now = self.clock.now();

        if game.is_settled {
            let ended = game.settled_at.unwrap_or(now);
            return Ok(CrashInfo {
                game_id: game.id,
                bet_amount: game.bet_amount,
                current_multiplier: game.multiplier,
                crash_point: game.crash_point,
                multiplier_speed: settings.multiplier_speed,
                elapsed_seconds: elapsed_seconds(game.created_at, ended),
                is_active: false,
                time_to_crash: None,
            });
        }

        let current = self.live_multiplier(&game, &settings, now);
        Ok(CrashInfo {
            game_id: game.id,
            bet_amount: game.bet_amount,
            current_multiplier: current,
            crash_point: game.crash_point,
            multiplier_speed: settings.multiplier_speed,
            elapsed_seconds: elapsed_seconds(game.created_at, now),
            is_active: true,
            time_to_crash: Some(time_to_crash(
                current,
                game.crash_point,
                settings.multiplier_speed,
            )),
        })
    }

    /// Most recent games for a user, newest first
    pub fn user_games(&self, user_id: u64) -> CrashResult<Vec<GameView>> {
        let games = self
            .store
            .list_user_games(user_id, self.config.history_limit)?;
        Ok(games
            .iter()
            .map(|game| GameView::new(game, game.multiplier))
            .collect())
    }

    pub fn game_settings(&self) -> CrashResult<SettingsView> {
        let settings = self.active_settings()?;
        Ok(SettingsView {
            max_multiplier: settings.max_multiplier,
            min_bet_amount: settings.min_bet_amount,
            max_bet_amount: settings.max_bet_amount,
            multiplier_speed: settings.multiplier_speed,
            display_cap: self.config.display_cap,
        })
    }

    /// Validate and install a new settings row. Games already in flight keep
    /// the crash point they were created with.
    pub fn replace_settings(&self, settings: GameSettings) -> CrashResult<()> {
        settings.validate().map_err(CrashError::Validation)?;
        self.store.put_settings(&settings)?;
        info!(
            "⚙️  Game settings replaced (max multiplier {:.2}x, speed {:.2}/s)",
            settings.max_multiplier, settings.multiplier_speed
        );
        Ok(())
    }

    fn active_settings(&self) -> CrashResult<GameSettings> {
        self.store
            .active_settings()?
            .ok_or_else(|| CrashError::not_found("Game settings not found"))
    }

    fn owned_game(&self, user_id: u64, game_id: u64) -> CrashResult<Game> {
        let game = self
            .store
            .load_game(game_id)?
            .ok_or_else(|| CrashError::not_found(format!("Game {} not found", game_id)))?;
        if game.user_id != user_id {
            return Err(CrashError::forbidden("Game belongs to another user"));
        }
        Ok(game)
    }

    fn live_multiplier(&self, game: &Game, settings: &GameSettings, now: DateTime<Utc>) -> f64 {
        current_multiplier_capped(
            game.created_at,
            settings.multiplier_speed,
            now,
            self.config.display_cap,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::clock::ManualClock;
    use crate::storage::flaky::FlakySettleStore;
    use crate::storage::{CrashStore, MemoryStore};
    use chrono::TimeZone;

    fn service() -> (GameService, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::with_settings(GameSettings::default()));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        let service = GameService::new(store.clone(), Arc::new(clock.clone()), EngineConfig::default());
        (service, store, clock)
    }

    #[tokio::test]
    async fn test_start_rejects_out_of_range_bet() {
        let (service, store, clock) = service();
        let user = store.create_user("erin", 5000.0, "IDR", clock.now()).unwrap();

        let err = service.start(user.id, 500.0).await.unwrap_err();
        assert!(matches!(err, CrashError::Validation(_)));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_banned_user_cannot_start() {
        let (service, store, clock) = service();
        let user = store.create_user("frank", 5000.0, "IDR", clock.now()).unwrap();
        store
            .set_user_status(user.id, crate::games::types::UserStatus::Banned)
            .unwrap();

        let err = service.start(user.id, 1000.0).await.unwrap_err();
        assert!(matches!(err, CrashError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_status_reports_live_multiplier() {
        let (service, store, clock) = service();
        let user = store.create_user("gina", 5000.0, "IDR", clock.now()).unwrap();
        let started = service.start(user.id, 1000.0).await.unwrap();
        service.sweeper().shutdown();

        clock.advance_secs(20);
        let view = service.status(user.id, started.game.id).unwrap();
        assert!((view.multiplier - 3.0).abs() < 1e-9);
        assert_eq!(view.status, GameStatus::Active);

        let info = service.crash_info(user.id, started.game.id).unwrap();
        assert!(info.is_active);
        assert_eq!(info.crash_point, 100.0);
        assert!((info.time_to_crash.unwrap() - 970.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_other_users_game_is_forbidden() {
        let (service, store, clock) = service();
        let owner = store.create_user("hank", 5000.0, "IDR", clock.now()).unwrap();
        let other = store.create_user("ivy", 5000.0, "IDR", clock.now()).unwrap();
        let started = service.start(owner.id, 1000.0).await.unwrap();
        service.sweeper().shutdown();

        let err = service.stop(other.id, started.game.id).await.unwrap_err();
        assert!(matches!(err, CrashError::Forbidden(_)));
        assert!(service.registry().contains(started.game.id));
    }

    #[tokio::test]
    async fn test_failed_stop_leaves_game_eligible() {
        let memory = Arc::new(MemoryStore::with_settings(GameSettings::default()));
        let store = Arc::new(FlakySettleStore::new(memory.clone(), 1));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        let service = GameService::new(store.clone(), Arc::new(clock.clone()), EngineConfig::default());
        let user = memory.create_user("jill", 5000.0, "IDR", clock.now()).unwrap();

        let started = service.start(user.id, 1000.0).await.unwrap();
        service.sweeper().shutdown();
        clock.advance_secs(5);

        let err = service.stop(user.id, started.game.id).await.unwrap_err();
        assert!(matches!(err, CrashError::Storage(_)));
        assert!(!memory.load_game(started.game.id).unwrap().unwrap().is_settled);
        assert!(service.registry().contains(started.game.id));
        assert_eq!(memory.load_wallet(user.id).unwrap().unwrap().balance, 4000.0);

        let result = service.stop(user.id, started.game.id).await.unwrap();
        assert_eq!(result.status, GameStatus::Won);
        assert_eq!(result.balance.new_balance, 5500.0);
        assert!(!service.registry().contains(started.game.id));
        assert_eq!(memory.list_ledger(user.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_active_listing_reports_time_to_crash() {
        let (service, store, clock) = service();
        let user = store.create_user("kim", 5000.0, "IDR", clock.now()).unwrap();
        let started = service.start(user.id, 1000.0).await.unwrap();
        service.sweeper().shutdown();

        clock.advance_secs(10);
        let active = service.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].game_id, started.game.id);
        assert!((active[0].current_multiplier - 2.0).abs() < 1e-9);
        assert!((active[0].time_to_crash - 980.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_active_listing_skips_unreadable_game() {
        let memory = Arc::new(MemoryStore::with_settings(GameSettings::default()));
        let store = Arc::new(FlakySettleStore::new(memory.clone(), 0));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        let service = GameService::new(store.clone(), Arc::new(clock.clone()), EngineConfig::default());
        let user = memory.create_user("lou", 5000.0, "IDR", clock.now()).unwrap();

        let broken = service.start(user.id, 1000.0).await.unwrap();
        let healthy = service.start(user.id, 1000.0).await.unwrap();
        service.sweeper().shutdown();
        store.make_unreadable(broken.game.id);

        let active = service.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].game_id, healthy.game.id);
        assert!(service.registry().contains(broken.game.id));
    }

    #[tokio::test]
    async fn test_replace_settings_validates() {
        let (service, _store, _clock) = service();
        let mut settings = GameSettings::default();
        settings.multiplier_speed = 0.0;
        assert!(matches!(
            service.replace_settings(settings),
            Err(CrashError::Validation(_))
        ));

        let mut settings = GameSettings::default();
        settings.multiplier_speed = f64::NAN;
        assert!(matches!(
            service.replace_settings(settings),
            Err(CrashError::Validation(_))
        ));
        assert_eq!(service.game_settings().unwrap().multiplier_speed, 0.1);
    }
}
