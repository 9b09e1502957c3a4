//! End-to-end game lifecycle against the in-memory store
//! Covers the worked win/loss examples, idempotent stop, insufficient balance,
//! crash-point immutability and registry recovery.

use chrono::{TimeZone, Utc};
use crashline::config::EngineConfig;
use crashline::errors::CrashError;
use crashline::games::{
    Clock, GameService, GameSettings, GameStatus, LedgerKind, ManualClock, StopReason,
};
use crashline::storage::{CrashStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

fn two_x_settings() -> GameSettings {
    GameSettings {
        max_multiplier: 2.0,
        min_bet_amount: 100.0,
        max_bet_amount: 100_000.0,
        multiplier_speed: 0.1,
        is_active: true,
    }
}

fn setup(opening_balance: f64) -> (Arc<GameService>, Arc<MemoryStore>, ManualClock, u64) {
    let store = Arc::new(MemoryStore::with_settings(two_x_settings()));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
    let user = store
        .create_user("player", opening_balance, "IDR", clock.now())
        .unwrap();

    let config = EngineConfig {
        sweep_interval_ms: 10,
        ..Default::default()
    };
    let service = Arc::new(GameService::new(
        store.clone(),
        Arc::new(clock.clone()),
        config,
    ));
    (service, store, clock, user.id)
}

#[tokio::test]
async fn test_stop_before_crash_point_wins() {
    let (service, store, clock, user_id) = setup(5000.0);

    let started = service.start(user_id, 1000.0).await.unwrap();
    assert_eq!(started.balance.old_balance, 5000.0);
    assert_eq!(started.balance.new_balance, 4000.0);
    assert_eq!(started.currency, "IDR");
    assert_eq!(started.game.status, GameStatus::Active);

    clock.advance_secs(5);
    let result = service.stop(user_id, started.game.id).await.unwrap();

    assert_eq!(result.status, GameStatus::Won);
    assert!((result.multiplier - 1.5).abs() < 1e-9);
    assert!((result.win_amount - 1500.0).abs() < 1e-9);
    assert_eq!(result.crash_point, 2.0);
    assert_eq!(result.stop_reason, StopReason::ManualStop);
    assert_eq!(result.balance.old_balance, 4000.0);
    assert_eq!(result.balance.new_balance, 5500.0);
    assert_eq!(result.message(), "Game won!");

    let ledger = store.list_ledger(user_id).unwrap();
    let kinds: Vec<LedgerKind> = ledger.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![LedgerKind::Deposit, LedgerKind::Bet, LedgerKind::Win]);
    assert_eq!(ledger[2].description, "Game won with multiplier 1.50x");
    assert!(!service.registry().contains(started.game.id));

    service.sweeper().shutdown();
}

#[tokio::test]
async fn test_stop_after_crash_point_loses() {
    let (service, store, clock, user_id) = setup(5000.0);
    let started = service.start(user_id, 1000.0).await.unwrap();
    service.sweeper().shutdown();

    clock.advance_secs(12);
    let result = service.stop(user_id, started.game.id).await.unwrap();

    assert_eq!(result.status, GameStatus::Lost);
    assert_eq!(result.win_amount, 0.0);
    assert_eq!(result.balance.new_balance, 4000.0);
    assert_eq!(result.message(), "Game lost - crashed!");

    let ledger = store.list_ledger(user_id).unwrap();
    let loss = ledger.last().unwrap();
    assert_eq!(loss.kind, LedgerKind::Loss);
    assert_eq!(loss.amount, 0.0);
    assert_eq!(loss.description, "Game lost - crashed at multiplier 2.00x");
}

#[tokio::test]
async fn test_sweeper_auto_crashes_unstopped_game() {
    let (service, store, clock, user_id) = setup(5000.0);
    let started = service.start(user_id, 1000.0).await.unwrap();
    assert!(service.sweeper().is_running());

    // Below the crash point nothing happens
    clock.advance_secs(9);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!store.load_game(started.game.id).unwrap().unwrap().is_settled);

    clock.advance_secs(1);
    let mut settled = None;
    for _ in 0..200 {
        let game = store.load_game(started.game.id).unwrap().unwrap();
        if game.is_settled {
            settled = Some(game);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let game = settled.expect("sweeper should settle the game");
    assert_eq!(game.status, GameStatus::Lost);
    assert_eq!(game.win_amount, 0.0);
    assert_eq!(store.load_wallet(user_id).unwrap().unwrap().balance, 4000.0);
    assert!(!service.registry().contains(started.game.id));

    let err = service.stop(user_id, started.game.id).await.unwrap_err();
    assert!(matches!(err, CrashError::AlreadyCompleted(_)));

    service.sweeper().shutdown();
}

#[tokio::test]
async fn test_stop_twice_reports_already_completed() {
    let (service, store, clock, user_id) = setup(5000.0);
    let started = service.start(user_id, 1000.0).await.unwrap();
    service.sweeper().shutdown();

    clock.advance_secs(3);
    let first = service.stop(user_id, started.game.id).await;
    let second = service.stop(user_id, started.game.id).await;

    assert!(first.is_ok());
    assert!(matches!(second, Err(CrashError::AlreadyCompleted(id)) if id == started.game.id));
    assert_eq!(store.list_ledger(user_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_insufficient_balance_creates_nothing() {
    let (service, store, _clock, user_id) = setup(500.0);

    let err = service.start(user_id, 1000.0).await.unwrap_err();
    assert!(matches!(err, CrashError::InsufficientBalance { .. }));

    assert_eq!(store.load_wallet(user_id).unwrap().unwrap().balance, 500.0);
    assert!(store.list_user_games(user_id, 20).unwrap().is_empty());
    assert_eq!(store.list_ledger(user_id).unwrap().len(), 1);
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn test_settings_change_keeps_crash_point() {
    let (service, store, clock, user_id) = setup(5000.0);
    let started = service.start(user_id, 1000.0).await.unwrap();
    service.sweeper().shutdown();

    let mut raised = two_x_settings();
    raised.max_multiplier = 5.0;
    service.replace_settings(raised).unwrap();

    let game = store.load_game(started.game.id).unwrap().unwrap();
    assert_eq!(game.crash_point, 2.0);
    assert_eq!(service.crash_info(user_id, started.game.id).unwrap().crash_point, 2.0);

    clock.advance_secs(10);
    let mut report = service.sweeper().sweep_once().await;
    assert_eq!(report.dispatched, vec![started.game.id]);
    report.wait_settled().await;

    let game = store.load_game(started.game.id).unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Lost);

    // New games pick up the new crash point
    let next = service.start(user_id, 1000.0).await.unwrap();
    let next = store.load_game(next.game.id).unwrap().unwrap();
    assert_eq!(next.crash_point, 5.0);
}

#[tokio::test]
async fn test_recover_registers_unsettled_games() {
    let store = Arc::new(MemoryStore::with_settings(two_x_settings()));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
    let user = store.create_user("returning", 5000.0, "IDR", clock.now()).unwrap();
    let in_flight = store.place_bet(user.id, 1000.0, 2.0, clock.now()).unwrap();
    let done = store.place_bet(user.id, 1000.0, 2.0, clock.now()).unwrap();
    store
        .settle_game(done.game.id, clock.now(), &mut |game, settings| {
            Ok(crashline::games::settlement::decide_outcome(
                game,
                settings,
                clock.now(),
                100.0,
            ))
        })
        .unwrap();

    let service = GameService::new(store.clone(), Arc::new(clock.clone()), EngineConfig::default());
    assert_eq!(service.recover_active_games().unwrap(), 1);
    assert!(service.registry().contains(in_flight.game.id));
    assert!(!service.registry().contains(done.game.id));

    let active = service.list_active().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].game_id, in_flight.game.id);
    assert_eq!(active[0].crash_point, 2.0);
    assert_eq!(active[0].elapsed_seconds, 0.0);
    assert!((active[0].time_to_crash - 10.0).abs() < 1e-9);

    clock.advance_secs(4);
    let active = service.list_active().unwrap();
    assert!((active[0].time_to_crash - 6.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_user_games_newest_first() {
    let (service, _store, clock, user_id) = setup(50_000.0);
    service.sweeper().shutdown();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(service.start(user_id, 1000.0).await.unwrap().game.id);
        clock.advance_secs(1);
    }

    let history: Vec<u64> = service.user_games(user_id).unwrap().iter().map(|g| g.id).collect();
    ids.reverse();
    assert_eq!(history, ids);

    let settings = service.game_settings().unwrap();
    assert_eq!(settings.max_multiplier, 2.0);
    assert_eq!(settings.display_cap, 100.0);
}
