//! Test store that fails a chosen number of settlement commits and can
//! refuse reads of one game

use super::{CrashStore, DecideFn, MemoryStore, PlacedBet, SettledGame};
use crate::errors::{CrashError, CrashResult, StorageError};
use crate::games::types::{
    BalanceChange, Game, GameSettings, LedgerEntry, LedgerKind, User, UserStatus, Wallet,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct FlakySettleStore {
    inner: Arc<MemoryStore>,
    failures_left: AtomicUsize,
    /// Game id whose loads fail; zero for none
    unreadable_game: AtomicU64,
}

impl FlakySettleStore {
    pub(crate) fn new(inner: Arc<MemoryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            unreadable_game: AtomicU64::new(0),
        }
    }

    pub(crate) fn make_unreadable(&self, game_id: u64) {
        self.unreadable_game.store(game_id, Ordering::Release);
    }

    pub(crate) fn failures_left(&self) -> usize {
        self.failures_left.load(Ordering::Acquire)
    }
}

impl CrashStore for FlakySettleStore {
    fn active_settings(&self) -> CrashResult<Option<GameSettings>> {
        self.inner.active_settings()
    }

    fn put_settings(&self, settings: &GameSettings) -> CrashResult<()> {
        self.inner.put_settings(settings)
    }

    fn create_user(
        &self,
        username: &str,
        opening_balance: f64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<User> {
        self.inner.create_user(username, opening_balance, currency, now)
    }

    fn load_user(&self, user_id: u64) -> CrashResult<Option<User>> {
        self.inner.load_user(user_id)
    }

    fn find_user_by_name(&self, username: &str) -> CrashResult<Option<User>> {
        self.inner.find_user_by_name(username)
    }

    fn set_user_status(&self, user_id: u64, status: UserStatus) -> CrashResult<()> {
        self.inner.set_user_status(user_id, status)
    }

    fn load_wallet(&self, user_id: u64) -> CrashResult<Option<Wallet>> {
        self.inner.load_wallet(user_id)
    }

    fn adjust_wallet(
        &self,
        user_id: u64,
        delta: f64,
        kind: LedgerKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<(BalanceChange, LedgerEntry)> {
        self.inner.adjust_wallet(user_id, delta, kind, description, now)
    }

    fn place_bet(
        &self,
        user_id: u64,
        bet_amount: f64,
        crash_point: f64,
        now: DateTime<Utc>,
    ) -> CrashResult<PlacedBet> {
        self.inner.place_bet(user_id, bet_amount, crash_point, now)
    }

    fn load_game(&self, game_id: u64) -> CrashResult<Option<Game>> {
        if game_id == self.unreadable_game.load(Ordering::Acquire) {
            return Err(CrashError::Storage(StorageError::ReadFailed(format!(
                "injected read failure for game {}",
                game_id
            ))));
        }
        self.inner.load_game(game_id)
    }

    fn list_user_games(&self, user_id: u64, limit: usize) -> CrashResult<Vec<Game>> {
        self.inner.list_user_games(user_id, limit)
    }

    fn list_unsettled_games(&self) -> CrashResult<Vec<Game>> {
        self.inner.list_unsettled_games()
    }

    fn settle_game(
        &self,
        game_id: u64,
        now: DateTime<Utc>,
        decide: &mut DecideFn<'_>,
    ) -> CrashResult<SettledGame> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CrashError::Storage(StorageError::CommitFailed(format!(
                "injected commit failure for game {}",
                game_id
            ))));
        }
        self.inner.settle_game(game_id, now, decide)
    }

    fn list_ledger(&self, user_id: u64) -> CrashResult<Vec<LedgerEntry>> {
        self.inner.list_ledger(user_id)
    }
}
