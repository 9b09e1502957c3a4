//! Transactional store contract
//!
//! Every operation that touches a wallet performs its read-modify-write and
//! its ledger append as one failure-atomic unit. Two backends implement the
//! contract: [`MemoryStore`] for tests and ephemeral runs, [`RocksStore`] for
//! persistence on a RocksDB `TransactionDB`.

pub mod memory;
pub mod rocks;

#[cfg(test)]
pub(crate) mod flaky;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::errors::{CrashError, CrashResult, StorageError};
use crate::games::types::{
    BalanceChange, Game, GameSettings, GameStatus, LedgerEntry, LedgerKind, SettlementDecision,
    User, UserStatus, Wallet,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const DEFAULT_CURRENCY: &str = "IDR";

pub type SharedStore = Arc<dyn CrashStore>;

/// Result of an atomic bet placement
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBet {
    pub game: Game,
    pub balance: BalanceChange,
    pub currency: String,
    pub entry: LedgerEntry,
}

/// Result of a committed settlement unit
#[derive(Debug, Clone, PartialEq)]
pub struct SettledGame {
    pub game: Game,
    pub balance: BalanceChange,
    pub currency: String,
    pub entry: LedgerEntry,
}

/// Decision callback run inside the settlement unit, after the guard
/// succeeded. Returning an error rolls the whole unit back.
pub type DecideFn<'a> = dyn FnMut(&Game, &GameSettings) -> CrashResult<SettlementDecision> + 'a;

/// Storage collaborator required by the engine
pub trait CrashStore: Send + Sync {
    /// The currently active settings row, if any
    fn active_settings(&self) -> CrashResult<Option<GameSettings>>;

    /// Replace the active settings row
    fn put_settings(&self, settings: &GameSettings) -> CrashResult<()>;

    /// Create a user and wallet; a positive opening balance is recorded as a deposit
    fn create_user(
        &self,
        username: &str,
        opening_balance: f64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<User>;

    fn load_user(&self, user_id: u64) -> CrashResult<Option<User>>;

    fn find_user_by_name(&self, username: &str) -> CrashResult<Option<User>>;

    fn set_user_status(&self, user_id: u64, status: UserStatus) -> CrashResult<()>;

    fn load_wallet(&self, user_id: u64) -> CrashResult<Option<Wallet>>;

    /// Atomic signed balance change plus ledger append; rejects overdrafts
    fn adjust_wallet(
        &self,
        user_id: u64,
        delta: f64,
        kind: LedgerKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<(BalanceChange, LedgerEntry)>;

    /// Atomic debit + game creation + `bet` ledger entry
    fn place_bet(
        &self,
        user_id: u64,
        bet_amount: f64,
        crash_point: f64,
        now: DateTime<Utc>,
    ) -> CrashResult<PlacedBet>;

    fn load_game(&self, game_id: u64) -> CrashResult<Option<Game>>;

    /// Most recent games first
    fn list_user_games(&self, user_id: u64, limit: usize) -> CrashResult<Vec<Game>>;

    /// Games whose settlement flag is still false
    fn list_unsettled_games(&self) -> CrashResult<Vec<Game>>;

    /// Conditionally flip the settlement flag, then decide and write the
    /// outcome, wallet and ledger entry in the same unit.
    ///
    /// Returns `AlreadyCompleted` without writing anything when the flag was
    /// already set.
    fn settle_game(
        &self,
        game_id: u64,
        now: DateTime<Utc>,
        decide: &mut DecideFn<'_>,
    ) -> CrashResult<SettledGame>;

    /// Ledger entries for a user, oldest first
    fn list_ledger(&self, user_id: u64) -> CrashResult<Vec<LedgerEntry>>;
}

/// Run a store operation on the blocking pool.
///
/// Once spawned the operation runs to completion even if the awaiting task
/// is dropped, so a unit that got past its guard is never abandoned halfway.
pub async fn run_blocking<T, F>(store: &SharedStore, op: F) -> CrashResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn CrashStore) -> CrashResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| {
            CrashError::Storage(StorageError::CommitFailed(format!("storage task aborted: {}", e)))
        })?
}

/// Build a game and debit the wallet copy; shared by both backends
pub(crate) fn apply_bet(
    wallet: &mut Wallet,
    game_id: u64,
    entry_id: u64,
    bet_amount: f64,
    crash_point: f64,
    now: DateTime<Utc>,
) -> CrashResult<(Game, BalanceChange, LedgerEntry)> {
    if wallet.balance < bet_amount {
        return Err(CrashError::InsufficientBalance {
            required: bet_amount,
            available: wallet.balance,
        });
    }

    let old_balance = wallet.balance;
    wallet.balance -= bet_amount;

    let game = Game {
        id: game_id,
        user_id: wallet.user_id,
        bet_amount,
        crash_point,
        multiplier: 1.0,
        win_amount: 0.0,
        status: GameStatus::Active,
        is_settled: false,
        created_at: now,
        settled_at: None,
    };

    let entry = LedgerEntry {
        id: entry_id,
        user_id: wallet.user_id,
        game_id: Some(game_id),
        kind: LedgerKind::Bet,
        amount: -bet_amount,
        balance_after: wallet.balance,
        description: "Bet placed for casino game".to_string(),
        created_at: now,
    };

    Ok((
        game,
        BalanceChange {
            old_balance,
            new_balance: wallet.balance,
        },
        entry,
    ))
}

/// Apply a settlement decision to copies of the game and wallet
pub(crate) fn apply_settlement(
    game: &mut Game,
    wallet: &mut Wallet,
    decision: SettlementDecision,
    entry_id: u64,
    now: DateTime<Utc>,
) -> (BalanceChange, LedgerEntry) {
    let old_balance = wallet.balance;
    wallet.balance += decision.win_amount;

    game.multiplier = decision.multiplier;
    game.win_amount = decision.win_amount;
    game.status = decision.status;
    game.is_settled = true;
    game.settled_at = Some(now);

    let entry = LedgerEntry {
        id: entry_id,
        user_id: game.user_id,
        game_id: Some(game.id),
        kind: decision.ledger_kind,
        amount: decision.win_amount,
        balance_after: wallet.balance,
        description: decision.description,
        created_at: now,
    };

    (
        BalanceChange {
            old_balance,
            new_balance: wallet.balance,
        },
        entry,
    )
}

/// Apply a signed adjustment to a wallet copy
pub(crate) fn apply_adjustment(
    wallet: &mut Wallet,
    delta: f64,
    kind: LedgerKind,
    description: &str,
    entry_id: u64,
    now: DateTime<Utc>,
) -> CrashResult<(BalanceChange, LedgerEntry)> {
    if !delta.is_finite() {
        return Err(CrashError::validation("Adjustment amount must be finite"));
    }
    if wallet.balance + delta < 0.0 {
        return Err(CrashError::InsufficientBalance {
            required: -delta,
            available: wallet.balance,
        });
    }

    let old_balance = wallet.balance;
    wallet.balance += delta;

    let entry = LedgerEntry {
        id: entry_id,
        user_id: wallet.user_id,
        game_id: None,
        kind,
        amount: delta,
        balance_after: wallet.balance,
        description: description.to_string(),
        created_at: now,
    };

    Ok((
        BalanceChange {
            old_balance,
            new_balance: wallet.balance,
        },
        entry,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(balance: f64) -> Wallet {
        Wallet {
            user_id: 1,
            balance,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    #[test]
    fn test_apply_bet_debits_and_records() {
        let mut w = wallet(5000.0);
        let (game, change, entry) = apply_bet(&mut w, 10, 3, 1000.0, 2.0, Utc::now()).unwrap();

        assert_eq!(w.balance, 4000.0);
        assert_eq!(change.old_balance, 5000.0);
        assert_eq!(change.new_balance, 4000.0);
        assert_eq!(game.status, GameStatus::Active);
        assert!(!game.is_settled);
        assert_eq!(entry.amount, -1000.0);
        assert_eq!(entry.balance_after, 4000.0);
        assert_eq!(entry.kind, LedgerKind::Bet);
    }

    #[test]
    fn test_apply_bet_rejects_overdraft_without_mutation() {
        let mut w = wallet(500.0);
        let err = apply_bet(&mut w, 10, 3, 1000.0, 2.0, Utc::now()).unwrap_err();
        assert!(matches!(err, CrashError::InsufficientBalance { .. }));
        assert_eq!(w.balance, 500.0);
    }

    #[test]
    fn test_apply_adjustment_rejects_overdraft() {
        let mut w = wallet(100.0);
        let err = apply_adjustment(&mut w, -150.0, LedgerKind::Withdraw, "cash out", 1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CrashError::InsufficientBalance { .. }));
        assert_eq!(w.balance, 100.0);

        let (change, entry) =
            apply_adjustment(&mut w, 50.0, LedgerKind::Topup, "admin top-up", 2, Utc::now()).unwrap();
        assert_eq!(change.new_balance, 150.0);
        assert_eq!(entry.balance_after, 150.0);
    }
}
