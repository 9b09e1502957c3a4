//! In-process store
//!
//! One mutex guards every table. Each operation stages its changes on copies
//! and writes them back only after every fallible step has passed, so an error
//! leaves the tables exactly as they were.

use super::{
    apply_adjustment, apply_bet, apply_settlement, CrashStore, DecideFn, PlacedBet, SettledGame,
};
use crate::errors::{CrashError, CrashResult, StorageError};
use crate::games::types::{
    BalanceChange, Game, GameSettings, LedgerEntry, LedgerKind, User, UserStatus, Wallet,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    settings: Option<GameSettings>,
    users: BTreeMap<u64, User>,
    wallets: BTreeMap<u64, Wallet>,
    games: BTreeMap<u64, Game>,
    ledger: Vec<LedgerEntry>,
    last_user_id: u64,
    last_game_id: u64,
    last_entry_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an active settings row
    pub fn with_settings(settings: GameSettings) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.lock() {
            tables.settings = Some(settings);
        }
        store
    }

    fn lock(&self) -> CrashResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| CrashError::Storage(StorageError::LockPoisoned))
    }
}

fn wallet_of(tables: &Tables, user_id: u64) -> CrashResult<Wallet> {
    tables
        .wallets
        .get(&user_id)
        .cloned()
        .ok_or_else(|| CrashError::not_found(format!("Wallet for user {} not found", user_id)))
}

impl CrashStore for MemoryStore {
    fn active_settings(&self) -> CrashResult<Option<GameSettings>> {
        let tables = self.lock()?;
        Ok(tables.settings.clone().filter(|s| s.is_active))
    }

    fn put_settings(&self, settings: &GameSettings) -> CrashResult<()> {
        let mut tables = self.lock()?;
        tables.settings = Some(settings.clone());
        Ok(())
    }

    fn create_user(
        &self,
        username: &str,
        opening_balance: f64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<User> {
        if opening_balance < 0.0 || !opening_balance.is_finite() {
            return Err(CrashError::validation("Opening balance must be a non-negative amount"));
        }

        let mut tables = self.lock()?;
        if tables.users.values().any(|u| u.username == username) {
            return Err(CrashError::validation(format!("Username {} already taken", username)));
        }

        let user = User {
            id: tables.last_user_id + 1,
            username: username.to_string(),
            status: UserStatus::Active,
        };
        let mut wallet = Wallet {
            user_id: user.id,
            balance: 0.0,
            currency: currency.to_string(),
        };
        let deposit = if opening_balance > 0.0 {
            let (_, entry) = apply_adjustment(
                &mut wallet,
                opening_balance,
                LedgerKind::Deposit,
                "Opening balance",
                tables.last_entry_id + 1,
                now,
            )?;
            Some(entry)
        } else {
            None
        };

        tables.last_user_id = user.id;
        tables.users.insert(user.id, user.clone());
        tables.wallets.insert(user.id, wallet);
        if let Some(entry) = deposit {
            tables.last_entry_id = entry.id;
            tables.ledger.push(entry);
        }
        Ok(user)
    }

    fn load_user(&self, user_id: u64) -> CrashResult<Option<User>> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    fn find_user_by_name(&self, username: &str) -> CrashResult<Option<User>> {
        let tables = self.lock()?;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    fn set_user_status(&self, user_id: u64, status: UserStatus) -> CrashResult<()> {
        let mut tables = self.lock()?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| CrashError::not_found(format!("User {} not found", user_id)))?;
        user.status = status;
        Ok(())
    }

    fn load_wallet(&self, user_id: u64) -> CrashResult<Option<Wallet>> {
        Ok(self.lock()?.wallets.get(&user_id).cloned())
    }

    fn adjust_wallet(
        &self,
        user_id: u64,
        delta: f64,
        kind: LedgerKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<(BalanceChange, LedgerEntry)> {
        let mut tables = self.lock()?;
        let mut wallet = wallet_of(&tables, user_id)?;
        let (change, entry) =
            apply_adjustment(&mut wallet, delta, kind, description, tables.last_entry_id + 1, now)?;

        tables.wallets.insert(user_id, wallet);
        tables.last_entry_id = entry.id;
        tables.ledger.push(entry.clone());
        Ok((change, entry))
    }

    fn place_bet(
        &self,
        user_id: u64,
        bet_amount: f64,
        crash_point: f64,
        now: DateTime<Utc>,
    ) -> CrashResult<PlacedBet> {
        let mut tables = self.lock()?;
        let mut wallet = wallet_of(&tables, user_id)?;
        let game_id = tables.last_game_id + 1;
        let entry_id = tables.last_entry_id + 1;
        let (game, balance, entry) =
            apply_bet(&mut wallet, game_id, entry_id, bet_amount, crash_point, now)?;

        let currency = wallet.currency.clone();
        tables.wallets.insert(user_id, wallet);
        tables.games.insert(game_id, game.clone());
        tables.ledger.push(entry.clone());
        tables.last_game_id = game_id;
        tables.last_entry_id = entry_id;

        Ok(PlacedBet {
            game,
            balance,
            currency,
            entry,
        })
    }

    fn load_game(&self, game_id: u64) -> CrashResult<Option<Game>> {
        Ok(self.lock()?.games.get(&game_id).cloned())
    }

    fn list_user_games(&self, user_id: u64, limit: usize) -> CrashResult<Vec<Game>> {
        let tables = self.lock()?;
        Ok(tables
            .games
            .values()
            .rev()
            .filter(|g| g.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn list_unsettled_games(&self) -> CrashResult<Vec<Game>> {
        let tables = self.lock()?;
        Ok(tables.games.values().filter(|g| !g.is_settled).cloned().collect())
    }

    fn settle_game(
        &self,
        game_id: u64,
        now: DateTime<Utc>,
        decide: &mut DecideFn<'_>,
    ) -> CrashResult<SettledGame> {
        let mut tables = self.lock()?;

        // Guard: the flag check and its flip happen under the same lock
        let mut game = tables
            .games
            .get(&game_id)
            .cloned()
            .ok_or_else(|| CrashError::not_found(format!("Game {} not found", game_id)))?;
        if game.is_settled {
            return Err(CrashError::AlreadyCompleted(game_id));
        }

        let mut wallet = wallet_of(&tables, game.user_id)?;
        let settings = tables
            .settings
            .clone()
            .filter(|s| s.is_active)
            .ok_or_else(|| CrashError::not_found("Game settings not found"))?;

        let decision = decide(&game, &settings)?;
        let entry_id = tables.last_entry_id + 1;
        let (balance, entry) = apply_settlement(&mut game, &mut wallet, decision, entry_id, now);

        let currency = wallet.currency.clone();
        tables.games.insert(game_id, game.clone());
        tables.wallets.insert(game.user_id, wallet);
        tables.ledger.push(entry.clone());
        tables.last_entry_id = entry_id;

        Ok(SettledGame {
            game,
            balance,
            currency,
            entry,
        })
    }

    fn list_ledger(&self, user_id: u64) -> CrashResult<Vec<LedgerEntry>> {
        let tables = self.lock()?;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
