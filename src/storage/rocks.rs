//! Persistent store on a RocksDB `TransactionDB`
//!
//! Each atomic unit is one pessimistic transaction. Records that a unit
//! reads and then rewrites (game, wallet, id sequences) are taken with
//! `get_for_update`, so concurrent writers against the same wallet or game
//! serialize on RocksDB row locks instead of losing updates.

use super::{
    apply_adjustment, apply_bet, apply_settlement, CrashStore, DecideFn, PlacedBet, SettledGame,
};
use crate::config::StorageConfig;
use crate::errors::{CrashError, CrashResult, StorageError};
use crate::games::types::{
    BalanceChange, Game, GameSettings, LedgerEntry, LedgerKind, User, UserStatus, Wallet,
};
use chrono::{DateTime, Utc};
use rocksdb::{Options, Transaction, TransactionDB, TransactionDBOptions};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

const SETTINGS_KEY: &[u8] = b"settings:active";
const USER_SEQ_KEY: &[u8] = b"seq:user";
const GAME_SEQ_KEY: &[u8] = b"seq:game";
const LEDGER_SEQ_KEY: &[u8] = b"seq:ledger";
const UNSETTLED_PREFIX: &str = "game:unsettled:";

fn user_key(user_id: u64) -> Vec<u8> {
    format!("user:id:{:020}", user_id).into_bytes()
}

fn username_key(username: &str) -> Vec<u8> {
    format!("user:name:{}", username).into_bytes()
}

fn wallet_key(user_id: u64) -> Vec<u8> {
    format!("wallet:{:020}", user_id).into_bytes()
}

fn game_key(game_id: u64) -> Vec<u8> {
    format!("game:id:{:020}", game_id).into_bytes()
}

// Zero-padded ids keep lexicographic order equal to numeric order
fn user_game_prefix(user_id: u64) -> String {
    format!("game:user:{:020}:", user_id)
}

fn user_game_key(user_id: u64, game_id: u64) -> Vec<u8> {
    format!("{}{:020}", user_game_prefix(user_id), game_id).into_bytes()
}

fn unsettled_key(game_id: u64) -> Vec<u8> {
    format!("{}{:020}", UNSETTLED_PREFIX, game_id).into_bytes()
}

fn ledger_prefix(user_id: u64) -> String {
    format!("ledger:{:020}:", user_id)
}

fn ledger_key(user_id: u64, entry_id: u64) -> Vec<u8> {
    format!("{}{:020}", ledger_prefix(user_id), entry_id).into_bytes()
}

fn encode<T: Serialize>(value: &T) -> CrashResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| CrashError::Storage(StorageError::WriteFailed(format!("encode: {}", e))))
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> CrashResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        CrashError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode {}: {}",
            String::from_utf8_lossy(key),
            e
        )))
    })
}

fn read_failed(e: rocksdb::Error) -> CrashError {
    CrashError::Storage(StorageError::ReadFailed(e.to_string()))
}

type Txn<'a> = Transaction<'a, TransactionDB>;

fn txn_get_for_update<T: DeserializeOwned>(txn: &Txn<'_>, key: &[u8]) -> CrashResult<Option<T>> {
    match txn.get_for_update(key, true).map_err(read_failed)? {
        Some(bytes) => Ok(Some(decode(key, &bytes)?)),
        None => Ok(None),
    }
}

fn txn_get<T: DeserializeOwned>(txn: &Txn<'_>, key: &[u8]) -> CrashResult<Option<T>> {
    match txn.get(key).map_err(read_failed)? {
        Some(bytes) => Ok(Some(decode(key, &bytes)?)),
        None => Ok(None),
    }
}

fn txn_put<T: Serialize>(txn: &Txn<'_>, key: &[u8], value: &T) -> CrashResult<()> {
    txn.put(key, encode(value)?)
        .map_err(|e| CrashError::Storage(StorageError::WriteFailed(e.to_string())))
}

/// Allocate the next id from a sequence key inside `txn`
fn next_id(txn: &Txn<'_>, seq_key: &[u8]) -> CrashResult<u64> {
    let current = match txn.get_for_update(seq_key, true).map_err(read_failed)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                CrashError::Storage(StorageError::CorruptedData(format!(
                    "Invalid sequence bytes at {}",
                    String::from_utf8_lossy(seq_key)
                )))
            })?;
            u64::from_be_bytes(raw)
        }
        None => 0,
    };
    let next = current + 1;
    txn.put(seq_key, next.to_be_bytes())
        .map_err(|e| CrashError::Storage(StorageError::WriteFailed(e.to_string())))?;
    Ok(next)
}

fn commit(txn: Txn<'_>) -> CrashResult<()> {
    txn.commit()
        .map_err(|e| CrashError::Storage(StorageError::CommitFailed(e.to_string())))
}

#[derive(Clone)]
pub struct RocksStore {
    db: Arc<TransactionDB>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> CrashResult<Self> {
        Self::open_with_config(path, &StorageConfig::default())
    }

    pub fn new_with_config(config: &StorageConfig) -> CrashResult<Self> {
        if config.clear_on_start {
            match std::fs::remove_dir_all(&config.data_directory) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CrashError::Storage(StorageError::DatabaseOpenFailed(format!(
                        "Failed to clear {}: {}",
                        config.data_directory, e
                    ))))
                }
            }
        }
        Self::open_with_config(&config.data_directory, config)
    }

    fn open_with_config<P: AsRef<Path>>(path: P, config: &StorageConfig) -> CrashResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(config.lock_timeout_ms);

        let db: TransactionDB = TransactionDB::open(&opts, &txn_opts, path)
            .map_err(|e| CrashError::Storage(StorageError::DatabaseOpenFailed(e.to_string())))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> CrashResult<Option<T>> {
        match self.db.get(key).map_err(read_failed)? {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Keys under `prefix`, in key order
    fn scan_keys(&self, prefix: &str) -> CrashResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, _) = item.map_err(read_failed)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Values under `prefix`, in key order
    fn scan_values<T: DeserializeOwned>(&self, prefix: &str) -> CrashResult<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, value) = item.map_err(read_failed)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            values.push(decode(&key, &value)?);
        }
        Ok(values)
    }

    fn id_suffix(key: &[u8]) -> Option<u64> {
        let text = std::str::from_utf8(key).ok()?;
        text.rsplit(':').next()?.parse().ok()
    }
}

impl CrashStore for RocksStore {
    fn active_settings(&self) -> CrashResult<Option<GameSettings>> {
        let settings: Option<GameSettings> = self.get_json(SETTINGS_KEY)?;
        Ok(settings.filter(|s| s.is_active))
    }

    fn put_settings(&self, settings: &GameSettings) -> CrashResult<()> {
        self.db
            .put(SETTINGS_KEY, encode(settings)?)
            .map_err(|e| CrashError::Storage(StorageError::WriteFailed(e.to_string())))
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

        let txn = self.db.transaction();
        let name_key = username_key(username);
        if txn.get_for_update(&name_key, true).map_err(read_failed)?.is_some() {
            return Err(CrashError::validation(format!("Username {} already taken", username)));
        }

        let user = User {
            id: next_id(&txn, USER_SEQ_KEY)?,
            username: username.to_string(),
            status: UserStatus::Active,
        };
        let mut wallet = Wallet {
            user_id: user.id,
            balance: 0.0,
            currency: currency.to_string(),
        };
        if opening_balance > 0.0 {
            let entry_id = next_id(&txn, LEDGER_SEQ_KEY)?;
            let (_, entry) = apply_adjustment(
                &mut wallet,
                opening_balance,
                LedgerKind::Deposit,
                "Opening balance",
                entry_id,
                now,
            )?;
            txn_put(&txn, &ledger_key(user.id, entry.id), &entry)?;
        }

        txn_put(&txn, &user_key(user.id), &user)?;
        txn_put(&txn, &name_key, &user.id)?;
        txn_put(&txn, &wallet_key(user.id), &wallet)?;
        commit(txn)?;
        Ok(user)
    }

    fn load_user(&self, user_id: u64) -> CrashResult<Option<User>> {
        self.get_json(&user_key(user_id))
    }

    fn find_user_by_name(&self, username: &str) -> CrashResult<Option<User>> {
        match self.get_json::<u64>(&username_key(username))? {
            Some(user_id) => self.load_user(user_id),
            None => Ok(None),
        }
    }

    fn set_user_status(&self, user_id: u64, status: UserStatus) -> CrashResult<()> {
        let txn = self.db.transaction();
        let key = user_key(user_id);
        let mut user: User = txn_get_for_update(&txn, &key)?
            .ok_or_else(|| CrashError::not_found(format!("User {} not found", user_id)))?;
        user.status = status;
        txn_put(&txn, &key, &user)?;
        commit(txn)
    }

    fn load_wallet(&self, user_id: u64) -> CrashResult<Option<Wallet>> {
        self.get_json(&wallet_key(user_id))
    }

    fn adjust_wallet(
        &self,
        user_id: u64,
        delta: f64,
        kind: LedgerKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CrashResult<(BalanceChange, LedgerEntry)> {
        let txn = self.db.transaction();
        let key = wallet_key(user_id);
        let mut wallet: Wallet = txn_get_for_update(&txn, &key)?
            .ok_or_else(|| CrashError::not_found(format!("Wallet for user {} not found", user_id)))?;

        let entry_id = next_id(&txn, LEDGER_SEQ_KEY)?;
        let (change, entry) = apply_adjustment(&mut wallet, delta, kind, description, entry_id, now)?;

        txn_put(&txn, &key, &wallet)?;
        txn_put(&txn, &ledger_key(user_id, entry.id), &entry)?;
        commit(txn)?;
        Ok((change, entry))
    }

    fn place_bet(
        &self,
        user_id: u64,
        bet_amount: f64,
        crash_point: f64,
        now: DateTime<Utc>,
    ) -> CrashResult<PlacedBet> {
        let txn = self.db.transaction();
        let key = wallet_key(user_id);
        let mut wallet: Wallet = txn_get_for_update(&txn, &key)?
            .ok_or_else(|| CrashError::not_found(format!("Wallet for user {} not found", user_id)))?;

        // Balance check before touching the sequences keeps a rejected bet write-free
        if wallet.balance < bet_amount {
            return Err(CrashError::InsufficientBalance {
                required: bet_amount,
                available: wallet.balance,
            });
        }

        let game_id = next_id(&txn, GAME_SEQ_KEY)?;
        let entry_id = next_id(&txn, LEDGER_SEQ_KEY)?;
        let (game, balance, entry) =
            apply_bet(&mut wallet, game_id, entry_id, bet_amount, crash_point, now)?;

        txn_put(&txn, &key, &wallet)?;
        txn_put(&txn, &game_key(game_id), &game)?;
        txn.put(user_game_key(user_id, game_id), b"")?;
        txn.put(unsettled_key(game_id), b"")?;
        txn_put(&txn, &ledger_key(user_id, entry_id), &entry)?;
        commit(txn)?;

        Ok(PlacedBet {
            game,
            balance,
            currency: wallet.currency,
            entry,
        })
    }

    fn load_game(&self, game_id: u64) -> CrashResult<Option<Game>> {
        self.get_json(&game_key(game_id))
    }

    fn list_user_games(&self, user_id: u64, limit: usize) -> CrashResult<Vec<Game>> {
        let keys = self.scan_keys(&user_game_prefix(user_id))?;
        let mut games = Vec::with_capacity(limit.min(keys.len()));
        for key in keys.iter().rev().take(limit) {
            let Some(game_id) = Self::id_suffix(key) else {
                continue;
            };
            if let Some(game) = self.load_game(game_id)? {
                games.push(game);
            }
        }
        Ok(games)
    }

    fn list_unsettled_games(&self) -> CrashResult<Vec<Game>> {
        let mut games = Vec::new();
        for key in self.scan_keys(UNSETTLED_PREFIX)? {
            let Some(game_id) = Self::id_suffix(&key) else {
                continue;
            };
            if let Some(game) = self.load_game(game_id)? {
                if !game.is_settled {
                    games.push(game);
                }
            }
        }
        Ok(games)
    }

    fn settle_game(
        &self,
        game_id: u64,
        now: DateTime<Utc>,
        decide: &mut DecideFn<'_>,
    ) -> CrashResult<SettledGame> {
        let txn = self.db.transaction();

        // Guard: lock the game row, then check-and-flip the flag. A concurrent
        // settler blocks here until this unit commits and then sees the flag.
        let key = game_key(game_id);
        let mut game: Game = txn_get_for_update(&txn, &key)?
            .ok_or_else(|| CrashError::not_found(format!("Game {} not found", game_id)))?;
        if game.is_settled {
            return Err(CrashError::AlreadyCompleted(game_id));
        }

        let wkey = wallet_key(game.user_id);
        let mut wallet: Wallet = txn_get_for_update(&txn, &wkey)?.ok_or_else(|| {
            CrashError::not_found(format!("Wallet for user {} not found", game.user_id))
        })?;
        let settings = txn_get::<GameSettings>(&txn, SETTINGS_KEY)?
            .filter(|s| s.is_active)
            .ok_or_else(|| CrashError::not_found("Game settings not found"))?;

        let decision = decide(&game, &settings)?;
        let entry_id = next_id(&txn, LEDGER_SEQ_KEY)?;
        let (balance, entry) = apply_settlement(&mut game, &mut wallet, decision, entry_id, now);

        txn_put(&txn, &key, &game)?;
        txn_put(&txn, &wkey, &wallet)?;
        txn_put(&txn, &ledger_key(game.user_id, entry_id), &entry)?;
        txn.delete(unsettled_key(game_id))?;
        commit(txn)?;

        Ok(SettledGame {
            game,
            balance,
            currency: wallet.currency,
            entry,
        })
    }

    fn list_ledger(&self, user_id: u64) -> CrashResult<Vec<LedgerEntry>> {
        self.scan_values(&ledger_prefix(user_id))
    }
}
