use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest crash point a game can ever be created with
pub const MIN_CRASH_POINT: f64 = 1.01;

/// Game status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Won,
    Lost,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Active => write!(f, "active"),
            GameStatus::Won => write!(f, "won"),
            GameStatus::Lost => write!(f, "lost"),
        }
    }
}

/// Why a settlement was requested
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ManualStop,
    AutoCrash,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ManualStop => write!(f, "manual_stop"),
            StopReason::AutoCrash => write!(f, "auto_crash"),
        }
    }
}

/// One wager, in play or settled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: u64,
    pub user_id: u64,
    pub bet_amount: f64,
    /// Snapshot of the active max multiplier at creation; never changes
    pub crash_point: f64,
    /// Last recorded multiplier; 1.0 until settlement
    pub multiplier: f64,
    pub win_amount: f64,
    pub status: GameStatus,
    /// Flipped false -> true in the same atomic unit as the payout
    pub is_settled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

/// The singleton active game configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameSettings {
    pub max_multiplier: f64,
    pub min_bet_amount: f64,
    pub max_bet_amount: f64,
    /// Multiplier growth per second
    pub multiplier_speed: f64,
    pub is_active: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_multiplier: 100.0,
            min_bet_amount: 1000.0,
            max_bet_amount: 1_000_000.0,
            multiplier_speed: 0.1,
            is_active: true,
        }
    }
}

impl GameSettings {
    /// Bounds enforced on admin edits
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            self.max_multiplier,
            self.min_bet_amount,
            self.max_bet_amount,
            self.multiplier_speed,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err("Settings values must be finite numbers".to_string());
        }
        if self.min_bet_amount <= 0.0 {
            return Err("Min bet amount must be greater than zero".to_string());
        }
        if self.min_bet_amount >= self.max_bet_amount {
            return Err("Min bet amount must be less than max bet amount".to_string());
        }
        if self.multiplier_speed <= 0.0 || self.multiplier_speed > 10.0 {
            return Err("Multiplier speed must be in (0, 10.0]".to_string());
        }
        if !(1.1..=1000.0).contains(&self.max_multiplier) {
            return Err("Max multiplier must be between 1.1x and 1000.0x".to_string());
        }
        Ok(())
    }

    pub fn accepts_bet(&self, bet_amount: f64) -> bool {
        bet_amount >= self.min_bet_amount && bet_amount <= self.max_bet_amount
    }
}

/// Account standing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Banned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub status: UserStatus,
}

impl User {
    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub user_id: u64,
    pub balance: f64,
    pub currency: String,
}

/// Balance-affecting event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Bet,
    Win,
    Loss,
    Deposit,
    Withdraw,
    Topup,
    Deduct,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedgerKind::Bet => "bet",
            LedgerKind::Win => "win",
            LedgerKind::Loss => "loss",
            LedgerKind::Deposit => "deposit",
            LedgerKind::Withdraw => "withdraw",
            LedgerKind::Topup => "topup",
            LedgerKind::Deduct => "deduct",
        };
        write!(f, "{}", name)
    }
}

/// Append-only ledger record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: u64,
    pub user_id: u64,
    pub game_id: Option<u64>,
    pub kind: LedgerKind,
    /// Signed change applied to the wallet
    pub amount: f64,
    /// Wallet balance after the change
    pub balance_after: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Wallet balance around a single atomic mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BalanceChange {
    pub old_balance: f64,
    pub new_balance: f64,
}

/// Terminal outcome decided inside a settlement unit
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementDecision {
    pub status: GameStatus,
    pub multiplier: f64,
    pub win_amount: f64,
    pub ledger_kind: LedgerKind,
    pub description: String,
}

/// What a committed settlement reports back
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementResult {
    pub game_id: u64,
    pub user_id: u64,
    pub bet_amount: f64,
    pub multiplier: f64,
    pub win_amount: f64,
    pub status: GameStatus,
    pub crash_point: f64,
    pub stop_reason: StopReason,
    pub balance: BalanceChange,
    pub currency: String,
}

impl SettlementResult {
    pub fn message(&self) -> &'static str {
        match self.status {
            GameStatus::Won => "Game won!",
            _ => "Game lost - crashed!",
        }
    }
}
