//! Engine counters exported in Prometheus text format

use crate::games::types::{GameStatus, StopReason};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    pub games_started_total: AtomicU64,
    pub settlements_won_total: AtomicU64,
    pub settlements_lost_total: AtomicU64,
    pub manual_stops_total: AtomicU64,
    pub auto_crashes_total: AtomicU64,
    /// Settlement attempts that found the game already settled
    pub settlement_races_lost_total: AtomicU64,
    pub settlement_failures_total: AtomicU64,
    pub sweep_ticks_total: AtomicU64,
    pub active_games: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_game_started(&self) {
        self.games_started_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement(&self, status: GameStatus, reason: StopReason) {
        match status {
            GameStatus::Won => self.settlements_won_total.fetch_add(1, Ordering::Relaxed),
            _ => self.settlements_lost_total.fetch_add(1, Ordering::Relaxed),
        };
        match reason {
            StopReason::ManualStop => self.manual_stops_total.fetch_add(1, Ordering::Relaxed),
            StopReason::AutoCrash => self.auto_crashes_total.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_race_lost(&self) {
        self.settlement_races_lost_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement_failure(&self) {
        self.settlement_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep_tick(&self, active: usize) {
        self.sweep_ticks_total.fetch_add(1, Ordering::Relaxed);
        self.active_games.store(active as u64, Ordering::Relaxed);
    }

    /// Generate Prometheus metrics format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters: [(&str, &str, &AtomicU64); 8] = [
            ("crashline_games_started_total", "Games started", &self.games_started_total),
            ("crashline_settlements_won_total", "Games settled as won", &self.settlements_won_total),
            ("crashline_settlements_lost_total", "Games settled as lost", &self.settlements_lost_total),
            ("crashline_manual_stops_total", "Settlements triggered by a player stop", &self.manual_stops_total),
            ("crashline_auto_crashes_total", "Settlements triggered by the crash sweep", &self.auto_crashes_total),
            ("crashline_settlement_races_lost_total", "Settlement attempts on an already settled game", &self.settlement_races_lost_total),
            ("crashline_settlement_failures_total", "Settlement units that failed to commit", &self.settlement_failures_total),
            ("crashline_sweep_ticks_total", "Crash sweep iterations", &self.sweep_ticks_total),
        ];

        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n\n",
                value.load(Ordering::Relaxed)
            ));
        }

        output.push_str(&format!(
            "# HELP crashline_active_games Games in the active registry at the last sweep\n\
             # TYPE crashline_active_games gauge\n\
             crashline_active_games {}\n",
            self.active_games.load(Ordering::Relaxed)
        ));

        output
    }
}
