//! Multiplier clock
//!
//! The multiplier is a pure function of creation time, growth speed and an
//! explicit "now". Nothing in the engine reads the wall clock directly; it goes
//! through a [`Clock`] so tests can drive time by hand.

use super::types::{GameSettings, MIN_CRASH_POINT};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

/// Upper bound on the multiplier reported to players
pub const DISPLAY_CAP: f64 = 100.0;

/// Seconds between `created_at` and `now`, never negative
pub fn elapsed_seconds(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds();
    millis.max(0) as f64 / 1000.0
}

/// `min(1 + speed * elapsed, cap)`
pub fn current_multiplier_capped(
    created_at: DateTime<Utc>,
    speed: f64,
    now: DateTime<Utc>,
    cap: f64,
) -> f64 {
    let multiplier = 1.0 + speed * elapsed_seconds(created_at, now);
    multiplier.min(cap)
}

pub fn current_multiplier(created_at: DateTime<Utc>, speed: f64, now: DateTime<Utc>) -> f64 {
    current_multiplier_capped(created_at, speed, now, DISPLAY_CAP)
}

/// Crash point fixed at game creation
pub fn crash_point_for(settings: &GameSettings) -> f64 {
    settings.max_multiplier.max(MIN_CRASH_POINT)
}

/// Seconds left before `current` reaches `crash_point` at `speed`
pub fn time_to_crash(current: f64, crash_point: f64, speed: f64) -> f64 {
    if current >= crash_point || speed <= 0.0 {
        return 0.0;
    }
    (crash_point - current) / speed
}

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.write() {
            *now += by;
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
