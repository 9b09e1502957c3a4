use crate::games::types::Game;
use dashmap::DashSet;
use std::sync::Arc;

/// Thread-safe index of games in flight.
///
/// Advisory only: membership says "this game might still need an auto-crash",
/// never whether it has been settled. Callers reload from storage before acting.
#[derive(Clone)]
pub struct ActiveRegistry {
    active: Arc<DashSet<u64>>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self {
            active: Arc::new(DashSet::new()),
        }
    }

    pub fn register(&self, game: &Game) {
        self.active.insert(game.id);
    }

    /// Returns whether the id was present
    pub fn unregister(&self, game_id: u64) -> bool {
        self.active.remove(&game_id).is_some()
    }

    /// Copy of the current ids in ascending order; safe to iterate while
    /// other tasks register or unregister
    pub fn snapshot_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.active.iter().map(|id| *id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, game_id: u64) -> bool {
        self.active.contains(&game_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for ActiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}
