//! Crashline - multiplier crash game settlement engine
//!
//! A player's stake grows linearly with elapsed time until they stop or the
//! game reaches its crash point. Every game settles exactly once, whether the
//! player stops it or the background sweep crashes it.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod metrics;
pub mod storage;

pub use config::CrashConfig;
pub use errors::{CrashError, CrashResult};
pub use games::GameService;
