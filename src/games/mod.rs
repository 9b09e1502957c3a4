pub mod clock;
pub mod registry;
pub mod service;
pub mod settlement;
pub mod sweeper;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::ActiveRegistry;
pub use service::GameService;
pub use settlement::SettlementCoordinator;
pub use sweeper::CrashSweeper;
pub use types::*;
