pub mod analytics;
pub mod cycle;
pub mod dataset;
pub mod errors;
pub mod event;
pub mod metadata;
pub mod persist;
pub mod preview;
pub mod state;

pub use cycle::{Artifacts, CycleConfig, CycleOutcome, CycleState, MarketSpec, StatePaths, run_cycle};
pub use dataset::JsonlDataset;
pub use errors::EngineError;
pub use event::SwapEvent;
