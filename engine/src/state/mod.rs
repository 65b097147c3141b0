//! Explicit, individually persisted pipeline state.
//!
//! Each tracker owns one JSON file under the data directory and survives
//! process restarts independently of the others.

pub mod checkpoint;
pub mod dedup;
pub mod preview_state;
pub mod price_buffer;

pub use checkpoint::Checkpoint;
pub use dedup::DedupTracker;
pub use preview_state::PreviewState;
pub use price_buffer::{PriceBuffer, PricePoint};
