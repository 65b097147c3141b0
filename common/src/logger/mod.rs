mod init;
mod trace_id;

pub use init::{init_tracing, warn_if_slow};
pub use trace_id::TraceId;
