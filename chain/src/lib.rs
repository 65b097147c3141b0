pub mod client;
pub mod decode;
pub mod errors;
pub mod price;
pub mod source;
pub mod types;

pub use client::RestChainClient;
pub use errors::ChainError;
pub use source::ChainSource;
pub use types::*;
