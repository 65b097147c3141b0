use async_trait::async_trait;

use crate::errors::ChainError;
use crate::types::{BlockRef, LogsPage, PageCursor, TokenMeta};

/// Upstream chain-data collaborator.
///
/// Pages from `logs_page` are newest-first; the ingestion loop relies on
/// that ordering for its early-stop watermark check.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn latest_block(&self) -> Result<BlockRef, ChainError>;

    /// Fetches one page of logs for a market. `cursor` is the opaque
    /// `next_page_params` object returned by the previous page.
    async fn logs_page(
        &self,
        market: &str,
        cursor: Option<&PageCursor>,
    ) -> Result<LogsPage, ChainError>;

    async fn token_meta(&self, address: &str) -> Result<TokenMeta, ChainError>;

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError>;
}
