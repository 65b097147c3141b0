use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::ChainError;
use crate::source::ChainSource;
use crate::types::{
    BlockRef, BlocksEnvelope, LogsPage, PageCursor, TokenEnvelope, TokenMeta, value_to_u64,
};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const BODY_SNIPPET_LEN: usize = 200;

/// REST client for a Blockscout-style explorer API (v2 endpoints).
///
/// Token metadata is cached per address for the process lifetime; block
/// timestamps are cached per block number.
pub struct RestChainClient {
    http: Client,
    base_url: String,
    token_cache: Mutex<HashMap<String, TokenMeta>>,
    block_ts_cache: Mutex<HashMap<u64, u64>>,
}

impl RestChainClient {
    pub fn new(base_url: String) -> Result<Self, ChainError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_cache: Mutex::new(HashMap::new()),
            block_ts_cache: Mutex::new(HashMap::new()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, ChainError> {
        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_get(url, query).await {
                Ok(body) => {
                    return serde_json::from_str(&body)
                        .map_err(|e| ChainError::InvalidResponse(format!("{url}: {e}")));
                }
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient explorer error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get(&self, url: &str, query: &[(String, String)]) -> Result<String, ChainError> {
        let resp = self.http.get(url).query(query).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChainError::Api {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        Ok(resp.text().await?)
    }
}

fn truncate_body(mut body: String) -> String {
    // Cut on a char boundary; String::truncate panics mid-codepoint.
    if let Some((idx, _)) = body.char_indices().nth(BODY_SNIPPET_LEN) {
        body.truncate(idx);
    }
    body
}

/// Flattens a `next_page_params` object into query pairs.
fn cursor_to_query(cursor: Option<&PageCursor>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = cursor else {
        return Vec::new();
    };

    map.iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

#[async_trait]
impl ChainSource for RestChainClient {
    async fn latest_block(&self) -> Result<BlockRef, ChainError> {
        let url = format!("{}/blocks", self.base_url);
        let query = vec![("type".to_string(), "block".to_string())];
        let envelope: BlocksEnvelope = self.get_json(&url, &query).await?;

        let latest = envelope
            .items
            .first()
            .ok_or_else(|| ChainError::InvalidResponse("no blocks returned".into()))?;

        let number = latest
            .height
            .ok_or_else(|| ChainError::InvalidResponse("block item missing height".into()))?;
        let timestamp = latest
            .timestamp
            .as_deref()
            .and_then(common::time::parse_iso_ts)
            .unwrap_or(0);

        debug!(number, timestamp, "latest block fetched");

        Ok(BlockRef { number, timestamp })
    }

    #[instrument(skip(self, cursor), fields(market = %market), level = "debug")]
    async fn logs_page(
        &self,
        market: &str,
        cursor: Option<&PageCursor>,
    ) -> Result<LogsPage, ChainError> {
        let url = format!("{}/addresses/{}/logs", self.base_url, market);
        let query = cursor_to_query(cursor);
        let page: LogsPage = self.get_json(&url, &query).await?;

        debug!(
            items = page.items.len(),
            has_next = page.next_page_params.is_some(),
            "logs page fetched"
        );

        Ok(page)
    }

    async fn token_meta(&self, address: &str) -> Result<TokenMeta, ChainError> {
        if let Some(meta) = self.token_cache.lock().get(address) {
            return Ok(meta.clone());
        }

        let url = format!("{}/tokens/{}", self.base_url, address);
        let envelope: TokenEnvelope = self.get_json(&url, &[]).await?;

        let meta = TokenMeta {
            symbol: envelope
                .symbol
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            decimals: envelope
                .decimals
                .as_ref()
                .and_then(value_to_u64)
                .unwrap_or(18) as u32,
        };

        self.token_cache
            .lock()
            .insert(address.to_string(), meta.clone());

        Ok(meta)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError> {
        if let Some(ts) = self.block_ts_cache.lock().get(&number) {
            return Ok(*ts);
        }

        let url = format!("{}/blocks/{}", self.base_url, number);
        let item: crate::types::BlockItem = self.get_json(&url, &[]).await?;

        let ts = item
            .timestamp
            .as_deref()
            .and_then(common::time::parse_iso_ts)
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!("block {number} missing timestamp"))
            })?;

        self.block_ts_cache.lock().insert(number, ts);

        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_flattens_strings_and_numbers() {
        let cursor = json!({"block_number": 4907716, "index": 5, "items_count": "50"});
        let mut pairs = cursor_to_query(Some(&cursor));
        pairs.sort();

        assert_eq!(
            pairs,
            vec![
                ("block_number".to_string(), "4907716".to_string()),
                ("index".to_string(), "5".to_string()),
                ("items_count".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn missing_cursor_yields_no_params() {
        assert!(cursor_to_query(None).is_empty());
        assert!(cursor_to_query(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = RestChainClient::new("https://example.test/api/v2/".into()).unwrap();
        assert_eq!(client.base_url, "https://example.test/api/v2");
    }

    #[test]
    fn error_bodies_are_cut_on_char_boundaries() {
        let long = "é".repeat(BODY_SNIPPET_LEN + 50);
        assert_eq!(truncate_body(long).chars().count(), BODY_SNIPPET_LEN);
        assert_eq!(truncate_body("brief".to_string()), "brief");
    }
}
