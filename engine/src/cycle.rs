//! One end-to-end ingestion cycle: fetch new pages, decode and dedup,
//! append durably, prune the rolling window, then derive the preview and
//! metadata artifacts.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use chain::price::{PriceQuote, PriceSource, ReferencePrice};
use chain::{ChainSource, PageCursor, RawLog, decode};

use crate::analytics::{infer_reference_price, round_to};
use crate::dataset::JsonlDataset;
use crate::errors::EngineError;
use crate::event::{SwapEvent, event_key, normalize_amount};
use crate::metadata;
use crate::persist;
use crate::preview::{PreviewConfig, build_preview};
use crate::state::{Checkpoint, DedupTracker, PreviewState, PriceBuffer, preview_state, price_buffer};

/// Swaps from the two markets closer than this are considered simultaneous
/// for the per-row cross-market delta.
pub const CROSS_MARKET_MATCH_MAX_GAP_SECS: u64 = 60;
/// Newest dataset rows sampled when inferring the reference price.
const INFERENCE_SAMPLE_ROWS: usize = 50;

/// A tracked pool and its two pool tokens in contract order.
#[derive(Debug, Clone)]
pub struct MarketSpec {
    pub address: String,
    pub token0: String,
    pub token1: String,
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub markets: Vec<MarketSpec>,
    pub window_minutes: u64,
    pub window_size: usize,
    pub max_pages_per_cycle: usize,
    pub explorer_base: String,
    pub preview: PreviewConfig,
}

/// Where each state tracker lives on disk.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub dedup: PathBuf,
    pub price_buffer: PathBuf,
    pub preview_state: PathBuf,
    pub checkpoint: PathBuf,
}

impl StatePaths {
    pub fn under(dir: &Path) -> Self {
        Self {
            dedup: dir.join("dedupe.json"),
            price_buffer: dir.join("price_buffer.json"),
            preview_state: dir.join("preview_state.json"),
            checkpoint: dir.join("last_block.json"),
        }
    }
}

/// The published files.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub dataset: JsonlDataset,
    pub preview_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl Artifacts {
    pub fn under(dir: &Path) -> Self {
        Self {
            dataset: JsonlDataset::new(dir.join("swaps.jsonl")),
            preview_path: dir.join("preview.json"),
            metadata_path: dir.join("metadata.json"),
        }
    }
}

/// All mutable pipeline state, owned by the single writer.
pub struct CycleState {
    pub dedup: DedupTracker,
    pub prices: PriceBuffer,
    pub preview_seen: PreviewState,
    pub checkpoint: Checkpoint,
}

impl CycleState {
    pub fn load(paths: &StatePaths, dedup_capacity: usize) -> Self {
        Self {
            dedup: DedupTracker::load(&paths.dedup, dedup_capacity),
            prices: PriceBuffer::load(
                &paths.price_buffer,
                price_buffer::DEFAULT_MAX_ENTRIES,
                price_buffer::DEFAULT_MAX_AGE_SECS,
            ),
            preview_seen: PreviewState::load(&paths.preview_state, preview_state::DEFAULT_CAPACITY),
            checkpoint: Checkpoint::load(&paths.checkpoint),
        }
    }

    pub fn persist(&self, paths: &StatePaths) -> Result<(), EngineError> {
        self.dedup.save(&paths.dedup)?;
        self.prices.save(&paths.price_buffer)?;
        self.preview_seen.save(&paths.preview_state)?;
        self.checkpoint.save(&paths.checkpoint)
    }
}

#[derive(Debug, Default)]
pub struct FetchStats {
    pub pages_fetched: usize,
    pub logs_seen: usize,
    pub duplicates_skipped: usize,
    /// Non-swap logs, undecodable payloads, rows missing identity fields.
    pub skipped: usize,
    /// Why fetching stopped before exhausting pages, when it did.
    pub early_stop: Option<String>,
    pub max_ts_seen: u64,
    pub max_block_seen: u64,
}

#[derive(Debug)]
pub struct CycleOutcome {
    pub fetch: FetchStats,
    pub appended: usize,
    pub total_rows: usize,
    pub rows_dropped: usize,
    pub reference_price_usd: f64,
}

/// Runs one cycle against `source`, mutating `state` and rewriting the
/// artifacts. On error the checkpoint is left where the last successful
/// append put it, so the next cycle re-covers the same ground and
/// deduplication absorbs the overlap.
#[instrument(skip_all, fields(now_ts = now_ts), level = "debug")]
pub async fn run_cycle(
    source: &dyn ChainSource,
    reference: &dyn ReferencePrice,
    artifacts: &Artifacts,
    state: &mut CycleState,
    cfg: &CycleConfig,
    now_ts: u64,
) -> anyhow::Result<CycleOutcome> {
    let head = source.latest_block().await.context("fetch chain head")?;
    debug!(block = head.number, block_ts = head.timestamp, "chain head");

    let quote = resolve_reference_price(reference, &artifacts.dataset);

    let watermark_ts = state.checkpoint.watermark_ts(now_ts, cfg.window_minutes);
    let (mut accepted, fetch) = fetch_new_swaps(source, &state.dedup, cfg, watermark_ts).await;

    if cfg.markets.len() == 2 {
        link_cross_market_rows(&mut accepted, &cfg.markets[0].address, &cfg.markets[1].address);
    }

    let appended = accepted.len();
    if !accepted.is_empty() {
        artifacts
            .dataset
            .append(&accepted)
            .context("append to dataset")?;
        // Trackers only learn about rows once those rows are durable.
        for event in &accepted {
            state.dedup.add(&event.key());
            state
                .prices
                .update(&event.market_id, event.timestamp, event.price);
        }
    }
    state.checkpoint.advance(fetch.max_ts_seen, fetch.max_block_seen);

    for market in &cfg.markets {
        let per_min = state
            .prices
            .activity_rate(&market.address, cfg.window_minutes * 60, now_ts);
        debug!(market = %market.address, swaps_per_min = per_min, "market activity");
    }

    let prune = artifacts
        .dataset
        .prune(cfg.window_size)
        .context("prune rolling window")?;
    state.dedup.prune(&prune.dropped_keys);
    if let Some(oldest_ts) = prune.oldest_ts {
        state.prices.prune_by_timestamp(oldest_ts);
    }

    metadata::update_metadata(
        &artifacts.metadata_path,
        prune.total_after,
        &common::time::iso_now(),
    )
    .context("update metadata artifact")?;

    let window = artifacts
        .dataset
        .read_all()
        .context("read window for preview")?;
    let (preview, published_keys) = build_preview(
        &window,
        &state.prices,
        &state.preview_seen,
        quote.price,
        now_ts,
        &cfg.preview,
    );
    persist::write_json_atomic(&artifacts.preview_path, &preview)
        .context("write preview artifact")?;
    state.preview_seen.update(&published_keys);

    info!(
        appended,
        total_rows = prune.total_after,
        rows_dropped = prune.rows_dropped,
        pages = fetch.pages_fetched,
        duplicates = fetch.duplicates_skipped,
        skipped = fetch.skipped,
        "cycle complete"
    );

    Ok(CycleOutcome {
        fetch,
        appended,
        total_rows: prune.total_after,
        rows_dropped: prune.rows_dropped,
        reference_price_usd: quote.price,
    })
}

/// Static reference price, upgraded to a swap-inferred one when the recent
/// window offers a plausible WETH/stable median.
fn resolve_reference_price(reference: &dyn ReferencePrice, dataset: &JsonlDataset) -> PriceQuote {
    let mut quote = reference.resolve();
    if quote.source != PriceSource::Inferred {
        match dataset.read_all() {
            Ok(mut rows) => {
                // File order alternates between append order and the pruner's
                // sort; pick the newest rows explicitly.
                rows.sort_by_key(|row| Reverse((row.timestamp, row.block_number)));
                rows.truncate(INFERENCE_SAMPLE_ROWS);
                if let Some(price) = infer_reference_price(&rows) {
                    quote = PriceQuote::inferred(price);
                }
            }
            Err(err) => warn!(error = %err, "could not read dataset for price inference"),
        }
    }
    if let Some(warning) = &quote.warning {
        debug!(warning = %warning, "reference price warning");
    }
    info!(
        price = quote.price,
        source = quote.source.as_str(),
        "reference price resolved"
    );
    quote
}

/// Pages newest-first through each market's logs until the watermark, the
/// page budget, or the upstream is exhausted. Failures end the fetch phase
/// early; whatever was collected so far is kept.
async fn fetch_new_swaps(
    source: &dyn ChainSource,
    dedup: &DedupTracker,
    cfg: &CycleConfig,
    watermark_ts: u64,
) -> (Vec<SwapEvent>, FetchStats) {
    let mut stats = FetchStats::default();
    let mut accepted: Vec<SwapEvent> = Vec::new();
    let mut pending: HashSet<String> = HashSet::new();

    'markets: for market in &cfg.markets {
        let mut cursor: Option<PageCursor> = None;
        let mut pages_for_market = 0usize;

        loop {
            let page = match source.logs_page(&market.address, cursor.as_ref()).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(
                        market = %market.address,
                        error = %err,
                        "log page fetch failed, ending fetch phase"
                    );
                    stats.early_stop = Some(format!("fetch error on {}", market.address));
                    break 'markets;
                }
            };
            stats.pages_fetched += 1;
            pages_for_market += 1;

            if page.items.is_empty() {
                break;
            }

            let mut oldest_ts_in_page = u64::MAX;
            for log in &page.items {
                stats.logs_seen += 1;

                let Some(block_number) = log.block() else {
                    stats.skipped += 1;
                    continue;
                };
                let timestamp = match source.block_timestamp(block_number).await {
                    Ok(ts) => ts,
                    Err(err) => {
                        warn!(
                            block = block_number,
                            error = %err,
                            "block timestamp fetch failed, ending fetch phase"
                        );
                        stats.early_stop = Some("block timestamp fetch failed".to_string());
                        break 'markets;
                    }
                };
                oldest_ts_in_page = oldest_ts_in_page.min(timestamp);
                stats.max_ts_seen = stats.max_ts_seen.max(timestamp);
                stats.max_block_seen = stats.max_block_seen.max(block_number);

                if !log.topic0().is_some_and(decode::is_swap_topic) {
                    stats.skipped += 1;
                    continue;
                }
                let (Some(tx_hash), Some(log_index)) = (log.tx_hash(), log.log_index()) else {
                    stats.skipped += 1;
                    continue;
                };
                let key = event_key(tx_hash, log_index);
                if dedup.contains(&key) || pending.contains(&key) {
                    stats.duplicates_skipped += 1;
                    continue;
                }

                match build_event(source, &cfg.explorer_base, market, log, block_number, timestamp)
                    .await
                {
                    Some(event) => {
                        pending.insert(key);
                        accepted.push(event);
                    }
                    None => stats.skipped += 1,
                }
            }

            // Early stop is evaluated only after the whole page is
            // processed; the page that crosses the watermark still counts.
            if oldest_ts_in_page != u64::MAX && oldest_ts_in_page <= watermark_ts {
                debug!(
                    market = %market.address,
                    oldest_ts_in_page,
                    watermark_ts,
                    "reached watermark"
                );
                stats.early_stop = Some(format!("reached watermark on {}", market.address));
                break;
            }

            match page.next_page_params {
                Some(next) if pages_for_market < cfg.max_pages_per_cycle => cursor = Some(next),
                Some(_) => {
                    warn!(
                        market = %market.address,
                        pages = pages_for_market,
                        "page budget exhausted before watermark"
                    );
                    stats.early_stop = Some(format!("page budget on {}", market.address));
                    break;
                }
                None => break,
            }
        }
    }

    (accepted, stats)
}

/// Decodes and normalizes one swap log into a dataset row. Anything that
/// cannot be decoded or priced is dropped with a debug log; one bad record
/// never aborts the cycle.
async fn build_event(
    source: &dyn ChainSource,
    explorer_base: &str,
    market: &MarketSpec,
    log: &RawLog,
    block_number: u64,
    timestamp: u64,
) -> Option<SwapEvent> {
    let data = log.data.as_deref().unwrap_or_default();
    let amounts = match decode::decode_swap_data(data) {
        Ok(amounts) => amounts,
        Err(err) => {
            debug!(error = %err, "undecodable swap payload");
            return None;
        }
    };
    let (zero_for_one, amount_in_raw, amount_out_raw) = amounts.direction()?;

    let (token_in_addr, token_out_addr) = if zero_for_one {
        (&market.token0, &market.token1)
    } else {
        (&market.token1, &market.token0)
    };
    let meta_in = match source.token_meta(token_in_addr).await {
        Ok(meta) => meta,
        Err(err) => {
            warn!(token = %token_in_addr, error = %err, "token metadata unavailable, skipping record");
            return None;
        }
    };
    let meta_out = match source.token_meta(token_out_addr).await {
        Ok(meta) => meta,
        Err(err) => {
            warn!(token = %token_out_addr, error = %err, "token metadata unavailable, skipping record");
            return None;
        }
    };

    let amount_in_normalized = normalize_amount(amount_in_raw, meta_in.decimals);
    let amount_out_normalized = normalize_amount(amount_out_raw, meta_out.decimals);
    if amount_in_normalized <= 0.0 {
        return None;
    }
    let price = amount_out_normalized / amount_in_normalized;
    if !price.is_finite() {
        return None;
    }

    let tx_hash = log.tx_hash()?.to_string();
    let log_index = log.log_index()?;
    let explorer_link = format!("{}/tx/{}", explorer_base.trim_end_matches('/'), tx_hash);

    Some(SwapEvent {
        timestamp,
        block_number,
        tx_hash,
        log_index,
        market_id: market.address.clone(),
        token_in: token_in_addr.clone(),
        token_in_symbol: meta_in.symbol,
        token_in_decimals: meta_in.decimals,
        token_out: token_out_addr.clone(),
        token_out_symbol: meta_out.symbol,
        token_out_decimals: meta_out.decimals,
        amount_in: amount_in_raw.to_string(),
        amount_out: amount_out_raw.to_string(),
        amount_in_normalized,
        amount_out_normalized,
        price,
        explorer_link,
        delta_vs_other_market: None,
    })
}

/// Pairs near-simultaneous swaps across the two markets and stamps both
/// rows with the absolute relative gap, positive on market A and negated
/// on market B. Rows without a counterpart stay unstamped.
fn link_cross_market_rows(rows: &mut [SwapEvent], market_a: &str, market_b: &str) {
    let idx_a: Vec<usize> = indexes_of(rows, market_a);
    let idx_b: Vec<usize> = indexes_of(rows, market_b);

    for &i in &idx_a {
        for &j in &idx_b {
            let delta = {
                let (a, b) = (&rows[i], &rows[j]);
                let simultaneous = a.block_number == b.block_number
                    || a.timestamp.abs_diff(b.timestamp) < CROSS_MARKET_MATCH_MAX_GAP_SECS;
                if !simultaneous {
                    None
                } else {
                    let low = a.price.min(b.price);
                    if low <= 0.0 {
                        None
                    } else {
                        Some((a.price - b.price).abs() / low * 100.0)
                            .filter(|d| d.is_finite())
                    }
                }
            };
            if let Some(d) = delta {
                let rounded = round_to(d, 2);
                rows[i].delta_vs_other_market = Some(rounded);
                rows[j].delta_vs_other_market = Some(-rounded);
                break;
            }
        }
    }
}

fn indexes_of(rows: &[SwapEvent], market: &str) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row.market_id == market)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap(market_id: &str, ts: u64, block: u64, price: f64) -> SwapEvent {
        SwapEvent {
            timestamp: ts,
            block_number: block,
            tx_hash: format!("0x{market_id}{ts}"),
            log_index: 0,
            market_id: market_id.into(),
            token_in: "0xa".into(),
            token_in_symbol: "WETH".into(),
            token_in_decimals: 18,
            token_out: "0xb".into(),
            token_out_symbol: "USDC".into(),
            token_out_decimals: 6,
            amount_in: "1".into(),
            amount_out: "1".into(),
            amount_in_normalized: 1.0,
            amount_out_normalized: price,
            price,
            explorer_link: String::new(),
            delta_vs_other_market: None,
        }
    }

    const A: &str = "0xpool_a";
    const B: &str = "0xpool_b";

    #[test]
    fn same_block_swaps_are_linked_with_opposite_signs() {
        let mut rows = vec![swap(A, 100, 10, 102.0), swap(B, 170, 10, 100.0)];
        link_cross_market_rows(&mut rows, A, B);

        assert_eq!(rows[0].delta_vs_other_market, Some(2.0));
        assert_eq!(rows[1].delta_vs_other_market, Some(-2.0));
    }

    #[test]
    fn close_timestamps_link_even_across_blocks() {
        let mut rows = vec![swap(A, 100, 10, 100.0), swap(B, 130, 12, 104.0)];
        link_cross_market_rows(&mut rows, A, B);

        assert_eq!(rows[0].delta_vs_other_market, Some(4.0));
        assert_eq!(rows[1].delta_vs_other_market, Some(-4.0));
    }

    #[test]
    fn distant_swaps_stay_unlinked() {
        let mut rows = vec![swap(A, 100, 10, 100.0), swap(B, 500, 50, 104.0)];
        link_cross_market_rows(&mut rows, A, B);

        assert_eq!(rows[0].delta_vs_other_market, None);
        assert_eq!(rows[1].delta_vs_other_market, None);
    }

    #[test]
    fn state_paths_live_under_the_data_dir() {
        let paths = StatePaths::under(Path::new("data"));
        assert_eq!(paths.dedup, Path::new("data/dedupe.json"));
        assert_eq!(paths.checkpoint, Path::new("data/last_block.json"));

        let artifacts = Artifacts::under(Path::new("data"));
        assert_eq!(artifacts.dataset.path(), Path::new("data/swaps.jsonl"));
        assert_eq!(artifacts.preview_path, Path::new("data/preview.json"));
    }
}
