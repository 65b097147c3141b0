use std::time::Duration;

use chain::RestChainClient;
use chain::price::StaticReference;
use common::logger::{TraceId, init_tracing, warn_if_slow};
use common::time::now_ts;
use engine::{Artifacts, CycleConfig, CycleState, StatePaths, run_cycle};
use tracing::Instrument;
use worker::config::AppConfig;
use worker::http::{self, HttpState};
use worker::storage::StorageCoordinator;

/// Serves the published artifacts on a background task; the ingestion loop
/// never waits on readers.
fn start_http_server(addr: std::net::SocketAddr, artifacts: &Artifacts) {
    let state = HttpState {
        preview_path: artifacts.preview_path.clone(),
        metadata_path: artifacts.metadata_path.clone(),
    };

    tokio::spawn(async move {
        if let Err(e) = http::serve(addr, state).await {
            tracing::error!(error = ?e, "http server exited");
        }
    });
}

async fn run_one_cycle(
    source: &RestChainClient,
    reference: &StaticReference,
    artifacts: &Artifacts,
    state: &mut CycleState,
    cycle_cfg: &CycleConfig,
    poll_seconds: u64,
) -> anyhow::Result<engine::CycleOutcome> {
    let trace_id = TraceId::default();
    let span = tracing::info_span!("cycle", trace_id = %trace_id);

    warn_if_slow(
        "cycle",
        Duration::from_secs(poll_seconds),
        run_cycle(source, reference, artifacts, state, cycle_cfg, now_ts()),
    )
    .instrument(span)
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting swap worker...");

    let config = AppConfig::from_env()?;
    config.log_summary();

    if config.dedup_capacity < config.window_size {
        // Keys forgotten before their rows leave the window would re-ingest.
        tracing::warn!(
            dedup_capacity = config.dedup_capacity,
            window_size = config.window_size,
            "dedup capacity below dataset window, duplicates may slip through"
        );
    }

    std::fs::create_dir_all(&config.data_dir)?;

    let artifacts = Artifacts::under(&config.data_dir);
    let state_paths = StatePaths::under(&config.data_dir);
    let mut state = CycleState::load(&state_paths, config.dedup_capacity);

    let source = RestChainClient::new(config.chain_api_base.clone())?;
    let reference = StaticReference::new(config.chain_id, config.reference_price_usd);
    let mut storage = StorageCoordinator::new(&config.storage, artifacts.metadata_path.clone())?;

    start_http_server(config.http_addr, &artifacts);

    let cycle_cfg = config.cycle_config();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_one_cycle(
                    &source,
                    &reference,
                    &artifacts,
                    &mut state,
                    &cycle_cfg,
                    config.poll_seconds,
                )
                .await
                {
                    Ok(outcome) => {
                        if outcome.total_rows > 0 {
                            storage.maybe_publish(artifacts.dataset.path());
                        }
                    }
                    Err(e) => tracing::error!(error = ?e, "cycle failed"),
                }

                if let Err(e) = state.persist(&state_paths) {
                    tracing::error!(error = ?e, "failed to persist cycle state");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    state.persist(&state_paths)?;
    tracing::info!("worker stopped");

    Ok(())
}
