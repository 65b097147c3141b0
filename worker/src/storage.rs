//! Fire-and-forget dataset publication to content-addressed storage.
//!
//! Publication never blocks the ingestion loop: the coordinator spawns an
//! upload task and the resulting content id is merged into the metadata
//! artifact whenever that task completes. Frequency is bounded by a
//! minimum interval between attempts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;

const BODY_SNIPPET_LEN: usize = 200;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid storage response: {0}")]
    InvalidResponse(String),
}

/// ERC20 balance condition gating reads of a published object.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub chain: String,
    pub contract_address: String,
    pub min_balance_wei: u128,
}

/// Sink that accepts a file and returns its content id, with optional
/// read gating applied afterwards.
#[async_trait]
pub trait StoragePublisher: Send + Sync {
    async fn publish(&self, file: &Path) -> Result<String, StorageError>;

    async fn apply_access_rule(
        &self,
        content_id: &str,
        rule: &AccessRule,
    ) -> Result<String, StorageError>;
}

/// IPFS-style add response.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    status: String,
}

pub struct HttpStoragePublisher {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpStoragePublisher {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/api/v0/add", self.endpoint)
    }

    fn access_url(&self) -> String {
        format!("{}/api/v0/access", self.endpoint)
    }
}

/// Condition payload checking `balanceOf(userAddress) >= min_balance_wei`
/// on the gating contract.
fn access_conditions(rule: &AccessRule) -> serde_json::Value {
    serde_json::json!([{
        "id": 1,
        "chain": rule.chain,
        "method": "balanceOf",
        "standardContractType": "ERC20",
        "contractAddress": rule.contract_address,
        "returnValueTest": {"comparator": ">=", "value": rule.min_balance_wei.to_string()},
        "parameters": [":userAddress"],
    }])
}

#[async_trait]
impl StoragePublisher for HttpStoragePublisher {
    async fn publish(&self, file: &Path) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(file).await?;
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("dataset.jsonl")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.upload_url())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|err| StorageError::InvalidResponse(err.to_string()))?;
        Ok(upload.hash)
    }

    async fn apply_access_rule(
        &self,
        content_id: &str,
        rule: &AccessRule,
    ) -> Result<String, StorageError> {
        let body = serde_json::json!({
            "cid": content_id,
            "conditions": access_conditions(rule),
            "aggregator": "([1])",
        });

        let response = self
            .http
            .post(self.access_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        let outcome: AccessResponse = response
            .json()
            .await
            .map_err(|err| StorageError::InvalidResponse(err.to_string()))?;
        Ok(outcome.status)
    }
}

fn truncate_body(mut body: String) -> String {
    // Cut on a char boundary; String::truncate panics mid-codepoint.
    if let Some((idx, _)) = body.char_indices().nth(BODY_SNIPPET_LEN) {
        body.truncate(idx);
    }
    body
}

/// Rate limiter for publish attempts. Attempts count whether or not they
/// succeed, so a failing endpoint is not hammered every cycle.
#[derive(Debug)]
pub struct PublishGate {
    min_interval: Duration,
    last_attempt: Option<Instant>,
}

impl PublishGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_attempt: None,
        }
    }

    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_attempt {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_attempt = Some(now);
                true
            }
        }
    }
}

/// Owns the publish decision each cycle: disabled configs and missing
/// credentials degrade to a no-op instead of an error.
pub struct StorageCoordinator {
    publisher: Option<Arc<dyn StoragePublisher>>,
    metadata_path: PathBuf,
    gateway_base: String,
    access_rule: Option<AccessRule>,
    gate: PublishGate,
}

impl StorageCoordinator {
    pub fn new(cfg: &StorageConfig, metadata_path: PathBuf) -> Result<Self, StorageError> {
        let publisher: Option<Arc<dyn StoragePublisher>> = if !cfg.enabled {
            debug!("storage publication disabled");
            None
        } else if let Some(api_key) = cfg.api_key.as_deref() {
            Some(Arc::new(HttpStoragePublisher::new(
                &cfg.endpoint,
                api_key,
                Duration::from_secs(cfg.timeout_seconds),
            )?))
        } else {
            warn!("storage publication enabled but no api key configured, disabling");
            None
        };

        let access_rule = cfg.access_contract.as_ref().map(|contract| AccessRule {
            chain: cfg.access_chain.clone(),
            contract_address: contract.clone(),
            min_balance_wei: cfg.access_min_balance_wei,
        });

        Ok(Self {
            publisher,
            metadata_path,
            gateway_base: cfg.gateway_base.trim_end_matches('/').to_string(),
            access_rule,
            gate: PublishGate::new(Duration::from_secs(cfg.publish_interval_seconds)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    /// Kicks off an upload of the dataset if the gate allows one, merging
    /// the content id into metadata when the task finishes.
    pub fn maybe_publish(&mut self, dataset: &Path) {
        let Some(publisher) = self.publisher.clone() else {
            return;
        };
        if !self.gate.try_acquire(Instant::now()) {
            debug!("storage publish skipped, min interval not elapsed");
            return;
        }

        let dataset = dataset.to_path_buf();
        let metadata_path = self.metadata_path.clone();
        let gateway_base = self.gateway_base.clone();
        let access_rule = self.access_rule.clone();
        tokio::spawn(async move {
            let cid = match publisher.publish(&dataset).await {
                Ok(cid) => cid,
                Err(err) => {
                    warn!(error = %err, "storage publish failed");
                    return;
                }
            };

            info!(cid = %cid, "dataset published to storage");
            let gateway_url = format!("{gateway_base}/{cid}");
            if let Err(err) = engine::metadata::record_content_id(
                &metadata_path,
                &cid,
                Some(gateway_url),
                &common::time::iso_now(),
            ) {
                warn!(error = %err, "failed to record content id in metadata");
            }

            if let Some(rule) = access_rule {
                match publisher.apply_access_rule(&cid, &rule).await {
                    Ok(status) => info!(cid = %cid, status = %status, "access rule applied"),
                    Err(err) => warn!(cid = %cid, error = %err, "failed to apply access rule"),
                }
            }
        });
    }
}
