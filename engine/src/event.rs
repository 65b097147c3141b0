use serde::{Deserialize, Serialize};

/// Composite identity key for a swap, `"{tx_hash}:{log_index}"`.
///
/// Unique per on-chain event; block hashes and timestamps are not part of
/// the key so a re-fetched page maps onto the same identities.
pub fn event_key(tx_hash: &str, log_index: u64) -> String {
    format!("{tx_hash}:{log_index}")
}

/// One decoded, normalized swap row as it appears in the durable dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapEvent {
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
    /// Pool contract address the event was emitted from.
    pub market_id: String,
    pub token_in: String,
    pub token_in_symbol: String,
    pub token_in_decimals: u32,
    pub token_out: String,
    pub token_out_symbol: String,
    pub token_out_decimals: u32,
    /// Raw integer amounts as decimal strings; u128 does not survive every
    /// JSON reader so the wire form stays stringly.
    pub amount_in: String,
    pub amount_out: String,
    pub amount_in_normalized: f64,
    pub amount_out_normalized: f64,
    /// Output per input unit, in token terms.
    pub price: f64,
    pub explorer_link: String,
    /// Signed percent gap vs a near-simultaneous swap on the other market.
    /// Present only when a counterpart within the matching tolerance exists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delta_vs_other_market: Option<f64>,
}

impl SwapEvent {
    pub fn key(&self) -> String {
        event_key(&self.tx_hash, self.log_index)
    }
}

/// Scales a raw token amount down by the token's decimals.
pub fn normalize_amount(raw: u128, decimals: u32) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_hash_and_index() {
        assert_eq!(event_key("0xabc", 7), "0xabc:7");
    }

    #[test]
    fn normalize_scales_by_decimals() {
        assert_eq!(normalize_amount(1_500_000, 6), 1.5);
        assert_eq!(normalize_amount(10u128.pow(18), 18), 1.0);
        assert_eq!(normalize_amount(42, 0), 42.0);
    }

    #[test]
    fn other_market_delta_is_omitted_when_absent() {
        let event = SwapEvent {
            timestamp: 1,
            block_number: 2,
            tx_hash: "0xabc".into(),
            log_index: 0,
            market_id: "0xpool".into(),
            token_in: "0xa".into(),
            token_in_symbol: "WETH".into(),
            token_in_decimals: 18,
            token_out: "0xb".into(),
            token_out_symbol: "USDC".into(),
            token_out_decimals: 6,
            amount_in: "1000".into(),
            amount_out: "2000".into(),
            amount_in_normalized: 1.0,
            amount_out_normalized: 2.0,
            price: 2.0,
            explorer_link: "https://example.org/tx/0xabc".into(),
            delta_vs_other_market: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("delta_vs_other_market"));

        let back: SwapEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
