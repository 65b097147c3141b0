use serde::Deserialize;
use serde_json::Value;

/// Opaque pagination cursor: the `next_page_params` object is re-passed
/// verbatim as query parameters on the following request.
pub type PageCursor = Value;

/// Chain head reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub timestamp: u64,
}

/// Token metadata, cacheable indefinitely per address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u32,
}

/// One raw log item as returned by the explorer API.
///
/// Field naming varies across API versions (`transaction_hash` vs
/// `tx_hash`, `index` vs `log_index`, integer vs hex-string numbers), so
/// the loose fields are resolved through accessors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLog {
    #[serde(default, alias = "tx_hash", alias = "transactionHash")]
    pub transaction_hash: Option<String>,

    #[serde(default, alias = "log_index", alias = "logIndex")]
    pub index: Option<Value>,

    #[serde(default, alias = "blockNumber")]
    pub block_number: Option<Value>,

    #[serde(default)]
    pub topics: Vec<Option<String>>,

    #[serde(default)]
    pub data: Option<String>,

    /// Either a plain address string or an object with a `hash` field.
    #[serde(default)]
    pub address: Option<Value>,
}

impl RawLog {
    pub fn tx_hash(&self) -> Option<&str> {
        self.transaction_hash.as_deref().filter(|s| !s.is_empty())
    }

    pub fn log_index(&self) -> Option<u64> {
        self.index.as_ref().and_then(value_to_u64)
    }

    pub fn block(&self) -> Option<u64> {
        self.block_number.as_ref().and_then(value_to_u64)
    }

    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().and_then(|t| t.as_deref())
    }

    pub fn emitter(&self) -> Option<&str> {
        match self.address.as_ref()? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("hash").and_then(|h| h.as_str()),
            _ => None,
        }
    }
}

/// One page of logs plus the cursor for the next page, if any.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsPage {
    #[serde(default)]
    pub items: Vec<RawLog>,
    #[serde(default)]
    pub next_page_params: Option<PageCursor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockItem {
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlocksEnvelope {
    #[serde(default)]
    pub items: Vec<BlockItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenEnvelope {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<Value>,
}

/// Accepts integers, decimal strings, and 0x-prefixed hex strings.
pub(crate) fn value_to_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            if let Some(hex_part) = s.strip_prefix("0x") {
                u64::from_str_radix(hex_part, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_log_accepts_v2_field_names() {
        let log: RawLog = serde_json::from_value(json!({
            "transaction_hash": "0xabc",
            "index": 7,
            "block_number": 1234,
            "topics": ["0xd78a", null],
            "data": "0x00",
            "address": {"hash": "0xpool"}
        }))
        .unwrap();

        assert_eq!(log.tx_hash(), Some("0xabc"));
        assert_eq!(log.log_index(), Some(7));
        assert_eq!(log.block(), Some(1234));
        assert_eq!(log.topic0(), Some("0xd78a"));
        assert_eq!(log.emitter(), Some("0xpool"));
    }

    #[test]
    fn raw_log_accepts_rpc_style_field_names() {
        let log: RawLog = serde_json::from_value(json!({
            "transactionHash": "0xdef",
            "logIndex": "0x2",
            "blockNumber": "0x4be0d2",
            "topics": ["0xd78a"],
            "address": "0xpool"
        }))
        .unwrap();

        assert_eq!(log.tx_hash(), Some("0xdef"));
        assert_eq!(log.log_index(), Some(2));
        assert_eq!(log.block(), Some(0x4be0d2));
        assert_eq!(log.emitter(), Some("0xpool"));
    }

    #[test]
    fn missing_fields_resolve_to_none() {
        let log: RawLog = serde_json::from_value(json!({})).unwrap();
        assert_eq!(log.tx_hash(), None);
        assert_eq!(log.log_index(), None);
        assert_eq!(log.block(), None);
        assert_eq!(log.topic0(), None);
        assert_eq!(log.emitter(), None);
    }
}
