/// Known ETH/USD aggregator feed addresses, keyed by chain id. The feed is
/// not queried here (no call path to the contract in this service); the
/// address is surfaced so operators can see which oracle would apply.
const KNOWN_FEEDS: &[(u64, &str, &str)] = &[
    (
        1,
        "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419",
        "Ethereum Mainnet",
    ),
    (
        11155111,
        "0x694AA1769357215DE4FAC081bf1f309aDC325306",
        "Sepolia Testnet",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Static fallback from configuration; no feed known for this chain.
    Fallback,
    /// Static fallback while a known feed exists but is not queried.
    FeedPending,
    /// Median of recent stable-pair swaps.
    Inferred,
}

impl PriceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceSource::Fallback => "fallback",
            PriceSource::FeedPending => "fallback_feed_pending",
            PriceSource::Inferred => "inferred_from_swaps",
        }
    }
}

/// Resolved USD reference price for one cycle.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub price: f64,
    pub source: PriceSource,
    pub feed_address: Option<&'static str>,
    pub warning: Option<String>,
}

impl PriceQuote {
    pub fn inferred(price: f64) -> Self {
        Self {
            price,
            source: PriceSource::Inferred,
            feed_address: None,
            warning: None,
        }
    }
}

/// Pluggable source of the USD reference price.
pub trait ReferencePrice: Send + Sync {
    fn resolve(&self) -> PriceQuote;
}

/// Static provider: configuration fallback plus the known-feed table.
pub struct StaticReference {
    chain_id: u64,
    fallback_price: f64,
}

impl StaticReference {
    pub fn new(chain_id: u64, fallback_price: f64) -> Self {
        Self {
            chain_id,
            fallback_price,
        }
    }
}

impl ReferencePrice for StaticReference {
    fn resolve(&self) -> PriceQuote {
        match known_feed(self.chain_id) {
            Some((address, network)) => PriceQuote {
                price: self.fallback_price,
                source: PriceSource::FeedPending,
                feed_address: Some(address),
                warning: Some(format!(
                    "{network} ETH/USD feed at {address} is not queried; \
                     using fallback until a call path exists"
                )),
            },
            None => PriceQuote {
                price: self.fallback_price,
                source: PriceSource::Fallback,
                feed_address: None,
                warning: Some(format!(
                    "no reference feed known for chain {}",
                    self.chain_id
                )),
            },
        }
    }
}

fn known_feed(chain_id: u64) -> Option<(&'static str, &'static str)> {
    KNOWN_FEEDS
        .iter()
        .find(|(id, _, _)| *id == chain_id)
        .map(|(_, address, network)| (*address, *network))
}
