//! Feed Domain Types - Protocols, Instances and Price Records
//!
//! Identifies what gets polled (a `MonitoredInstance` on one protocol and
//! chain) and what a successful poll produces (`PriceFeedRecord`).
//! Records are keyed by (protocol, chain, instance, symbol, timestamp).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Oracle protocols with a registered adapter family.
///
/// Dispatch goes through this enum rather than free-form strings so an
/// unknown protocol is rejected when configuration is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Chainlink,
    Pyth,
    Band,
    Api3,
    Redstone,
    Switchboard,
    Uma,
    Dia,
    Tellor,
    Chronicle,
}

impl Protocol {
    /// Every supported protocol, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Chainlink,
        Self::Pyth,
        Self::Band,
        Self::Api3,
        Self::Redstone,
        Self::Switchboard,
        Self::Uma,
        Self::Dia,
        Self::Tellor,
        Self::Chronicle,
    ];

    /// Lowercase identifier used in keys, logs and persisted rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chainlink => "chainlink",
            Self::Pyth => "pyth",
            Self::Band => "band",
            Self::Api3 => "api3",
            Self::Redstone => "redstone",
            Self::Switchboard => "switchboard",
            Self::Uma => "uma",
            Self::Dia => "dia",
            Self::Tellor => "tellor",
            Self::Chronicle => "chronicle",
        }
    }

    /// Age after which a reading from this protocol counts as stale.
    ///
    /// Push oracles with heartbeat updates (Chainlink, Band, DIA) tolerate
    /// an hour; pull oracles (Pyth, Switchboard) are expected to be seconds
    /// to minutes fresh. Optimistic oracles (UMA, Tellor) settle slowly.
    pub const fn default_stale_threshold_seconds(self) -> u64 {
        match self {
            Self::Pyth => 60,
            Self::Switchboard | Self::Redstone => 300,
            Self::Chainlink | Self::Band | Self::Api3 | Self::Dia | Self::Chronicle => 3600,
            Self::Uma | Self::Tellor => 7200,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| format!("unknown oracle protocol: {s}"))
    }
}

/// One feed to poll within an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    /// Human-readable pair, e.g. "ETH/USD".
    pub symbol: String,
    /// Protocol-side identifier (aggregator address, price id, ...).
    /// Falls back to the symbol when absent.
    #[serde(default)]
    pub feed_id: Option<String>,
}

impl FeedSpec {
    /// Identifier handed to the protocol adapter.
    pub fn id(&self) -> &str {
        self.feed_id.as_deref().unwrap_or(&self.symbol)
    }
}

/// Adapter configuration attached to an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// RPC or gateway endpoint for the adapter.
    pub endpoint: String,
    /// Feeds to poll.
    #[serde(default)]
    pub feeds: Vec<FeedSpec>,
    /// Adapter-side I/O timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Free-form protocol parameters (contract addresses, network ids).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl AdapterConfig {
    /// Adapter-side identifiers of every configured feed.
    pub fn feed_ids(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.id().to_string()).collect()
    }
}

/// A configured (protocol, chain) polling target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredInstance {
    /// Unique instance identifier.
    pub instance_id: String,
    /// Oracle protocol.
    pub protocol: Protocol,
    /// Chain name, e.g. "ethereum".
    pub chain: String,
    /// Per-instance sync interval; the scheduler default applies when absent.
    #[serde(default)]
    pub sync_interval_ms: Option<u64>,
    /// Adapter configuration.
    #[serde(rename = "adapter")]
    pub adapter_config: AdapterConfig,
}

/// Raw value returned by a protocol adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Reported value.
    pub value: f64,
    /// When the oracle produced the value.
    pub origin_timestamp: DateTime<Utc>,
    /// Block the value was read at, for on-chain sources.
    pub block_number: Option<u64>,
    /// Protocol-reported confidence in [0, 1], when available.
    pub confidence: Option<f64>,
}

/// Identity of a persisted price row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceFeedKey {
    pub protocol: Protocol,
    pub chain: String,
    pub instance_id: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

/// One durable price reading produced by a sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFeedRecord {
    pub protocol: Protocol,
    pub chain: String,
    pub instance_id: String,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub block_number: Option<u64>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Producer of the value (usually the protocol name).
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PriceFeedRecord {
    /// Build a record from an adapter reading.
    ///
    /// Confidence defaults to 1.0 and is clamped into [0, 1].
    pub fn from_reading(instance: &MonitoredInstance, feed: &FeedSpec, reading: &Reading) -> Self {
        let (base_asset, quote_asset) = split_symbol(&feed.symbol);
        let mut metadata = serde_json::Map::new();
        metadata.insert("feed_id".to_string(), serde_json::Value::from(feed.id()));

        Self {
            protocol: instance.protocol,
            chain: instance.chain.clone(),
            instance_id: instance.instance_id.clone(),
            symbol: feed.symbol.clone(),
            base_asset,
            quote_asset,
            price: reading.value,
            timestamp: reading.origin_timestamp,
            block_number: reading.block_number,
            confidence: reading.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            source: instance.protocol.to_string(),
            metadata,
        }
    }

    /// Upsert key of this record.
    pub fn key(&self) -> PriceFeedKey {
        PriceFeedKey {
            protocol: self.protocol,
            chain: self.chain.clone(),
            instance_id: self.instance_id.clone(),
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Apply a later write with the same key: mutable fields only.
    pub fn merge_from(&mut self, newer: &Self) {
        self.price = newer.price;
        self.confidence = newer.confidence;
        self.metadata = newer.metadata.clone();
        if newer.block_number.is_some() {
            self.block_number = newer.block_number;
        }
    }
}

/// Split "BASE/QUOTE" (or "BASE-QUOTE") into its assets.
///
/// Symbols without a separator are treated as quoted in USD.
pub fn split_symbol(symbol: &str) -> (String, String) {
    match symbol.split_once(['/', '-']) {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
            (base.trim().to_uppercase(), quote.trim().to_uppercase())
        }
        _ => (symbol.trim().to_uppercase(), "USD".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> MonitoredInstance {
        MonitoredInstance {
            instance_id: "cl-eth".to_string(),
            protocol: Protocol::Chainlink,
            chain: "ethereum".to_string(),
            sync_interval_ms: None,
            adapter_config: AdapterConfig::default(),
        }
    }

    #[test]
    fn test_protocol_round_trip_through_str() {
        for protocol in Protocol::ALL {
            assert_eq!(protocol.to_string().parse::<Protocol>(), Ok(protocol));
        }
        assert_eq!(" Pyth ".parse::<Protocol>(), Ok(Protocol::Pyth));
        assert!("nope".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("eth/usd"), ("ETH".to_string(), "USD".to_string()));
        assert_eq!(split_symbol("BTC-EUR"), ("BTC".to_string(), "EUR".to_string()));
        assert_eq!(split_symbol("LINK"), ("LINK".to_string(), "USD".to_string()));
    }

    #[test]
    fn test_record_from_reading_clamps_confidence() {
        let feed = FeedSpec {
            symbol: "ETH/USD".to_string(),
            feed_id: Some("0x5f4e".to_string()),
        };
        let reading = Reading {
            value: 3120.5,
            origin_timestamp: Utc::now(),
            block_number: Some(19_000_000),
            confidence: Some(1.7),
        };

        let record = PriceFeedRecord::from_reading(&instance(), &feed, &reading);
        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.base_asset, "ETH");
        assert_eq!(record.source, "chainlink");
        assert_eq!(record.metadata["feed_id"], "0x5f4e");
    }

    #[test]
    fn test_merge_keeps_identity() {
        let feed = FeedSpec {
            symbol: "ETH/USD".to_string(),
            feed_id: None,
        };
        let ts = Utc::now();
        let reading = Reading {
            value: 100.0,
            origin_timestamp: ts,
            block_number: Some(7),
            confidence: None,
        };
        let mut stored = PriceFeedRecord::from_reading(&instance(), &feed, &reading);
        let mut newer = stored.clone();
        newer.price = 101.0;
        newer.confidence = 0.5;
        newer.source = "other".to_string();
        newer.block_number = None;

        stored.merge_from(&newer);
        assert_eq!(stored.price, 101.0);
        assert_eq!(stored.confidence, 0.5);
        assert_eq!(stored.source, "chainlink");
        assert_eq!(stored.block_number, Some(7));
        assert_eq!(stored.key(), newer.key());
    }
}
