//! Health Domain - Feed Verdicts, Staleness and Protocol Summaries
//!
//! A `HealthCheckResult` is one verdict for one feed. Verdicts are
//! level-triggered: every check recomputes the verdict from the latest
//! observation, and the only memory a feed has is its cached last result.
//! A flapping feed therefore alternates verdicts cycle to cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feed::Protocol;

/// What an adapter observed about a feed, before staleness is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedObservation {
    /// Origin timestamp of the most recent value, if the feed reported one.
    pub last_update: Option<DateTime<Utc>>,
    /// Problems the adapter detected itself (deviation, paused feed, ...).
    #[serde(default)]
    pub issues: Vec<String>,
    /// Protocol-specific extras (round id, confidence interval, ...).
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Classification of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedVerdict {
    Healthy,
    Stale,
    Error,
}

/// One verdict for one feed.
///
/// `healthy` always equals `issues.is_empty()`; both constructors
/// derive it from the issue list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub protocol: Protocol,
    pub chain: String,
    pub feed_id: String,
    pub healthy: bool,
    pub last_update: Option<DateTime<Utc>>,
    /// Seconds since `last_update`; infinite when unknown.
    #[serde(with = "staleness_serde")]
    pub staleness_seconds: f64,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    /// Evaluate an adapter observation against a staleness threshold.
    pub fn from_observation(
        protocol: Protocol,
        chain: &str,
        feed_id: &str,
        observation: FeedObservation,
        stale_threshold_seconds: u64,
        checked_at: DateTime<Utc>,
        latency_ms: u64,
    ) -> Self {
        let mut issues = observation.issues;
        let staleness_seconds = match observation.last_update {
            Some(ts) => staleness_between(ts, checked_at),
            None => {
                issues.push("No update timestamp reported".to_string());
                f64::INFINITY
            }
        };

        if let Some(issue) = stale_issue(staleness_seconds, stale_threshold_seconds) {
            issues.push(issue);
        }

        Self {
            protocol,
            chain: chain.to_string(),
            feed_id: feed_id.to_string(),
            healthy: issues.is_empty(),
            last_update: observation.last_update,
            staleness_seconds,
            issues,
            checked_at,
            latency_ms,
            details: observation.details,
        }
    }

    /// Synthesize the result of a check that could not complete.
    pub fn failed(
        protocol: Protocol,
        chain: &str,
        feed_id: &str,
        error: &str,
        checked_at: DateTime<Utc>,
        latency_ms: u64,
    ) -> Self {
        Self {
            protocol,
            chain: chain.to_string(),
            feed_id: feed_id.to_string(),
            healthy: false,
            last_update: None,
            staleness_seconds: f64::INFINITY,
            issues: vec![format!("Health check failed: {error}")],
            checked_at,
            latency_ms,
            details: BTreeMap::new(),
        }
    }

    /// Cache key: `protocol-chain-feedId`.
    pub fn cache_key(&self) -> String {
        cache_key(self.protocol, &self.chain, &self.feed_id)
    }

    /// Whether the staleness is known and beyond the threshold.
    pub fn is_stale(&self, stale_threshold_seconds: u64) -> bool {
        self.staleness_seconds.is_finite()
            && self.staleness_seconds > stale_threshold_seconds as f64
    }

    /// Classify this result.
    pub fn verdict(&self, stale_threshold_seconds: u64) -> FeedVerdict {
        if self.healthy {
            FeedVerdict::Healthy
        } else if self.is_stale(stale_threshold_seconds) {
            FeedVerdict::Stale
        } else {
            FeedVerdict::Error
        }
    }
}

/// Cache key of a feed.
pub fn cache_key(protocol: Protocol, chain: &str, feed_id: &str) -> String {
    format!("{protocol}-{chain}-{feed_id}")
}

/// Seconds elapsed between an origin timestamp and `now`, never negative.
pub fn staleness_between(origin: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - origin).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Issue text for a reading older than the threshold.
pub fn stale_issue(staleness_seconds: f64, stale_threshold_seconds: u64) -> Option<String> {
    if staleness_seconds.is_finite() && staleness_seconds > stale_threshold_seconds as f64 {
        Some(format!("Data is stale: {}s old", staleness_seconds.round() as u64))
    } else {
        None
    }
}

/// Aggregate of all cached results for one protocol. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolHealthSummary {
    pub protocol: Protocol,
    pub total_feeds: usize,
    pub healthy_feeds: usize,
    pub unhealthy_feeds: usize,
    pub stale_feeds: usize,
    /// Mean over finite staleness values; failed checks are excluded.
    pub average_staleness_seconds: f64,
}

impl ProtocolHealthSummary {
    /// Zeroed summary for a protocol with no cached results.
    pub const fn empty(protocol: Protocol) -> Self {
        Self {
            protocol,
            total_feeds: 0,
            healthy_feeds: 0,
            unhealthy_feeds: 0,
            stale_feeds: 0,
            average_staleness_seconds: 0.0,
        }
    }

    /// Summarize results of one protocol.
    pub fn from_results<'a, I>(protocol: Protocol, results: I, stale_threshold_seconds: u64) -> Self
    where
        I: IntoIterator<Item = &'a HealthCheckResult>,
    {
        let mut summary = Self::empty(protocol);
        let mut staleness_sum = 0.0;
        let mut finite = 0usize;

        for result in results {
            summary.total_feeds += 1;
            if result.healthy {
                summary.healthy_feeds += 1;
            } else {
                summary.unhealthy_feeds += 1;
            }
            if result.is_stale(stale_threshold_seconds) {
                summary.stale_feeds += 1;
            }
            if result.staleness_seconds.is_finite() {
                staleness_sum += result.staleness_seconds;
                finite += 1;
            }
        }

        if finite > 0 {
            summary.average_staleness_seconds = staleness_sum / finite as f64;
        }
        summary
    }
}

/// Counts logged after a check pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTally {
    pub healthy: usize,
    pub stale: usize,
    pub failed: usize,
}

impl PassTally {
    pub fn from_results(results: &[HealthCheckResult], stale_threshold_seconds: u64) -> Self {
        results.iter().fold(Self::default(), |mut tally, r| {
            match r.verdict(stale_threshold_seconds) {
                FeedVerdict::Healthy => tally.healthy += 1,
                FeedVerdict::Stale => tally.stale += 1,
                FeedVerdict::Error => tally.failed += 1,
            }
            tally
        })
    }
}

/// JSON has no infinity; unknown staleness travels as `null`.
mod staleness_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn observed(age_secs: i64, now: DateTime<Utc>) -> FeedObservation {
        FeedObservation {
            last_update: Some(now - Duration::seconds(age_secs)),
            ..FeedObservation::default()
        }
    }

    #[test]
    fn test_stale_reading_is_unhealthy() {
        let now = Utc::now();
        let result = HealthCheckResult::from_observation(
            Protocol::Pyth,
            "solana",
            "SOL/USD",
            observed(120, now),
            60,
            now,
            12,
        );

        assert!(!result.healthy);
        assert!((result.staleness_seconds - 120.0).abs() < 1e-6);
        assert_eq!(result.issues, vec!["Data is stale: 120s old".to_string()]);
        assert_eq!(result.verdict(60), FeedVerdict::Stale);
    }

    #[test]
    fn test_fresh_reading_is_healthy() {
        let now = Utc::now();
        let result = HealthCheckResult::from_observation(
            Protocol::Chainlink,
            "ethereum",
            "ETH/USD",
            observed(30, now),
            3600,
            now,
            5,
        );
        assert!(result.healthy);
        assert!(result.issues.is_empty());
        assert_eq!(result.verdict(3600), FeedVerdict::Healthy);
    }

    #[test]
    fn test_adapter_issue_makes_unhealthy_without_staleness() {
        let now = Utc::now();
        let mut observation = observed(1, now);
        observation.issues.push("Round incomplete".to_string());
        let result =
            HealthCheckResult::from_observation(Protocol::Band, "cosmos", "ATOM/USD", observation, 3600, now, 3);
        assert!(!result.healthy);
        assert_eq!(result.verdict(3600), FeedVerdict::Error);
    }

    #[test]
    fn test_missing_timestamp_is_infinitely_stale() {
        let now = Utc::now();
        let result = HealthCheckResult::from_observation(
            Protocol::Dia,
            "ethereum",
            "DIA/USD",
            FeedObservation::default(),
            3600,
            now,
            3,
        );
        assert!(result.staleness_seconds.is_infinite());
        assert!(!result.healthy);
    }

    #[test]
    fn test_failed_result_shape() {
        let result = HealthCheckResult::failed(Protocol::Pyth, "solana", "SOL/USD", "rpc down", Utc::now(), 40);
        assert!(!result.healthy);
        assert!(result.staleness_seconds.is_infinite());
        assert!(result.issues[0].contains("rpc down"));
        assert_eq!(result.cache_key(), "pyth-solana-SOL/USD");
    }

    #[test]
    fn test_empty_summary_is_zeroed() {
        let summary = ProtocolHealthSummary::from_results(Protocol::Uma, Vec::<HealthCheckResult>::new().iter(), 7200);
        assert_eq!(summary, ProtocolHealthSummary::empty(Protocol::Uma));
    }

    #[test]
    fn test_summary_excludes_infinite_staleness_from_average() {
        let now = Utc::now();
        let results = vec![
            HealthCheckResult::from_observation(Protocol::Pyth, "solana", "A", observed(10, now), 60, now, 1),
            HealthCheckResult::from_observation(Protocol::Pyth, "solana", "B", observed(90, now), 60, now, 1),
            HealthCheckResult::failed(Protocol::Pyth, "solana", "C", "boom", now, 1),
        ];

        let summary = ProtocolHealthSummary::from_results(Protocol::Pyth, &results, 60);
        assert_eq!(summary.total_feeds, 3);
        assert_eq!(summary.healthy_feeds, 1);
        assert_eq!(summary.unhealthy_feeds, 2);
        assert_eq!(summary.stale_feeds, 1);
        assert!((summary.average_staleness_seconds - 50.0).abs() < 1e-6);

        let tally = PassTally::from_results(&results, 60);
        assert_eq!(tally, PassTally { healthy: 1, stale: 1, failed: 1 });
    }

    #[test]
    fn test_infinite_staleness_survives_json() {
        let result = HealthCheckResult::failed(Protocol::Tellor, "ethereum", "TRB/USD", "x", Utc::now(), 0);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"staleness_seconds\":null"));
        let back: HealthCheckResult = serde_json::from_str(&json).unwrap();
        assert!(back.staleness_seconds.is_infinite());
    }
}
