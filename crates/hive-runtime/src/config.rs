//! Node configuration
//!
//! Loaded from an optional JSON file. Every field has a default, so a file
//! only needs the settings it changes:
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/hive",
//!   "log": { "level": "debug", "json": true },
//!   "intervals": { "rebroadcast": 15 },
//!   "udp": [{ "name": "lan", "broadcast": "192.168.1.255", "port": 4880 }],
//!   "pubsub": ["hive"]
//! }
//! ```
//!
//! Durations are given in seconds and may be fractional.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hive_core::{HiveError, HiveResult};
use hive_transport::UdpSettings;

const DAY: u64 = 24 * 60 * 60;

mod seconds {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Periods of the brain's scheduled tasks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    #[serde(with = "seconds")]
    pub peer_advert: Duration,
    #[serde(with = "seconds")]
    pub address_advert: Duration,
    #[serde(with = "seconds")]
    pub connect_retry: Duration,
    #[serde(with = "seconds")]
    pub summary_publish: Duration,
    #[serde(with = "seconds")]
    pub rebroadcast: Duration,
    #[serde(with = "seconds")]
    pub maintenance: Duration,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        IntervalConfig {
            peer_advert: Duration::from_secs(60),
            address_advert: Duration::from_secs(60),
            connect_retry: Duration::from_secs(120),
            summary_publish: Duration::from_secs(300),
            rebroadcast: Duration::from_secs(30),
            maintenance: Duration::from_secs(60),
        }
    }
}

/// Content-store call timeouts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "seconds")]
    pub get: Duration,
    #[serde(with = "seconds")]
    pub pin: Duration,
    #[serde(with = "seconds")]
    pub connect: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            get: Duration::from_secs(30),
            pin: Duration::from_secs(120),
            connect: Duration::from_secs(10),
        }
    }
}

/// Bounded retry of content-store calls that fail transiently
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Calls made in total, the first one included
    pub attempts: u32,
    #[serde(with = "seconds")]
    pub backoff: Duration,
    #[serde(with = "seconds")]
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// Pause before retry number `retry` (from 0): `backoff * 2^retry`,
    /// capped at `max_backoff`
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempts: 4,
            backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCounts {
    pub pinners: usize,
    pub verifiers: usize,
    pub connectors: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        WorkerCounts {
            pinners: 2,
            verifiers: 2,
            connectors: 1,
        }
    }
}

/// Everything a node needs to start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub log: LogConfig,
    pub intervals: IntervalConfig,
    /// Longest the brain waits for mail before checking its intervals
    #[serde(with = "seconds")]
    pub brain_poll: Duration,
    /// Pause between answering `quit` and exiting
    #[serde(with = "seconds")]
    pub quit_grace: Duration,
    /// Lifetime of self-advertisements
    #[serde(with = "seconds")]
    pub advert_ttl: Duration,
    /// Lifetime of `safe` entries
    #[serde(with = "seconds")]
    pub safe_ttl: Duration,
    /// Lifetime of a verifier's dismissal from `files`
    #[serde(with = "seconds")]
    pub dismiss_ttl: Duration,
    pub timeouts: TimeoutConfig,
    /// Verifier and pinner retries
    pub retry: RetryConfig,
    pub workers: WorkerCounts,
    pub udp: Vec<UdpSettings>,
    /// Content-store pub/sub topics used as transports
    pub pubsub: Vec<String>,
    /// TCP control listener; `None` disables it
    pub tcp: Option<SocketAddr>,
    #[serde(with = "seconds")]
    pub restart_delay: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: PathBuf::from("hive-data"),
            log: LogConfig::default(),
            intervals: IntervalConfig::default(),
            brain_poll: Duration::from_secs(1),
            quit_grace: Duration::from_secs(1),
            advert_ttl: Duration::from_secs(180),
            safe_ttl: Duration::from_secs(7 * DAY),
            dismiss_ttl: Duration::from_secs(60 * 60),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            workers: WorkerCounts::default(),
            udp: vec![UdpSettings::default()],
            pubsub: vec!["hive".to_string()],
            tcp: Some(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4881))),
            restart_delay: Duration::from_secs(1),
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> HiveResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HiveError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: NodeConfig = serde_json::from_str(&text)
            .map_err(|e| HiveError::Config(format!("invalid config JSON in {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// `load` if a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> HiveResult<Self> {
        match path {
            Some(path) => NodeConfig::load(path),
            None => Ok(NodeConfig::default()),
        }
    }

    pub fn validate(&self) -> HiveResult<()> {
        let bad_segment = |s: &str| s.is_empty() || s.contains('/') || s == hive_core::WILDCARD;
        if let Some(udp) = self.udp.iter().find(|u| bad_segment(&u.name)) {
            return Err(HiveError::Config(format!("invalid UDP interface name {:?}", udp.name)));
        }
        if let Some(topic) = self.pubsub.iter().find(|t| bad_segment(t)) {
            return Err(HiveError::Config(format!("invalid pub/sub topic {topic:?}")));
        }
        let mut names: Vec<&str> = self.udp.iter().map(|u| u.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(HiveError::Config("duplicate UDP interface name".into()));
        }
        if self.workers.pinners == 0 || self.workers.verifiers == 0 || self.workers.connectors == 0 {
            return Err(HiveError::Config("every worker pool needs at least one worker".into()));
        }
        if self.brain_poll.is_zero() {
            return Err(HiveError::Config("brain_poll must be positive".into()));
        }
        if self.retry.attempts == 0 {
            return Err(HiveError::Config("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity.key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.safe_ttl, Duration::from_secs(604_800));
        assert_eq!(config.identity_path(), PathBuf::from("hive-data/identity.key"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.json");
        std::fs::write(
            &path,
            r#"{
                "data_dir": "/tmp/hive",
                "intervals": { "rebroadcast": 0.5 },
                "udp": [{ "name": "wifi", "port": 5000 }],
                "tcp": null
            }"#,
        )
        .unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/hive"));
        assert_eq!(config.intervals.rebroadcast, Duration::from_millis(500));
        assert_eq!(config.intervals.maintenance, Duration::from_secs(60));
        assert_eq!(config.udp[0].name, "wifi");
        assert_eq!(config.udp[0].port_attempts, 10);
        assert!(config.tcp.is_none());
        assert_eq!(config.pubsub, vec!["hive"]);
    }

    #[test]
    fn test_invalid_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(NodeConfig::load(&path), Err(HiveError::Config(_))));

        std::fs::write(&path, r#"{ "pubsub": ["a/b"] }"#).unwrap();
        assert!(matches!(NodeConfig::load(&path), Err(HiveError::Config(_))));

        std::fs::write(&path, r#"{ "brain_poll": -1 }"#).unwrap();
        assert!(NodeConfig::load(&path).is_err());

        assert!(NodeConfig::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_retry_delay_doubles_up_to_cap() {
        let retry = RetryConfig {
            attempts: 10,
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(retry.delay(0), Duration::from_millis(100));
        assert_eq!(retry.delay(1), Duration::from_millis(200));
        assert_eq!(retry.delay(2), Duration::from_millis(400));
        assert_eq!(retry.delay(3), Duration::from_millis(500));
        assert_eq!(retry.delay(40), Duration::from_millis(500));

        let mut config = NodeConfig::default();
        config.retry.attempts = 0;
        assert!(matches!(config.validate(), Err(HiveError::Config(_))));
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = NodeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
