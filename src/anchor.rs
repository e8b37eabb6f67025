//! Remote ledger snapshot oracle.
//!
//! The ledger is consumed purely as an HTTP oracle: proof generation
//! embeds the latest snapshot as an anchor, verification re-checks each
//! embedded ordinal. Any network failure, timeout or non-success status
//! maps to `AnchorUnavailable`; a 404 on a by-ordinal lookup means the
//! snapshot does not exist. The two call sites treat unavailability
//! differently on purpose: generation degrades to an unanchored bundle,
//! verification of present refs fails closed.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::domain::SnapshotRef;
use crate::infra::{LedgerError, Result};

/// Default oracle request timeout in seconds
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 3;

/// Snapshot as reported by the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerSnapshot {
    pub ordinal: u64,
    pub hash: String,
    /// Ledger timestamp (epoch milliseconds)
    pub timestamp: i64,
}

impl From<&LedgerSnapshot> for SnapshotRef {
    fn from(snapshot: &LedgerSnapshot) -> Self {
        SnapshotRef {
            ordinal: snapshot.ordinal,
            hash: snapshot.hash.clone(),
            timestamp: snapshot.timestamp,
        }
    }
}

/// Read-only view of the remote ledger.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SnapshotOracle: Send + Sync {
    /// Latest snapshot on the ledger.
    async fn latest_snapshot(&self) -> Result<LedgerSnapshot>;

    /// Snapshot at a specific ordinal, or `None` when the ledger has
    /// no snapshot for it.
    async fn snapshot_at(&self, ordinal: u64) -> Result<Option<LedgerSnapshot>>;
}

/// Oracle client configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL of the ledger node (e.g. "http://localhost:9000")
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl OracleConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("LEDGER_ORACLE_URL").ok()?;
        let timeout_secs = std::env::var("LEDGER_ORACLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ORACLE_TIMEOUT_SECS);

        Some(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// HTTP oracle client.
///
/// Holds one shared `reqwest::Client`; safe for concurrent in-flight
/// requests.
pub struct HttpLedgerOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpLedgerOracle {
    /// Create a new oracle client
    pub fn new(config: OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Configuration(format!("oracle client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SnapshotOracle for HttpLedgerOracle {
    async fn latest_snapshot(&self) -> Result<LedgerSnapshot> {
        let response = self
            .client
            .get(self.url("snapshots/latest"))
            .send()
            .await
            .map_err(|e| LedgerError::AnchorUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::AnchorUnavailable(format!(
                "latest snapshot returned {}",
                response.status()
            )));
        }

        response
            .json::<LedgerSnapshot>()
            .await
            .map_err(|e| LedgerError::AnchorUnavailable(format!("invalid snapshot body: {e}")))
    }

    async fn snapshot_at(&self, ordinal: u64) -> Result<Option<LedgerSnapshot>> {
        let response = self
            .client
            .get(self.url(&format!("snapshots/{ordinal}")))
            .send()
            .await
            .map_err(|e| LedgerError::AnchorUnavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LedgerError::AnchorUnavailable(format!(
                "snapshot {ordinal} returned {}",
                response.status()
            )));
        }

        let snapshot = response
            .json::<LedgerSnapshot>()
            .await
            .map_err(|e| LedgerError::AnchorUnavailable(format!("invalid snapshot body: {e}")))?;
        Ok(Some(snapshot))
    }
}
