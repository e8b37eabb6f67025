//! Consent records as seen by the proof pipeline.
//!
//! The proof engine consumes these from a [`crate::infra::ConsentHistoryProvider`];
//! the event-sourced implementation derives them by replaying the consent
//! aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a single consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Granted,
    Revoked,
    Expired,
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsentStatus::Pending => "pending",
            ConsentStatus::Granted => "granted",
            ConsentStatus::Revoked => "revoked",
            ConsentStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// A subject's consent for one purpose at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Stable identifier, used as the canonical sort key
    pub id: String,

    /// Subject the consent belongs to
    pub subject_id: String,

    /// Linked policy, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    /// Processing purpose (marketing, analytics, ...)
    pub purpose: String,

    /// Current status
    pub status: ConsentStatus,

    /// When the status last changed
    pub timestamp: DateTime<Utc>,

    /// Scheduled expiry, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// Canonical id for a subject/purpose pair.
    pub fn record_id(subject_id: &str, purpose: &str) -> String {
        format!("{subject_id}:{purpose}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ConsentStatus::Granted).unwrap();
        assert_eq!(json, r#""granted""#);

        let parsed: ConsentStatus = serde_json::from_str(r#""revoked""#).unwrap();
        assert_eq!(parsed, ConsentStatus::Revoked);
    }

    #[test]
    fn test_record_id() {
        assert_eq!(
            ConsentRecord::record_id("subj-1", "marketing"),
            "subj-1:marketing"
        );
    }
}
