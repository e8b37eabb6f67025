//! Event envelope and the closed set of consent event kinds.
//!
//! The [`DomainEvent`] envelope is the append-only unit of persistence.
//! Its `payload` is the serialized form of exactly one [`ConsentEvent`]
//! variant; decoding is an explicit match on the `event_type` string, so
//! the set of event kinds is closed and checked at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::{LedgerError, Result};

use super::{AggregateType, EventType, TenantId};

/// Immutable domain event envelope.
///
/// Events for a given `(tenant_id, aggregate_id)` form a total order by
/// `version` with no gaps, starting at 1. Appended once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Globally unique event identifier
    pub event_id: Uuid,

    /// Tenant isolation
    pub tenant_id: TenantId,

    /// Aggregate this event belongs to
    pub aggregate_id: String,

    /// Aggregate classification (consent, policy, ...)
    pub aggregate_type: AggregateType,

    /// Event kind discriminator (decides how `payload` is decoded)
    pub event_type: EventType,

    /// Position in the aggregate's stream (1-based, contiguous)
    pub version: u64,

    /// Event-specific payload (one serialized [`ConsentEvent`] variant)
    pub payload: serde_json::Value,

    /// Request-level metadata captured at authoring time
    #[serde(default)]
    pub metadata: EventMetadata,

    /// When the domain operation happened
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Decode the payload back into its typed event kind.
    pub fn decode(&self) -> Result<ConsentEvent> {
        ConsentEvent::from_parts(&self.event_type, &self.payload)
    }
}

/// Optional metadata attached to every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Event that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    /// Correlation across a whole command chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Acting user, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Source IP of the originating request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// User agent of the originating request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl EventMetadata {
    pub fn with_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }
}

/// Payload of `consent.created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentCreated {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload of `consent.granted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentGranted {
    pub purpose: String,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload of `consent.revoked`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRevoked {
    pub purpose: String,
    pub revoked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `consent.expired`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentExpired {
    pub purpose: String,
    pub expired_at: DateTime<Utc>,
}

/// Payload of `consent.policy_linked`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyLinked {
    pub policy_id: String,
    pub linked_at: DateTime<Utc>,
}

/// Closed sum type over every consent event kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsentEvent {
    Created(ConsentCreated),
    Granted(ConsentGranted),
    Revoked(ConsentRevoked),
    Expired(ConsentExpired),
    PolicyLinked(PolicyLinked),
}

impl ConsentEvent {
    /// The discriminator string stored in the envelope.
    pub fn event_type(&self) -> EventType {
        let s = match self {
            ConsentEvent::Created(_) => EventType::CONSENT_CREATED,
            ConsentEvent::Granted(_) => EventType::CONSENT_GRANTED,
            ConsentEvent::Revoked(_) => EventType::CONSENT_REVOKED,
            ConsentEvent::Expired(_) => EventType::CONSENT_EXPIRED,
            ConsentEvent::PolicyLinked(_) => EventType::CONSENT_POLICY_LINKED,
        };
        EventType::from(s)
    }

    /// Serialize the variant payload for the envelope.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            ConsentEvent::Created(p) => serde_json::to_value(p),
            ConsentEvent::Granted(p) => serde_json::to_value(p),
            ConsentEvent::Revoked(p) => serde_json::to_value(p),
            ConsentEvent::Expired(p) => serde_json::to_value(p),
            ConsentEvent::PolicyLinked(p) => serde_json::to_value(p),
        };
        value.map_err(|e| LedgerError::Codec(e.to_string()))
    }

    /// Decode a `(event_type, payload)` pair from the envelope.
    ///
    /// Unknown event types are a decode error: the set of kinds is
    /// closed and enumerated here.
    pub fn from_parts(event_type: &EventType, payload: &serde_json::Value) -> Result<Self> {
        let decoded = match event_type.as_str() {
            EventType::CONSENT_CREATED => {
                ConsentEvent::Created(from_payload(payload)?)
            }
            EventType::CONSENT_GRANTED => {
                ConsentEvent::Granted(from_payload(payload)?)
            }
            EventType::CONSENT_REVOKED => {
                ConsentEvent::Revoked(from_payload(payload)?)
            }
            EventType::CONSENT_EXPIRED => {
                ConsentEvent::Expired(from_payload(payload)?)
            }
            EventType::CONSENT_POLICY_LINKED => {
                ConsentEvent::PolicyLinked(from_payload(payload)?)
            }
            other => {
                return Err(LedgerError::Codec(format!(
                    "unknown event type: {other}"
                )))
            }
        };
        Ok(decoded)
    }
}

fn from_payload<T: serde::de::DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
    serde_json::from_value(payload.clone()).map_err(|e| LedgerError::Codec(e.to_string()))
}
