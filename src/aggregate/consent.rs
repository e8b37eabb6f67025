//! The consent aggregate: one subject's consent ledger per purpose.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConsentCreated, ConsentEvent, ConsentExpired, ConsentGranted, ConsentRecord, ConsentRevoked,
    ConsentStatus, DomainEvent, EventMetadata, EventType, PolicyLinked, TenantId,
};
use crate::infra::{ConsentHistoryProvider, EventStore, LedgerError, Result};

use super::{AggregateRoot, AggregateState};

/// One purpose's current standing within a subject's consent ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentEntry {
    pub status: ConsentStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Replayed state of a subject's consents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentState {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Purpose -> current entry; BTreeMap keeps derivations ordered
    pub entries: BTreeMap<String, ConsentEntry>,
}

impl AggregateState for ConsentState {
    type Event = ConsentEvent;

    const AGGREGATE_TYPE: &'static str = "consent";

    fn decode(event: &DomainEvent) -> Result<Self::Event> {
        event.decode()
    }

    fn encode(event: &Self::Event) -> Result<(EventType, serde_json::Value)> {
        Ok((event.event_type(), event.to_payload()?))
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ConsentEvent::Created(p) => {
                self.subject_id = p.subject_id.clone();
                self.policy_id = p.policy_id.clone();
            }
            ConsentEvent::Granted(p) => {
                self.entries.insert(
                    p.purpose.clone(),
                    ConsentEntry {
                        status: ConsentStatus::Granted,
                        updated_at: p.granted_at,
                        expires_at: p.expires_at,
                    },
                );
            }
            ConsentEvent::Revoked(p) => {
                let entry = self
                    .entries
                    .entry(p.purpose.clone())
                    .or_insert(ConsentEntry {
                        status: ConsentStatus::Revoked,
                        updated_at: p.revoked_at,
                        expires_at: None,
                    });
                entry.status = ConsentStatus::Revoked;
                entry.updated_at = p.revoked_at;
            }
            ConsentEvent::Expired(p) => {
                if let Some(entry) = self.entries.get_mut(&p.purpose) {
                    entry.status = ConsentStatus::Expired;
                    entry.updated_at = p.expired_at;
                }
            }
            ConsentEvent::PolicyLinked(p) => {
                self.policy_id = Some(p.policy_id.clone());
            }
        }
    }
}

/// Command-side wrapper over the generic root for consent aggregates.
///
/// The aggregate id is the subject id; one aggregate holds all of a
/// subject's purposes.
#[derive(Debug)]
pub struct ConsentAggregate {
    root: AggregateRoot<ConsentState>,
}

impl ConsentAggregate {
    /// Fresh, unsaved aggregate for a subject.
    pub fn new(tenant_id: TenantId, subject_id: impl Into<String>) -> Self {
        Self {
            root: AggregateRoot::new(tenant_id, subject_id),
        }
    }

    /// Load a subject's aggregate from the store.
    pub async fn load(
        store: &dyn EventStore,
        tenant_id: TenantId,
        subject_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            root: AggregateRoot::load(store, tenant_id, subject_id).await?,
        })
    }

    pub fn subject_id(&self) -> &str {
        self.root.aggregate_id()
    }

    pub fn version(&self) -> u64 {
        self.root.version()
    }

    pub fn state(&self) -> &ConsentState {
        self.root.state()
    }

    pub fn uncommitted_events(&self) -> &[DomainEvent] {
        self.root.uncommitted_events()
    }

    /// Initialize the subject's consent ledger. Must be the first event.
    pub fn create(&mut self, policy_id: Option<String>, metadata: EventMetadata) -> Result<()> {
        if self.root.version() > 0 {
            return Err(LedgerError::Invariant(format!(
                "consent ledger for subject {} already exists",
                self.subject_id()
            )));
        }
        let subject_id = self.root.aggregate_id().to_string();
        self.root.record(
            ConsentEvent::Created(ConsentCreated {
                subject_id,
                policy_id,
                created_at: Utc::now(),
            }),
            metadata,
        )
    }

    /// Grant consent for a purpose.
    pub fn grant(
        &mut self,
        purpose: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        metadata: EventMetadata,
    ) -> Result<()> {
        self.require_created()?;
        self.root.record(
            ConsentEvent::Granted(ConsentGranted {
                purpose: purpose.into(),
                granted_at: Utc::now(),
                expires_at,
            }),
            metadata,
        )
    }

    /// Revoke a currently granted consent.
    pub fn revoke(
        &mut self,
        purpose: &str,
        reason: Option<String>,
        metadata: EventMetadata,
    ) -> Result<()> {
        self.require_created()?;
        match self.root.state().entries.get(purpose) {
            Some(entry) if entry.status == ConsentStatus::Granted => {}
            Some(entry) => {
                return Err(LedgerError::Invariant(format!(
                    "consent for purpose {purpose} is {} and cannot be revoked",
                    entry.status
                )))
            }
            None => {
                return Err(LedgerError::Invariant(format!(
                    "no consent recorded for purpose {purpose}"
                )))
            }
        }
        self.root.record(
            ConsentEvent::Revoked(ConsentRevoked {
                purpose: purpose.to_string(),
                revoked_at: Utc::now(),
                reason,
            }),
            metadata,
        )
    }

    /// Mark a granted consent as expired.
    pub fn expire(&mut self, purpose: &str, metadata: EventMetadata) -> Result<()> {
        self.require_created()?;
        match self.root.state().entries.get(purpose) {
            Some(entry) if entry.status == ConsentStatus::Granted => {}
            _ => {
                return Err(LedgerError::Invariant(format!(
                    "no granted consent for purpose {purpose} to expire"
                )))
            }
        }
        self.root.record(
            ConsentEvent::Expired(ConsentExpired {
                purpose: purpose.to_string(),
                expired_at: Utc::now(),
            }),
            metadata,
        )
    }

    /// Link (or re-link) the subject's consents to a policy.
    pub fn link_policy(
        &mut self,
        policy_id: impl Into<String>,
        metadata: EventMetadata,
    ) -> Result<()> {
        self.require_created()?;
        self.root.record(
            ConsentEvent::PolicyLinked(PolicyLinked {
                policy_id: policy_id.into(),
                linked_at: Utc::now(),
            }),
            metadata,
        )
    }

    /// Flush uncommitted events; see [`AggregateRoot::save`].
    pub async fn save(&mut self, store: &dyn EventStore) -> Result<()> {
        self.root.save(store).await
    }

    pub fn should_snapshot(&self) -> bool {
        self.root.should_snapshot()
    }

    pub async fn create_snapshot(&self, store: &dyn EventStore) -> Result<()> {
        self.root.create_snapshot(store).await
    }

    /// Derive consent records from current state, sorted by record id.
    pub fn consent_records(&self) -> Vec<ConsentRecord> {
        let state = self.root.state();
        let mut records: Vec<ConsentRecord> = state
            .entries
            .iter()
            .map(|(purpose, entry)| ConsentRecord {
                id: ConsentRecord::record_id(&state.subject_id, purpose),
                subject_id: state.subject_id.clone(),
                policy_id: state.policy_id.clone(),
                purpose: purpose.clone(),
                status: entry.status,
                timestamp: entry.updated_at,
                expires_at: entry.expires_at,
            })
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    fn require_created(&self) -> Result<()> {
        if self.root.version() == 0 {
            return Err(LedgerError::Invariant(format!(
                "consent ledger for subject {} does not exist yet",
                self.subject_id()
            )));
        }
        Ok(())
    }
}

/// Consent history provider backed by the event store.
///
/// Replays the subject's aggregate on every call; the records it
/// returns are exactly the aggregate's derived state.
pub struct EventSourcedConsentProvider {
    store: Arc<dyn EventStore>,
}

impl EventSourcedConsentProvider {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConsentHistoryProvider for EventSourcedConsentProvider {
    async fn consent_history(
        &self,
        tenant_id: &TenantId,
        subject_id: &str,
    ) -> Result<Vec<ConsentRecord>> {
        let aggregate =
            ConsentAggregate::load(self.store.as_ref(), tenant_id.clone(), subject_id).await?;
        Ok(aggregate.consent_records())
    }
}
