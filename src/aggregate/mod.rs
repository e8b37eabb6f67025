//! Generic event-sourced replay engine.
//!
//! State types implement [`AggregateState`] as an explicit transition
//! function; [`AggregateRoot`] threads that function through loading,
//! replay, buffering and optimistic persistence. No inheritance, no
//! reflection: the state type decides how envelopes decode.

mod consent;

pub use consent::*;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    AggregateSnapshot, AggregateType, DomainEvent, EventMetadata, EventType, TenantId,
};
use crate::infra::{EventStore, LedgerError, Result};

/// Snapshot every this many events. Policy only; snapshots are never a
/// correctness requirement.
pub const SNAPSHOT_INTERVAL: u64 = 100;

/// State built purely by replaying events.
pub trait AggregateState: Default + Serialize + DeserializeOwned + Send + Sync {
    /// Typed event kind this state consumes
    type Event;

    /// Aggregate classification stored on every envelope
    const AGGREGATE_TYPE: &'static str;

    /// Decode an envelope into the typed event kind
    fn decode(event: &DomainEvent) -> Result<Self::Event>;

    /// Encode a typed event kind into its envelope parts
    fn encode(event: &Self::Event) -> Result<(EventType, serde_json::Value)>;

    /// State transition; must be total over `Self::Event`
    fn apply(&mut self, event: &Self::Event);
}

/// Generic aggregate root: replay engine plus uncommitted-event buffer.
///
/// Never shared across tenants; ownership is exclusive to the command
/// that loaded it. Two concurrent `save` calls for the same aggregate
/// race at the store, and exactly one wins the sequencing check.
#[derive(Debug)]
pub struct AggregateRoot<S: AggregateState> {
    tenant_id: TenantId,
    aggregate_id: String,
    version: u64,
    state: S,
    uncommitted: Vec<DomainEvent>,
}

impl<S: AggregateState> AggregateRoot<S> {
    /// Construct a fresh aggregate at version 0.
    pub fn new(tenant_id: TenantId, aggregate_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            aggregate_id: aggregate_id.into(),
            version: 0,
            state: S::default(),
            uncommitted: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    /// Version of the last applied event (0 when pristine).
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Events applied locally but not yet persisted.
    pub fn uncommitted_events(&self) -> &[DomainEvent] {
        &self.uncommitted
    }

    pub fn aggregate_type() -> AggregateType {
        AggregateType::from(S::AGGREGATE_TYPE)
    }

    /// Record a locally-originated event: assigns `version + 1`, applies
    /// the transition and buffers the envelope as uncommitted.
    pub fn record(&mut self, event: S::Event, metadata: EventMetadata) -> Result<()> {
        let (event_type, payload) = S::encode(&event)?;
        let envelope = DomainEvent {
            event_id: Uuid::new_v4(),
            tenant_id: self.tenant_id.clone(),
            aggregate_id: self.aggregate_id.clone(),
            aggregate_type: Self::aggregate_type(),
            event_type,
            version: self.version + 1,
            payload,
            metadata,
            occurred_at: Utc::now(),
        };
        self.apply_event(envelope)
    }

    /// Apply an event the aggregate itself originated.
    ///
    /// The version must be exactly `self.version + 1`; anything else is
    /// a sequencing bug in the caller.
    pub fn apply_event(&mut self, event: DomainEvent) -> Result<()> {
        if event.version != self.version + 1 {
            return Err(LedgerError::Sequence {
                aggregate_id: self.aggregate_id.clone(),
                message: format!(
                    "applied version {} does not follow current version {}",
                    event.version, self.version
                ),
            });
        }

        let decoded = S::decode(&event)?;
        self.state.apply(&decoded);
        self.version = event.version;
        self.uncommitted.push(event);
        Ok(())
    }

    /// Replay persisted history for state reconstruction only. Nothing
    /// is buffered as uncommitted.
    pub fn load_from_history(&mut self, events: &[DomainEvent]) -> Result<()> {
        for event in events {
            if event.version != self.version + 1 {
                return Err(LedgerError::Sequence {
                    aggregate_id: self.aggregate_id.clone(),
                    message: format!(
                        "history version {} does not follow {}",
                        event.version, self.version
                    ),
                });
            }
            let decoded = S::decode(event)?;
            self.state.apply(&decoded);
            self.version = event.version;
        }
        Ok(())
    }

    /// Hydrate state from a snapshot; replay resumes at `version + 1`.
    pub fn load_from_snapshot(&mut self, snapshot: &AggregateSnapshot) -> Result<()> {
        self.state = serde_json::from_value(snapshot.state.clone())
            .map_err(|e| LedgerError::Codec(format!("invalid snapshot state: {e}")))?;
        self.version = snapshot.version;
        Ok(())
    }

    /// Load an aggregate: latest snapshot (if any), then replay the
    /// event tail; without a snapshot, replay from version 1.
    pub async fn load(
        store: &dyn EventStore,
        tenant_id: TenantId,
        aggregate_id: impl Into<String>,
    ) -> Result<Self> {
        let mut root = Self::new(tenant_id, aggregate_id);

        if let Some(snapshot) = store
            .latest_snapshot(&root.tenant_id, &root.aggregate_id)
            .await?
        {
            root.load_from_snapshot(&snapshot)?;
        }

        let events = store
            .get_events(&root.tenant_id, &root.aggregate_id, root.version + 1)
            .await?;
        root.load_from_history(&events)?;

        Ok(root)
    }

    /// Flush uncommitted events to the store, then clear the buffer.
    ///
    /// No-op when the buffer is empty. The buffer is only cleared after
    /// the store confirms the append; on failure the events remain
    /// available so the caller can reload and retry.
    pub async fn save(&mut self, store: &dyn EventStore) -> Result<()> {
        if self.uncommitted.is_empty() {
            return Ok(());
        }

        store.append_events(&self.uncommitted).await?;
        self.uncommitted.clear();
        Ok(())
    }

    /// Pure snapshot policy; creating one is caller-triggered.
    pub fn should_snapshot(&self) -> bool {
        self.version > 0 && self.version % SNAPSHOT_INTERVAL == 0
    }

    /// Serialize current state into a snapshot record.
    pub fn snapshot(&self) -> Result<AggregateSnapshot> {
        let state = serde_json::to_value(&self.state)
            .map_err(|e| LedgerError::Codec(e.to_string()))?;
        Ok(AggregateSnapshot::new(
            self.tenant_id.clone(),
            self.aggregate_id.clone(),
            Self::aggregate_type(),
            self.version,
            state,
        ))
    }

    /// Persist a snapshot of the current state.
    pub async fn create_snapshot(&self, store: &dyn EventStore) -> Result<()> {
        store.create_snapshot(&self.snapshot()?).await
    }
}
