//! Trait definitions for the consent ledger core services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    AggregateSnapshot, AggregateType, AggregatedProof, ConsentRecord, DomainEvent, EventType,
    ProofBundle, TenantId,
};

use super::Result;

/// Append-only event storage with strict version sequencing.
///
/// Invariant: events for a `(tenant_id, aggregate_id)` pair form a
/// contiguous ascending run by `version`, starting at 1. The store
/// enforces this at append time; it is the sole concurrency-control
/// mechanism (optimistic, no locks).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of events atomically.
    ///
    /// All events must share one `(tenant_id, aggregate_id,
    /// aggregate_type)` and their versions must form a contiguous run
    /// starting immediately after the current stored maximum. A stale
    /// starting version fails with `ConcurrencyConflict`; a gap or
    /// disorder fails with `Sequence`. Nothing is persisted on failure.
    async fn append_events(&self, events: &[DomainEvent]) -> Result<()>;

    /// Events for one aggregate, ascending by version, inclusive of
    /// `from_version` (0 means everything).
    async fn get_events(
        &self,
        tenant_id: &TenantId,
        aggregate_id: &str,
        from_version: u64,
    ) -> Result<Vec<DomainEvent>>;

    /// Time-range scan over one event type, ascending by occurrence time.
    async fn get_events_by_type(
        &self,
        tenant_id: &TenantId,
        event_type: &EventType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>>;

    /// Time-range scan over one aggregate type, ascending by occurrence time.
    async fn get_events_by_aggregate_type(
        &self,
        tenant_id: &TenantId,
        aggregate_type: &AggregateType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>>;

    /// Highest stored version for an aggregate, or 0 when none exist.
    async fn current_version(&self, tenant_id: &TenantId, aggregate_id: &str) -> Result<u64>;

    /// Store a snapshot.
    async fn create_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<()>;

    /// Latest snapshot by version for an aggregate, if any.
    async fn latest_snapshot(
        &self,
        tenant_id: &TenantId,
        aggregate_id: &str,
    ) -> Result<Option<AggregateSnapshot>>;
}

/// Durable storage for proof bundles and aggregations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Persist a bundle. Bundles are immutable once stored.
    async fn put_bundle(&self, bundle: &ProofBundle) -> Result<()>;

    /// Fetch a bundle by id.
    async fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<ProofBundle>>;

    /// Bundles for a subject, newest first.
    async fn list_bundles(
        &self,
        tenant_id: &TenantId,
        subject_id: &str,
    ) -> Result<Vec<ProofBundle>>;

    /// Persist an aggregation atomically.
    async fn put_aggregated(&self, proof: &AggregatedProof) -> Result<()>;

    /// Fetch an aggregation by id.
    async fn get_aggregated(&self, aggregation_id: Uuid) -> Result<Option<AggregatedProof>>;

    /// Delete bundles whose expiry passed before `now`. Returns the
    /// number of bundles removed.
    async fn delete_expired(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<u64>;
}

/// Source of a subject's consent history.
///
/// Consumed, not defined, by the proof engine; the event-sourced
/// implementation lives in [`crate::aggregate`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConsentHistoryProvider: Send + Sync {
    /// Current consent records for a subject, in provider order.
    async fn consent_history(
        &self,
        tenant_id: &TenantId,
        subject_id: &str,
    ) -> Result<Vec<ConsentRecord>>;
}
