//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use consent_ledger::anchor::{LedgerSnapshot, SnapshotOracle};
use consent_ledger::domain::{
    AggregateType, ConsentEvent, ConsentGranted, DomainEvent, EventMetadata, TenantId,
};
use consent_ledger::infra::{LedgerError, Result, SqliteBundleStore, SqliteEventStore};

/// Test tenant ID
pub fn test_tenant_id() -> TenantId {
    TenantId::from_uuid(Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap())
}

/// A second tenant for isolation tests
pub fn other_tenant_id() -> TenantId {
    TenantId::from_uuid(Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap())
}

/// In-memory SQLite pool (single connection so every handle shares one
/// database)
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

/// Initialized in-memory event store
pub async fn event_store() -> SqliteEventStore {
    let store = SqliteEventStore::new(memory_pool().await);
    store.initialize().await.expect("schema");
    store
}

/// Initialized in-memory event + bundle stores over one database
pub async fn stores() -> (SqliteEventStore, SqliteBundleStore) {
    let pool = memory_pool().await;
    let event_store = SqliteEventStore::new(pool.clone());
    event_store.initialize().await.expect("schema");
    (event_store, SqliteBundleStore::new(pool))
}

/// Build a consent.granted envelope at a given version
pub fn granted_event(
    tenant_id: &TenantId,
    subject_id: &str,
    purpose: &str,
    version: u64,
    occurred_at: DateTime<Utc>,
) -> DomainEvent {
    let event = ConsentEvent::Granted(ConsentGranted {
        purpose: purpose.to_string(),
        granted_at: occurred_at,
        expires_at: None,
    });

    DomainEvent {
        event_id: Uuid::new_v4(),
        tenant_id: tenant_id.clone(),
        aggregate_id: subject_id.to_string(),
        aggregate_type: AggregateType::consent(),
        event_type: event.event_type(),
        version,
        payload: event.to_payload().unwrap(),
        metadata: EventMetadata::default(),
        occurred_at,
    }
}

/// Controllable in-process ledger oracle.
pub struct StubOracle {
    available: AtomicBool,
    snapshots: Mutex<BTreeMap<u64, LedgerSnapshot>>,
}

impl StubOracle {
    pub fn unavailable() -> Self {
        Self {
            available: AtomicBool::new(false),
            snapshots: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_snapshot(ordinal: u64, hash: &str) -> Self {
        let oracle = Self {
            available: AtomicBool::new(true),
            snapshots: Mutex::new(BTreeMap::new()),
        };
        oracle.insert(ordinal, hash);
        oracle
    }

    pub fn insert(&self, ordinal: u64, hash: &str) {
        self.snapshots.lock().unwrap().insert(
            ordinal,
            LedgerSnapshot {
                ordinal,
                hash: hash.to_string(),
                timestamp: 1_750_000_000_000 + ordinal as i64,
            },
        );
    }

    pub fn remove(&self, ordinal: u64) {
        self.snapshots.lock().unwrap().remove(&ordinal);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::AnchorUnavailable(
                "stub oracle down".to_string(),
            ))
        }
    }
}

#[async_trait]
impl SnapshotOracle for StubOracle {
    async fn latest_snapshot(&self) -> Result<LedgerSnapshot> {
        self.check_available()?;
        self.snapshots
            .lock()
            .unwrap()
            .values()
            .last()
            .cloned()
            .ok_or_else(|| LedgerError::AnchorUnavailable("no snapshots".to_string()))
    }

    async fn snapshot_at(&self, ordinal: u64) -> Result<Option<LedgerSnapshot>> {
        self.check_available()?;
        Ok(self.snapshots.lock().unwrap().get(&ordinal).cloned())
    }
}
