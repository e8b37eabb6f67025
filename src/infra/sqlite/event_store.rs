//! SQLite event store.
//!
//! Append-only storage with strict version sequencing. A uniqueness
//! guarantee on `(tenant_id, aggregate_id, version)` backstops the
//! read-validate-insert window, so of two concurrent writers appending
//! the same version exactly one commits and the other observes a
//! concurrency conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, FromRow};
use uuid::Uuid;

use crate::domain::{
    rfc3339_micros, AggregateSnapshot, AggregateType, DomainEvent, EventMetadata, EventType,
    TenantId,
};
use crate::infra::{EventStore, LedgerError, Result};

/// SQLite-based event store
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new event store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new event store from a database path
    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        Ok(Self::new(pool))
    }

    /// Initialize the database schema
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_sqlite(&self.pool).await
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validate batch shape before touching the database.
    fn validate_batch(events: &[DomainEvent]) -> Result<()> {
        let first = &events[0];

        for event in events {
            if event.tenant_id != first.tenant_id
                || event.aggregate_id != first.aggregate_id
                || event.aggregate_type != first.aggregate_type
            {
                return Err(LedgerError::Sequence {
                    aggregate_id: first.aggregate_id.clone(),
                    message: "batch spans more than one aggregate".to_string(),
                });
            }
        }

        for (idx, event) in events.iter().enumerate() {
            let expected = first.version + idx as u64;
            if event.version != expected {
                return Err(LedgerError::Sequence {
                    aggregate_id: first.aggregate_id.clone(),
                    message: format!(
                        "batch versions not contiguous: expected {expected}, found {}",
                        event.version
                    ),
                });
            }
        }

        if first.version == 0 {
            return Err(LedgerError::Sequence {
                aggregate_id: first.aggregate_id.clone(),
                message: "event versions start at 1".to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append_events(&self, events: &[DomainEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        Self::validate_batch(events)?;
        let first = &events[0];

        let mut tx = self.pool.begin().await?;

        let (current,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version), 0) FROM events
             WHERE tenant_id = ? AND aggregate_id = ?",
        )
        .bind(first.tenant_id.0.to_string())
        .bind(&first.aggregate_id)
        .fetch_one(&mut *tx)
        .await?;
        let current = current as u64;

        if first.version <= current {
            return Err(LedgerError::ConcurrencyConflict {
                aggregate_id: first.aggregate_id.clone(),
                expected: current + 1,
                actual: first.version,
            });
        }
        if first.version != current + 1 {
            return Err(LedgerError::Sequence {
                aggregate_id: first.aggregate_id.clone(),
                message: format!(
                    "batch starts at version {} but current stored maximum is {current}",
                    first.version
                ),
            });
        }

        for event in events {
            let payload_json = serde_json::to_string(&event.payload)
                .map_err(|e| LedgerError::Codec(e.to_string()))?;
            let metadata_json = serde_json::to_string(&event.metadata)
                .map_err(|e| LedgerError::Codec(e.to_string()))?;

            let result = sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, tenant_id, aggregate_id, aggregate_type,
                    event_type, version, payload, metadata,
                    occurred_at, created_by
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.event_id.to_string())
            .bind(event.tenant_id.0.to_string())
            .bind(&event.aggregate_id)
            .bind(event.aggregate_type.as_str())
            .bind(event.event_type.as_str())
            .bind(event.version as i64)
            .bind(&payload_json)
            .bind(&metadata_json)
            .bind(rfc3339_micros(&event.occurred_at))
            .bind(event.metadata.user_id.as_deref())
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                // A concurrent writer slipped in between the version
                // read and this insert.
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    return Err(LedgerError::ConcurrencyConflict {
                        aggregate_id: event.aggregate_id.clone(),
                        expected: event.version,
                        actual: event.version,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_events(
        &self,
        tenant_id: &TenantId,
        aggregate_id: &str,
        from_version: u64,
    ) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type,
                   event_type, version, payload, metadata, occurred_at
            FROM events
            WHERE tenant_id = ? AND aggregate_id = ? AND version >= ?
            ORDER BY version ASC
            "#,
        )
        .bind(tenant_id.0.to_string())
        .bind(aggregate_id)
        .bind(from_version as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DomainEvent::try_from).collect()
    }

    async fn get_events_by_type(
        &self,
        tenant_id: &TenantId,
        event_type: &EventType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type,
                   event_type, version, payload, metadata, occurred_at
            FROM events
            WHERE tenant_id = ? AND event_type = ?
              AND occurred_at >= ? AND occurred_at <= ?
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(tenant_id.0.to_string())
        .bind(event_type.as_str())
        .bind(rfc3339_micros(&from))
        .bind(rfc3339_micros(&to))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DomainEvent::try_from).collect()
    }

    async fn get_events_by_aggregate_type(
        &self,
        tenant_id: &TenantId,
        aggregate_type: &AggregateType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type,
                   event_type, version, payload, metadata, occurred_at
            FROM events
            WHERE tenant_id = ? AND aggregate_type = ?
              AND occurred_at >= ? AND occurred_at <= ?
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(tenant_id.0.to_string())
        .bind(aggregate_type.as_str())
        .bind(rfc3339_micros(&from))
        .bind(rfc3339_micros(&to))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DomainEvent::try_from).collect()
    }

    async fn current_version(&self, tenant_id: &TenantId, aggregate_id: &str) -> Result<u64> {
        let (version,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version), 0) FROM events
             WHERE tenant_id = ? AND aggregate_id = ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(version as u64)
    }

    async fn create_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<()> {
        let state_json = serde_json::to_string(&snapshot.state)
            .map_err(|e| LedgerError::Codec(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO snapshots (
                tenant_id, aggregate_id, aggregate_type, version, state, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.tenant_id.0.to_string())
        .bind(&snapshot.aggregate_id)
        .bind(snapshot.aggregate_type.as_str())
        .bind(snapshot.version as i64)
        .bind(&state_json)
        .bind(rfc3339_micros(&snapshot.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_snapshot(
        &self,
        tenant_id: &TenantId,
        aggregate_id: &str,
    ) -> Result<Option<AggregateSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT tenant_id, aggregate_id, aggregate_type, version, state, created_at
            FROM snapshots
            WHERE tenant_id = ? AND aggregate_id = ?
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.0.to_string())
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AggregateSnapshot::try_from).transpose()
    }
}

/// Raw row from the events table
#[derive(Debug, FromRow)]
struct EventRow {
    event_id: String,
    tenant_id: String,
    aggregate_id: String,
    aggregate_type: String,
    event_type: String,
    version: i64,
    payload: String,
    metadata: String,
    occurred_at: String,
}

impl TryFrom<EventRow> for DomainEvent {
    type Error = LedgerError;

    fn try_from(row: EventRow) -> Result<Self> {
        let event_id = Uuid::parse_str(&row.event_id)
            .map_err(|e| LedgerError::Codec(format!("invalid event_id: {e}")))?;
        let tenant_id = Uuid::parse_str(&row.tenant_id)
            .map_err(|e| LedgerError::Codec(format!("invalid tenant_id: {e}")))?;
        let payload: serde_json::Value = serde_json::from_str(&row.payload)
            .map_err(|e| LedgerError::Codec(format!("invalid payload: {e}")))?;
        let metadata: EventMetadata = serde_json::from_str(&row.metadata)
            .map_err(|e| LedgerError::Codec(format!("invalid metadata: {e}")))?;
        let occurred_at = parse_rfc3339(&row.occurred_at)?;

        Ok(DomainEvent {
            event_id,
            tenant_id: TenantId::from_uuid(tenant_id),
            aggregate_id: row.aggregate_id,
            aggregate_type: AggregateType::from(row.aggregate_type),
            event_type: EventType::from(row.event_type),
            version: row.version as u64,
            payload,
            metadata,
            occurred_at,
        })
    }
}

/// Raw row from the snapshots table
#[derive(Debug, FromRow)]
struct SnapshotRow {
    tenant_id: String,
    aggregate_id: String,
    aggregate_type: String,
    version: i64,
    state: String,
    created_at: String,
}

impl TryFrom<SnapshotRow> for AggregateSnapshot {
    type Error = LedgerError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        let tenant_id = Uuid::parse_str(&row.tenant_id)
            .map_err(|e| LedgerError::Codec(format!("invalid tenant_id: {e}")))?;
        let state: serde_json::Value = serde_json::from_str(&row.state)
            .map_err(|e| LedgerError::Codec(format!("invalid snapshot state: {e}")))?;
        let created_at = parse_rfc3339(&row.created_at)?;

        Ok(AggregateSnapshot {
            tenant_id: TenantId::from_uuid(tenant_id),
            aggregate_id: row.aggregate_id,
            aggregate_type: AggregateType::from(row.aggregate_type),
            version: row.version as u64,
            state,
            created_at,
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::Codec(format!("invalid timestamp: {e}")))
}
