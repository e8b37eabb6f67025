//! SQLite proof bundle store.
//!
//! Bundles are stored as their full JSON representation plus the columns
//! needed for lookup and expiry cleanup. Stored bundles are immutable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::domain::{rfc3339_micros, AggregatedProof, ProofBundle, TenantId};
use crate::infra::{BundleStore, LedgerError, Result};

/// SQLite-based bundle store
pub struct SqliteBundleStore {
    pool: SqlitePool,
}

impl SqliteBundleStore {
    /// Create a new bundle store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_sqlite(&self.pool).await
    }
}

#[async_trait]
impl BundleStore for SqliteBundleStore {
    async fn put_bundle(&self, bundle: &ProofBundle) -> Result<()> {
        let bundle_json =
            serde_json::to_string(bundle).map_err(|e| LedgerError::Codec(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO proof_bundles (
                bundle_id, tenant_id, subject_id, policy_id,
                bundle, generated_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(bundle.bundle_id.to_string())
        .bind(bundle.tenant_id.0.to_string())
        .bind(&bundle.subject_id)
        .bind(bundle.policy_id.as_deref())
        .bind(&bundle_json)
        .bind(rfc3339_micros(&bundle.generated_at))
        .bind(bundle.expires_at.as_ref().map(rfc3339_micros))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<ProofBundle>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT bundle FROM proof_bundles WHERE bundle_id = ?")
                .bind(bundle_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(json,)| {
            serde_json::from_str(&json).map_err(|e| LedgerError::Codec(e.to_string()))
        })
        .transpose()
    }

    async fn list_bundles(
        &self,
        tenant_id: &TenantId,
        subject_id: &str,
    ) -> Result<Vec<ProofBundle>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT bundle FROM proof_bundles
            WHERE tenant_id = ? AND subject_id = ?
            ORDER BY generated_at DESC
            "#,
        )
        .bind(tenant_id.0.to_string())
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(json,)| {
                serde_json::from_str(&json).map_err(|e| LedgerError::Codec(e.to_string()))
            })
            .collect()
    }

    async fn put_aggregated(&self, proof: &AggregatedProof) -> Result<()> {
        let proof_json =
            serde_json::to_string(proof).map_err(|e| LedgerError::Codec(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO aggregated_proofs (
                aggregation_id, tenant_id, root, proof, created_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(proof.aggregation_id.to_string())
        .bind(proof.tenant_id.0.to_string())
        .bind(&proof.root)
        .bind(&proof_json)
        .bind(rfc3339_micros(&proof.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_aggregated(&self, aggregation_id: Uuid) -> Result<Option<AggregatedProof>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT proof FROM aggregated_proofs WHERE aggregation_id = ?")
                .bind(aggregation_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(json,)| {
            serde_json::from_str(&json).map_err(|e| LedgerError::Codec(e.to_string()))
        })
        .transpose()
    }

    async fn delete_expired(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM proof_bundles
            WHERE tenant_id = ? AND expires_at IS NOT NULL AND expires_at <= ?
            "#,
        )
        .bind(tenant_id.0.to_string())
        .bind(rfc3339_micros(&now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
