//! Aggregate snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AggregateType, TenantId};

/// Point-in-time projection of an aggregate's state.
///
/// `version` equals the version of the last event the state reflects;
/// replay resumes at `version + 1`. Snapshots are purely a read
/// optimization, never a correctness requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub tenant_id: TenantId,
    pub aggregate_id: String,
    pub aggregate_type: AggregateType,
    pub version: u64,
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AggregateSnapshot {
    pub fn new(
        tenant_id: TenantId,
        aggregate_id: impl Into<String>,
        aggregate_type: AggregateType,
        version: u64,
        state: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id,
            aggregate_id: aggregate_id.into(),
            aggregate_type,
            version,
            state,
            created_at: Utc::now(),
        }
    }
}
