//! Consent Ledger Library
//!
//! Event-sourced consent core for a multi-tenant privacy-compliance
//! platform: an append-only domain-event log with optimistic versioning
//! and snapshotting, plus a cryptographic proof-bundle pipeline
//! (Ed25519 signing, Merkle aggregation, time-locks, delegation)
//! anchored against a remote ledger snapshot oracle.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (events, consents, snapshots, proof bundles)
//! - [`aggregate`] - Generic replay engine and the consent aggregate
//! - [`infra`] - Infrastructure implementations (SQLite stores, traits, errors)
//! - [`crypto`] - Cryptographic utilities (canonical hashing, signing, Merkle, encryption)
//! - [`proof`] - Proof bundle engine and Merkle aggregator
//! - [`anchor`] - Remote ledger snapshot oracle client
//! - [`metrics`] - Observability and metrics
//! - [`telemetry`] - Logging and tracing initialization

pub mod aggregate;
pub mod anchor;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod metrics;
pub mod migrations;
pub mod proof;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{
    AggregateSnapshot, AggregateType, AggregatedProof, ConsentEvent, ConsentRecord,
    ConsentStatus, DomainEvent, EventMetadata, EventType, ProofBundle, SnapshotRef, TenantId,
    VerificationReport,
};

pub use aggregate::{AggregateRoot, AggregateState, ConsentAggregate, ConsentState};

pub use infra::{
    BundleStore, ConsentHistoryProvider, EventStore, LedgerError, Result, SqliteBundleStore,
    SqliteEventStore,
};

pub use anchor::{HttpLedgerOracle, LedgerSnapshot, OracleConfig, SnapshotOracle};

pub use proof::{GenerateOptions, ProofAggregator, ProofBundleEngine};
