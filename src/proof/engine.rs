//! Proof bundle engine.
//!
//! Generation builds a canonical, deterministic representation of a
//! subject's consent history, signs its SHA-512 digest with Ed25519 and
//! anchors it against the remote ledger when the oracle is reachable.
//! Verification reverses every check and fails closed on anchors:
//! an unreachable oracle invalidates a bundle that carries refs, even
//! though the same outage is tolerated during generation.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::anchor::SnapshotOracle;
use crate::crypto::{
    base64_url_encode, generate_key, generate_nonce, seal, sha512, signature_from_hex,
    signature_to_hex, BundleSigningKey, BundleVerifyingKey, AEAD_ALGORITHM,
};
use crate::domain::{
    Delegation, EncryptionEnvelope, ProofBundle, ProofType, SnapshotRef, TenantId, TimeLock,
    VerificationReport,
};
use crate::infra::{BundleStore, ConsentHistoryProvider, LedgerError, Result};
use crate::metrics::{metric_names, MetricsRegistry};

/// Load the bundle signing key from the environment.
///
/// An absent key is a hard configuration error: the engine never emits
/// unsigned or downgraded bundles.
pub fn signing_key_from_env() -> Result<BundleSigningKey> {
    let seed = std::env::var("PROOF_SIGNING_KEY").map_err(|_| LedgerError::SigningKeyMissing)?;
    BundleSigningKey::from_hex(seed.trim()).map_err(|_| {
        LedgerError::Configuration(
            "PROOF_SIGNING_KEY must be a 64-character hex Ed25519 seed".to_string(),
        )
    })
}

/// Options for bundle generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Policy scope recorded on the bundle
    pub policy_id: Option<String>,

    /// What the bundle attests to
    pub proof_type: ProofType,

    /// Optional bundle expiry
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional disclosure gate: `(unlock_at, difficulty)`
    pub time_lock: Option<(DateTime<Utc>, u32)>,

    /// Optional delegation metadata
    pub delegation: Option<Delegation>,

    /// Also store an AES-GCM-encrypted copy of the canonical payload
    pub encrypt: bool,
}

/// Generates, persists and verifies proof bundles.
pub struct ProofBundleEngine {
    signing_key: BundleSigningKey,
    oracle: Arc<dyn SnapshotOracle>,
    bundles: Arc<dyn BundleStore>,
    consents: Arc<dyn ConsentHistoryProvider>,
    metrics: Arc<MetricsRegistry>,
}

impl ProofBundleEngine {
    pub fn new(
        signing_key: BundleSigningKey,
        oracle: Arc<dyn SnapshotOracle>,
        bundles: Arc<dyn BundleStore>,
        consents: Arc<dyn ConsentHistoryProvider>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            signing_key,
            oracle,
            bundles,
            consents,
            metrics,
        }
    }

    /// Construct with the signing key from `PROOF_SIGNING_KEY`.
    pub fn from_env(
        oracle: Arc<dyn SnapshotOracle>,
        bundles: Arc<dyn BundleStore>,
        consents: Arc<dyn ConsentHistoryProvider>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let signing_key = signing_key_from_env()?;
        Ok(Self::new(signing_key, oracle, bundles, consents, metrics))
    }

    /// Public key the engine signs with, as 64 lowercase hex characters.
    pub fn public_key_hex(&self) -> String {
        self.signing_key.public_key_hex()
    }

    /// Generate, sign and persist a proof bundle for a subject.
    pub async fn generate(
        &self,
        tenant_id: &TenantId,
        subject_id: &str,
        options: GenerateOptions,
    ) -> Result<ProofBundle> {
        let started = Instant::now();
        let result = self.generate_inner(tenant_id, subject_id, options).await;

        match &result {
            Ok(_) => {
                self.metrics
                    .inc_counter(metric_names::BUNDLES_GENERATED)
                    .await
            }
            Err(_) => {
                self.metrics
                    .inc_counter(metric_names::BUNDLE_GENERATION_FAILED)
                    .await
            }
        }
        self.metrics
            .observe_histogram(
                metric_names::GENERATE_LATENCY,
                started.elapsed().as_secs_f64(),
            )
            .await;

        result
    }

    async fn generate_inner(
        &self,
        tenant_id: &TenantId,
        subject_id: &str,
        options: GenerateOptions,
    ) -> Result<ProofBundle> {
        let mut consents = self.consents.consent_history(tenant_id, subject_id).await?;
        consents.sort_by(|a, b| a.id.cmp(&b.id));

        // Anchor failure is soft here: an unanchored bundle is still a
        // valid attestation, it just carries no ledger refs.
        let snapshot_refs = match self.oracle.latest_snapshot().await {
            Ok(snapshot) => vec![SnapshotRef::from(&snapshot)],
            Err(e) => {
                warn!(subject_id, error = %e, "ledger oracle unavailable, generating unanchored bundle");
                self.metrics
                    .inc_counter(metric_names::ANCHOR_UNAVAILABLE)
                    .await;
                Vec::new()
            }
        };

        let bundle_id = Uuid::new_v4();
        let mut bundle = ProofBundle {
            bundle_id,
            tenant_id: tenant_id.clone(),
            subject_id: subject_id.to_string(),
            policy_id: options.policy_id,
            consents,
            proof_type: options.proof_type,
            data_hash: String::new(),
            signature: String::new(),
            public_key: self.signing_key.public_key_hex(),
            snapshot_refs,
            generated_at: Utc::now(),
            expires_at: options.expires_at,
            time_lock: None,
            delegation: options.delegation,
            encryption: None,
        };

        let canonical = bundle.canonical_signing_bytes()?;
        let digest = sha512(&canonical);
        bundle.data_hash = hex::encode(digest);
        bundle.signature = signature_to_hex(&self.signing_key.sign_digest(&digest));

        if let Some((unlock_at, difficulty)) = options.time_lock {
            bundle.time_lock = Some(TimeLock::new(&bundle_id, unlock_at, difficulty));
        }

        if options.encrypt {
            let key = generate_key();
            let nonce = generate_nonce();
            let ciphertext = seal(&key, &nonce, bundle_id.as_bytes(), &canonical)?;
            bundle.encryption = Some(EncryptionEnvelope {
                algorithm: AEAD_ALGORITHM.to_string(),
                key_b64u: base64_url_encode(&key),
                nonce_b64u: base64_url_encode(&nonce),
                ciphertext_b64u: base64_url_encode(&ciphertext),
            });
        }

        self.bundles.put_bundle(&bundle).await?;

        info!(
            bundle_id = %bundle.bundle_id,
            subject_id,
            consents = bundle.consents.len(),
            anchored = !bundle.snapshot_refs.is_empty(),
            "proof bundle generated"
        );

        Ok(bundle)
    }

    /// Verify a bundle against its signature, anchors, expiry and
    /// time-lock. Always returns a structured report, never an error:
    /// data-shaped problems become issues on the report.
    pub async fn verify(&self, bundle: &ProofBundle) -> VerificationReport {
        let started = Instant::now();
        let report = self.verify_inner(bundle).await;

        let counter = if report.valid {
            metric_names::VERIFICATIONS_VALID
        } else {
            metric_names::VERIFICATIONS_INVALID
        };
        self.metrics.inc_counter(counter).await;
        self.metrics
            .observe_histogram(
                metric_names::VERIFY_LATENCY,
                started.elapsed().as_secs_f64(),
            )
            .await;

        report
    }

    async fn verify_inner(&self, bundle: &ProofBundle) -> VerificationReport {
        // A malformed signature short-circuits everything else.
        let signature = match signature_from_hex(&bundle.signature) {
            Ok(signature) => signature,
            Err(_) => {
                return VerificationReport::new(
                    bundle.bundle_id,
                    vec!["malformed signature: expected 128 hex characters".to_string()],
                );
            }
        };

        let mut issues = Vec::new();

        match bundle.canonical_signing_bytes() {
            Ok(canonical) => {
                let digest = sha512(&canonical);
                if hex::encode(digest) != bundle.data_hash {
                    issues.push("data hash does not match canonical content".to_string());
                }

                match BundleVerifyingKey::from_hex(&bundle.public_key) {
                    Ok(key) => {
                        if key.verify(&digest, &signature).is_err() {
                            issues.push("signature verification failed".to_string());
                        }
                    }
                    Err(_) => {
                        issues.push("malformed public key: expected 64 hex characters".to_string())
                    }
                }
            }
            Err(e) => issues.push(format!("cannot canonicalize bundle: {e}")),
        }

        // Anchor checks fail closed: an unconfirmable ref is as bad as a
        // mismatched one.
        for snapshot_ref in &bundle.snapshot_refs {
            match self.oracle.snapshot_at(snapshot_ref.ordinal).await {
                Ok(Some(snapshot)) => {
                    if snapshot.hash != snapshot_ref.hash {
                        issues.push(format!(
                            "snapshot {} hash mismatch: bundle has {}, ledger reports {}",
                            snapshot_ref.ordinal, snapshot_ref.hash, snapshot.hash
                        ));
                    }
                }
                Ok(None) => issues.push(format!(
                    "snapshot {} not found on ledger",
                    snapshot_ref.ordinal
                )),
                Err(e) => issues.push(format!(
                    "ledger oracle unavailable, cannot confirm anchor {}: {e}",
                    snapshot_ref.ordinal
                )),
            }
        }

        let now = Utc::now();
        if let Some(expires_at) = bundle.expires_at {
            if now >= expires_at {
                issues.push(format!("bundle expired at {expires_at}"));
            }
        }
        if let Some(lock) = &bundle.time_lock {
            if lock.is_locked(now) {
                issues.push(format!("bundle time-locked until {}", lock.unlock_at));
            }
        }

        VerificationReport::new(bundle.bundle_id, issues)
    }
}
