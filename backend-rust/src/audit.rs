//! # audit
//!
//! SHA-256 signed append-only audit log.
//!
//! Every pipeline action (round open, event admit/reject, score, lock,
//! validation, calibration change) is appended as a signed entry. The
//! signature covers the entry's identifying fields over the canonical JSON of
//! `hashing.rs`; tampering with any stored field makes `verify` fail.
//!
//! ## Invariant
//! Entries are never updated or deleted. Writers are serialized per bout so
//! timestamp order matches insertion order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::hashing;
use crate::persistence::{StorageError, Store};

// ── Audit Actions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RoundOpened,
    EventAdmitted,
    EventRejected,
    ScoreComputed,
    RoundLocked,
    ValidationRun,
    ConfigChanged,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

// ── Audit Entry ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub log_id: String,
    pub bout_id: String,
    pub round_id: String,
    pub action: AuditAction,
    /// Opaque caller identity; access policy lives outside the pipeline
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    /// SHA-256 over the canonical JSON of the fields above (minus log_id)
    pub signature: String,
}

impl AuditLogEntry {
    fn signature_payload(&self) -> serde_json::Value {
        json!({
            "bout_id": self.bout_id,
            "round_id": self.round_id,
            "action": self.action,
            "actor": self.actor,
            "timestamp": hashing::iso_millis(self.timestamp),
            "data": self.data,
        })
    }

    /// Recompute the signature from stored fields and compare.
    pub fn verify(&self) -> bool {
        hashing::sign_payload(&self.signature_payload()) == self.signature
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit entry not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ── Export Bundle ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditBundle {
    pub bout_id: String,
    pub export_timestamp: DateTime<Utc>,
    pub total_entries: usize,
    pub entries: Vec<AuditLogEntry>,
    pub worm_compliant: bool,
    pub signature_algorithm: String,
}

// ── Audit Log ─────────────────────────────────────────────────────────────────

/// Append-only signed audit log over the storage layer.
#[derive(Clone)]
pub struct AuditLog {
    store: Store,
    // Serializes appends so stored timestamp order equals insertion order
    write_lock: Arc<Mutex<()>>,
}

impl AuditLog {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append one signed entry. This is the single write path.
    pub async fn log(
        &self,
        bout_id: &str,
        round_id: &str,
        action: AuditAction,
        actor: &str,
        data: serde_json::Value,
    ) -> Result<AuditLogEntry, AuditError> {
        let _guard = self.write_lock.lock().await;

        let mut entry = AuditLogEntry {
            log_id: Uuid::new_v4().to_string(),
            bout_id: bout_id.to_string(),
            round_id: round_id.to_string(),
            action,
            actor: actor.to_string(),
            timestamp: Utc::now(),
            data,
            signature: String::new(),
        };
        entry.signature = hashing::sign_payload(&entry.signature_payload());
        debug_assert!(entry.verify(), "audit signature mismatch immediately after signing");

        self.store.append_audit(&entry).await?;
        info!("audit: {} by {} (bout {bout_id})", entry.action, entry.actor);
        Ok(entry)
    }

    /// Recompute a stored entry's signature and compare for exact equality.
    pub async fn verify(&self, log_id: &str) -> Result<bool, AuditError> {
        let entry = self
            .store
            .get_audit(log_id)
            .await?
            .ok_or_else(|| AuditError::NotFound(log_id.to_string()))?;
        Ok(entry.verify())
    }

    /// All entries for a bout ordered by timestamp, with export metadata.
    pub async fn export_bundle(&self, bout_id: &str) -> Result<AuditBundle, AuditError> {
        let mut entries = self.store.audit_for_bout(bout_id).await?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(AuditBundle {
            bout_id: bout_id.to_string(),
            export_timestamp: Utc::now(),
            total_entries: entries.len(),
            entries,
            worm_compliant: true,
            signature_algorithm: "SHA-256".to_string(),
        })
    }
}
