//! # persistence
//!
//! The two storage surfaces the pipeline needs: round state keyed by
//! `round_id`, and the append-only audit log indexed by bout. Nothing else is
//! persisted. Transient failures are retried up to 3 times with exponential
//! backoff before the error reaches the caller, who rolls back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::audit::AuditLogEntry;
use crate::state::{CalibrationConfig, RoundState};

const MAX_ATTEMPTS: u32 = 3;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Retryable (I/O hiccup, contention); retried internally before surfacing
    #[error("transient storage failure: {0}")]
    Transient(String),
    /// Not retryable (corrupt document, missing directory permissions)
    #[error("permanent storage failure: {0}")]
    Permanent(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent(err.to_string())
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Storage backend. Enum dispatch rather than a trait object: exactly two
/// implementations exist and the bout worker holds the store by value.
#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    File(FileStore),
}

impl Store {
    pub fn in_memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn put_round(&self, round: &RoundState) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            let result = match self {
                Self::Memory(store) => store.put_round(round).await,
                Self::File(store) => store.put_round(round).await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    warn!("put_round retry {}: {err}", attempt + 1);
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn get_round(&self, round_id: &str) -> Result<Option<RoundState>, StorageError> {
        match self {
            Self::Memory(store) => store.get_round(round_id).await,
            Self::File(store) => store.get_round(round_id).await,
        }
    }

    pub async fn list_rounds(&self, bout_id: &str) -> Result<Vec<RoundState>, StorageError> {
        let mut rounds = match self {
            Self::Memory(store) => store.list_rounds(bout_id).await?,
            Self::File(store) => store.list_rounds(bout_id).await?,
        };
        rounds.sort_by_key(|r| r.round_num);
        Ok(rounds)
    }

    pub async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            let result = match self {
                Self::Memory(store) => store.append_audit(entry).await,
                Self::File(store) => store.append_audit(entry).await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    warn!("append_audit retry {}: {err}", attempt + 1);
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn audit_for_bout(&self, bout_id: &str) -> Result<Vec<AuditLogEntry>, StorageError> {
        match self {
            Self::Memory(store) => store.audit_for_bout(bout_id).await,
            Self::File(store) => store.audit_for_bout(bout_id).await,
        }
    }

    pub async fn get_audit(&self, log_id: &str) -> Result<Option<AuditLogEntry>, StorageError> {
        match self {
            Self::Memory(store) => store.get_audit(log_id).await,
            Self::File(store) => store.get_audit(log_id).await,
        }
    }

    pub async fn put_calibration(&self, config: &CalibrationConfig) -> Result<(), StorageError> {
        match self {
            Self::Memory(store) => store.put_calibration(config).await,
            Self::File(store) => store.put_calibration(config).await,
        }
    }

    pub async fn get_calibration(&self) -> Result<Option<CalibrationConfig>, StorageError> {
        match self {
            Self::Memory(store) => store.get_calibration().await,
            Self::File(store) => store.get_calibration().await,
        }
    }
}

async fn backoff(attempt: u32) {
    tokio::time::sleep(Duration::from_millis(50 * 2u64.pow(attempt))).await;
}

// ── Memory Store ──────────────────────────────────────────────────────────────

/// Default store for tests and local runs. Supports injected transient
/// failures so retry/rollback paths are testable.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rounds: Arc<RwLock<HashMap<String, RoundState>>>,
    audit: Arc<RwLock<Vec<AuditLogEntry>>>,
    calibration: Arc<RwLock<Option<CalibrationConfig>>>,
    fail_writes: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a transient error.
    pub fn inject_transient_failures(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    fn check_injected_failure(&self) -> Result<(), StorageError> {
        let remaining = self.fail_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Transient("injected failure".to_string()));
        }
        Ok(())
    }

    async fn put_round(&self, round: &RoundState) -> Result<(), StorageError> {
        self.check_injected_failure()?;
        self.rounds
            .write()
            .await
            .insert(round.round_id.clone(), round.clone());
        Ok(())
    }

    async fn get_round(&self, round_id: &str) -> Result<Option<RoundState>, StorageError> {
        Ok(self.rounds.read().await.get(round_id).cloned())
    }

    async fn list_rounds(&self, bout_id: &str) -> Result<Vec<RoundState>, StorageError> {
        Ok(self
            .rounds
            .read()
            .await
            .values()
            .filter(|r| r.bout_id == bout_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StorageError> {
        self.check_injected_failure()?;
        self.audit.write().await.push(entry.clone());
        Ok(())
    }

    async fn audit_for_bout(&self, bout_id: &str) -> Result<Vec<AuditLogEntry>, StorageError> {
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .filter(|e| e.bout_id == bout_id)
            .cloned()
            .collect())
    }

    async fn get_audit(&self, log_id: &str) -> Result<Option<AuditLogEntry>, StorageError> {
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .find(|e| e.log_id == log_id)
            .cloned())
    }

    async fn put_calibration(&self, config: &CalibrationConfig) -> Result<(), StorageError> {
        self.check_injected_failure()?;
        *self.calibration.write().await = Some(config.clone());
        Ok(())
    }

    async fn get_calibration(&self) -> Result<Option<CalibrationConfig>, StorageError> {
        Ok(self.calibration.read().await.clone())
    }
}

// ── File Store ────────────────────────────────────────────────────────────────

/// JSON-on-disk store: one document per round, one append-only JSONL audit
/// file per bout, one calibration document.
#[derive(Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join("rounds")).await?;
        fs::create_dir_all(data_dir.join("audit")).await?;
        Ok(Self { data_dir })
    }

    fn round_path(&self, round_id: &str) -> PathBuf {
        self.data_dir.join("rounds").join(format!("{round_id}.json"))
    }

    fn audit_path(&self, bout_id: &str) -> PathBuf {
        self.data_dir.join("audit").join(format!("{bout_id}.jsonl"))
    }

    async fn put_round(&self, round: &RoundState) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(round)?;
        fs::write(self.round_path(&round.round_id), json).await?;
        Ok(())
    }

    async fn get_round(&self, round_id: &str) -> Result<Option<RoundState>, StorageError> {
        let path = self.round_path(round_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn list_rounds(&self, bout_id: &str) -> Result<Vec<RoundState>, StorageError> {
        let mut rounds = Vec::new();
        let mut dir = fs::read_dir(self.data_dir.join("rounds")).await?;
        while let Some(entry) = dir.next_entry().await? {
            let data = fs::read_to_string(entry.path()).await?;
            match serde_json::from_str::<RoundState>(&data) {
                Ok(round) if round.bout_id == bout_id => rounds.push(round),
                Ok(_) => {}
                Err(err) => warn!("skipping unreadable round file {:?}: {err}", entry.path()),
            }
        }
        Ok(rounds)
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StorageError> {
        let line = format!("{}\n", serde_json::to_string(entry)?);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.audit_path(&entry.bout_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn audit_for_bout(&self, bout_id: &str) -> Result<Vec<AuditLogEntry>, StorageError> {
        let path = self.audit_path(bout_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(path).await?;
        let mut entries = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    async fn get_audit(&self, log_id: &str) -> Result<Option<AuditLogEntry>, StorageError> {
        let mut dir = fs::read_dir(self.data_dir.join("audit")).await?;
        while let Some(file) = dir.next_entry().await? {
            let data = fs::read_to_string(file.path()).await?;
            for line in data.lines().filter(|l| !l.trim().is_empty()) {
                let entry: AuditLogEntry = serde_json::from_str(line)?;
                if entry.log_id == log_id {
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    async fn put_calibration(&self, config: &CalibrationConfig) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(config)?;
        fs::write(self.data_dir.join("calibration.json"), json).await?;
        Ok(())
    }

    async fn get_calibration(&self) -> Result<Option<CalibrationConfig>, StorageError> {
        let path = self.data_dir.join("calibration.json");
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}
