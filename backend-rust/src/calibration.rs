//! # calibration
//!
//! Owner of the process-wide `CalibrationConfig`. Readers take a cheap
//! `Arc` snapshot; updates build a new config, persist it, swap the pointer,
//! audit the change and broadcast it on the bus. Writers serialize behind the
//! swap lock.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::audit::{AuditAction, AuditError, AuditLog};
use crate::bus::{BusMessage, FanoutBus, MessageType, Topic, GLOBAL_SCOPE};
use crate::persistence::{StorageError, Store};
use crate::state::{CalibrationChange, CalibrationConfig};

const HISTORY_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

#[derive(Clone)]
pub struct CalibrationCoordinator {
    snapshot: Arc<RwLock<Arc<CalibrationConfig>>>,
    history: Arc<RwLock<Vec<CalibrationChange>>>,
    store: Store,
    bus: FanoutBus,
    audit: AuditLog,
}

impl CalibrationCoordinator {
    /// Restore the persisted config, or start from defaults.
    pub async fn load(store: Store, bus: FanoutBus, audit: AuditLog) -> Result<Self, CalibrationError> {
        let config = store.get_calibration().await?.unwrap_or_default();
        Ok(Self {
            snapshot: Arc::new(RwLock::new(Arc::new(config))),
            history: Arc::new(RwLock::new(Vec::new())),
            store,
            bus,
            audit,
        })
    }

    /// Consistent snapshot of the active config.
    pub fn current(&self) -> Arc<CalibrationConfig> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply a new config: persist, swap, audit, broadcast. On a storage
    /// failure nothing is swapped and readers keep the old snapshot.
    pub async fn update(
        &self,
        mut config: CalibrationConfig,
        modified_by: &str,
    ) -> Result<Arc<CalibrationConfig>, CalibrationError> {
        let old = self.current();

        let changes = diff_configs(&old, &config, modified_by);
        config.version = old.version + 1;
        config.modified_by = modified_by.to_string();
        config.last_modified = Utc::now();

        self.store.put_calibration(&config).await?;

        let next = Arc::new(config);
        {
            let mut slot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
            *slot = next.clone();
        }
        {
            let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
            history.extend(changes.iter().cloned());
            let overflow = history.len().saturating_sub(HISTORY_LIMIT);
            if overflow > 0 {
                history.drain(..overflow);
            }
        }

        let change_count = changes.len();
        self.audit
            .log(
                GLOBAL_SCOPE,
                "",
                AuditAction::ConfigChanged,
                modified_by,
                json!({
                    "version": next.version,
                    "changes": changes,
                }),
            )
            .await?;

        self.bus.publish_global(
            Topic::ConfigUpdates,
            BusMessage::new(
                MessageType::ConfigUpdate,
                GLOBAL_SCOPE,
                None,
                Utc::now(),
                serde_json::to_value(next.as_ref()).unwrap_or_default(),
            ),
        );

        info!(
            "calibration v{} applied by {modified_by} ({change_count} parameter changes)",
            next.version
        );
        Ok(next)
    }

    pub fn history(&self, limit: usize) -> Vec<CalibrationChange> {
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(limit);
        history[skip..].to_vec()
    }
}

fn diff_configs(old: &CalibrationConfig, new: &CalibrationConfig, modified_by: &str) -> Vec<CalibrationChange> {
    let now = Utc::now();
    let mut changes = Vec::new();
    let mut record = |parameter: &str, old_value: f64, new_value: f64| {
        if (old_value - new_value).abs() > f64::EPSILON {
            changes.push(CalibrationChange {
                timestamp: now,
                parameter: parameter.to_string(),
                old_value,
                new_value,
                modified_by: modified_by.to_string(),
            });
        }
    };
    record("kd_threshold", old.kd_threshold, new.kd_threshold);
    record("rocked_threshold", old.rocked_threshold, new.rocked_threshold);
    record(
        "highimpact_strike_threshold",
        old.highimpact_strike_threshold,
        new.highimpact_strike_threshold,
    );
    record(
        "momentum_swing_window_ms",
        old.momentum_swing_window_ms as f64,
        new.momentum_swing_window_ms as f64,
    );
    record(
        "multicam_merge_window_ms",
        old.multicam_merge_window_ms as f64,
        new.multicam_merge_window_ms as f64,
    );
    record("confidence_threshold", old.confidence_threshold, new.confidence_threshold);
    record(
        "deduplication_window_ms",
        old.deduplication_window_ms as f64,
        new.deduplication_window_ms as f64,
    );
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Topic;

    async fn coordinator(store: Store) -> (CalibrationCoordinator, FanoutBus) {
        let bus = FanoutBus::new();
        let audit = AuditLog::new(store.clone());
        let coord = CalibrationCoordinator::load(store, bus.clone(), audit)
            .await
            .unwrap();
        (coord, bus)
    }

    #[tokio::test]
    async fn update_bumps_version_and_broadcasts() {
        let (coord, bus) = coordinator(Store::in_memory()).await;
        let mut sub = bus.subscribe_global(Topic::ConfigUpdates);

        let mut config = CalibrationConfig::default();
        config.confidence_threshold = 0.65;
        let applied = coord.update(config, "supervisor-7").await.unwrap();

        assert_eq!(applied.version, 2);
        assert_eq!(applied.modified_by, "supervisor-7");
        assert!((coord.current().confidence_threshold - 0.65).abs() < f64::EPSILON);

        let msg = sub.rx.recv().await.unwrap();
        assert_eq!(msg.data["confidence_threshold"], 0.65);

        let history = coord.history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].parameter, "confidence_threshold");
    }

    #[tokio::test]
    async fn failed_persist_keeps_old_snapshot() {
        let memory = MemoryStoreHandle::new();
        let (coord, _bus) = coordinator(memory.store()).await;
        memory.inject(5);

        let mut config = CalibrationConfig::default();
        config.confidence_threshold = 0.9;
        let err = coord.update(config, "supervisor-7").await;
        assert!(err.is_err());
        assert!((coord.current().confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(coord.current().version, 1);
    }

    /// Small helper keeping a handle on the memory store to inject failures.
    struct MemoryStoreHandle(crate::persistence::MemoryStore);

    impl MemoryStoreHandle {
        fn new() -> Self {
            Self(crate::persistence::MemoryStore::new())
        }
        fn store(&self) -> Store {
            Store::Memory(self.0.clone())
        }
        fn inject(&self, n: u32) {
            self.0.inject_transient_failures(n);
        }
    }
}
