//! # context
//!
//! `PipelineContext` bundles the shared services every component needs —
//! storage, bus, audit log, calibration, clock — and is passed explicitly
//! into constructors. No process-wide singletons: two contexts are two fully
//! isolated pipelines, which is what both multi-bout isolation and tests
//! want.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::audit::AuditLog;
use crate::bus::FanoutBus;
use crate::calibration::{CalibrationCoordinator, CalibrationError};
use crate::persistence::Store;
use crate::round_manager::BoutHandle;
use crate::timesvc::UnifiedClock;

#[derive(Clone)]
pub struct PipelineContext {
    pub store: Store,
    pub bus: FanoutBus,
    pub audit: AuditLog,
    pub calibration: CalibrationCoordinator,
    pub clock: UnifiedClock,
}

impl PipelineContext {
    pub async fn new(store: Store, clock: UnifiedClock) -> Result<Self, CalibrationError> {
        let bus = FanoutBus::new();
        let audit = AuditLog::new(store.clone());
        let calibration = CalibrationCoordinator::load(store.clone(), bus.clone(), audit.clone()).await?;
        Ok(Self { store, bus, audit, calibration, clock })
    }

    /// Fully in-memory context (tests, local development).
    pub async fn in_memory() -> Result<Self, CalibrationError> {
        Self::new(Store::in_memory(), UnifiedClock::new()).await
    }
}

/// Registry of per-bout workers. Each bout gets exactly one worker task; all
/// mutating operations on its rounds serialize through that worker while
/// separate bouts proceed in parallel.
#[derive(Clone)]
pub struct BoutSupervisor {
    ctx: PipelineContext,
    workers: Arc<Mutex<HashMap<String, BoutHandle>>>,
}

impl BoutSupervisor {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Handle for a bout, spawning its worker on first use.
    pub async fn bout(&self, bout_id: &str) -> BoutHandle {
        let mut workers = self.workers.lock().await;
        workers
            .entry(bout_id.to_string())
            .or_insert_with(|| BoutHandle::spawn(bout_id, self.ctx.clone()))
            .clone()
    }

    pub async fn active_bouts(&self) -> usize {
        self.workers.lock().await.len()
    }
}
