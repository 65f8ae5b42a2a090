//! # timesvc
//!
//! Unified monotonic clock and per-bout round timer.
//!
//! Every timestamp that ends up in an event hash or a validation envelope
//! comes from here. Replay/import paths pass explicit timestamps instead and
//! are marked as such at their call sites.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

// ── Unified Clock ─────────────────────────────────────────────────────────────

/// Monotonic bout clock. `now_ms()` never goes backwards; the wall-clock side
/// is only used for display timestamps and audit entry times.
#[derive(Clone)]
pub struct UnifiedClock {
    anchor: Instant,
    /// Bout-clock offset at the anchor, in ms. Tests pin this to position the
    /// clock inside a synthetic round.
    base_ms: Arc<AtomicI64>,
}

impl UnifiedClock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            base_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Clock starting at a given bout-clock offset (test and replay setup).
    pub fn starting_at(base_ms: i64) -> Self {
        Self {
            anchor: Instant::now(),
            base_ms: Arc::new(AtomicI64::new(base_ms)),
        }
    }

    /// Milliseconds since bout-clock zero.
    pub fn now_ms(&self) -> i64 {
        self.base_ms.load(Ordering::Relaxed) + self.anchor.elapsed().as_millis() as i64
    }

    /// Wall-clock time for audit entries and bus message stamps.
    pub fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Re-anchor the bout clock (operator resync between rounds).
    pub fn rebase(&self, base_ms: i64) {
        let elapsed = self.anchor.elapsed().as_millis() as i64;
        self.base_ms.store(base_ms - elapsed, Ordering::Relaxed);
    }
}

impl Default for UnifiedClock {
    fn default() -> Self {
        Self::new()
    }
}

// ── Round Timer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TimerState {
    pub running: bool,
    pub elapsed_ms: i64,
}

/// Pull-based round timer. `start` resumes from the paused elapsed; `reset`
/// zeroes and stops. No background ticker — elapsed is computed on read.
pub struct RoundTimer {
    accumulated_ms: i64,
    started_at: Option<Instant>,
}

impl RoundTimer {
    pub fn new() -> Self {
        Self {
            accumulated_ms: 0,
            started_at: None,
        }
    }

    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.accumulated_ms += started.elapsed().as_millis() as i64;
        }
    }

    pub fn reset(&mut self) {
        self.accumulated_ms = 0;
        self.started_at = None;
    }

    pub fn state(&self) -> TimerState {
        let running_ms = self
            .started_at
            .map(|s| s.elapsed().as_millis() as i64)
            .unwrap_or(0);
        TimerState {
            running: self.started_at.is_some(),
            elapsed_ms: self.accumulated_ms + running_ms,
        }
    }
}

impl Default for RoundTimer {
    fn default() -> Self {
        Self::new()
    }
}
