//! # pipeline
//!
//! Admission gate and derived-event synthesis for harmonized events:
//! confidence filtering, same-fighter/same-type temporal deduplication,
//! multi-camera fusion by angle-weighted confidence, and flurry-based
//! momentum-swing synthesis. One pipeline instance per bout, owned by the
//! bout worker.

use chrono::{DateTime, Utc};
use combat_types::{CombatEvent, Corner, EventMetadata, EventSource, EventType};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::CalibrationConfig;

/// Dedup scans at most this many recent admissions.
const DEDUP_SCAN_DEPTH: usize = 50;
/// Admitted-event ring bound; older events are trimmed to cap memory.
const ADMITTED_RING_LIMIT: usize = 1000;
/// Strikes needed inside the momentum window to call a flurry.
const MOMENTUM_STRIKE_THRESHOLD: usize = 3;

// ── Rejection ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionRejection {
    #[error("low confidence: {confidence:.2} < {threshold:.2}")]
    LowConfidence { confidence: f64, threshold: f64 },
    #[error("duplicate event within {window_ms}ms window")]
    Duplicate { window_ms: i64 },
}

impl AdmissionRejection {
    /// Machine-readable reason code carried into audit entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LowConfidence { .. } => "LOW_CONFIDENCE",
            Self::Duplicate { .. } => "DUPLICATE",
        }
    }
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineStats {
    pub total_admitted: u64,
    pub rejected_low_confidence: u64,
    pub rejected_duplicates: u64,
    pub multicam_fusions: u64,
    pub momentum_swings_detected: u64,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct IngestPipeline {
    admitted: Vec<CombatEvent>,
    stats: PipelineStats,
}

impl IngestPipeline {
    pub fn new() -> Self {
        Self {
            admitted: Vec::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Decide whether a harmonized event enters the round. On success the
    /// event comes back with its pipeline flags set.
    pub fn admit(
        &mut self,
        mut event: CombatEvent,
        config: &CalibrationConfig,
        processed_at: DateTime<Utc>,
    ) -> Result<CombatEvent, AdmissionRejection> {
        if event.confidence < config.confidence_threshold {
            self.stats.rejected_low_confidence += 1;
            return Err(AdmissionRejection::LowConfidence {
                confidence: event.confidence,
                threshold: config.confidence_threshold,
            });
        }

        if self.is_duplicate(&event, config.deduplication_window_ms) {
            self.stats.rejected_duplicates += 1;
            return Err(AdmissionRejection::Duplicate {
                window_ms: config.deduplication_window_ms,
            });
        }

        event.deduplicated = true;
        event.processed_at = Some(processed_at);

        self.admitted.push(event.clone());
        if self.admitted.len() > ADMITTED_RING_LIMIT {
            let overflow = self.admitted.len() - ADMITTED_RING_LIMIT;
            self.admitted.drain(..overflow);
        }
        self.stats.total_admitted += 1;
        Ok(event)
    }

    /// Undo the most recent admission (storage rollback path). No-op unless
    /// the given event is in fact the latest admission.
    pub fn rollback(&mut self, event_id: &str) {
        if self.admitted.last().map(|e| e.event_id.as_str()) == Some(event_id) {
            self.admitted.pop();
            self.stats.total_admitted -= 1;
        }
    }

    fn is_duplicate(&self, event: &CombatEvent, window_ms: i64) -> bool {
        for processed in self.admitted.iter().rev().take(DEDUP_SCAN_DEPTH) {
            if processed.corner == event.corner && processed.event_type == event.event_type {
                let time_diff = (event.timestamp_ms - processed.timestamp_ms).abs();
                if time_diff < window_ms {
                    debug!(
                        "duplicate {} for {} within {time_diff}ms",
                        event.event_type.as_str(),
                        event.corner.as_str()
                    );
                    return true;
                }
            }
        }
        false
    }

    // ── Multi-camera fusion ───────────────────────────────────────────────────

    /// Fuse a batch of events into canonical events. Consecutive similar
    /// events (same corner + type) within the merge window of the group head
    /// form a group; a non-similar event closes the group. The group winner
    /// is the highest `confidence × angle_weight` and is tagged canonical;
    /// the rest drop from the canonical sequence (they stay in the audit
    /// trail from admission).
    pub fn fuse_multicamera(&mut self, events: Vec<CombatEvent>, merge_window_ms: i64) -> Vec<CombatEvent> {
        if events.is_empty() {
            return Vec::new();
        }

        let mut sorted = events;
        sorted.sort_by_key(|e| e.timestamp_ms);

        let mut groups: Vec<Vec<CombatEvent>> = Vec::new();
        let mut current: Vec<CombatEvent> = vec![sorted.remove(0)];

        for event in sorted {
            let head = &current[0];
            let in_window = event.timestamp_ms - head.timestamp_ms < merge_window_ms;
            let similar = event.corner == head.corner && event.event_type == head.event_type;
            if in_window && similar {
                current.push(event);
            } else {
                groups.push(std::mem::replace(&mut current, vec![event]));
            }
        }
        groups.push(current);

        let mut canonical_events = Vec::with_capacity(groups.len());
        for group in groups {
            if group.len() == 1 {
                canonical_events.extend(group);
            } else if let Some(mut winner) = select_canonical(group) {
                winner.canonical = true;
                info!(
                    "multicam fusion: {} for {} → canonical {}",
                    winner.event_type.as_str(),
                    winner.corner.as_str(),
                    winner.event_id
                );
                canonical_events.push(winner);
                self.stats.multicam_fusions += 1;
            }
        }
        canonical_events
    }

    // ── Momentum-swing synthesis ──────────────────────────────────────────────

    /// Scan one fighter's striking events for flurries: ≥3 strikes inside the
    /// momentum window synthesize one MOMENTUM_SWING event, then the cursor
    /// skips past the window so flurries do not overlap.
    pub fn detect_momentum_swings(
        &mut self,
        events: &[CombatEvent],
        corner: Corner,
        config: &CalibrationConfig,
    ) -> Vec<CombatEvent> {
        let mut strikes: Vec<&CombatEvent> = events
            .iter()
            .filter(|e| e.corner == corner && e.event_type.is_momentum_trigger())
            .collect();
        if strikes.len() < MOMENTUM_STRIKE_THRESHOLD {
            return Vec::new();
        }
        strikes.sort_by_key(|e| e.timestamp_ms);

        let mut swings = Vec::new();
        let mut i = 0;
        while i + MOMENTUM_STRIKE_THRESHOLD <= strikes.len() {
            let window = &strikes[i..i + MOMENTUM_STRIKE_THRESHOLD];
            let time_span = window[window.len() - 1].timestamp_ms - window[0].timestamp_ms;

            if time_span < config.momentum_swing_window_ms {
                let avg_severity = window.iter().map(|e| e.severity).sum::<f64>() / window.len() as f64;
                let avg_confidence = window.iter().map(|e| e.confidence).sum::<f64>() / window.len() as f64;

                swings.push(CombatEvent {
                    event_id: Uuid::new_v4().to_string(),
                    bout_id: window[0].bout_id.clone(),
                    round_id: window[0].round_id.clone(),
                    corner,
                    event_type: EventType::MomentumSwing,
                    severity: (avg_severity * 1.2).min(1.0),
                    confidence: avg_confidence,
                    timestamp_ms: window[window.len() - 1].timestamp_ms,
                    source: EventSource::AnalyticsDerived,
                    camera_id: None,
                    angle_degrees: None,
                    metadata: EventMetadata {
                        strikes_in_flurry: Some(window.len() as u32),
                        time_span_ms: Some(time_span),
                        trigger: Some("flurry".to_string()),
                        ..EventMetadata::default()
                    },
                    deduplicated: false,
                    canonical: false,
                    processed_at: None,
                });
                self.stats.momentum_swings_detected += 1;
                i += MOMENTUM_STRIKE_THRESHOLD;
            } else {
                i += 1;
            }
        }
        swings
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Front/back camera arcs see the action square-on and are trusted more.
fn angle_weight(angle: Option<f64>) -> f64 {
    match angle {
        None => 0.8,
        Some(a) => {
            let a = a.rem_euclid(360.0);
            if (45.0..=135.0).contains(&a) || (225.0..=315.0).contains(&a) {
                1.0
            } else {
                0.7
            }
        }
    }
}

fn select_canonical(group: Vec<CombatEvent>) -> Option<CombatEvent> {
    let mut best_score = f64::MIN;
    let mut best: Option<CombatEvent> = None;
    for event in group {
        let score = event.confidence * angle_weight(event.angle_degrees);
        if score > best_score {
            best_score = score;
            best = Some(event);
        }
    }
    best
}
