use chrono::{DateTime, Utc};
use combat_types::CombatEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::RoundScore;

// ─── Round Lifecycle ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    #[default]
    Open,    // accepting events, never scored
    Scoring, // accepting events, at least one score computed
    Locked,  // frozen: event list and hash immutable
}

// ─── Round State ─────────────────────────────────────────────────────────────

/// One scored interval of a bout. Owned exclusively by the bout worker;
/// everything outside sees persisted snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundState {
    pub round_id: String,
    pub bout_id: String,
    /// 1-based
    pub round_num: u32,
    pub status: RoundStatus,
    /// Insertion order after admission — the order the event hash is built on
    #[serde(default)]
    pub events: Vec<CombatEvent>,
    // Cached from the last scoring pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<RoundScore>,
    pub opened_at: DateTime<Utc>,
    /// Bout-clock ms at open; start of the validation envelope
    pub opened_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    /// Set exactly once, at lock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_hash: Option<String>,
}

impl RoundState {
    pub fn new(bout_id: &str, round_num: u32, opened_at: DateTime<Utc>, opened_at_ms: i64) -> Self {
        Self {
            round_id: Uuid::new_v4().to_string(),
            bout_id: bout_id.to_string(),
            round_num,
            status: RoundStatus::Open,
            events: Vec::new(),
            red_score: None,
            blue_score: None,
            score_card: None,
            winner: None,
            verdict: None,
            opened_at,
            opened_at_ms,
            locked_at: None,
            event_hash: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status == RoundStatus::Locked
    }
}

// ─── Calibration ─────────────────────────────────────────────────────────────

/// Process-wide pipeline thresholds. Readers always hold a consistent
/// snapshot (copy-on-update, see `calibration.rs`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationConfig {
    // Detection thresholds
    pub kd_threshold: f64,
    pub rocked_threshold: f64,
    pub highimpact_strike_threshold: f64,
    // Timing windows (milliseconds)
    pub momentum_swing_window_ms: i64,
    pub multicam_merge_window_ms: i64,
    // Event pipeline
    pub confidence_threshold: f64,
    pub deduplication_window_ms: i64,
    // Metadata
    pub version: u64,
    pub modified_by: String,
    pub last_modified: DateTime<Utc>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            kd_threshold: 0.75,
            rocked_threshold: 0.65,
            highimpact_strike_threshold: 0.70,
            momentum_swing_window_ms: 1200,
            multicam_merge_window_ms: 150,
            confidence_threshold: 0.5,
            deduplication_window_ms: 100,
            version: 1,
            modified_by: "system".to_string(),
            last_modified: Utc::now(),
        }
    }
}

/// One recorded calibration parameter change (bounded history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationChange {
    pub timestamp: DateTime<Utc>,
    pub parameter: String,
    pub old_value: f64,
    pub new_value: f64,
    pub modified_by: String,
}
