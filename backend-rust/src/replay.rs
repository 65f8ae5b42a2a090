//! # replay
//!
//! Post-hoc round timeline reconstruction for supervisor consoles. Read-only
//! over persisted state; every timestamp here comes from the stored events,
//! never from the live clock.

use combat_types::{Corner, EventSource, EventType};
use serde::{Deserialize, Serialize};

use crate::hashing;
use crate::persistence::{StorageError, Store};
use crate::scoring::Verdict;
use crate::state::RoundStatus;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("round not found: {0}")]
    RoundNotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Milliseconds from the first event of the round
    pub offset_ms: i64,
    pub timestamp_ms: i64,
    pub corner: Corner,
    pub event_type: EventType,
    pub source: EventSource,
    pub severity: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTimeline {
    pub round_id: String,
    pub bout_id: String,
    pub round_num: u32,
    pub status: RoundStatus,
    pub entries: Vec<TimelineEntry>,
    pub judge_events: usize,
    pub cv_events: usize,
    pub analytics_events: usize,
    pub red_events: usize,
    pub blue_events: usize,
    /// Frozen verdict, if the round was scored
    pub verdict: Option<Verdict>,
    /// For locked rounds: does the stored event hash still reproduce?
    pub hash_intact: Option<bool>,
}

/// Rebuild a round's timeline from storage.
pub async fn reconstruct_timeline(store: &Store, round_id: &str) -> Result<RoundTimeline, ReplayError> {
    let round = store
        .get_round(round_id)
        .await?
        .ok_or_else(|| ReplayError::RoundNotFound(round_id.to_string()))?;

    let mut events = round.events.clone();
    events.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });

    let round_start = events.first().map(|e| e.timestamp_ms).unwrap_or(0);
    let entries: Vec<TimelineEntry> = events
        .iter()
        .map(|e| TimelineEntry {
            offset_ms: e.timestamp_ms - round_start,
            timestamp_ms: e.timestamp_ms,
            corner: e.corner,
            event_type: e.event_type,
            source: e.source,
            severity: e.severity,
            confidence: e.confidence,
        })
        .collect();

    let hash_intact = round
        .event_hash
        .as_ref()
        .map(|stored| &hashing::event_hash(&round.events) == stored);

    Ok(RoundTimeline {
        round_id: round.round_id.clone(),
        bout_id: round.bout_id.clone(),
        round_num: round.round_num,
        status: round.status,
        judge_events: events.iter().filter(|e| e.source == EventSource::JudgeManual).count(),
        cv_events: events.iter().filter(|e| e.source == EventSource::CvSystem).count(),
        analytics_events: events
            .iter()
            .filter(|e| e.source == EventSource::AnalyticsDerived)
            .count(),
        red_events: events.iter().filter(|e| e.corner == Corner::Red).count(),
        blue_events: events.iter().filter(|e| e.corner == Corner::Blue).count(),
        entries,
        verdict: round.verdict.as_ref().map(|v| v.verdict.clone()),
        hash_intact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RoundState;
    use chrono::Utc;
    use combat_types::{CombatEvent, EventMetadata};

    fn event(corner: Corner, source: EventSource, ts: i64) -> CombatEvent {
        CombatEvent {
            event_id: format!("e-{ts}"),
            bout_id: "b1".into(),
            round_id: "r1".into(),
            corner,
            event_type: EventType::StrikeJab,
            severity: 0.5,
            confidence: 0.9,
            timestamp_ms: ts,
            source,
            camera_id: None,
            angle_degrees: None,
            metadata: EventMetadata::default(),
            deduplicated: true,
            canonical: false,
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn timeline_orders_and_tallies() {
        let store = Store::in_memory();
        let mut round = RoundState::new("b1", 2, Utc::now(), 0);
        round.events = vec![
            event(Corner::Blue, EventSource::CvSystem, 30_000),
            event(Corner::Red, EventSource::JudgeManual, 10_000),
            event(Corner::Red, EventSource::AnalyticsDerived, 20_000),
        ];
        store.put_round(&round).await.unwrap();

        let timeline = reconstruct_timeline(&store, &round.round_id).await.unwrap();
        assert_eq!(timeline.entries.len(), 3);
        assert_eq!(timeline.entries[0].offset_ms, 0);
        assert_eq!(timeline.entries[0].timestamp_ms, 10_000);
        assert_eq!(timeline.entries[2].offset_ms, 20_000);
        assert_eq!(timeline.judge_events, 1);
        assert_eq!(timeline.cv_events, 1);
        assert_eq!(timeline.analytics_events, 1);
        assert_eq!(timeline.red_events, 2);
        assert_eq!(timeline.verdict, None);
        assert_eq!(timeline.hash_intact, None);
    }

    #[tokio::test]
    async fn locked_round_hash_is_checked() {
        let store = Store::in_memory();
        let mut round = RoundState::new("b1", 1, Utc::now(), 0);
        round.events = vec![event(Corner::Red, EventSource::JudgeManual, 10_000)];
        round.status = RoundStatus::Locked;
        round.event_hash = Some(crate::hashing::event_hash(&round.events));
        store.put_round(&round).await.unwrap();

        let timeline = reconstruct_timeline(&store, &round.round_id).await.unwrap();
        assert_eq!(timeline.hash_intact, Some(true));

        // Tamper with the stored events
        round.events[0].severity = 0.99;
        store.put_round(&round).await.unwrap();
        let timeline = reconstruct_timeline(&store, &round.round_id).await.unwrap();
        assert_eq!(timeline.hash_intact, Some(false));
    }

    #[tokio::test]
    async fn missing_round_is_an_error() {
        let store = Store::in_memory();
        let err = reconstruct_timeline(&store, "nope").await.unwrap_err();
        assert!(matches!(err, ReplayError::RoundNotFound(_)));
    }
}
