//! End-to-end scenarios over the full pipeline: supervisor → bout worker →
//! harmonizer → admission → scoring → lock, with literal expected verdicts.

use combat_types::{Corner, EventSource, RawEvent};
use fightjudge_backend::context::{BoutSupervisor, PipelineContext};
use fightjudge_backend::harmonizer::harmonize;
use fightjudge_backend::pipeline::IngestPipeline;
use fightjudge_backend::round_manager::{AppendOutcome, BoutHandle, LockOutcome};
use fightjudge_backend::scoring::Winner;
use fightjudge_backend::state::RoundStatus;
use serde_json::json;

fn raw(
    round_id: &str,
    fighter: &str,
    event_type: &str,
    ts: i64,
    confidence: Option<f64>,
    severity: f64,
) -> RawEvent {
    RawEvent {
        event_id: None,
        bout_id: "scenario-bout".to_string(),
        round_id: round_id.to_string(),
        fighter_id: Some(fighter.to_string()),
        event_type: event_type.to_string(),
        severity: Some(severity),
        confidence,
        timestamp_ms: ts,
        source: None,
        camera_id: None,
        angle_degrees: None,
        metadata: None,
    }
}

async fn bout() -> (BoutSupervisor, BoutHandle) {
    let ctx = PipelineContext::in_memory().await.unwrap();
    let supervisor = BoutSupervisor::new(ctx);
    let handle = supervisor.bout("scenario-bout").await;
    (supervisor, handle)
}

async fn admit(bout: &BoutHandle, round_id: &str, raw: RawEvent, source: EventSource) {
    match bout.append_event(round_id, raw, source, "test").await.unwrap() {
        AppendOutcome::Admitted(_) => {}
        AppendOutcome::Rejected(rejection) => panic!("unexpected rejection: {rejection:?}"),
    }
}

// ── Scenario 1: duplicate suppression ─────────────────────────────────────────

#[tokio::test]
async fn duplicate_suppression() {
    let (_supervisor, bout) = bout().await;
    let round = bout.open_round(1, "operator").await.unwrap();

    let first = raw(&round.round_id, "RED", "STRIKE_HOOK", 10_000, Some(0.9), 0.8);
    admit(&bout, &round.round_id, first, EventSource::JudgeManual).await;

    let near_twin = raw(&round.round_id, "RED", "STRIKE_HOOK", 10_050, Some(0.9), 0.8);
    let outcome = bout
        .append_event(&round.round_id, near_twin, EventSource::JudgeManual, "test")
        .await
        .unwrap();
    match outcome {
        AppendOutcome::Rejected(rejection) => assert_eq!(rejection.code, "DUPLICATE"),
        AppendOutcome::Admitted(_) => panic!("duplicate admitted"),
    }

    let score = bout.compute_score(&round.round_id, "test").await.unwrap();
    assert!((score.red.striking_score - 2.5).abs() < 1e-9);
    assert_eq!(score.verdict.winner, Winner::Red);
    assert_eq!(score.verdict.score_card, "10-9");
}

// ── Scenario 2: multi-camera fusion ───────────────────────────────────────────

#[test]
fn multicamera_fusion_picks_front_angle() {
    // Fusion runs over a detection batch before admission
    let mut cameras = Vec::new();
    for (ts, confidence, angle, camera) in [
        (20_000, 0.6, 30.0, "cam-1"),
        (20_080, 0.9, 90.0, "cam-2"),
        (20_140, 0.75, 250.0, "cam-3"),
    ] {
        let mut event = raw("r1", "RED", "STRIKE_CROSS", ts, Some(confidence), 0.7);
        event.camera_id = Some(camera.to_string());
        event.angle_degrees = Some(angle);
        cameras.push(harmonize(event, EventSource::CvSystem).unwrap());
    }
    let winner_id = cameras[1].event_id.clone();

    let mut pipeline = IngestPipeline::new();
    let canonical = pipeline.fuse_multicamera(cameras, 150);

    assert_eq!(canonical.len(), 1);
    assert_eq!(canonical[0].event_id, winner_id);
    assert!(canonical[0].canonical);
    assert_eq!(pipeline.stats().multicam_fusions, 1);
}

// ── Scenario 3: clear 10-9 ────────────────────────────────────────────────────

#[tokio::test]
async fn clear_ten_nine() {
    let (_supervisor, bout) = bout().await;
    let round = bout.open_round(1, "operator").await.unwrap();

    for i in 0..10 {
        let event = raw(&round.round_id, "RED", "STRIKE_JAB", 10_000 + i * 20_000, None, 0.6);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }
    for i in 0..3 {
        let event = raw(&round.round_id, "BLUE", "STRIKE_JAB", 15_000 + i * 40_000, None, 0.6);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }

    let score = bout.compute_score(&round.round_id, "test").await.unwrap();
    assert!((score.delta_plan_a - 7.0).abs() < 1e-9);
    assert!(!score.receipt.red_has_impact_advantage);
    assert!(!score.receipt.blue_has_impact_advantage);
    assert!(!score.receipt.plan_b_allowed);
    assert!(!score.receipt.plan_c_allowed);
    assert_eq!(score.verdict.winner, Winner::Red);
    assert_eq!(score.verdict.score_card, "10-9");
    assert_eq!(score.receipt.score, "10-9 RED");
}

// ── Scenario 4: 10-8 by knockdowns ────────────────────────────────────────────

#[tokio::test]
async fn ten_eight_by_knockdowns() {
    let (_supervisor, bout) = bout().await;
    let round = bout.open_round(2, "operator").await.unwrap();

    // Knockdowns spaced beyond the 30s pairing window
    for (i, ts) in [30_000i64, 90_000, 150_000].iter().enumerate() {
        let event = raw(&round.round_id, "RED", "KD_HARD", *ts + i as i64, None, 0.95);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }
    for ts in [200_000i64, 260_000] {
        let event = raw(&round.round_id, "RED", "KD_NF", ts, None, 0.95);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }
    for i in 0..8 {
        let event = raw(&round.round_id, "RED", "STRIKE_HOOK", 12_000 + i * 15_000, None, 0.7);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }
    for i in 0..2 {
        let event = raw(&round.round_id, "BLUE", "STRIKE_HOOK", 20_000 + i * 60_000, None, 0.7);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }

    let score = bout.compute_score(&round.round_id, "test").await.unwrap();
    assert_eq!(score.red.total_kd_count, 3);
    assert_eq!(score.red.kd_nf_count, 2);
    assert_eq!(score.red.heavy_strike_count - score.blue.heavy_strike_count, 6);
    assert_eq!(score.verdict.winner, Winner::Red);
    assert_eq!(score.verdict.score_card, "10-8");
    assert!(score
        .receipt
        .gate_messages
        .iter()
        .any(|m| m.contains("10-8 awarded")));
    // 10-7 was evaluated first and denied
    assert!(score
        .receipt
        .gate_messages
        .iter()
        .any(|m| m.contains("10-7 denied")));
}

// ── Scenario 5: impact advantage forbids the draw ─────────────────────────────

#[tokio::test]
async fn impact_tilts_even_round_to_blue() {
    let (_supervisor, bout) = bout().await;
    let round = bout.open_round(3, "operator").await.unwrap();

    for i in 0..4 {
        let event = raw(&round.round_id, "RED", "STRIKE_JAB", 10_000 + i * 30_000, None, 0.6);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
        let event = raw(&round.round_id, "BLUE", "STRIKE_JAB", 15_000 + i * 30_000, None, 0.6);
        admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    }
    let event = raw(&round.round_id, "RED", "KD_FLASH", 60_000, None, 0.9);
    admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;
    let event = raw(&round.round_id, "BLUE", "KD_HARD", 120_000, None, 0.9);
    admit(&bout, &round.round_id, event, EventSource::JudgeManual).await;

    let score = bout.compute_score(&round.round_id, "test").await.unwrap();
    assert!(score.receipt.blue_has_impact_advantage);
    assert!(!score.receipt.red_has_impact_advantage);
    // The draw rule must not fire with an advantage present
    assert_eq!(score.verdict.winner, Winner::Blue);
    assert_eq!(score.verdict.score_card, "9-10");
    assert_eq!(score.receipt.score, "10-9 BLUE");
    assert!(!score.receipt.plan_b_allowed);
}

// ── Scenario 6: lock refused without judge events ─────────────────────────────

#[tokio::test]
async fn lock_refused_without_judge_events() {
    let (supervisor, bout) = bout().await;
    let round = bout.open_round(1, "operator").await.unwrap();

    for i in 0..6 {
        let mut event = raw(&round.round_id, "RED", "STRIKE_JAB", 10_000 + i * 25_000, Some(0.9), 0.6);
        event.camera_id = Some("cam-1".to_string());
        admit(&bout, &round.round_id, event, EventSource::CvSystem).await;
    }

    match bout.lock_round(&round.round_id, "operator").await.unwrap() {
        LockOutcome::Refused(report) => {
            assert!(!report.can_lock);
            assert!(report.critical_issues >= 1);
            assert!(report
                .issues
                .iter()
                .any(|i| format!("{:?}", i.kind).contains("MissingJudgeEvents")));
        }
        other => panic!("expected refusal, got {other:?}"),
    }

    // Status stays SCORING (the final pre-lock score ran), never LOCKED
    let reloaded = bout.get_round(&round.round_id).await.unwrap();
    assert_eq!(reloaded.status, RoundStatus::Scoring);
    assert!(reloaded.event_hash.is_none());

    // No round_locked audit entry was produced
    let bundle = supervisor
        .context()
        .audit
        .export_bundle("scenario-bout")
        .await
        .unwrap();
    assert!(bundle
        .entries
        .iter()
        .all(|e| serde_json::to_value(e.action).unwrap() != json!("round_locked")));
}

// ── Momentum synthesis through the manager ────────────────────────────────────

#[tokio::test]
async fn momentum_swings_are_admitted_and_deduplicated() {
    let (_supervisor, bout) = bout().await;
    let round = bout.open_round(1, "operator").await.unwrap();

    for i in 0..3 {
        let mut event = raw(&round.round_id, "RED", "STRIKE_SIG", 50_000 + i * 300, Some(0.9), 0.8);
        event.camera_id = Some("cam-1".to_string());
        admit(&bout, &round.round_id, event, EventSource::CvSystem).await;
    }

    let swings = bout.detect_momentum(&round.round_id, Corner::Red, "analytics").await.unwrap();
    assert_eq!(swings.len(), 1);
    assert_eq!(swings[0].source, EventSource::AnalyticsDerived);

    // A second pass over the same strikes synthesizes the same swing, which
    // the admission gate rejects as a duplicate
    let again = bout.detect_momentum(&round.round_id, Corner::Red, "analytics").await.unwrap();
    assert!(again.is_empty());

    let reloaded = bout.get_round(&round.round_id).await.unwrap();
    assert_eq!(reloaded.events.len(), 4);
}
