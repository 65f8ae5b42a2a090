//! Property-based invariants over random event streams: scoring determinism,
//! plan-hierarchy exclusivity, gate necessity, event-hash stability and
//! admission monotonicity.

use chrono::Utc;
use combat_types::{
    CombatEvent, Corner, EventMetadata, EventSource, EventType, StrikeQuality, SubTier,
};
use fightjudge_backend::hashing::event_hash;
use fightjudge_backend::pipeline::IngestPipeline;
use fightjudge_backend::scoring::{score_round, ScoringProfile, Winner};
use fightjudge_backend::state::CalibrationConfig;
use proptest::prelude::*;

fn arb_event_type() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::StrikeJab),
        Just(EventType::StrikeCross),
        Just(EventType::StrikeHook),
        Just(EventType::KickLeg),
        Just(EventType::KickHead),
        Just(EventType::StrikeGround),
        Just(EventType::KdFlash),
        Just(EventType::KdHard),
        Just(EventType::KdNf),
        Just(EventType::Rocked),
        Just(EventType::StrikeHighimpact),
        Just(EventType::TdLand),
        Just(EventType::TdStuffed),
        Just(EventType::SubAttempt),
        Just(EventType::Aggression),
        Just(EventType::Pressing),
    ]
}

prop_compose! {
    fn arb_event()(
        index in 0u32..10_000,
        red in any::<bool>(),
        event_type in arb_event_type(),
        severity in 0.0f64..=1.0,
        confidence in 0.0f64..=1.0,
        timestamp_ms in 0i64..300_000,
        light in any::<bool>(),
        tier_pick in 0u8..3,
    ) -> CombatEvent {
        let corner = if red { Corner::Red } else { Corner::Blue };
        let mut metadata = EventMetadata::default();
        if event_type.is_strike() {
            metadata.quality = Some(if light { StrikeQuality::Light } else { StrikeQuality::Solid });
        }
        if event_type == EventType::SubAttempt {
            metadata.tier = Some(match tier_pick {
                0 => SubTier::Light,
                1 => SubTier::Deep,
                _ => SubTier::NearFinish,
            });
        }
        CombatEvent {
            event_id: format!("evt-{index}"),
            bout_id: "prop-bout".into(),
            round_id: "prop-round".into(),
            corner,
            event_type,
            severity,
            confidence,
            timestamp_ms,
            source: EventSource::JudgeManual,
            camera_id: None,
            angle_degrees: None,
            metadata,
            deduplicated: true,
            canonical: false,
            processed_at: None,
        }
    }
}

proptest! {
    /// Scoring is a pure function: same inputs, same verdict, byte-identical
    /// receipt.
    #[test]
    fn scoring_is_deterministic(events in prop::collection::vec(arb_event(), 0..60)) {
        let profile = ScoringProfile::default();
        let first = score_round(1, &events, &profile);
        let second = score_round(1, &events, &profile);
        prop_assert_eq!(&first, &second);
        let first_json = serde_json::to_string(&first.receipt).unwrap();
        let second_json = serde_json::to_string(&second.receipt).unwrap();
        prop_assert_eq!(first_json, second_json);
    }

    /// Plan B/C contribute only when the hierarchy allows them.
    #[test]
    fn plan_hierarchy_is_exclusive(events in prop::collection::vec(arb_event(), 0..60)) {
        let profile = ScoringProfile::default();
        let score = score_round(1, &events, &profile);
        let receipt = &score.receipt;

        if !receipt.plan_b_allowed {
            prop_assert!(score.delta_plan_b.abs() < f64::EPSILON);
        } else {
            prop_assert!(!receipt.red_has_impact_advantage && !receipt.blue_has_impact_advantage);
            prop_assert!(score.delta_plan_a.abs() < profile.plan_b_threshold);
            prop_assert!(score.delta_plan_b.abs() <= profile.plan_b_cap + f64::EPSILON);
        }
        if !receipt.plan_c_allowed {
            prop_assert!(score.delta_plan_c.abs() < f64::EPSILON);
        } else {
            prop_assert!(!receipt.red_has_impact_advantage && !receipt.blue_has_impact_advantage);
            prop_assert!((score.delta_plan_a + score.delta_plan_b).abs() < profile.plan_c_threshold);
        }
    }

    /// A dominant card is only returned when both of its gate conditions
    /// hold for the winner.
    #[test]
    fn gates_are_necessary(events in prop::collection::vec(arb_event(), 0..60)) {
        let profile = ScoringProfile::default();
        let score = score_round(1, &events, &profile);
        let card = score.verdict.score_card.as_str();

        if card == "10-8" || card == "8-10" {
            let (winner, loser) = if card == "10-8" {
                (&score.red, &score.blue)
            } else {
                (&score.blue, &score.red)
            };
            let heavy_diff = winner.heavy_strike_count as i64 - loser.heavy_strike_count as i64;
            let impact_ok = winner.total_kd_count >= 3
                || (winner.kd_hard_count >= 3 && winner.kd_nf_count + winner.sub_nf_count >= 2)
                || (winner.sub_nf_count >= 3 && heavy_diff >= 5);
            prop_assert!(impact_ok, "10-8 without impact condition: {:?}", score.receipt.gate_messages);

            let solid_diff = winner.solid_strike_count as i64 - loser.solid_strike_count as i64;
            let winner_lead = if card == "10-8" { score.delta_plan_a } else { -score.delta_plan_a };
            let diff_ok = winner_lead >= 4.0 || solid_diff >= 12 || heavy_diff >= 5;
            prop_assert!(diff_ok, "10-8 without differential condition");
        }

        if card == "10-10" {
            prop_assert!(!score.receipt.red_has_impact_advantage);
            prop_assert!(!score.receipt.blue_has_impact_advantage);
            prop_assert!(score.delta_round.abs() < profile.draw_threshold);
            prop_assert_eq!(score.verdict.winner, Winner::Draw);
        }
    }

    /// The event hash is stable across input order and recomputation.
    #[test]
    fn event_hash_is_order_stable(events in prop::collection::vec(arb_event(), 0..40)) {
        let forward = event_hash(&events);
        let mut reversed = events.clone();
        reversed.reverse();
        prop_assert_eq!(&forward, &event_hash(&reversed));
        prop_assert_eq!(&forward, &event_hash(&events));
    }

    /// Rejections are monotone: raising confidence past the threshold admits
    /// a low-confidence reject; shifting past the window admits a duplicate.
    #[test]
    fn admission_is_monotone(
        event in arb_event(),
        threshold in 0.1f64..0.9,
        window in 50i64..400,
    ) {
        let mut config = CalibrationConfig::default();
        config.confidence_threshold = threshold;
        config.deduplication_window_ms = window;

        // Low-confidence rejection flips to admission at the threshold
        if event.confidence < threshold {
            let mut pipeline = IngestPipeline::new();
            prop_assert!(pipeline.admit(event.clone(), &config, Utc::now()).is_err());
            let mut raised = event.clone();
            raised.confidence = threshold;
            prop_assert!(pipeline.admit(raised, &config, Utc::now()).is_ok());
        }

        // Duplicate rejection flips to admission outside the window
        let mut pipeline = IngestPipeline::new();
        let mut confident = event.clone();
        confident.confidence = 1.0;
        prop_assert!(pipeline.admit(confident.clone(), &config, Utc::now()).is_ok());

        let mut twin = confident.clone();
        twin.event_id = format!("{}-twin", confident.event_id);
        twin.timestamp_ms = confident.timestamp_ms + window / 2;
        prop_assert!(pipeline.admit(twin.clone(), &config, Utc::now()).is_err());

        twin.timestamp_ms = confident.timestamp_ms + window;
        prop_assert!(pipeline.admit(twin, &config, Utc::now()).is_ok());
    }
}
