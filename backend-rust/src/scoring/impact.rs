//! Impact category scoring, impact-advantage detection and near-finish
//! sequence counting.

use combat_types::{CombatEvent, Corner, EventType, SubTier};

use super::profile::ScoringProfile;
use super::{Category, ContributionItem, CornerBreakdown};

/// Running impact totals for one corner, accumulated during Plan A.
#[derive(Debug, Default)]
pub(super) struct ImpactTally {
    pub score: f64,
    pub kd_flash: u32,
    pub kd_hard: u32,
    pub kd_nf: u32,
    pub rocked: u32,
    pub highimpact: u32,
    pub total_kd: u32,
    pub contributions: Vec<ContributionItem>,
}

pub(super) fn compute_impact(events: &[CombatEvent], profile: &ScoringProfile) -> (ImpactTally, ImpactTally) {
    let mut red = ImpactTally::default();
    let mut blue = ImpactTally::default();

    for event in events.iter().filter(|e| e.event_type.is_impact()) {
        let tally = match event.corner {
            Corner::Red => &mut red,
            Corner::Blue => &mut blue,
        };
        let (value, label) = match event.event_type {
            EventType::KdFlash => {
                tally.kd_flash += 1;
                tally.total_kd += 1;
                (profile.kd_flash_value, "KD_FLASH (Flash Knockdown)")
            }
            EventType::KdHard => {
                tally.kd_hard += 1;
                tally.total_kd += 1;
                (profile.kd_hard_value, "KD_HARD (Hard Knockdown)")
            }
            // Near-finish knockdowns are tracked as near-finishes, not in the
            // plain knockdown total the gates count
            EventType::KdNf => {
                tally.kd_nf += 1;
                (profile.kd_nf_value, "KD_NF (Near-Finish Knockdown)")
            }
            EventType::Rocked => {
                tally.rocked += 1;
                (profile.rocked_value, "ROCKED (Stunned/Hurt)")
            }
            EventType::StrikeHighimpact => {
                tally.highimpact += 1;
                (profile.highimpact_strike_value, "High-Impact Strike")
            }
            _ => continue,
        };
        tally.score += value;
        tally.contributions.push(ContributionItem {
            id: event.event_id.clone(),
            corner: event.corner,
            label: label.to_string(),
            points: value,
            category: Category::Impact,
        });
    }

    (red, blue)
}

/// Impact advantage: one fighter has landed materially damaging events,
/// which disables the Plan B/C tie-breakers. Holds if ANY:
/// ≥1 KD_HARD, ≥1 KD_NF, ≥2 ROCKED, or a KD_FLASH lead of ≥2.
pub(super) fn check_impact_advantage(red: &CornerBreakdown, blue: &CornerBreakdown) -> (bool, bool, String) {
    let mut red_advantage = false;
    let mut blue_advantage = false;
    let mut reasons: Vec<String> = Vec::new();

    if red.kd_hard_count >= 1 {
        red_advantage = true;
        reasons.push(format!("RED has {} KD_HARD", red.kd_hard_count));
    }
    if blue.kd_hard_count >= 1 {
        blue_advantage = true;
        reasons.push(format!("BLUE has {} KD_HARD", blue.kd_hard_count));
    }

    if red.kd_nf_count >= 1 {
        red_advantage = true;
        reasons.push(format!("RED has {} KD_NF", red.kd_nf_count));
    }
    if blue.kd_nf_count >= 1 {
        blue_advantage = true;
        reasons.push(format!("BLUE has {} KD_NF", blue.kd_nf_count));
    }

    if red.rocked_count >= 2 {
        red_advantage = true;
        reasons.push(format!("RED has {} ROCKED", red.rocked_count));
    }
    if blue.rocked_count >= 2 {
        blue_advantage = true;
        reasons.push(format!("BLUE has {} ROCKED", blue.rocked_count));
    }

    let flash_diff = red.kd_flash_count as i64 - blue.kd_flash_count as i64;
    if flash_diff >= 2 {
        red_advantage = true;
        reasons.push(format!("RED has KD_FLASH advantage of {flash_diff}"));
    } else if flash_diff <= -2 {
        blue_advantage = true;
        reasons.push(format!("BLUE has KD_FLASH advantage of {}", -flash_diff));
    }

    let reason = if reasons.is_empty() {
        "No impact advantage".to_string()
    } else {
        reasons.join("; ")
    };
    (red_advantage, blue_advantage, reason)
}

/// Near-finish sequences for a fighter: each KD_NF, each NEAR_FINISH
/// submission attempt, and each adjacent pair of knockdowns inside the
/// pairing window.
pub fn count_nf_sequences(events: &[CombatEvent], corner: Corner, profile: &ScoringProfile) -> u32 {
    let mut count = 0;
    let mut kd_timestamps = Vec::new();

    for event in events.iter().filter(|e| e.corner == corner) {
        match event.event_type {
            EventType::KdNf => {
                count += 1;
                kd_timestamps.push(event.timestamp_ms);
            }
            EventType::KdFlash | EventType::KdHard => kd_timestamps.push(event.timestamp_ms),
            EventType::SubAttempt => {
                if event.metadata.tier == Some(SubTier::NearFinish) {
                    count += 1;
                }
            }
            _ => {}
        }
    }

    kd_timestamps.sort_unstable();
    let window_ms = profile.nf_sequence_window_seconds * 1000;
    for pair in kd_timestamps.windows(2) {
        if pair[1] - pair[0] <= window_ms {
            count += 1;
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_types::{EventMetadata, EventSource};

    fn event(corner: Corner, event_type: EventType, ts: i64) -> CombatEvent {
        CombatEvent {
            event_id: format!("{}-{ts}", event_type.as_str()),
            bout_id: "b1".into(),
            round_id: "r1".into(),
            corner,
            event_type,
            severity: 0.9,
            confidence: 1.0,
            timestamp_ms: ts,
            source: EventSource::JudgeManual,
            camera_id: None,
            angle_degrees: None,
            metadata: EventMetadata::default(),
            deduplicated: true,
            canonical: false,
            processed_at: None,
        }
    }

    fn breakdown_from(events: &[CombatEvent]) -> (CornerBreakdown, CornerBreakdown) {
        let profile = ScoringProfile::default();
        let (red_tally, blue_tally) = compute_impact(events, &profile);
        let mut red = CornerBreakdown::default();
        let mut blue = CornerBreakdown::default();
        red.kd_flash_count = red_tally.kd_flash;
        red.kd_hard_count = red_tally.kd_hard;
        red.kd_nf_count = red_tally.kd_nf;
        red.rocked_count = red_tally.rocked;
        blue.kd_flash_count = blue_tally.kd_flash;
        blue.kd_hard_count = blue_tally.kd_hard;
        blue.kd_nf_count = blue_tally.kd_nf;
        blue.rocked_count = blue_tally.rocked;
        (red, blue)
    }

    #[test]
    fn impact_values_accumulate() {
        let profile = ScoringProfile::default();
        let events = vec![
            event(Corner::Red, EventType::KdHard, 1000),
            event(Corner::Red, EventType::Rocked, 2000),
            event(Corner::Blue, EventType::StrikeHighimpact, 3000),
        ];
        let (red, blue) = compute_impact(&events, &profile);
        assert!((red.score - 37.0).abs() < f64::EPSILON);
        assert_eq!(red.total_kd, 1);
        assert!((blue.score - 5.0).abs() < f64::EPSILON);
        assert_eq!(blue.total_kd, 0);
        assert_eq!(red.contributions.len(), 2);
    }

    #[test]
    fn single_hard_kd_grants_advantage() {
        let (red, blue) = breakdown_from(&[event(Corner::Blue, EventType::KdHard, 1000)]);
        let (red_adv, blue_adv, reason) = check_impact_advantage(&red, &blue);
        assert!(!red_adv);
        assert!(blue_adv);
        assert!(reason.contains("BLUE has 1 KD_HARD"));
    }

    #[test]
    fn one_rocked_is_not_enough_two_are() {
        let (red, blue) = breakdown_from(&[event(Corner::Red, EventType::Rocked, 1000)]);
        let (red_adv, ..) = check_impact_advantage(&red, &blue);
        assert!(!red_adv);

        let (red, blue) = breakdown_from(&[
            event(Corner::Red, EventType::Rocked, 1000),
            event(Corner::Red, EventType::Rocked, 5000),
        ]);
        let (red_adv, blue_adv, _) = check_impact_advantage(&red, &blue);
        assert!(red_adv);
        assert!(!blue_adv);
    }

    #[test]
    fn flash_lead_of_two_grants_advantage() {
        let (red, blue) = breakdown_from(&[
            event(Corner::Red, EventType::KdFlash, 1000),
            event(Corner::Red, EventType::KdFlash, 60_000),
            event(Corner::Blue, EventType::KdFlash, 90_000),
        ]);
        // Lead is 1 — no advantage
        let (red_adv, ..) = check_impact_advantage(&red, &blue);
        assert!(!red_adv);

        let (red, blue) = breakdown_from(&[
            event(Corner::Red, EventType::KdFlash, 1000),
            event(Corner::Red, EventType::KdFlash, 60_000),
        ]);
        let (red_adv, _, reason) = check_impact_advantage(&red, &blue);
        assert!(red_adv);
        assert!(reason.contains("KD_FLASH advantage of 2"));
    }

    #[test]
    fn nf_sequences_count_nf_events_and_paired_kds() {
        let profile = ScoringProfile::default();
        let mut sub_nf = event(Corner::Red, EventType::SubAttempt, 40_000);
        sub_nf.metadata.tier = Some(SubTier::NearFinish);
        let events = vec![
            event(Corner::Red, EventType::KdNf, 10_000),   // +1 NF
            event(Corner::Red, EventType::KdFlash, 20_000), // pairs with above (10s apart): +1
            sub_nf,                                         // +1 NF sub
            event(Corner::Red, EventType::KdHard, 200_000), // too far from previous KD
            event(Corner::Blue, EventType::KdNf, 50_000),   // other corner, ignored
        ];
        assert_eq!(count_nf_sequences(&events, Corner::Red, &profile), 3);
        assert_eq!(count_nf_sequences(&events, Corner::Blue, &profile), 1);
    }
}
