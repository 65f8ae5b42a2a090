//! Plan A/B/C computation. Plan A is the primary ledger — effective striking,
//! grappling, non-cage control and impact. Plans B and C are tie-breakers
//! that only activate when no impact advantage exists and the earlier stages
//! failed to separate the fighters.

use combat_types::{CombatEvent, Corner, EventType, StrikeQuality, SubTier, Technique};

use super::control::{control_breakdown, control_score, parse_control_windows, ControlScope};
use super::impact;
use super::leg_damage::LegDamageTracker;
use super::profile::ScoringProfile;
use super::{Category, ContributionItem, CornerBreakdown};

pub(super) struct PlanAResult {
    pub red: CornerBreakdown,
    pub blue: CornerBreakdown,
    pub contributions: Vec<ContributionItem>,
}

pub(super) struct PlanOutcome {
    pub delta: f64,
    pub allowed: bool,
    pub reason: String,
}

// ── Striking ──────────────────────────────────────────────────────────────────

struct StrikeTally {
    score: f64,
    heavy_count: u32,
    solid_count: u32,
    breakdown: std::collections::BTreeMap<String, u32>,
    contributions: Vec<ContributionItem>,
}

impl StrikeTally {
    fn new() -> Self {
        Self {
            score: 0.0,
            heavy_count: 0,
            solid_count: 0,
            breakdown: Default::default(),
            contributions: Vec::new(),
        }
    }
}

fn compute_striking(
    events: &[CombatEvent],
    ldi: &mut LegDamageTracker,
    profile: &ScoringProfile,
) -> (StrikeTally, StrikeTally) {
    let mut red = StrikeTally::new();
    let mut blue = StrikeTally::new();

    // Walk in round order so LDI escalation applies to the right kicks
    for event in events {
        let Some(technique) = event.event_type.technique() else {
            continue;
        };
        let tally = match event.corner {
            Corner::Red => &mut red,
            Corner::Blue => &mut blue,
        };

        let base = profile.strike_weights.for_technique(technique);
        let quality = event.quality();
        let quality_mult = profile.quality_multiplier(quality);
        let ldi_mult = if technique == Technique::LegKick {
            ldi.record_leg_kick(event.corner, profile)
        } else {
            1.0
        };
        let value = base * quality_mult * ldi_mult;

        tally.score += value;
        *tally.breakdown.entry(event.event_type.as_str().to_string()).or_insert(0) += 1;

        if quality == StrikeQuality::Solid {
            tally.solid_count += 1;
            if profile.is_heavy(technique) {
                tally.heavy_count += 1;
            }
        }

        let mut label = event.event_type.as_str().to_string();
        if quality == StrikeQuality::Light {
            label.push_str(" (LIGHT)");
        }
        if ldi_mult > 1.0 {
            label.push_str(&format!(" (LDI x{ldi_mult:.2})"));
        }
        tally.contributions.push(ContributionItem {
            id: event.event_id.clone(),
            corner: event.corner,
            label,
            points: value,
            category: Category::Striking,
        });
    }

    (red, blue)
}

// ── Grappling ─────────────────────────────────────────────────────────────────

struct GrapplingTally {
    score: f64,
    sub_nf: u32,
    breakdown: std::collections::BTreeMap<String, u32>,
    contributions: Vec<ContributionItem>,
}

impl GrapplingTally {
    fn new() -> Self {
        Self {
            score: 0.0,
            sub_nf: 0,
            breakdown: Default::default(),
            contributions: Vec::new(),
        }
    }
}

fn compute_grappling(events: &[CombatEvent], profile: &ScoringProfile) -> (GrapplingTally, GrapplingTally) {
    let mut red = GrapplingTally::new();
    let mut blue = GrapplingTally::new();

    for event in events.iter().filter(|e| e.event_type.is_grappling()) {
        let tally = match event.corner {
            Corner::Red => &mut red,
            Corner::Blue => &mut blue,
        };
        *tally.breakdown.entry(event.event_type.as_str().to_string()).or_insert(0) += 1;

        let (value, label) = match event.event_type {
            EventType::TdLand => (profile.takedown_landed_value, "Takedown".to_string()),
            EventType::TdStuffed => (
                profile.takedown_stuffed_value,
                "Takedown Stuffed (defensive)".to_string(),
            ),
            EventType::Sweep => (profile.sweep_value, "Sweep".to_string()),
            EventType::GuardPass => (profile.guard_pass_value, "Guard Pass".to_string()),
            EventType::SubAttempt => {
                let tier = event.metadata.tier.unwrap_or(SubTier::Light);
                if tier == SubTier::NearFinish {
                    tally.sub_nf += 1;
                }
                let label = match tier {
                    SubTier::Light => "Submission Attempt (Light)",
                    SubTier::Deep => "Submission Attempt (Deep)",
                    SubTier::NearFinish => "Submission Attempt (Near-Finish)",
                };
                (profile.submission_value(tier), label.to_string())
            }
            // Attempts carry no credit, only the count
            EventType::TdAttempt => continue,
            _ => continue,
        };

        tally.score += value;
        tally.contributions.push(ContributionItem {
            id: event.event_id.clone(),
            corner: event.corner,
            label,
            points: value,
            category: Category::Grappling,
        });
    }

    (red, blue)
}

// ── Plan A ────────────────────────────────────────────────────────────────────

pub(super) fn compute_plan_a(events: &[CombatEvent], profile: &ScoringProfile) -> PlanAResult {
    let mut ldi = LegDamageTracker::new();
    let (red_strikes, blue_strikes) = compute_striking(events, &mut ldi, profile);
    let (red_grappling, blue_grappling) = compute_grappling(events, profile);
    let (red_impact, blue_impact) = impact::compute_impact(events, profile);

    let windows = parse_control_windows(events, None);
    let (red_control, blue_control) = control_score(&windows, profile, ControlScope::ExcludingCage);

    let mut contributions = Vec::new();
    contributions.extend(red_strikes.contributions.iter().cloned());
    contributions.extend(blue_strikes.contributions.iter().cloned());
    contributions.extend(red_grappling.contributions.iter().cloned());
    contributions.extend(blue_grappling.contributions.iter().cloned());
    contributions.extend(red_impact.contributions.iter().cloned());
    contributions.extend(blue_impact.contributions.iter().cloned());
    for window in windows.iter().filter(|w| w.has_offense && w.duration_seconds > 0.0) {
        let rate = profile.control_rate(window.control_type);
        let points = window.duration_seconds * rate * profile.control_offense_multiplier;
        contributions.push(ContributionItem {
            id: format!("ctrl_{}_{}", window.control_type.as_str(), window.start_ms),
            corner: window.corner,
            label: format!(
                "{} Control w/ offense ({:.0}s)",
                window.control_type.as_str(),
                window.duration_seconds
            ),
            points,
            category: Category::Control,
        });
    }

    let mut red = CornerBreakdown {
        striking_score: red_strikes.score,
        grappling_score: red_grappling.score,
        control_score: red_control,
        impact_score: red_impact.score,
        strike_breakdown: red_strikes.breakdown,
        grappling_breakdown: red_grappling.breakdown,
        control_breakdown: control_breakdown(&windows, Corner::Red),
        kd_flash_count: red_impact.kd_flash,
        kd_hard_count: red_impact.kd_hard,
        kd_nf_count: red_impact.kd_nf,
        rocked_count: red_impact.rocked,
        total_kd_count: red_impact.total_kd,
        highimpact_count: red_impact.highimpact,
        heavy_strike_count: red_strikes.heavy_count,
        solid_strike_count: red_strikes.solid_count,
        sub_nf_count: red_grappling.sub_nf,
        ..CornerBreakdown::default()
    };
    red.plan_a_total = red.striking_score + red.grappling_score + red.control_score + red.impact_score;

    let mut blue = CornerBreakdown {
        striking_score: blue_strikes.score,
        grappling_score: blue_grappling.score,
        control_score: blue_control,
        impact_score: blue_impact.score,
        strike_breakdown: blue_strikes.breakdown,
        grappling_breakdown: blue_grappling.breakdown,
        control_breakdown: control_breakdown(&windows, Corner::Blue),
        kd_flash_count: blue_impact.kd_flash,
        kd_hard_count: blue_impact.kd_hard,
        kd_nf_count: blue_impact.kd_nf,
        rocked_count: blue_impact.rocked,
        total_kd_count: blue_impact.total_kd,
        highimpact_count: blue_impact.highimpact,
        heavy_strike_count: blue_strikes.heavy_count,
        solid_strike_count: blue_strikes.solid_count,
        sub_nf_count: blue_grappling.sub_nf,
        ..CornerBreakdown::default()
    };
    blue.plan_a_total = blue.striking_score + blue.grappling_score + blue.control_score + blue.impact_score;

    PlanAResult { red, blue, contributions }
}

// ── Plan B (effective aggressiveness) ─────────────────────────────────────────

pub(super) fn compute_plan_b(
    events: &[CombatEvent],
    delta_plan_a: f64,
    red_impact_adv: bool,
    blue_impact_adv: bool,
    profile: &ScoringProfile,
) -> PlanOutcome {
    if red_impact_adv || blue_impact_adv {
        return PlanOutcome {
            delta: 0.0,
            allowed: false,
            reason: "Plan B disabled: Impact Advantage present".to_string(),
        };
    }
    if delta_plan_a.abs() >= profile.plan_b_threshold {
        return PlanOutcome {
            delta: 0.0,
            allowed: false,
            reason: format!(
                "Plan B disabled: Plan A delta ({delta_plan_a:.2}) >= threshold ({})",
                profile.plan_b_threshold
            ),
        };
    }

    let mut red_aggression = 0i64;
    let mut blue_aggression = 0i64;
    for event in events.iter().filter(|e| e.event_type.is_aggression()) {
        match event.corner {
            Corner::Red => red_aggression += 1,
            Corner::Blue => blue_aggression += 1,
        }
    }

    let delta = ((red_aggression - blue_aggression) as f64 * profile.aggression_event_value)
        .clamp(-profile.plan_b_cap, profile.plan_b_cap);

    PlanOutcome {
        delta,
        allowed: true,
        reason: "Plan B applied (aggressiveness)".to_string(),
    }
}

// ── Plan C (cage control) ─────────────────────────────────────────────────────

pub(super) fn compute_plan_c(
    events: &[CombatEvent],
    delta_combined: f64,
    red_impact_adv: bool,
    blue_impact_adv: bool,
    profile: &ScoringProfile,
) -> PlanOutcome {
    if red_impact_adv || blue_impact_adv {
        return PlanOutcome {
            delta: 0.0,
            allowed: false,
            reason: "Plan C disabled: Impact Advantage present".to_string(),
        };
    }
    if delta_combined.abs() >= profile.plan_c_threshold {
        return PlanOutcome {
            delta: 0.0,
            allowed: false,
            reason: format!(
                "Plan C disabled: Combined delta ({delta_combined:.2}) >= threshold ({})",
                profile.plan_c_threshold
            ),
        };
    }

    let windows = parse_control_windows(events, None);
    let (red, blue) = control_score(&windows, profile, ControlScope::CageOnly);

    PlanOutcome {
        delta: red - blue,
        allowed: true,
        reason: "Plan C applied (cage control)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_types::{ControlType, EventMetadata, EventSource};

    fn event(corner: Corner, event_type: EventType, ts: i64) -> CombatEvent {
        CombatEvent {
            event_id: format!("{}-{}-{ts}", corner.as_str(), event_type.as_str()),
            bout_id: "b1".into(),
            round_id: "r1".into(),
            corner,
            event_type,
            severity: 0.8,
            confidence: 1.0,
            timestamp_ms: ts,
            source: EventSource::JudgeManual,
            camera_id: None,
            angle_degrees: None,
            metadata: EventMetadata {
                quality: Some(StrikeQuality::Solid),
                ..EventMetadata::default()
            },
            deduplicated: true,
            canonical: false,
            processed_at: None,
        }
    }

    #[test]
    fn striking_applies_base_and_quality_weights() {
        let profile = ScoringProfile::default();
        let mut light_jab = event(Corner::Red, EventType::StrikeJab, 2000);
        light_jab.metadata.quality = Some(StrikeQuality::Light);
        let events = vec![
            event(Corner::Red, EventType::StrikeHook, 1000), // 2.5
            light_jab,                                       // 1.0 * 0.5
            event(Corner::Blue, EventType::KickHead, 3000),  // 5.0
        ];
        let result = compute_plan_a(&events, &profile);
        assert!((result.red.striking_score - 3.0).abs() < 1e-9);
        assert!((result.blue.striking_score - 5.0).abs() < 1e-9);
        assert_eq!(result.red.solid_strike_count, 1); // the light jab is not solid
        assert_eq!(result.red.heavy_strike_count, 1);
        assert_eq!(result.blue.heavy_strike_count, 1);
    }

    #[test]
    fn leg_kick_escalation_raises_later_kicks() {
        let profile = ScoringProfile::default();
        let events: Vec<CombatEvent> = (0..5)
            .map(|i| event(Corner::Red, EventType::KickLeg, 1000 + i * 5000))
            .collect();
        let result = compute_plan_a(&events, &profile);
        // Kicks 1-3 at x1.00, kick 4 at x1.10, kick 5 at x1.10 (index 0.4)
        let expected = 1.5 * (3.0 + 1.10 + 1.10);
        assert!((result.red.striking_score - expected).abs() < 1e-9);
        let escalated: Vec<_> = result
            .contributions
            .iter()
            .filter(|c| c.label.contains("LDI"))
            .collect();
        assert_eq!(escalated.len(), 2);
    }

    #[test]
    fn grappling_values_and_counts() {
        let profile = ScoringProfile::default();
        let mut deep_sub = event(Corner::Blue, EventType::SubAttempt, 4000);
        deep_sub.metadata.tier = Some(SubTier::Deep);
        let mut nf_sub = event(Corner::Blue, EventType::SubAttempt, 5000);
        nf_sub.metadata.tier = Some(SubTier::NearFinish);
        let events = vec![
            event(Corner::Red, EventType::TdLand, 1000),    // 4.0
            event(Corner::Red, EventType::TdStuffed, 2000), // 0.5
            event(Corner::Red, EventType::TdAttempt, 3000), // counted, no credit
            deep_sub,                                       // 6.0
            nf_sub,                                         // 12.0
        ];
        let result = compute_plan_a(&events, &profile);
        assert!((result.red.grappling_score - 4.5).abs() < 1e-9);
        assert!((result.blue.grappling_score - 18.0).abs() < 1e-9);
        assert_eq!(result.blue.sub_nf_count, 1);
        assert_eq!(result.red.grappling_breakdown["TD_ATTEMPT"], 1);
    }

    #[test]
    fn plan_a_control_excludes_cage() {
        let profile = ScoringProfile::default();
        let mut start = event(Corner::Red, EventType::ControlStart, 10_000);
        start.metadata.control_type = Some(ControlType::Cage);
        let mut end = event(Corner::Red, EventType::ControlEnd, 70_000);
        end.metadata.control_type = Some(ControlType::Cage);
        let result = compute_plan_a(&[start, end], &profile);
        assert!(result.red.control_score.abs() < f64::EPSILON);
        assert!((result.red.control_breakdown.cage_seconds - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn plan_b_disabled_by_impact_advantage_and_big_lead() {
        let profile = ScoringProfile::default();
        let out = compute_plan_b(&[], 0.5, true, false, &profile);
        assert!(!out.allowed);
        assert!(out.delta.abs() < f64::EPSILON);

        let out = compute_plan_b(&[], 2.0, false, false, &profile);
        assert!(!out.allowed);
        assert!(out.reason.contains("threshold"));
    }

    #[test]
    fn plan_b_counts_aggression_and_caps() {
        let profile = ScoringProfile::default();
        let events: Vec<CombatEvent> = (0..10)
            .map(|i| event(Corner::Red, EventType::Pressing, 1000 + i * 1000))
            .collect();
        let out = compute_plan_b(&events, 0.5, false, false, &profile);
        assert!(out.allowed);
        // 10 * 0.3 = 3.0, capped at 1.5
        assert!((out.delta - profile.plan_b_cap).abs() < f64::EPSILON);
    }

    #[test]
    fn plan_c_scores_only_cage_when_close() {
        let profile = ScoringProfile::default();
        let mut start = event(Corner::Blue, EventType::ControlStart, 10_000);
        start.metadata.control_type = Some(ControlType::Cage);
        let mut end = event(Corner::Blue, EventType::ControlEnd, 70_000);
        end.metadata.control_type = Some(ControlType::Cage);
        let events = vec![start, end];

        let out = compute_plan_c(&events, 0.2, false, false, &profile);
        assert!(out.allowed);
        // 60s * 0.006 * 0.5 (no offense), blue side
        assert!((out.delta + 60.0 * 0.006 * 0.5).abs() < 1e-9);

        let blocked = compute_plan_c(&events, 1.0, false, false, &profile);
        assert!(!blocked.allowed);
    }
}
