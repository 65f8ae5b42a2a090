//! 10-8 and 10-7 gate logic. A dominant card requires BOTH an impact
//! condition and a differential condition; otherwise the round defaults to
//! 10-9 (or 10-10 under the draw rule).

use combat_types::{CombatEvent, Corner};

use super::impact::count_nf_sequences;
use super::profile::ScoringProfile;
use super::{CornerBreakdown, Winner};

pub(super) struct GateResult {
    pub red_points: u8,
    pub blue_points: u8,
    pub winner: Winner,
    pub messages: Vec<String>,
}

fn check_10_8(
    winner_breakdown: &CornerBreakdown,
    loser_breakdown: &CornerBreakdown,
    plan_a_lead: f64,
    profile: &ScoringProfile,
) -> (bool, String) {
    let gate = &profile.gate_10_8;
    let total_kd = winner_breakdown.total_kd_count;
    let kd_hard = winner_breakdown.kd_hard_count;
    let kd_nf = winner_breakdown.kd_nf_count;
    let sub_nf = winner_breakdown.sub_nf_count;
    let heavy_diff =
        winner_breakdown.heavy_strike_count as i64 - loser_breakdown.heavy_strike_count as i64;

    // (i) impact requirement
    let (impact_met, impact_reason) = if total_kd >= gate.min_total_kd {
        (true, format!("{total_kd} total knockdowns"))
    } else if kd_hard >= gate.alt_kd_hard_min && (kd_nf + sub_nf) >= gate.alt_kd_nf_min {
        (true, format!("{kd_hard} KD_HARD + {} near-finishes", kd_nf + sub_nf))
    } else if sub_nf >= gate.alt_sub_nf_min && heavy_diff >= gate.min_heavy_advantage {
        (
            true,
            format!("{sub_nf} near-finish submissions + {heavy_diff} heavy strike advantage"),
        )
    } else {
        (false, String::new())
    };

    if !impact_met {
        return (
            false,
            format!(
                "10-8 denied: Impact requirement not met (need {} KDs or equivalent, got {total_kd} KDs)",
                gate.min_total_kd
            ),
        );
    }

    // (ii) differential requirement
    let solid_diff =
        winner_breakdown.solid_strike_count as i64 - loser_breakdown.solid_strike_count as i64;
    let (diff_met, diff_reason) = if plan_a_lead >= gate.min_plan_a_lead {
        (true, format!("Plan A lead of {plan_a_lead:.2}"))
    } else if solid_diff >= gate.min_solid_differential {
        (true, format!("SOLID strike differential of {solid_diff}"))
    } else if heavy_diff >= gate.min_heavy_advantage {
        (true, format!("Heavy strike advantage of {heavy_diff}"))
    } else {
        (false, String::new())
    };

    if !diff_met {
        return (
            false,
            format!(
                "10-8 denied: Differential requirement not met (need Plan A lead >= {} or strike diff >= {})",
                gate.min_plan_a_lead, gate.min_solid_differential
            ),
        );
    }

    (true, format!("10-8 awarded: {impact_reason} + {diff_reason}"))
}

fn check_10_7(
    winner: Winner,
    winner_breakdown: &CornerBreakdown,
    loser_breakdown: &CornerBreakdown,
    plan_a_lead: f64,
    events: &[CombatEvent],
    profile: &ScoringProfile,
) -> (bool, String) {
    let gate = &profile.gate_10_7;
    let total_kd = winner_breakdown.total_kd_count;
    let kd_hard = winner_breakdown.kd_hard_count;

    let corner = match winner {
        Winner::Red => Corner::Red,
        Winner::Blue => Corner::Blue,
        Winner::Draw => return (false, "10-7 denied: no winner".to_string()),
    };
    let nf_sequences = count_nf_sequences(events, corner, profile);

    // (i) severe impact requirement
    let (impact_met, impact_reason) = if total_kd >= gate.min_total_kd {
        (true, format!("{total_kd} total knockdowns"))
    } else if kd_hard >= gate.alt_kd_hard_min && nf_sequences >= gate.alt_nf_sequence_min {
        (true, format!("{kd_hard} KD_HARD + {nf_sequences} near-finish sequences"))
    } else if nf_sequences >= gate.alt_nf_kd_sequence_min {
        (true, format!("{nf_sequences} NF+KD sequences"))
    } else {
        (false, String::new())
    };

    if !impact_met {
        return (
            false,
            format!(
                "10-7 denied: Severe impact requirement not met (need {} KDs or equivalent)",
                gate.min_total_kd
            ),
        );
    }

    // (ii) massive differential requirement
    let solid_diff =
        winner_breakdown.solid_strike_count as i64 - loser_breakdown.solid_strike_count as i64;
    let heavy_diff =
        winner_breakdown.heavy_strike_count as i64 - loser_breakdown.heavy_strike_count as i64;
    let (diff_met, diff_reason) = if plan_a_lead >= gate.min_plan_a_lead {
        (true, format!("Plan A lead of {plan_a_lead:.2}"))
    } else if solid_diff >= gate.min_solid_differential {
        (true, format!("SOLID strike differential of {solid_diff}"))
    } else if heavy_diff >= gate.min_heavy_advantage {
        (true, format!("Heavy strike advantage of {heavy_diff}"))
    } else {
        (false, String::new())
    };

    if !diff_met {
        return (
            false,
            format!(
                "10-7 denied: Massive differential requirement not met (need Plan A lead >= {} or strike diff >= {})",
                gate.min_plan_a_lead, gate.min_solid_differential
            ),
        );
    }

    (true, format!("10-7 awarded: {impact_reason} + {diff_reason}"))
}

/// Map the final round delta onto the 10-point-must card.
///
/// 1. Draw rule: tiny delta AND no impact advantage on either side → 10-10
/// 2. Winner is the positive side of the delta
/// 3. 10-7 gate, then 10-8 gate, then the default 10-9
#[allow(clippy::too_many_arguments)]
pub(super) fn apply_gates(
    delta_round: f64,
    delta_plan_a: f64,
    red: &CornerBreakdown,
    blue: &CornerBreakdown,
    red_impact_adv: bool,
    blue_impact_adv: bool,
    events: &[CombatEvent],
    profile: &ScoringProfile,
) -> GateResult {
    let mut messages = Vec::new();

    if delta_round.abs() < profile.draw_threshold && !red_impact_adv && !blue_impact_adv {
        messages.push(format!(
            "10-10 Draw: Delta ({delta_round:.2}) < threshold ({}) with no impact advantage",
            profile.draw_threshold
        ));
        return GateResult {
            red_points: 10,
            blue_points: 10,
            winner: Winner::Draw,
            messages,
        };
    }

    let (winner, winner_breakdown, loser_breakdown) = if delta_round > 0.0 {
        (Winner::Red, red, blue)
    } else {
        (Winner::Blue, blue, red)
    };
    // The winner's Plan A lead; negative if the round flipped on Plan B/C
    let plan_a_lead = match winner {
        Winner::Red => delta_plan_a,
        _ => -delta_plan_a,
    };

    let (qualifies_10_7, reason_10_7) = check_10_7(
        winner,
        winner_breakdown,
        loser_breakdown,
        plan_a_lead,
        events,
        profile,
    );
    messages.push(reason_10_7);
    if qualifies_10_7 {
        let (red_points, blue_points) = match winner {
            Winner::Red => (10, 7),
            _ => (7, 10),
        };
        return GateResult { red_points, blue_points, winner, messages };
    }

    let (qualifies_10_8, reason_10_8) =
        check_10_8(winner_breakdown, loser_breakdown, plan_a_lead, profile);
    messages.push(reason_10_8);
    if qualifies_10_8 {
        let (red_points, blue_points) = match winner {
            Winner::Red => (10, 8),
            _ => (8, 10),
        };
        return GateResult { red_points, blue_points, winner, messages };
    }

    messages.push(format!("10-9 {}: Standard round victory", winner.as_str()));
    let (red_points, blue_points) = match winner {
        Winner::Red => (10, 9),
        _ => (9, 10),
    };
    GateResult { red_points, blue_points, winner, messages }
}
