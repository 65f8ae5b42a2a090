//! # scoring
//!
//! Deterministic 10-point-must scoring engine. Pure compute: the same event
//! list and profile always produce the same verdict and a byte-identical
//! receipt. No storage, no bus, no clock.
//!
//! Hierarchy: Plan A (striking + grappling + control + impact) decides most
//! rounds; Plan B (aggressiveness) and Plan C (cage control) only break ties
//! when no impact advantage exists; the 10-8/10-7 gates then bound the card.

mod control;
mod gates;
mod impact;
mod leg_damage;
mod plan;
mod profile;
mod receipt;

pub use control::{control_breakdown, control_score, parse_control_windows, ControlBreakdown, ControlScope, ControlWindow};
pub use impact::count_nf_sequences;
pub use leg_damage::LegDamageTracker;
pub use profile::{Gate107, Gate108, ScoringProfile, StrikeWeights};

use std::collections::BTreeMap;

use combat_types::{CombatEvent, Corner};
use serde::{Deserialize, Serialize};

// ── Verdict ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Red,
    Blue,
    Draw,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Blue => "BLUE",
            Self::Draw => "DRAW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub winner: Winner,
    /// Red-blue order, winner holds the 10: "10-9", "8-10", "10-10"
    pub score_card: String,
    pub red_points: u8,
    pub blue_points: u8,
}

// ── Receipt building blocks ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Striking,
    Grappling,
    Control,
    Impact,
}

/// One scoring contribution, for explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionItem {
    pub id: String,
    pub corner: Corner,
    pub label: String,
    pub points: f64,
    pub category: Category,
}

/// Per-corner category subtotals plus every count the gates read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CornerBreakdown {
    pub striking_score: f64,
    pub grappling_score: f64,
    pub control_score: f64,
    pub impact_score: f64,
    pub plan_a_total: f64,
    pub plan_b_value: f64,
    pub plan_c_value: f64,
    pub strike_breakdown: BTreeMap<String, u32>,
    pub grappling_breakdown: BTreeMap<String, u32>,
    pub control_breakdown: ControlBreakdown,
    pub kd_flash_count: u32,
    pub kd_hard_count: u32,
    pub kd_nf_count: u32,
    pub rocked_count: u32,
    pub total_kd_count: u32,
    pub highimpact_count: u32,
    pub heavy_strike_count: u32,
    pub solid_strike_count: u32,
    pub sub_nf_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReceipt {
    pub round_number: u32,
    pub winner: Winner,
    /// Display string, e.g. "10-9 RED" or "10-10"
    pub score: String,
    pub red_plan_a: f64,
    pub blue_plan_a: f64,
    pub delta_plan_a: f64,
    pub plan_b_applied: f64,
    pub plan_c_applied: f64,
    pub plan_b_allowed: bool,
    pub plan_c_allowed: bool,
    pub plan_b_reason: String,
    pub plan_c_reason: String,
    pub red_has_impact_advantage: bool,
    pub blue_has_impact_advantage: bool,
    pub impact_advantage_reason: String,
    pub top_drivers: Vec<ContributionItem>,
    pub gate_messages: Vec<String>,
    pub red_breakdown: CornerBreakdown,
    pub blue_breakdown: CornerBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundScore {
    pub red: CornerBreakdown,
    pub blue: CornerBreakdown,
    pub delta_plan_a: f64,
    pub delta_plan_b: f64,
    pub delta_plan_c: f64,
    pub delta_round: f64,
    pub verdict: Verdict,
    pub receipt: RoundReceipt,
    pub total_events: usize,
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Score a round. O(n log n) over events, no I/O.
pub fn score_round(round_num: u32, events: &[CombatEvent], profile: &ScoringProfile) -> RoundScore {
    if events.is_empty() {
        return empty_round(round_num);
    }

    // Plan A with full contribution trail
    let plan_a = plan::compute_plan_a(events, profile);
    let (mut red, mut blue) = (plan_a.red, plan_a.blue);
    let delta_plan_a = red.plan_a_total - blue.plan_a_total;

    // Impact advantage disables the tie-breaking plans
    let (red_adv, blue_adv, impact_reason) = impact::check_impact_advantage(&red, &blue);

    let plan_b = plan::compute_plan_b(events, delta_plan_a, red_adv, blue_adv, profile);
    let combined = delta_plan_a + plan_b.delta;
    let plan_c = plan::compute_plan_c(events, combined, red_adv, blue_adv, profile);

    if plan_b.delta > 0.0 {
        red.plan_b_value = plan_b.delta;
    } else if plan_b.delta < 0.0 {
        blue.plan_b_value = -plan_b.delta;
    }
    if plan_c.delta > 0.0 {
        red.plan_c_value = plan_c.delta;
    } else if plan_c.delta < 0.0 {
        blue.plan_c_value = -plan_c.delta;
    }

    let delta_round = delta_plan_a + plan_b.delta + plan_c.delta;

    let gate_result = gates::apply_gates(
        delta_round,
        delta_plan_a,
        &red,
        &blue,
        red_adv,
        blue_adv,
        events,
        profile,
    );

    let score_string = match gate_result.winner {
        Winner::Draw => "10-10".to_string(),
        Winner::Red => format!("{}-{} RED", gate_result.red_points, gate_result.blue_points),
        Winner::Blue => format!("{}-{} BLUE", gate_result.blue_points, gate_result.red_points),
    };

    let receipt = receipt::generate_receipt(receipt::ReceiptInput {
        round_number: round_num,
        winner: gate_result.winner,
        score: score_string,
        red_breakdown: &red,
        blue_breakdown: &blue,
        delta_plan_a,
        delta_plan_b: plan_b.delta,
        delta_plan_c: plan_c.delta,
        plan_b_allowed: plan_b.allowed,
        plan_c_allowed: plan_c.allowed,
        plan_b_reason: plan_b.reason,
        plan_c_reason: plan_c.reason,
        red_impact_advantage: red_adv,
        blue_impact_advantage: blue_adv,
        impact_advantage_reason: impact_reason,
        gate_messages: gate_result.messages,
        contributions: plan_a.contributions,
    });

    let verdict = Verdict {
        winner: gate_result.winner,
        score_card: format!("{}-{}", gate_result.red_points, gate_result.blue_points),
        red_points: gate_result.red_points,
        blue_points: gate_result.blue_points,
    };

    RoundScore {
        red,
        blue,
        delta_plan_a,
        delta_plan_b: plan_b.delta,
        delta_plan_c: plan_c.delta,
        delta_round,
        verdict,
        receipt,
        total_events: events.len(),
    }
}

fn empty_round(round_num: u32) -> RoundScore {
    let verdict = Verdict {
        winner: Winner::Draw,
        score_card: "10-10".to_string(),
        red_points: 10,
        blue_points: 10,
    };
    let receipt = RoundReceipt {
        round_number: round_num,
        winner: Winner::Draw,
        score: "10-10".to_string(),
        red_plan_a: 0.0,
        blue_plan_a: 0.0,
        delta_plan_a: 0.0,
        plan_b_applied: 0.0,
        plan_c_applied: 0.0,
        plan_b_allowed: false,
        plan_c_allowed: false,
        plan_b_reason: "No events".to_string(),
        plan_c_reason: "No events".to_string(),
        red_has_impact_advantage: false,
        blue_has_impact_advantage: false,
        impact_advantage_reason: "No events".to_string(),
        top_drivers: Vec::new(),
        gate_messages: vec!["10-10 Draw: No events logged".to_string()],
        red_breakdown: CornerBreakdown::default(),
        blue_breakdown: CornerBreakdown::default(),
    };
    RoundScore {
        red: CornerBreakdown::default(),
        blue: CornerBreakdown::default(),
        delta_plan_a: 0.0,
        delta_plan_b: 0.0,
        delta_plan_c: 0.0,
        delta_round: 0.0,
        verdict,
        receipt,
        total_events: 0,
    }
}
