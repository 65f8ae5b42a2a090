//! Scoring constants, grouped as a profile so a promotion can override them.

use combat_types::{ControlType, StrikeQuality, SubTier, Technique};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrikeWeights {
    pub jab: f64,
    pub cross: f64,
    pub hook: f64,
    pub uppercut: f64,
    pub overhand: f64,
    pub head_kick: f64,
    pub body_kick: f64,
    pub leg_kick: f64,
    pub front_kick: f64,
    pub elbow: f64,
    pub knee: f64,
    pub ground_strike: f64,
}

impl Default for StrikeWeights {
    fn default() -> Self {
        Self {
            jab: 1.0,
            cross: 2.0,
            hook: 2.5,
            uppercut: 2.5,
            overhand: 2.8,
            head_kick: 5.0,
            body_kick: 3.0,
            leg_kick: 1.5,
            front_kick: 2.0,
            elbow: 3.0,
            knee: 4.0,
            ground_strike: 1.2,
        }
    }
}

impl StrikeWeights {
    pub fn for_technique(&self, technique: Technique) -> f64 {
        match technique {
            Technique::Jab => self.jab,
            Technique::Cross => self.cross,
            Technique::Hook => self.hook,
            Technique::Uppercut => self.uppercut,
            Technique::Overhand => self.overhand,
            Technique::HeadKick => self.head_kick,
            Technique::BodyKick => self.body_kick,
            Technique::LegKick => self.leg_kick,
            Technique::FrontKick => self.front_kick,
            Technique::Elbow => self.elbow,
            Technique::Knee => self.knee,
            Technique::GroundStrike => self.ground_strike,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gate108 {
    pub min_total_kd: u32,
    pub alt_kd_hard_min: u32,
    pub alt_kd_nf_min: u32,
    pub alt_sub_nf_min: u32,
    pub min_plan_a_lead: f64,
    pub min_solid_differential: i64,
    pub min_heavy_advantage: i64,
}

impl Default for Gate108 {
    fn default() -> Self {
        Self {
            min_total_kd: 3,
            alt_kd_hard_min: 3,
            alt_kd_nf_min: 2,
            alt_sub_nf_min: 3,
            min_plan_a_lead: 4.0,
            min_solid_differential: 12,
            min_heavy_advantage: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gate107 {
    pub min_total_kd: u32,
    pub alt_kd_hard_min: u32,
    pub alt_nf_sequence_min: u32,
    pub alt_nf_kd_sequence_min: u32,
    pub min_plan_a_lead: f64,
    pub min_solid_differential: i64,
    pub min_heavy_advantage: i64,
}

impl Default for Gate107 {
    fn default() -> Self {
        Self {
            min_total_kd: 4,
            alt_kd_hard_min: 3,
            alt_nf_sequence_min: 4,
            alt_nf_kd_sequence_min: 3,
            min_plan_a_lead: 8.0,
            min_solid_differential: 25,
            min_heavy_advantage: 10,
        }
    }
}

/// All scoring constants in one overridable bundle. Defaults are the ruleset
/// this engine ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringProfile {
    pub strike_weights: StrikeWeights,
    pub quality_light_multiplier: f64,
    // Impact event values
    pub kd_flash_value: f64,
    pub kd_hard_value: f64,
    pub kd_nf_value: f64,
    pub rocked_value: f64,
    pub highimpact_strike_value: f64,
    // Grappling
    pub takedown_landed_value: f64,
    pub takedown_stuffed_value: f64,
    pub sweep_value: f64,
    pub guard_pass_value: f64,
    pub sub_light_value: f64,
    pub sub_deep_value: f64,
    pub sub_nf_value: f64,
    // Control reward rate per second, by position
    pub control_rate_top: f64,
    pub control_rate_back: f64,
    pub control_rate_cage: f64,
    pub control_offense_multiplier: f64,
    pub control_no_offense_multiplier: f64,
    // Plan hierarchy
    pub plan_b_threshold: f64,
    pub plan_b_cap: f64,
    pub plan_c_threshold: f64,
    pub draw_threshold: f64,
    pub aggression_event_value: f64,
    // Leg-Damage Index
    pub ldi_increment: f64,
    // Near-finish sequence pairing window
    pub nf_sequence_window_seconds: i64,
    // Score-card gates
    pub gate_10_8: Gate108,
    pub gate_10_7: Gate107,
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self {
            strike_weights: StrikeWeights::default(),
            quality_light_multiplier: 0.5,
            kd_flash_value: 15.0,
            kd_hard_value: 25.0,
            kd_nf_value: 35.0,
            rocked_value: 12.0,
            highimpact_strike_value: 5.0,
            takedown_landed_value: 4.0,
            takedown_stuffed_value: 0.5,
            sweep_value: 3.0,
            guard_pass_value: 1.0,
            sub_light_value: 2.0,
            sub_deep_value: 6.0,
            sub_nf_value: 12.0,
            control_rate_top: 0.010,
            control_rate_back: 0.012,
            control_rate_cage: 0.006,
            control_offense_multiplier: 1.10,
            control_no_offense_multiplier: 0.5,
            plan_b_threshold: 2.0,
            plan_b_cap: 1.5,
            plan_c_threshold: 1.0,
            draw_threshold: 0.5,
            aggression_event_value: 0.3,
            ldi_increment: 0.1,
            nf_sequence_window_seconds: 30,
            gate_10_8: Gate108::default(),
            gate_10_7: Gate107::default(),
        }
    }
}

impl ScoringProfile {
    pub fn quality_multiplier(&self, quality: StrikeQuality) -> f64 {
        match quality {
            StrikeQuality::Light => self.quality_light_multiplier,
            StrikeQuality::Solid => 1.0,
        }
    }

    /// Heavy strikes: the techniques that decide gate advantages.
    pub fn is_heavy(&self, technique: Technique) -> bool {
        matches!(
            technique,
            Technique::Hook
                | Technique::Uppercut
                | Technique::Overhand
                | Technique::HeadKick
                | Technique::BodyKick
                | Technique::Elbow
                | Technique::Knee
        )
    }

    pub fn submission_value(&self, tier: SubTier) -> f64 {
        match tier {
            SubTier::Light => self.sub_light_value,
            SubTier::Deep => self.sub_deep_value,
            SubTier::NearFinish => self.sub_nf_value,
        }
    }

    pub fn control_rate(&self, control_type: ControlType) -> f64 {
        match control_type {
            ControlType::Top => self.control_rate_top,
            ControlType::Back => self.control_rate_back,
            ControlType::Cage => self.control_rate_cage,
        }
    }

    /// Escalation multiplier for a leg kick against a target with the given
    /// accumulated Leg-Damage Index.
    pub fn ldi_multiplier(&self, ldi: f64) -> f64 {
        if ldi < 0.3 {
            1.00
        } else if ldi < 0.6 {
            1.10
        } else if ldi < 1.0 {
            1.25
        } else {
            1.40
        }
    }
}
