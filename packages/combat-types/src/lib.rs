//! # combat-types
//!
//! Shared combat-event structures for the FightJudge scoring pipeline.
//!
//! These types are used by:
//! - `backend-rust`: harmonizing, admitting, scoring and hashing events
//! - `packages/bout-simulator`: producing scripted judge/CV event streams
//!
//! ## Event contract
//!
//! - `RawEvent` is the loose inbound JSON shape: vendor event-type strings,
//!   `fighter1`/`fighter2` corner spellings, percentage severities.
//! - `CombatEvent` is the canonical form every downstream component consumes.
//!   The pipeline alone sets `deduplicated`, `canonical` and `processed_at`.
//!
//! ## Invariants
//! - `severity` and `confidence` are in [0,1] on every `CombatEvent`
//! - `event_id` is unique within a bout for the lifetime of the bout
//! - the event taxonomy is closed; unknown types never reach a round

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Corner ────────────────────────────────────────────────────────────────────

/// Fighter corner. Inbound `fighter1`/`fighter2` spellings are normalized by
/// the harmonizer before a `CombatEvent` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Corner {
    Red,
    Blue,
}

impl Corner {
    pub fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Blue => "BLUE",
        }
    }
}

// ── Event Source ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    /// Tablet tap from a human judge (confidence defaults to 1.0)
    JudgeManual,
    /// Computer-vision detector feed
    CvSystem,
    /// Synthesized by the pipeline itself (momentum swings)
    AnalyticsDerived,
}

// ── Strike Technique ──────────────────────────────────────────────────────────

/// Concrete strike technique, used by the scoring engine's base-weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Jab,
    Cross,
    Hook,
    Uppercut,
    Overhand,
    HeadKick,
    BodyKick,
    LegKick,
    FrontKick,
    Elbow,
    Knee,
    GroundStrike,
}

impl Technique {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jab => "jab",
            Self::Cross => "cross",
            Self::Hook => "hook",
            Self::Uppercut => "uppercut",
            Self::Overhand => "overhand",
            Self::HeadKick => "head_kick",
            Self::BodyKick => "body_kick",
            Self::LegKick => "leg_kick",
            Self::FrontKick => "front_kick",
            Self::Elbow => "elbow",
            Self::Knee => "knee",
            Self::GroundStrike => "ground_strike",
        }
    }
}

// ── Event Taxonomy ────────────────────────────────────────────────────────────

/// The closed event taxonomy. Wire names are case-sensitive
/// SCREAMING_SNAKE_CASE; vendor spellings are mapped by the harmonizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Strikes
    StrikeJab,
    StrikeCross,
    StrikeHook,
    StrikeUppercut,
    StrikeOverhand,
    StrikeElbow,
    StrikeKnee,
    KickHead,
    KickBody,
    KickLeg,
    KickFront,
    StrikeGround,
    // CV aggregates
    StrikeSig,
    StrikeHighimpact,
    // Impact
    KdFlash,
    KdHard,
    KdNf,
    Rocked,
    // Grappling
    TdAttempt,
    TdLand,
    TdStuffed,
    SubAttempt,
    Sweep,
    GuardPass,
    // Control
    ControlStart,
    ControlEnd,
    ControlPosition,
    // Dynamics / aggression
    MomentumSwing,
    Aggression,
    Pressing,
    ForwardMovement,
}

impl EventType {
    /// Strike technique for base-weight lookup, if this is a technique strike.
    pub fn technique(self) -> Option<Technique> {
        match self {
            Self::StrikeJab => Some(Technique::Jab),
            Self::StrikeCross => Some(Technique::Cross),
            Self::StrikeHook => Some(Technique::Hook),
            Self::StrikeUppercut => Some(Technique::Uppercut),
            Self::StrikeOverhand => Some(Technique::Overhand),
            Self::StrikeElbow => Some(Technique::Elbow),
            Self::StrikeKnee => Some(Technique::Knee),
            Self::KickHead => Some(Technique::HeadKick),
            Self::KickBody => Some(Technique::BodyKick),
            Self::KickLeg => Some(Technique::LegKick),
            Self::KickFront => Some(Technique::FrontKick),
            Self::StrikeGround => Some(Technique::GroundStrike),
            _ => None,
        }
    }

    pub fn is_strike(self) -> bool {
        self.technique().is_some()
    }

    pub fn is_knockdown(self) -> bool {
        matches!(self, Self::KdFlash | Self::KdHard | Self::KdNf)
    }

    pub fn is_impact(self) -> bool {
        self.is_knockdown() || matches!(self, Self::Rocked | Self::StrikeHighimpact)
    }

    pub fn is_grappling(self) -> bool {
        matches!(
            self,
            Self::TdAttempt | Self::TdLand | Self::TdStuffed | Self::SubAttempt | Self::Sweep | Self::GuardPass
        )
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::ControlStart | Self::ControlEnd | Self::ControlPosition)
    }

    pub fn is_aggression(self) -> bool {
        matches!(self, Self::Aggression | Self::Pressing | Self::ForwardMovement)
    }

    /// Striking events that can trigger momentum-swing synthesis.
    pub fn is_momentum_trigger(self) -> bool {
        matches!(self, Self::StrikeSig | Self::StrikeHighimpact)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrikeJab => "STRIKE_JAB",
            Self::StrikeCross => "STRIKE_CROSS",
            Self::StrikeHook => "STRIKE_HOOK",
            Self::StrikeUppercut => "STRIKE_UPPERCUT",
            Self::StrikeOverhand => "STRIKE_OVERHAND",
            Self::StrikeElbow => "STRIKE_ELBOW",
            Self::StrikeKnee => "STRIKE_KNEE",
            Self::KickHead => "KICK_HEAD",
            Self::KickBody => "KICK_BODY",
            Self::KickLeg => "KICK_LEG",
            Self::KickFront => "KICK_FRONT",
            Self::StrikeGround => "STRIKE_GROUND",
            Self::StrikeSig => "STRIKE_SIG",
            Self::StrikeHighimpact => "STRIKE_HIGHIMPACT",
            Self::KdFlash => "KD_FLASH",
            Self::KdHard => "KD_HARD",
            Self::KdNf => "KD_NF",
            Self::Rocked => "ROCKED",
            Self::TdAttempt => "TD_ATTEMPT",
            Self::TdLand => "TD_LAND",
            Self::TdStuffed => "TD_STUFFED",
            Self::SubAttempt => "SUB_ATTEMPT",
            Self::Sweep => "SWEEP",
            Self::GuardPass => "GUARD_PASS",
            Self::ControlStart => "CONTROL_START",
            Self::ControlEnd => "CONTROL_END",
            Self::ControlPosition => "CONTROL_POSITION",
            Self::MomentumSwing => "MOMENTUM_SWING",
            Self::Aggression => "AGGRESSION",
            Self::Pressing => "PRESSING",
            Self::ForwardMovement => "FORWARD_MOVEMENT",
        }
    }
}

// ── Metadata refinements ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrikeQuality {
    Light,
    Solid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubTier {
    Light,
    Deep,
    NearFinish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlType {
    Top,
    Back,
    Cage,
}

impl ControlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "TOP",
            Self::Back => "BACK",
            Self::Cage => "CAGE",
        }
    }
}

/// Event-type-specific refinements. Typed fields cover the refinements the
/// pipeline acts on; anything else a vendor attaches survives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Submission depth for SUB_ATTEMPT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<SubTier>,
    /// Strike quality; the harmonizer defaults strikes to SOLID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<StrikeQuality>,
    /// Strike target zone, when the detector reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Legacy single-event control windows carry their span here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Position for CONTROL_START / CONTROL_END / CONTROL_POSITION
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_type: Option<ControlType>,
    // Momentum-swing synthesis trail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikes_in_flurry: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_span_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Vendor extras, passed through untouched
    #[serde(flatten, default)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ── Canonical Combat Event ────────────────────────────────────────────────────

/// The canonical unit of information flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEvent {
    pub event_id: String,
    pub bout_id: String,
    pub round_id: String,
    #[serde(rename = "fighter_id")]
    pub corner: Corner,
    pub event_type: EventType,
    /// Intensity/impact modifier in [0,1]
    pub severity: f64,
    /// Detection certainty in [0,1]; judge events default to 1.0
    pub confidence: f64,
    /// Milliseconds from bout-clock zero
    pub timestamp_ms: i64,
    pub source: EventSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_degrees: Option<f64>,
    #[serde(default)]
    pub metadata: EventMetadata,
    // Pipeline-owned flags, never set by producers
    #[serde(default)]
    pub deduplicated: bool,
    #[serde(default)]
    pub canonical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl CombatEvent {
    pub fn quality(&self) -> StrikeQuality {
        self.metadata.quality.unwrap_or(StrikeQuality::Solid)
    }
}

// ── Raw inbound event ─────────────────────────────────────────────────────────

/// Loose inbound shape accepted from judges and CV vendors. Everything the
/// harmonizer can repair is optional; what it cannot repair it rejects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub bout_id: String,
    pub round_id: String,
    /// "RED" | "BLUE" | "fighter1" | "fighter2"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fighter_id: Option<String>,
    /// Vendor or canonical event-type name
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_degrees: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_wire_names_are_screaming_snake_case() {
        let json = serde_json::to_string(&EventType::KdNf).unwrap();
        assert_eq!(json, "\"KD_NF\"");
        let json = serde_json::to_string(&EventType::StrikeHighimpact).unwrap();
        assert_eq!(json, "\"STRIKE_HIGHIMPACT\"");
        let back: EventType = serde_json::from_str("\"KICK_LEG\"").unwrap();
        assert_eq!(back, EventType::KickLeg);
    }

    #[test]
    fn corner_serializes_to_wire_field_name() {
        let event = CombatEvent {
            event_id: "e1".into(),
            bout_id: "b1".into(),
            round_id: "r1".into(),
            corner: Corner::Red,
            event_type: EventType::StrikeJab,
            severity: 0.5,
            confidence: 1.0,
            timestamp_ms: 1000,
            source: EventSource::JudgeManual,
            camera_id: None,
            angle_degrees: None,
            metadata: EventMetadata::default(),
            deduplicated: false,
            canonical: false,
            processed_at: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["fighter_id"], "RED");
    }

    #[test]
    fn technique_lookup_covers_all_strikes() {
        assert_eq!(EventType::KickLeg.technique(), Some(Technique::LegKick));
        assert_eq!(EventType::StrikeSig.technique(), None);
        assert!(EventType::StrikeGround.is_strike());
        assert!(!EventType::KdHard.is_strike());
        assert!(EventType::KdHard.is_knockdown());
        assert!(EventType::StrikeHighimpact.is_momentum_trigger());
    }

    #[test]
    fn unknown_metadata_keys_survive_roundtrip() {
        let json = r#"{"quality":"SOLID","vendor_frame":42}"#;
        let meta: EventMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.quality, Some(StrikeQuality::Solid));
        assert_eq!(meta.extra["vendor_frame"], 42);
    }
}
