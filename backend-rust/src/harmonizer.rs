//! # harmonizer
//!
//! Turns any inbound payload — judge tablet taps, vendor CV detections —
//! into a canonical `CombatEvent`, or rejects it with a typed reason. Pure:
//! no persistence, no bus, no shared state.

use combat_types::{
    CombatEvent, ControlType, Corner, EventMetadata, EventSource, EventType, RawEvent, StrikeQuality,
};
use uuid::Uuid;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum HarmonizeError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    #[error("missing or invalid corner")]
    MissingCorner,
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl HarmonizeError {
    /// Machine-readable reason code carried into audit entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownEventType(_) => "UNKNOWN_EVENT_TYPE",
            Self::MissingCorner => "MISSING_CORNER",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
        }
    }
}

// ── Vendor substitution table ─────────────────────────────────────────────────

/// Map an inbound event-type name to the canonical taxonomy. Canonical names
/// map to themselves; known vendor spellings are substituted; anything else
/// is rejected. Positional vendor names also imply a control type.
fn resolve_event_type(name: &str) -> Option<(EventType, Option<ControlType>)> {
    // Canonical wire names first
    if let Ok(event_type) = serde_json::from_value::<EventType>(serde_json::Value::String(name.to_string())) {
        return Some((event_type, None));
    }
    let mapped = match name {
        // vendor A (punch_* family)
        "punch_jab" => EventType::StrikeJab,
        "punch_straight" | "punch_cross" => EventType::StrikeCross,
        "punch_hook" => EventType::StrikeHook,
        "punch_uppercut" => EventType::StrikeUppercut,
        "punch_overhand" => EventType::StrikeOverhand,
        "knockdown" => EventType::KdHard,
        // vendor B (*_detected family)
        "jab_detected" => EventType::StrikeJab,
        "cross_detected" => EventType::StrikeCross,
        "hook_detected" => EventType::StrikeHook,
        "kd_event" => EventType::KdHard,
        // shared loose spellings
        "rock" | "rocked" => EventType::Rocked,
        "kick_low" | "low_kick" => EventType::KickLeg,
        "td_landed" | "takedown" => EventType::TdLand,
        "takedown_stuffed" => EventType::TdStuffed,
        "submission_attempt" => EventType::SubAttempt,
        "control_top" => return Some((EventType::ControlPosition, Some(ControlType::Top))),
        "control_back" => return Some((EventType::ControlPosition, Some(ControlType::Back))),
        "control_cage" => return Some((EventType::ControlPosition, Some(ControlType::Cage))),
        _ => return None,
    };
    Some((mapped, None))
}

fn resolve_corner(fighter_id: Option<&str>) -> Option<Corner> {
    match fighter_id?.trim() {
        "RED" | "red" | "fighter1" => Some(Corner::Red),
        "BLUE" | "blue" | "fighter2" => Some(Corner::Blue),
        _ => None,
    }
}

// ── Harmonizer ────────────────────────────────────────────────────────────────

/// Normalize a single raw event into the canonical schema.
pub fn harmonize(raw: RawEvent, source_hint: EventSource) -> Result<CombatEvent, HarmonizeError> {
    let (event_type, implied_control) = resolve_event_type(&raw.event_type)
        .ok_or_else(|| HarmonizeError::UnknownEventType(raw.event_type.clone()))?;

    let corner = resolve_corner(raw.fighter_id.as_deref()).ok_or(HarmonizeError::MissingCorner)?;

    let mut metadata: EventMetadata = match raw.metadata {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| HarmonizeError::MalformedPayload(format!("metadata: {e}")))?,
        None => EventMetadata::default(),
    };
    if event_type.is_strike() && metadata.quality.is_none() {
        metadata.quality = Some(StrikeQuality::Solid);
    }
    if metadata.control_type.is_none() {
        metadata.control_type = implied_control;
    }

    let source = raw.source.unwrap_or(source_hint);

    // Severity: percentages are folded down, then everything clamps to [0,1]
    let mut severity = raw.severity.unwrap_or(0.5);
    if severity < 0.0 {
        return Err(HarmonizeError::OutOfRange { field: "severity", value: severity });
    }
    if severity > 1.0 {
        severity /= 100.0;
    }
    severity = severity.clamp(0.0, 1.0);

    let confidence = raw.confidence.unwrap_or(match source {
        EventSource::JudgeManual => 1.0,
        EventSource::CvSystem | EventSource::AnalyticsDerived => 0.7,
    });
    if confidence < 0.0 {
        return Err(HarmonizeError::OutOfRange { field: "confidence", value: confidence });
    }
    let confidence = confidence.clamp(0.0, 1.0);

    Ok(CombatEvent {
        event_id: raw.event_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        bout_id: raw.bout_id,
        round_id: raw.round_id,
        corner,
        event_type,
        severity,
        confidence,
        timestamp_ms: raw.timestamp_ms,
        source,
        camera_id: raw.camera_id,
        angle_degrees: raw.angle_degrees,
        metadata,
        deduplicated: false,
        canonical: false,
        processed_at: None,
    })
}

/// Batch form: accepted events plus (index, error) pairs for the rejects.
pub fn harmonize_batch(
    raw_events: Vec<RawEvent>,
    source_hint: EventSource,
) -> (Vec<CombatEvent>, Vec<(usize, HarmonizeError)>) {
    let mut accepted = Vec::with_capacity(raw_events.len());
    let mut errors = Vec::new();
    for (i, raw) in raw_events.into_iter().enumerate() {
        match harmonize(raw, source_hint) {
            Ok(event) => accepted.push(event),
            Err(err) => errors.push((i, err)),
        }
    }
    (accepted, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(event_type: &str, fighter: Option<&str>) -> RawEvent {
        RawEvent {
            bout_id: "b1".into(),
            round_id: "r1".into(),
            fighter_id: fighter.map(str::to_string),
            event_type: event_type.to_string(),
            timestamp_ms: 1000,
            ..RawEvent::default()
        }
    }

    #[test]
    fn vendor_names_map_to_canonical_taxonomy() {
        let event = harmonize(raw("punch_jab", Some("fighter1")), EventSource::CvSystem).unwrap();
        assert_eq!(event.event_type, EventType::StrikeJab);
        assert_eq!(event.corner, Corner::Red);

        let event = harmonize(raw("jab_detected", Some("BLUE")), EventSource::CvSystem).unwrap();
        assert_eq!(event.event_type, EventType::StrikeJab);
        assert_eq!(event.corner, Corner::Blue);

        let event = harmonize(raw("KICK_LEG", Some("RED")), EventSource::JudgeManual).unwrap();
        assert_eq!(event.event_type, EventType::KickLeg);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = harmonize(raw("backflip", Some("RED")), EventSource::CvSystem).unwrap_err();
        assert_eq!(err, HarmonizeError::UnknownEventType("backflip".into()));
    }

    #[test]
    fn missing_or_invalid_corner_is_rejected() {
        let err = harmonize(raw("STRIKE_JAB", None), EventSource::CvSystem).unwrap_err();
        assert_eq!(err, HarmonizeError::MissingCorner);
        let err = harmonize(raw("STRIKE_JAB", Some("GREEN")), EventSource::CvSystem).unwrap_err();
        assert_eq!(err, HarmonizeError::MissingCorner);
    }

    #[test]
    fn percentage_severity_is_folded_and_clamped() {
        let mut input = raw("STRIKE_HOOK", Some("RED"));
        input.severity = Some(85.0);
        let event = harmonize(input, EventSource::CvSystem).unwrap();
        assert!((event.severity - 0.85).abs() < 1e-9);

        let mut input = raw("STRIKE_HOOK", Some("RED"));
        input.severity = Some(250.0);
        let event = harmonize(input, EventSource::CvSystem).unwrap();
        assert!((event.severity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_values_are_out_of_range() {
        let mut input = raw("STRIKE_HOOK", Some("RED"));
        input.severity = Some(-0.1);
        assert!(matches!(
            harmonize(input, EventSource::CvSystem),
            Err(HarmonizeError::OutOfRange { field: "severity", .. })
        ));

        let mut input = raw("STRIKE_HOOK", Some("RED"));
        input.confidence = Some(-1.0);
        assert!(matches!(
            harmonize(input, EventSource::CvSystem),
            Err(HarmonizeError::OutOfRange { field: "confidence", .. })
        ));
    }

    #[test]
    fn judge_confidence_defaults_to_full() {
        let event = harmonize(raw("STRIKE_JAB", Some("RED")), EventSource::JudgeManual).unwrap();
        assert!((event.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(event.source, EventSource::JudgeManual);
    }

    #[test]
    fn strike_quality_defaults_to_solid() {
        let event = harmonize(raw("STRIKE_JAB", Some("RED")), EventSource::JudgeManual).unwrap();
        assert_eq!(event.metadata.quality, Some(StrikeQuality::Solid));
        // Non-strikes are left alone
        let event = harmonize(raw("TD_LAND", Some("RED")), EventSource::JudgeManual).unwrap();
        assert_eq!(event.metadata.quality, None);
    }

    #[test]
    fn positional_vendor_names_imply_control_type() {
        let event = harmonize(raw("control_back", Some("BLUE")), EventSource::CvSystem).unwrap();
        assert_eq!(event.event_type, EventType::ControlPosition);
        assert_eq!(event.metadata.control_type, Some(ControlType::Back));
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        let mut input = raw("SUB_ATTEMPT", Some("RED"));
        input.metadata = Some(json!({"tier": "IMPOSSIBLE"}));
        assert!(matches!(
            harmonize(input, EventSource::JudgeManual),
            Err(HarmonizeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn batch_splits_accepted_and_errors() {
        let batch = vec![
            raw("STRIKE_JAB", Some("RED")),
            raw("mystery", Some("RED")),
            raw("STRIKE_CROSS", Some("fighter2")),
        ];
        let (accepted, errors) = harmonize_batch(batch, EventSource::CvSystem);
        assert_eq!(accepted.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 1);
    }

    #[test]
    fn event_id_assigned_when_absent() {
        let event = harmonize(raw("STRIKE_JAB", Some("RED")), EventSource::CvSystem).unwrap();
        assert!(!event.event_id.is_empty());

        let mut input = raw("STRIKE_JAB", Some("RED"));
        input.event_id = Some("given".into());
        let event = harmonize(input, EventSource::CvSystem).unwrap();
        assert_eq!(event.event_id, "given");
    }
}
