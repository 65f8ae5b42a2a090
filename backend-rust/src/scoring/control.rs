//! Control-window parsing and scoring. Two input patterns: paired
//! CONTROL_START / CONTROL_END events matched per (corner, position) with a
//! stack, and legacy single CONTROL_POSITION events carrying
//! `duration_seconds`. A window earns half value with no offense inside it,
//! full value × offense multiplier otherwise. Plan A excludes CAGE; Plan C
//! scores only CAGE.

use combat_types::{CombatEvent, ControlType, Corner, EventType, StrikeQuality};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::profile::ScoringProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlWindow {
    pub corner: Corner,
    pub control_type: ControlType,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_seconds: f64,
    pub has_offense: bool,
    pub offense_events: Vec<String>,
}

/// Which side of the Plan hierarchy a scoring pass wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScope {
    /// Plan A: TOP and BACK only
    ExcludingCage,
    /// Plan C: CAGE only
    CageOnly,
}

/// Parse control windows out of a round's ordered events. Unmatched starts
/// are closed at round end and logged.
pub fn parse_control_windows(events: &[CombatEvent], round_end_ms: Option<i64>) -> Vec<ControlWindow> {
    let round_end = round_end_ms
        .or_else(|| events.iter().map(|e| e.timestamp_ms).max())
        .unwrap_or(0);

    let mut windows = Vec::new();
    let mut active: HashMap<(Corner, ControlType), Vec<i64>> = HashMap::new();

    for event in events {
        match event.event_type {
            EventType::ControlPosition => {
                let duration = event.metadata.duration_seconds.unwrap_or(0.0);
                if duration > 0.0 {
                    let control_type = event.metadata.control_type.unwrap_or(ControlType::Top);
                    windows.push(ControlWindow {
                        corner: event.corner,
                        control_type,
                        start_ms: event.timestamp_ms - (duration * 1000.0) as i64,
                        end_ms: event.timestamp_ms,
                        duration_seconds: duration,
                        has_offense: false,
                        offense_events: Vec::new(),
                    });
                }
            }
            EventType::ControlStart => {
                let control_type = event.metadata.control_type.unwrap_or(ControlType::Top);
                active
                    .entry((event.corner, control_type))
                    .or_default()
                    .push(event.timestamp_ms);
            }
            EventType::ControlEnd => {
                let control_type = event.metadata.control_type.unwrap_or(ControlType::Top);
                if let Some(start_ms) = active
                    .get_mut(&(event.corner, control_type))
                    .and_then(Vec::pop)
                {
                    let duration_ms = event.timestamp_ms - start_ms;
                    if duration_ms > 0 {
                        windows.push(ControlWindow {
                            corner: event.corner,
                            control_type,
                            start_ms,
                            end_ms: event.timestamp_ms,
                            duration_seconds: duration_ms as f64 / 1000.0,
                            has_offense: false,
                            offense_events: Vec::new(),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    // Unmatched starts close at round end, in a fixed order so scoring stays
    // byte-deterministic
    let mut leftovers: Vec<((Corner, ControlType), Vec<i64>)> = active.into_iter().collect();
    leftovers.sort_by_key(|((corner, control_type), _)| (*corner as u8, *control_type as u8));
    for ((corner, control_type), starts) in leftovers {
        for start_ms in starts {
            warn!(
                "unmatched {} control start for {} at {start_ms}ms, closing at round end",
                control_type.as_str(),
                corner.as_str()
            );
            let duration_ms = round_end - start_ms;
            if duration_ms > 0 {
                windows.push(ControlWindow {
                    corner,
                    control_type,
                    start_ms,
                    end_ms: round_end,
                    duration_seconds: duration_ms as f64 / 1000.0,
                    has_offense: false,
                    offense_events: Vec::new(),
                });
            }
        }
    }

    windows.sort_by_key(|w| (w.start_ms, w.end_ms));
    detect_offense(&mut windows, events);
    windows
}

/// Meaningful offense inside a window: a SOLID strike, or any submission
/// attempt, by the controlling fighter within the window timeframe.
fn detect_offense(windows: &mut [ControlWindow], events: &[CombatEvent]) {
    for window in windows.iter_mut() {
        let mut offense = Vec::new();
        for event in events {
            if event.corner != window.corner {
                continue;
            }
            if event.timestamp_ms > 0
                && window.start_ms > 0
                && !(window.start_ms..=window.end_ms).contains(&event.timestamp_ms)
            {
                continue;
            }
            let counts = match event.event_type {
                EventType::SubAttempt => true,
                t if t.is_strike() => event.quality() == StrikeQuality::Solid,
                _ => false,
            };
            if counts {
                offense.push(event.event_id.clone());
            }
        }
        window.has_offense = !offense.is_empty();
        window.offense_events = offense;
    }
}

/// Sum control contributions per corner within one Plan scope.
pub fn control_score(
    windows: &[ControlWindow],
    profile: &ScoringProfile,
    scope: ControlScope,
) -> (f64, f64) {
    let mut red = 0.0;
    let mut blue = 0.0;
    for window in windows {
        let in_scope = match scope {
            ControlScope::ExcludingCage => window.control_type != ControlType::Cage,
            ControlScope::CageOnly => window.control_type == ControlType::Cage,
        };
        if !in_scope {
            continue;
        }
        let rate = profile.control_rate(window.control_type);
        let multiplier = if window.has_offense {
            profile.control_offense_multiplier
        } else {
            profile.control_no_offense_multiplier
        };
        let score = window.duration_seconds * rate * multiplier;
        match window.corner {
            Corner::Red => red += score,
            Corner::Blue => blue += score,
        }
    }
    (red, blue)
}

/// Per-corner control totals for the receipt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ControlBreakdown {
    pub top_seconds: f64,
    pub back_seconds: f64,
    pub cage_seconds: f64,
    pub total_seconds: f64,
    pub windows_with_offense: u32,
}

pub fn control_breakdown(windows: &[ControlWindow], corner: Corner) -> ControlBreakdown {
    let mut breakdown = ControlBreakdown::default();
    for window in windows.iter().filter(|w| w.corner == corner) {
        match window.control_type {
            ControlType::Top => breakdown.top_seconds += window.duration_seconds,
            ControlType::Back => breakdown.back_seconds += window.duration_seconds,
            ControlType::Cage => breakdown.cage_seconds += window.duration_seconds,
        }
        breakdown.total_seconds += window.duration_seconds;
        if window.has_offense {
            breakdown.windows_with_offense += 1;
        }
    }
    breakdown
}
