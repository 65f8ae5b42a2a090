//! # validator
//!
//! Pre-lock round validation. Pure: given events and the round envelope it
//! produces a structured report; the round manager decides what to do with it
//! and audit-logs it. A CRITICAL issue blocks the lock; ERRORs flag the round
//! for supervisor review; WARNINGs are informational.

use chrono::{DateTime, Utc};
use combat_types::{CombatEvent, EventSource};
use serde::{Deserialize, Serialize};
use serde_json::json;

const TOTAL_CHECKS: u32 = 5;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationConfig {
    pub min_total_events: usize,
    pub min_judge_events: usize,
    pub max_judge_inactivity_sec: i64,
    pub max_cv_inactivity_sec: i64,
    pub timecode_tolerance_ms: i64,
    pub expected_round_duration_sec: i64,
    pub duration_tolerance_sec: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_total_events: 5,
            min_judge_events: 2,
            max_judge_inactivity_sec: 60,
            max_cv_inactivity_sec: 30,
            timecode_tolerance_ms: 5000,
            expected_round_duration_sec: 300,
            duration_tolerance_sec: 30,
        }
    }
}

// ── Issues ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingJudgeEvents,
    CvFeedInactive,
    TimecodeMismatch,
    JudgeInactivity,
    InsufficientEvents,
    TimingAnomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub round_id: String,
    pub bout_id: String,
    pub round_num: u32,
    pub valid: bool,
    pub requires_supervisor_review: bool,
    pub can_lock: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: u32,
    pub errors: u32,
    pub critical_issues: u32,
    pub total_events: usize,
    pub judge_events: usize,
    pub cv_events: usize,
    pub checks_passed: u32,
    pub checks_failed: u32,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn has_critical(&self) -> bool {
        self.critical_issues > 0
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub fn validate_round(
    round_id: &str,
    bout_id: &str,
    round_num: u32,
    events: &[CombatEvent],
    round_start_ms: Option<i64>,
    round_end_ms: Option<i64>,
    config: &ValidationConfig,
) -> ValidationReport {
    let judge_events: Vec<&CombatEvent> = events
        .iter()
        .filter(|e| e.source == EventSource::JudgeManual)
        .collect();
    let cv_events: Vec<&CombatEvent> = events
        .iter()
        .filter(|e| e.source == EventSource::CvSystem)
        .collect();

    let mut issues = Vec::new();
    issues.extend(check_minimum_events(events, &judge_events, config));
    issues.extend(check_judge_inactivity(&judge_events, config));
    issues.extend(check_cv_feed_activity(&cv_events, config));
    if let (Some(start), Some(end)) = (round_start_ms, round_end_ms) {
        issues.extend(check_timecodes(events, start, end, config));
        issues.extend(check_round_duration(start, end, config));
    }

    let warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count() as u32;
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count() as u32;
    let critical = issues.iter().filter(|i| i.severity == Severity::Critical).count() as u32;

    let mut failed_kinds: Vec<IssueKind> = issues.iter().map(|i| i.kind).collect();
    failed_kinds.sort_unstable();
    failed_kinds.dedup();
    let checks_failed = failed_kinds.len() as u32;

    ValidationReport {
        round_id: round_id.to_string(),
        bout_id: bout_id.to_string(),
        round_num,
        valid: issues.is_empty(),
        requires_supervisor_review: errors > 0 || critical > 0,
        can_lock: critical == 0,
        issues,
        warnings,
        errors,
        critical_issues: critical,
        total_events: events.len(),
        judge_events: judge_events.len(),
        cv_events: cv_events.len(),
        checks_passed: TOTAL_CHECKS.saturating_sub(checks_failed),
        checks_failed,
        validated_at: Utc::now(),
    }
}

fn check_minimum_events(
    all_events: &[CombatEvent],
    judge_events: &[&CombatEvent],
    config: &ValidationConfig,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if all_events.len() < config.min_total_events {
        issues.push(ValidationIssue {
            kind: IssueKind::InsufficientEvents,
            severity: Severity::Error,
            message: format!(
                "Insufficient total events: {} < {}",
                all_events.len(),
                config.min_total_events
            ),
            details: json!({"total_events": all_events.len(), "required": config.min_total_events}),
        });
    }

    if judge_events.len() < config.min_judge_events {
        issues.push(ValidationIssue {
            kind: IssueKind::MissingJudgeEvents,
            severity: Severity::Critical,
            message: format!(
                "Insufficient judge events: {} < {}",
                judge_events.len(),
                config.min_judge_events
            ),
            details: json!({"judge_events": judge_events.len(), "required": config.min_judge_events}),
        });
    }

    issues
}

fn max_gap_seconds(events: &[&CombatEvent]) -> f64 {
    let mut timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
    timestamps.sort_unstable();
    timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64 / 1000.0)
        .fold(0.0, f64::max)
}

fn check_judge_inactivity(judge_events: &[&CombatEvent], config: &ValidationConfig) -> Vec<ValidationIssue> {
    if judge_events.len() < 2 {
        return Vec::new();
    }
    let max_gap = max_gap_seconds(judge_events);
    if max_gap > config.max_judge_inactivity_sec as f64 {
        return vec![ValidationIssue {
            kind: IssueKind::JudgeInactivity,
            severity: Severity::Warning,
            message: format!("Judge inactivity detected: {max_gap:.0}s gap"),
            details: json!({"max_gap_seconds": max_gap, "threshold": config.max_judge_inactivity_sec}),
        }];
    }
    Vec::new()
}

fn check_cv_feed_activity(cv_events: &[&CombatEvent], config: &ValidationConfig) -> Vec<ValidationIssue> {
    if cv_events.is_empty() {
        return vec![ValidationIssue {
            kind: IssueKind::CvFeedInactive,
            severity: Severity::Warning,
            message: "No CV events detected - CV feed may be inactive".to_string(),
            details: json!({"cv_events": 0}),
        }];
    }
    let max_gap = max_gap_seconds(cv_events);
    if max_gap > config.max_cv_inactivity_sec as f64 {
        return vec![ValidationIssue {
            kind: IssueKind::CvFeedInactive,
            severity: Severity::Warning,
            message: format!("CV feed gap detected: {max_gap:.0}s"),
            details: json!({"max_gap_seconds": max_gap, "threshold": config.max_cv_inactivity_sec}),
        }];
    }
    Vec::new()
}

fn check_timecodes(
    events: &[CombatEvent],
    round_start: i64,
    round_end: i64,
    config: &ValidationConfig,
) -> Vec<ValidationIssue> {
    let out_of_window = events
        .iter()
        .filter(|e| {
            e.timestamp_ms < round_start - config.timecode_tolerance_ms
                || e.timestamp_ms > round_end + config.timecode_tolerance_ms
        })
        .count();

    if out_of_window > 0 {
        return vec![ValidationIssue {
            kind: IssueKind::TimecodeMismatch,
            severity: Severity::Error,
            message: format!("{out_of_window} events outside round window"),
            details: json!({
                "out_of_window_count": out_of_window,
                "round_start": round_start,
                "round_end": round_end,
                "tolerance_ms": config.timecode_tolerance_ms,
            }),
        }];
    }
    Vec::new()
}

fn check_round_duration(round_start: i64, round_end: i64, config: &ValidationConfig) -> Vec<ValidationIssue> {
    let duration_sec = (round_end - round_start).abs() as f64 / 1000.0;
    let expected = config.expected_round_duration_sec as f64;
    if (duration_sec - expected).abs() > config.duration_tolerance_sec as f64 {
        return vec![ValidationIssue {
            kind: IssueKind::TimingAnomaly,
            severity: Severity::Warning,
            message: format!("Round duration anomaly: {duration_sec:.0}s (expected {expected:.0}s)"),
            details: json!({
                "duration_seconds": duration_sec,
                "expected_seconds": expected,
                "tolerance_seconds": config.duration_tolerance_sec,
            }),
        }];
    }
    Vec::new()
}
