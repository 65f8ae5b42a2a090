//! # round_manager
//!
//! Per-bout round lifecycle: OPEN → SCORING → LOCKED. One worker task owns a
//! bout's rounds and its ingestion pipeline, drains a command channel and
//! replies over oneshots — every mutating operation on a round is serialized
//! through it, while independent bouts run in parallel. `BoutHandle` is the
//! cloneable sender side and applies per-call deadlines.
//!
//! ## Invariants
//! - events append only while a round is OPEN or SCORING
//! - `append_event` is atomic: appended + audited + published, or none
//! - `event_hash` is committed exactly once, at lock, and recomputing it from
//!   the persisted event list must reproduce it

use std::collections::HashMap;
use std::time::Duration;

use combat_types::{CombatEvent, Corner, EventSource, RawEvent};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::audit::{AuditAction, AuditError};
use crate::bus::{BusMessage, MessageType, Topic};
use crate::context::PipelineContext;
use crate::harmonizer::{harmonize, HarmonizeError};
use crate::hashing;
use crate::pipeline::{AdmissionRejection, IngestPipeline, PipelineStats};
use crate::persistence::StorageError;
use crate::scoring::{score_round, RoundScore, ScoringProfile, Verdict};
use crate::state::{RoundState, RoundStatus};
use crate::timesvc::{RoundTimer, TimerState};
use crate::validator::{validate_round, ValidationConfig, ValidationReport};

const COMMAND_QUEUE_DEPTH: usize = 64;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
/// Lock blocks on the validator and must answer within this window.
const LOCK_DEADLINE: Duration = Duration::from_secs(2);

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("round not found: {0}")]
    RoundNotFound(String),
    #[error("round is locked: {0}")]
    RoundLocked(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("operation deadline exceeded")]
    Timeout,
    #[error("bout worker is gone")]
    WorkerGone,
    #[error("event hash mismatch on locked round {0}")]
    HashMismatch(String),
}

// ── Operation outcomes ────────────────────────────────────────────────────────

/// A rejection is a value, not a failure: the caller gets a reason code and a
/// one-line description, and the audit trail gets an `event_rejected` entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Rejection {
    pub code: &'static str,
    pub message: String,
}

impl From<&HarmonizeError> for Rejection {
    fn from(err: &HarmonizeError) -> Self {
        Self { code: err.code(), message: err.to_string() }
    }
}

impl From<&AdmissionRejection> for Rejection {
    fn from(err: &AdmissionRejection) -> Self {
        Self { code: err.code(), message: err.to_string() }
    }
}

#[derive(Debug)]
pub enum AppendOutcome {
    Admitted(Box<CombatEvent>),
    Rejected(Rejection),
}

#[derive(Debug)]
pub enum LockOutcome {
    Locked { event_hash: String, verdict: Verdict },
    AlreadyLocked,
    Refused(Box<ValidationReport>),
}

#[derive(Debug, Clone, Copy)]
pub enum TimerOp {
    Start,
    Pause,
    Reset,
    State,
}

// ── Commands ──────────────────────────────────────────────────────────────────

enum Command {
    OpenRound {
        round_num: u32,
        actor: String,
        reply: oneshot::Sender<Result<RoundState, RoundError>>,
    },
    AppendEvent {
        round_id: String,
        raw: Box<RawEvent>,
        source_hint: EventSource,
        actor: String,
        reply: oneshot::Sender<Result<AppendOutcome, RoundError>>,
    },
    ComputeScore {
        round_id: String,
        actor: String,
        reply: oneshot::Sender<Result<RoundScore, RoundError>>,
    },
    LockRound {
        round_id: String,
        actor: String,
        reply: oneshot::Sender<Result<LockOutcome, RoundError>>,
    },
    ValidateRound {
        round_id: String,
        actor: String,
        reply: oneshot::Sender<Result<ValidationReport, RoundError>>,
    },
    FuseCameras {
        round_id: String,
        reply: oneshot::Sender<Result<Vec<CombatEvent>, RoundError>>,
    },
    DetectMomentum {
        round_id: String,
        corner: Corner,
        actor: String,
        reply: oneshot::Sender<Result<Vec<CombatEvent>, RoundError>>,
    },
    GetRound {
        round_id: String,
        reply: oneshot::Sender<Result<RoundState, RoundError>>,
    },
    Stats {
        reply: oneshot::Sender<PipelineStats>,
    },
    Timer {
        op: TimerOp,
        reply: oneshot::Sender<TimerState>,
    },
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable entry point to one bout's worker. Every call carries a deadline;
/// a deadline hit before the worker replies surfaces as `Timeout` and the
/// command either commits atomically inside the worker or not at all.
#[derive(Clone)]
pub struct BoutHandle {
    bout_id: String,
    tx: mpsc::Sender<Command>,
}

impl BoutHandle {
    /// Spawn the worker task for a bout.
    pub fn spawn(bout_id: &str, ctx: PipelineContext) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let worker = BoutWorker {
            bout_id: bout_id.to_string(),
            ctx,
            pipeline: IngestPipeline::new(),
            rounds: HashMap::new(),
            profile: ScoringProfile::default(),
            validation: ValidationConfig::default(),
            timer: RoundTimer::new(),
        };
        tokio::spawn(worker.run(rx));
        Self { bout_id: bout_id.to_string(), tx }
    }

    pub fn bout_id(&self) -> &str {
        &self.bout_id
    }

    async fn request<T>(
        &self,
        deadline: Duration,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RoundError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| RoundError::WorkerGone)?;
        match tokio::time::timeout(deadline, reply_rx).await {
            Err(_) => Err(RoundError::Timeout),
            Ok(Err(_)) => Err(RoundError::WorkerGone),
            Ok(Ok(value)) => Ok(value),
        }
    }

    pub async fn open_round(&self, round_num: u32, actor: &str) -> Result<RoundState, RoundError> {
        let actor = actor.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::OpenRound { round_num, actor, reply })
            .await?
    }

    pub async fn append_event(
        &self,
        round_id: &str,
        raw: RawEvent,
        source_hint: EventSource,
        actor: &str,
    ) -> Result<AppendOutcome, RoundError> {
        let round_id = round_id.to_string();
        let actor = actor.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::AppendEvent {
            round_id,
            raw: Box::new(raw),
            source_hint,
            actor,
            reply,
        })
        .await?
    }

    pub async fn compute_score(&self, round_id: &str, actor: &str) -> Result<RoundScore, RoundError> {
        let round_id = round_id.to_string();
        let actor = actor.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::ComputeScore { round_id, actor, reply })
            .await?
    }

    pub async fn lock_round(&self, round_id: &str, actor: &str) -> Result<LockOutcome, RoundError> {
        let round_id = round_id.to_string();
        let actor = actor.to_string();
        self.request(LOCK_DEADLINE, |reply| Command::LockRound { round_id, actor, reply })
            .await?
    }

    pub async fn validate_round(&self, round_id: &str, actor: &str) -> Result<ValidationReport, RoundError> {
        let round_id = round_id.to_string();
        let actor = actor.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::ValidateRound { round_id, actor, reply })
            .await?
    }

    pub async fn fuse_cameras(&self, round_id: &str) -> Result<Vec<CombatEvent>, RoundError> {
        let round_id = round_id.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::FuseCameras { round_id, reply })
            .await?
    }

    pub async fn detect_momentum(
        &self,
        round_id: &str,
        corner: Corner,
        actor: &str,
    ) -> Result<Vec<CombatEvent>, RoundError> {
        let round_id = round_id.to_string();
        let actor = actor.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::DetectMomentum { round_id, corner, actor, reply })
            .await?
    }

    pub async fn get_round(&self, round_id: &str) -> Result<RoundState, RoundError> {
        let round_id = round_id.to_string();
        self.request(DEFAULT_DEADLINE, |reply| Command::GetRound { round_id, reply })
            .await?
    }

    pub async fn pipeline_stats(&self) -> Result<PipelineStats, RoundError> {
        self.request(DEFAULT_DEADLINE, |reply| Command::Stats { reply }).await
    }

    pub async fn timer(&self, op: TimerOp) -> Result<TimerState, RoundError> {
        self.request(DEFAULT_DEADLINE, |reply| Command::Timer { op, reply }).await
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct BoutWorker {
    bout_id: String,
    ctx: PipelineContext,
    pipeline: IngestPipeline,
    rounds: HashMap<String, RoundState>,
    profile: ScoringProfile,
    validation: ValidationConfig,
    timer: RoundTimer,
}

impl BoutWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("bout worker started: {}", self.bout_id);
        while let Some(command) = rx.recv().await {
            match command {
                Command::OpenRound { round_num, actor, reply } => {
                    let _ = reply.send(self.open_round(round_num, &actor).await);
                }
                Command::AppendEvent { round_id, raw, source_hint, actor, reply } => {
                    let _ = reply.send(self.append_event(&round_id, *raw, source_hint, &actor).await);
                }
                Command::ComputeScore { round_id, actor, reply } => {
                    let _ = reply.send(self.compute_score(&round_id, &actor).await);
                }
                Command::LockRound { round_id, actor, reply } => {
                    let _ = reply.send(self.lock_round(&round_id, &actor).await);
                }
                Command::ValidateRound { round_id, actor, reply } => {
                    let _ = reply.send(self.validate(&round_id, &actor).await);
                }
                Command::FuseCameras { round_id, reply } => {
                    let _ = reply.send(self.fuse_cameras(&round_id).await);
                }
                Command::DetectMomentum { round_id, corner, actor, reply } => {
                    let _ = reply.send(self.detect_momentum(&round_id, corner, &actor).await);
                }
                Command::GetRound { round_id, reply } => {
                    let _ = reply.send(self.get_round(&round_id).await);
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.pipeline.stats());
                }
                Command::Timer { op, reply } => {
                    match op {
                        TimerOp::Start => self.timer.start(),
                        TimerOp::Pause => self.timer.pause(),
                        TimerOp::Reset => self.timer.reset(),
                        TimerOp::State => {}
                    }
                    let _ = reply.send(self.timer.state());
                }
            }
        }
        info!("bout worker stopped: {}", self.bout_id);
    }

    /// Load a round into the worker cache if it is not there yet.
    async fn ensure_round(&mut self, round_id: &str) -> Result<(), RoundError> {
        if self.rounds.contains_key(round_id) {
            return Ok(());
        }
        match self.ctx.store.get_round(round_id).await? {
            Some(round) if round.bout_id == self.bout_id => {
                self.rounds.insert(round_id.to_string(), round);
                Ok(())
            }
            _ => Err(RoundError::RoundNotFound(round_id.to_string())),
        }
    }

    fn round(&self, round_id: &str) -> Result<&RoundState, RoundError> {
        self.rounds
            .get(round_id)
            .ok_or_else(|| RoundError::RoundNotFound(round_id.to_string()))
    }

    async fn open_round(&mut self, round_num: u32, actor: &str) -> Result<RoundState, RoundError> {
        let round = RoundState::new(&self.bout_id, round_num, self.ctx.clock.wall(), self.ctx.clock.now_ms());
        self.ctx.store.put_round(&round).await?;

        self.ctx
            .audit
            .log(
                &self.bout_id,
                &round.round_id,
                AuditAction::RoundOpened,
                actor,
                json!({ "round_num": round_num }),
            )
            .await?;

        self.publish_lifecycle(&round.round_id, json!({
            "event": "round_opened",
            "round_id": round.round_id,
            "round_num": round_num,
        }));

        info!("round opened: {} (bout {}, round {round_num})", round.round_id, self.bout_id);
        self.rounds.insert(round.round_id.clone(), round.clone());
        Ok(round)
    }

    async fn append_event(
        &mut self,
        round_id: &str,
        raw: RawEvent,
        source_hint: EventSource,
        actor: &str,
    ) -> Result<AppendOutcome, RoundError> {
        self.ensure_round(round_id).await?;
        if self.round(round_id)?.is_locked() {
            warn!("append rejected, round locked: {round_id}");
            return Err(RoundError::RoundLocked(round_id.to_string()));
        }

        let raw_type = raw.event_type.clone();
        let raw_ts = raw.timestamp_ms;

        let mut event = match harmonize(raw, source_hint) {
            Ok(event) => event,
            Err(err) => {
                let rejection = Rejection::from(&err);
                self.audit_rejection(round_id, actor, &rejection, &raw_type, raw_ts).await?;
                return Ok(AppendOutcome::Rejected(rejection));
            }
        };
        // The round, not the producer, is authoritative for placement
        event.bout_id = self.bout_id.clone();
        event.round_id = round_id.to_string();

        let config = self.ctx.calibration.current();
        let admitted = match self.pipeline.admit(event, &config, self.ctx.clock.wall()) {
            Ok(event) => event,
            Err(err) => {
                let rejection = Rejection::from(&err);
                self.audit_rejection(round_id, actor, &rejection, &raw_type, raw_ts).await?;
                return Ok(AppendOutcome::Rejected(rejection));
            }
        };

        // Commit: persist, audit, publish — or roll all of it back
        let mut updated = self.round(round_id)?.clone();
        updated.events.push(admitted.clone());
        if let Err(err) = self.ctx.store.put_round(&updated).await {
            self.pipeline.rollback(&admitted.event_id);
            return Err(err.into());
        }

        let audit_result = self
            .ctx
            .audit
            .log(
                &self.bout_id,
                round_id,
                AuditAction::EventAdmitted,
                actor,
                serde_json::to_value(&admitted).unwrap_or_default(),
            )
            .await;
        if let Err(err) = audit_result {
            // Roll the persisted append back to keep admission atomic
            self.pipeline.rollback(&admitted.event_id);
            let reverted = self.round(round_id)?.clone();
            if let Err(revert_err) = self.ctx.store.put_round(&reverted).await {
                error!("rollback persist failed for {round_id}: {revert_err}");
            }
            return Err(err.into());
        }

        self.rounds.insert(round_id.to_string(), updated);

        let topic = Topic::for_source(admitted.source);
        let message_type = match admitted.source {
            EventSource::JudgeManual => MessageType::JudgeEvent,
            EventSource::CvSystem | EventSource::AnalyticsDerived => MessageType::CvEvent,
        };
        self.ctx.bus.publish(
            &self.bout_id,
            topic,
            BusMessage::new(
                message_type,
                &self.bout_id,
                Some(round_id),
                self.ctx.clock.wall(),
                serde_json::to_value(&admitted).unwrap_or_default(),
            ),
        );

        info!(
            "event admitted to {round_id}: {} for {}",
            admitted.event_type.as_str(),
            admitted.corner.as_str()
        );
        Ok(AppendOutcome::Admitted(Box::new(admitted)))
    }

    async fn audit_rejection(
        &self,
        round_id: &str,
        actor: &str,
        rejection: &Rejection,
        raw_type: &str,
        raw_ts: i64,
    ) -> Result<(), AuditError> {
        info!("event rejected on {round_id}: {} ({})", rejection.code, rejection.message);
        self.ctx
            .audit
            .log(
                &self.bout_id,
                round_id,
                AuditAction::EventRejected,
                actor,
                json!({
                    "reason": rejection.code,
                    "message": rejection.message,
                    "event_type": raw_type,
                    "timestamp_ms": raw_ts,
                }),
            )
            .await
            .map(|_| ())
    }

    async fn compute_score(&mut self, round_id: &str, actor: &str) -> Result<RoundScore, RoundError> {
        self.ensure_round(round_id).await?;
        let round = self.round(round_id)?;

        // A locked round serves its frozen verdict; recomputing would mutate
        if round.is_locked() {
            return round
                .verdict
                .clone()
                .ok_or_else(|| RoundError::RoundLocked(round_id.to_string()));
        }

        let score = score_round(round.round_num, &round.events, &self.profile);

        let mut updated = round.clone();
        let was_open = updated.status == RoundStatus::Open;
        updated.status = RoundStatus::Scoring;
        updated.red_score = Some(score.verdict.red_points as f64);
        updated.blue_score = Some(score.verdict.blue_points as f64);
        updated.score_card = Some(score.verdict.score_card.clone());
        updated.winner = Some(score.verdict.winner.as_str().to_string());
        updated.verdict = Some(score.clone());
        self.ctx.store.put_round(&updated).await?;
        self.rounds.insert(round_id.to_string(), updated);

        self.ctx
            .audit
            .log(
                &self.bout_id,
                round_id,
                AuditAction::ScoreComputed,
                actor,
                json!({
                    "score_card": score.verdict.score_card,
                    "winner": score.verdict.winner.as_str(),
                    "delta_round": score.delta_round,
                }),
            )
            .await?;

        if was_open {
            self.publish_lifecycle(round_id, json!({
                "event": "round_scoring",
                "round_id": round_id,
            }));
        }
        self.ctx.bus.publish(
            &self.bout_id,
            Topic::ScoreUpdates,
            BusMessage::new(
                MessageType::ScoreUpdate,
                &self.bout_id,
                Some(round_id),
                self.ctx.clock.wall(),
                serde_json::to_value(&score).unwrap_or_default(),
            ),
        );

        Ok(score)
    }

    /// Validation envelope for a round: widened by the actual event span so
    /// replayed/imported rounds with explicit timestamps stay in bounds.
    fn envelope(&self, round: &RoundState) -> (i64, i64) {
        let first_event = round.events.iter().map(|e| e.timestamp_ms).min();
        let last_event = round.events.iter().map(|e| e.timestamp_ms).max();
        let start = first_event.map_or(round.opened_at_ms, |t| t.min(round.opened_at_ms));
        let end = last_event.map_or_else(|| self.ctx.clock.now_ms(), |t| t.max(self.ctx.clock.now_ms()));
        (start, end)
    }

    async fn validate(&mut self, round_id: &str, actor: &str) -> Result<ValidationReport, RoundError> {
        self.ensure_round(round_id).await?;
        let round = self.round(round_id)?;
        let (start, end) = self.envelope(round);
        let report = validate_round(
            round_id,
            &self.bout_id,
            round.round_num,
            &round.events,
            Some(start),
            Some(end),
            &self.validation,
        );
        self.ctx
            .audit
            .log(
                &self.bout_id,
                round_id,
                AuditAction::ValidationRun,
                actor,
                serde_json::to_value(&report).unwrap_or_default(),
            )
            .await?;
        Ok(report)
    }

    async fn lock_round(&mut self, round_id: &str, actor: &str) -> Result<LockOutcome, RoundError> {
        self.ensure_round(round_id).await?;
        if self.round(round_id)?.is_locked() {
            info!("round already locked: {round_id}");
            return Ok(LockOutcome::AlreadyLocked);
        }

        // Final score before the freeze
        let score = self.compute_score(round_id, actor).await?;

        let report = self.validate(round_id, actor).await?;
        if report.has_critical() {
            warn!(
                "lock refused for {round_id}: {} critical validation issue(s)",
                report.critical_issues
            );
            return Ok(LockOutcome::Refused(Box::new(report)));
        }

        let round = self.round(round_id)?;
        let event_hash = hashing::event_hash(&round.events);

        let mut updated = round.clone();
        updated.status = RoundStatus::Locked;
        updated.locked_at = Some(self.ctx.clock.wall());
        updated.event_hash = Some(event_hash.clone());
        self.ctx.store.put_round(&updated).await?;
        self.rounds.insert(round_id.to_string(), updated);

        self.ctx
            .audit
            .log(
                &self.bout_id,
                round_id,
                AuditAction::RoundLocked,
                actor,
                json!({
                    "event_hash": event_hash,
                    "final_score": score.verdict.score_card,
                }),
            )
            .await?;

        self.publish_lifecycle(round_id, json!({
            "event": "round_locked",
            "round_id": round_id,
            "event_hash": event_hash,
            "score_card": score.verdict.score_card,
        }));

        info!("round locked: {round_id} with hash {event_hash}");
        Ok(LockOutcome::Locked { event_hash, verdict: score.verdict })
    }

    async fn fuse_cameras(&mut self, round_id: &str) -> Result<Vec<CombatEvent>, RoundError> {
        self.ensure_round(round_id).await?;
        if self.round(round_id)?.is_locked() {
            return Err(RoundError::RoundLocked(round_id.to_string()));
        }
        let events = self.round(round_id)?.events.clone();

        let config = self.ctx.calibration.current();
        let canonical = self.pipeline.fuse_multicamera(events, config.multicam_merge_window_ms);

        let mut updated = self.round(round_id)?.clone();
        updated.events = canonical.clone();
        self.ctx.store.put_round(&updated).await?;
        self.rounds.insert(round_id.to_string(), updated);
        Ok(canonical)
    }

    async fn detect_momentum(
        &mut self,
        round_id: &str,
        corner: Corner,
        actor: &str,
    ) -> Result<Vec<CombatEvent>, RoundError> {
        self.ensure_round(round_id).await?;
        if self.round(round_id)?.is_locked() {
            return Err(RoundError::RoundLocked(round_id.to_string()));
        }
        let events = self.round(round_id)?.events.clone();

        let config = self.ctx.calibration.current();
        let swings = self.pipeline.detect_momentum_swings(&events, corner, &config);
        if swings.is_empty() {
            return Ok(Vec::new());
        }

        // Synthesized events go through the same admission gate, so repeated
        // detection passes deduplicate instead of stacking
        let mut admitted = Vec::new();
        let mut updated = self.round(round_id)?.clone();
        for swing in swings {
            if let Ok(event) = self.pipeline.admit(swing, &config, self.ctx.clock.wall()) {
                updated.events.push(event.clone());
                admitted.push(event);
            }
        }
        if admitted.is_empty() {
            return Ok(Vec::new());
        }

        if let Err(err) = self.ctx.store.put_round(&updated).await {
            for event in admitted.iter().rev() {
                self.pipeline.rollback(&event.event_id);
            }
            return Err(err.into());
        }
        self.rounds.insert(round_id.to_string(), updated);

        for event in &admitted {
            self.ctx
                .audit
                .log(
                    &self.bout_id,
                    round_id,
                    AuditAction::EventAdmitted,
                    actor,
                    serde_json::to_value(event).unwrap_or_default(),
                )
                .await?;
            self.ctx.bus.publish(
                &self.bout_id,
                Topic::for_source(event.source),
                BusMessage::new(
                    MessageType::CvEvent,
                    &self.bout_id,
                    Some(round_id),
                    self.ctx.clock.wall(),
                    serde_json::to_value(event).unwrap_or_default(),
                ),
            );
        }

        info!("momentum: {} swing(s) synthesized for {} on {round_id}", admitted.len(), corner.as_str());
        Ok(admitted)
    }

    async fn get_round(&mut self, round_id: &str) -> Result<RoundState, RoundError> {
        self.ensure_round(round_id).await?;
        let round = self.round(round_id)?;
        // A locked round must reproduce its committed hash on every read
        if let Some(stored_hash) = &round.event_hash {
            let recomputed = hashing::event_hash(&round.events);
            if &recomputed != stored_hash {
                error!("event hash mismatch on locked round {round_id}");
                return Err(RoundError::HashMismatch(round_id.to_string()));
            }
        }
        Ok(round.clone())
    }

    fn publish_lifecycle(&self, round_id: &str, data: serde_json::Value) {
        self.ctx.bus.publish(
            &self.bout_id,
            Topic::Lifecycle,
            BusMessage::new(
                MessageType::Lifecycle,
                &self.bout_id,
                Some(round_id),
                self.ctx.clock.wall(),
                data,
            ),
        );
    }
}
