//! main.rs — Bout simulator entry point
//!
//! Generates a scripted synthetic bout (judge taps + multi-camera CV
//! detections) and either:
//!   1. emits the raw event stream as JSON lines (`--emit-only`), or
//!   2. drives an in-process pipeline end to end — open, ingest, fuse,
//!      momentum, score, lock — and prints each round's verdict receipt.
//!
//! Deterministic per seed, so a regression in the scoring path shows up as a
//! changed verdict for the same seed.

mod script;

use clap::Parser;
use tracing::{info, warn};

use combat_types::Corner;
use fightjudge_backend::context::{BoutSupervisor, PipelineContext};
use fightjudge_backend::round_manager::{AppendOutcome, LockOutcome};
use script::{scripted_bout, source_hint, ScriptConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bout-sim", about = "FightJudge synthetic bout simulator")]
struct Args {
    /// Bout identifier
    #[arg(long, default_value = "sim-bout")]
    bout: String,
    /// Number of rounds to script
    #[arg(long, default_value_t = 3)]
    rounds: u32,
    /// RNG seed (same seed → same bout → same verdicts)
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Strike-volume multiplier
    #[arg(long, default_value_t = 1.0)]
    intensity: f64,
    /// Print the raw event stream as JSON lines instead of scoring it
    #[arg(long)]
    emit_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bout_sim=info,fightjudge_backend=warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = ScriptConfig {
        bout_id: args.bout.clone(),
        rounds: args.rounds,
        seed: args.seed,
        intensity: args.intensity,
    };
    let bout_script = scripted_bout(&config);

    if args.emit_only {
        for round in &bout_script {
            for event in &round.events {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        return Ok(());
    }

    info!("🥊 driving {} scripted round(s) for bout {} (seed {})", args.rounds, args.bout, args.seed);
    let ctx = PipelineContext::in_memory().await?;
    let supervisor = BoutSupervisor::new(ctx);
    let bout = supervisor.bout(&args.bout).await;

    for round_script in bout_script {
        let round = bout.open_round(round_script.round_num, "simulator").await?;

        let mut admitted = 0u32;
        let mut rejected = 0u32;
        for mut raw in round_script.events {
            raw.round_id = round.round_id.clone();
            let hint = source_hint(&raw);
            match bout.append_event(&round.round_id, raw, hint, "simulator").await? {
                AppendOutcome::Admitted(_) => admitted += 1,
                AppendOutcome::Rejected(rejection) => {
                    rejected += 1;
                    if rejection.code != "DUPLICATE" && rejection.code != "LOW_CONFIDENCE" {
                        warn!("unexpected rejection: {rejection:?}");
                    }
                }
            }
        }

        let swings_red = bout.detect_momentum(&round.round_id, Corner::Red, "simulator").await?;
        let swings_blue = bout.detect_momentum(&round.round_id, Corner::Blue, "simulator").await?;
        let score = bout.compute_score(&round.round_id, "simulator").await?;

        info!(
            "round {}: {admitted} admitted, {rejected} rejected, {} momentum swing(s) → {}",
            round_script.round_num,
            swings_red.len() + swings_blue.len(),
            score.receipt.score,
        );

        match bout.lock_round(&round.round_id, "simulator").await? {
            LockOutcome::Locked { event_hash, verdict } => {
                info!("round {} locked ({}) hash {}", round_script.round_num, verdict.score_card, event_hash);
            }
            LockOutcome::Refused(report) => {
                warn!(
                    "round {} lock refused: {} critical issue(s)",
                    round_script.round_num, report.critical_issues
                );
            }
            LockOutcome::AlreadyLocked => {}
        }

        println!("{}", serde_json::to_string_pretty(&score.receipt)?);
    }

    let stats = bout.pipeline_stats().await?;
    info!(
        "pipeline stats: {} admitted, {} low-confidence, {} duplicates, {} fusions, {} swings",
        stats.total_admitted,
        stats.rejected_low_confidence,
        stats.rejected_duplicates,
        stats.multicam_fusions,
        stats.momentum_swings_detected,
    );
    Ok(())
}
