//! Steadystep demo
//!
//! Records the bouncing-balls scenario, round-trips the recording through
//! JSON, replays it and reports whether the run was deterministic. A second
//! replay with one stray random draw shows what a divergence looks like.
//!
//! Environment:
//! - `STEADYSTEP_SEED`: recording seed (default 1138)
//! - `STEADYSTEP_FRAMES`: frames to record (default 600)
//! - `STEADYSTEP_OUT`: write the recording JSON to this path
//! - `STEADYSTEP_FIXED_HZ`, `STEADYSTEP_MAX_STEPS`, `STEADYSTEP_MAX_DELTA_MS`: stepper
//! - `STEADYSTEP_TOLERANCE`, `STEADYSTEP_MAX_ERRORS`, `STEADYSTEP_ENTITY_LIMIT`: validator
//! - `RUST_LOG`: log filter (default `info`)

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use steadystep::{
    GOLDEN_SEED, VERSION,
    StepperConfig, ValidatorConfig, RecordingOptions,
    replay::DeterminismHarness,
    scenario::BouncingBalls,
};

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {}={:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let seed: u32 = env_or("STEADYSTEP_SEED", GOLDEN_SEED)?;
    let frames: u32 = env_or("STEADYSTEP_FRAMES", 600)?;
    let out = std::env::var("STEADYSTEP_OUT").ok();

    let stepper_config = StepperConfig::from_env();
    let validator_config = ValidatorConfig::from_env();

    info!("Steadystep v{}", VERSION);
    info!(
        "Stepper: {:.1} Hz, max {} steps/update, delta clamp {:.0} ms",
        1.0 / stepper_config.fixed_time_step,
        stepper_config.max_steps_per_frame,
        stepper_config.max_frame_delta * 1000.0
    );
    info!("Validator: tolerance {}", validator_config.tolerance);

    let mut harness = DeterminismHarness::new(stepper_config, validator_config);
    let mut scenario = BouncingBalls::default();

    // Record
    info!("=== Recording {} frames (seed {}) ===", frames, seed);
    let recording = harness.record(&mut scenario, RecordingOptions::new(seed, frames))?;
    info!(
        "Recorded {} frames, score {}, digest {}",
        recording.total_frames(),
        scenario.score(),
        recording.digest_hex()
    );

    let text = harness.validator().export_snapshot(&recording)?;
    if let Some(path) = &out {
        std::fs::write(path, &text).with_context(|| format!("failed to write {}", path))?;
        info!("Wrote recording to {} ({} bytes)", path, text.len());
    }

    // Replay
    info!("=== Verifying Determinism ===");
    let imported = harness
        .validator()
        .import_snapshot(&text)
        .context("exported recording did not re-import")?;
    let report = harness.validate(&mut scenario, imported)?;
    info!("{}", report);
    if !report.success {
        if let Some(first) = report.first_divergence() {
            warn!("First divergence: {}", first);
        }
        let total = report.errors.len() as u64 + report.omitted_errors;
        bail!("DETERMINISM FAILURE: {} divergences", total);
    }
    info!("DETERMINISM VERIFIED: {} frames match", report.frames_validated);

    // Sabotaged replay
    info!("=== Injecting a stray random draw ===");
    scenario.stray_draw_at = Some(frames / 2);
    let report = harness.validate(&mut scenario, recording)?;
    match report.first_divergence() {
        Some(first) => info!("Caught as expected: {}", first),
        None => bail!("stray draw went undetected"),
    }

    Ok(())
}
