//! Replay Validator
//!
//! Two-mode state machine:
//!
//! ```text
//!   Idle ──start_recording──▶ Recording ──stop_recording──▶ Idle   (Recording)
//!   Idle ──start_validation─▶ Validating ─stop_validation─▶ Idle   (ValidationReport)
//! ```
//!
//! Calls made in the wrong phase are no-ops that return a sentinel. Starting
//! a session while another one is active is rejected with
//! [`ReplayError::SessionActive`]; the running session is left untouched.
//!
//! The validator touches the generator only when a session starts: it
//! re-seeds it for recording and restores the recorded initial state for
//! validation. Per-frame calls only read it.

use std::fmt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::env::env_parse;
use crate::core::persist::{PersistError, Persistable, StateBlob};
use crate::core::rng::StreamRng;
use super::recording::{Recording, RecordingOptions};
use super::report::{
    summarize, Divergence, DivergenceKind, ErrorSummary, Observed, ValidationReport,
};
use super::snapshot::{EntityState, FrameSnapshot, GameStateSnapshot, PhysicsMetrics};

/// Default position/velocity tolerance.
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Default cap on stored divergences per validation session.
pub const DEFAULT_MAX_ERRORS: usize = 10_000;

// =============================================================================
// ERRORS
// =============================================================================

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("cannot start a session while {active} is active")]
    SessionActive { active: ValidatorMode },

    #[error("no {0} session is active")]
    NotActive(ValidatorMode),

    #[error("recording has no frames")]
    EmptyRecording,

    #[error("inconsistent recording: {0}")]
    InconsistentRecording(String),

    #[error("failed to restore generator state: {0}")]
    RngRestore(#[from] PersistError),

    #[error("corrupt recording: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// =============================================================================
// CONFIG
// =============================================================================

/// Validator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorConfig {
    /// Accepted position/velocity difference (max axis delta, inclusive).
    pub tolerance: f64,
    /// Divergences stored per session; further ones are only summarized.
    pub max_errors: usize,
    /// Entities kept per captured frame (`None` keeps all).
    pub entity_limit: Option<usize>,
    /// Compare entity velocities when both sides supply them.
    pub compare_velocities: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_errors: DEFAULT_MAX_ERRORS,
            entity_limit: None,
            compare_velocities: true,
        }
    }
}

impl ValidatorConfig {
    /// Create config from environment variables.
    ///
    /// - `STEADYSTEP_TOLERANCE`: position/velocity tolerance
    /// - `STEADYSTEP_MAX_ERRORS`: stored divergence cap
    /// - `STEADYSTEP_ENTITY_LIMIT`: entities kept per frame
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let tolerance = env_parse::<f64>("STEADYSTEP_TOLERANCE")
            .filter(|t| t.is_finite() && *t >= 0.0);
        if let Some(tolerance) = tolerance {
            config.tolerance = tolerance;
        }
        if let Some(max_errors) = env_parse::<usize>("STEADYSTEP_MAX_ERRORS") {
            config.max_errors = max_errors;
        }
        if let Some(limit) = env_parse::<usize>("STEADYSTEP_ENTITY_LIMIT") {
            config.entity_limit = Some(limit);
        }
        config
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Current phase of the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorMode {
    /// No session.
    Idle,
    /// Capturing frames.
    Recording,
    /// Comparing frames against a recording.
    Validating,
}

impl fmt::Display for ValidatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Recording => f.write_str("recording"),
            Self::Validating => f.write_str("validation"),
        }
    }
}

struct RecordingSession {
    id: Uuid,
    options: RecordingOptions,
    initial_rng_state: StateBlob,
    frames: Vec<FrameSnapshot>,
}

struct ValidationSession {
    id: Uuid,
    recording: Recording,
    cursor: usize,
    errors: Vec<Divergence>,
    summary: ErrorSummary,
    omitted: u64,
}

impl ValidationSession {
    fn push(&mut self, divergence: Divergence, max_errors: usize) {
        summarize(&mut self.summary, divergence.kind, divergence.frame);
        if self.errors.is_empty() && self.omitted == 0 {
            warn!("Session {}: first divergence: {}", self.id, divergence);
        }
        if self.errors.len() < max_errors {
            self.errors.push(divergence);
        } else {
            self.omitted += 1;
        }
    }
}

enum Session {
    Idle,
    Recording(RecordingSession),
    Validating(ValidationSession),
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Deterministic record/replay validator.
pub struct ReplayValidator {
    config: ValidatorConfig,
    session: Session,
}

impl Default for ReplayValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl ReplayValidator {
    /// Create an idle validator.
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            session: Session::Idle,
        }
    }

    /// Active settings.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Current phase.
    pub fn mode(&self) -> ValidatorMode {
        match self.session {
            Session::Idle => ValidatorMode::Idle,
            Session::Recording(_) => ValidatorMode::Recording,
            Session::Validating(_) => ValidatorMode::Validating,
        }
    }

    /// Frames captured so far (recording) or compared so far (validating).
    pub fn frame_index(&self) -> usize {
        match &self.session {
            Session::Idle => 0,
            Session::Recording(s) => s.frames.len(),
            Session::Validating(s) => s.cursor,
        }
    }

    fn ensure_idle(&self) -> Result<(), ReplayError> {
        match self.mode() {
            ValidatorMode::Idle => Ok(()),
            active => Err(ReplayError::SessionActive { active }),
        }
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    /// Re-seed the generator and begin capturing frames.
    pub fn start_recording(
        &mut self,
        options: RecordingOptions,
        rng: &mut StreamRng,
    ) -> Result<(), ReplayError> {
        self.ensure_idle()?;

        rng.init(options.seed);
        let session = RecordingSession {
            id: Uuid::new_v4(),
            options,
            initial_rng_state: rng.save_state(),
            frames: Vec::new(),
        };
        info!(
            "Recording session {} started (seed {}, max {} frames)",
            session.id, options.seed, options.max_frames
        );
        self.session = Session::Recording(session);
        Ok(())
    }

    /// Capture one frame. Returns false when not recording or when the
    /// frame cap is reached.
    pub fn record_frame(
        &mut self,
        state: &GameStateSnapshot,
        rng: &StreamRng,
        physics: Option<PhysicsMetrics>,
    ) -> bool {
        let Session::Recording(session) = &mut self.session else {
            return false;
        };
        if session.frames.len() >= session.options.max_frames as usize {
            return false;
        }

        let frame_index = session.frames.len() as u32;
        session.frames.push(FrameSnapshot::capture(
            frame_index,
            state,
            rng.state_hash(),
            physics,
            self.config.entity_limit,
        ));
        true
    }

    /// Freeze the captured frames. `None` when not recording.
    pub fn stop_recording(&mut self, rng: &StreamRng) -> Option<Recording> {
        if self.mode() != ValidatorMode::Recording {
            return None;
        }
        let Session::Recording(session) = std::mem::replace(&mut self.session, Session::Idle) else {
            return None;
        };

        let recording = Recording::new(
            session.options.seed,
            session.frames,
            session.initial_rng_state,
            rng.save_state(),
        );
        info!(
            "Recording session {} stopped: {} frames, digest {}",
            session.id,
            recording.total_frames(),
            recording.digest_hex()
        );
        Some(recording)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Restore the generator to the recording's initial state and begin
    /// comparing frames.
    ///
    /// An empty or inconsistent recording is rejected and the validator
    /// stays idle.
    pub fn start_validation(
        &mut self,
        recording: Recording,
        rng: &mut StreamRng,
    ) -> Result<(), ReplayError> {
        self.ensure_idle()?;
        recording.check()?;
        rng.load_state(recording.initial_rng_state())?;

        let session = ValidationSession {
            id: Uuid::new_v4(),
            recording,
            cursor: 0,
            errors: Vec::new(),
            summary: ErrorSummary::new(),
            omitted: 0,
        };
        info!(
            "Validation session {} started against {} frames (seed {})",
            session.id,
            session.recording.total_frames(),
            session.recording.seed()
        );
        self.session = Session::Validating(session);
        Ok(())
    }

    /// Compare live state against the next recorded frame.
    ///
    /// Returns true when the frame matched, or when there was nothing to
    /// compare (not validating, or past the last frame). The cursor advances
    /// whether or not the frame matched.
    pub fn validate_frame(
        &mut self,
        state: &GameStateSnapshot,
        rng: &StreamRng,
        physics: Option<PhysicsMetrics>,
    ) -> bool {
        let config = self.config;
        let Session::Validating(session) = &mut self.session else {
            return true;
        };
        let Some(expected) = session.recording.frames().get(session.cursor) else {
            return true;
        };

        let actual = FrameSnapshot::capture(
            expected.frame_index,
            state,
            rng.state_hash(),
            physics,
            config.entity_limit,
        );
        let divergences = compare_frames(expected, &actual, &config);
        session.cursor += 1;

        let matched = divergences.is_empty();
        for divergence in divergences {
            session.push(divergence, config.max_errors);
        }
        matched
    }

    /// Finish validation. `None` when not validating.
    pub fn stop_validation(&mut self) -> Option<ValidationReport> {
        if self.mode() != ValidatorMode::Validating {
            return None;
        }
        let session = std::mem::replace(&mut self.session, Session::Idle);
        let Session::Validating(session) = session else {
            return None;
        };

        let report = ValidationReport {
            success: session.errors.is_empty() && session.omitted == 0,
            frames_validated: session.cursor as u32,
            total_frames: session.recording.total_frames(),
            errors: session.errors,
            error_summary: session.summary,
            omitted_errors: session.omitted,
        };
        if report.success {
            info!("Validation session {} passed: {}", session.id, report);
        } else {
            warn!("Validation session {} failed: {}", session.id, report);
        }
        Some(report)
    }

    // -------------------------------------------------------------------------
    // Text encoding
    // -------------------------------------------------------------------------

    /// Encode a recording as portable JSON.
    pub fn export_snapshot(&self, recording: &Recording) -> Result<String, ReplayError> {
        recording.to_json()
    }

    /// Decode a recording, logging and returning `None` on malformed text.
    pub fn import_snapshot(&self, text: &str) -> Option<Recording> {
        match self.try_import_snapshot(text) {
            Ok(recording) => Some(recording),
            Err(e) => {
                error!("Failed to import recording: {}", e);
                None
            }
        }
    }

    /// Decode a recording.
    pub fn try_import_snapshot(&self, text: &str) -> Result<Recording, ReplayError> {
        let recording = Recording::from_json(text)?;
        debug!(
            "Imported recording: seed {}, {} frames",
            recording.seed(),
            recording.total_frames()
        );
        Ok(recording)
    }
}

// =============================================================================
// COMPARISON
// =============================================================================

fn compare_frames(
    expected: &FrameSnapshot,
    actual: &FrameSnapshot,
    config: &ValidatorConfig,
) -> Vec<Divergence> {
    let frame = expected.frame_index;
    let mut out = Vec::new();

    if let (Some(e), Some(a)) = (&expected.player, &actual.player) {
        compare_entity("player", e, a, frame, config, &mut out);
    }
    for (index, (e, a)) in expected.entities.iter().zip(&actual.entities).enumerate() {
        let subject = match &e.id {
            Some(id) => id.clone(),
            None => format!("entities[{}]", index),
        };
        compare_entity(&subject, e, a, frame, config, &mut out);
    }

    if let (Some(e), Some(a)) = (expected.entity_count, actual.entity_count) {
        if e != a {
            out.push(exact(frame, DivergenceKind::EntityCount, "entities", e as f64, a as f64));
        }
    }

    if expected.rng_state_hash != actual.rng_state_hash {
        out.push(exact(
            frame,
            DivergenceKind::RngState,
            "rng",
            expected.rng_state_hash as f64,
            actual.rng_state_hash as f64,
        ));
    }

    for (name, e) in &expected.metrics {
        let Some(a) = actual.metrics.get(name) else { continue };
        let same = e == a || (e.is_nan() && a.is_nan());
        if !same {
            out.push(exact(frame, DivergenceKind::Metric, &format!("metrics.{}", name), *e, *a));
        }
    }

    if let (Some(e), Some(a)) = (&expected.physics_metrics, &actual.physics_metrics) {
        if e.body_count != a.body_count {
            out.push(exact(
                frame,
                DivergenceKind::Physics,
                "physics.bodyCount",
                e.body_count as f64,
                a.body_count as f64,
            ));
        }
        let diff = (e.accumulator - a.accumulator).abs();
        if !(diff <= config.tolerance) {
            out.push(Divergence {
                frame,
                kind: DivergenceKind::Physics,
                subject: "physics.accumulator".into(),
                expected: e.accumulator.into(),
                actual: a.accumulator.into(),
                difference: Some(diff),
            });
        }
    }

    out
}

fn compare_entity(
    subject: &str,
    expected: &EntityState,
    actual: &EntityState,
    frame: u32,
    config: &ValidatorConfig,
    out: &mut Vec<Divergence>,
) {
    let diff = expected.position().max_axis_delta(actual.position());
    // Mismatched non-finite axes come back as infinity
    if !(diff <= config.tolerance) {
        out.push(Divergence {
            frame,
            kind: DivergenceKind::Position,
            subject: subject.to_string(),
            expected: expected.position().into(),
            actual: actual.position().into(),
            difference: Some(diff),
        });
    }

    if !config.compare_velocities {
        return;
    }
    if let (Some(e), Some(a)) = (expected.velocity(), actual.velocity()) {
        let diff = e.max_axis_delta(a);
        if !(diff <= config.tolerance) {
            out.push(Divergence {
                frame,
                kind: DivergenceKind::Velocity,
                subject: subject.to_string(),
                expected: e.into(),
                actual: a.into(),
                difference: Some(diff),
            });
        }
    }
}

fn exact(
    frame: u32,
    kind: DivergenceKind,
    subject: &str,
    expected: f64,
    actual: f64,
) -> Divergence {
    Divergence {
        frame,
        kind,
        subject: subject.to_string(),
        expected: Observed::Number(expected),
        actual: Observed::Number(actual),
        difference: None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
