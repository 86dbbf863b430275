//! Determinism Harness
//!
//! Runs a scripted [`Scenario`] twice through the same stepper, generator
//! and validator wiring: once recording, once validating. Each tick does
//! the same thing in both runs:
//!
//! ```text
//! before_step → Stepper::update → observe → record_frame / validate_frame
//! ```

use tracing::info;

use crate::core::rng::StreamRng;
use crate::physics::stepper::{Stepper, StepperConfig};
use crate::physics::world::PhysicsWorld;
use super::recording::{Recording, RecordingOptions};
use super::report::ValidationReport;
use super::snapshot::{GameStateSnapshot, PhysicsMetrics};
use super::validator::{ReplayError, ReplayValidator, ValidatorConfig, ValidatorMode};

/// 60 Hz frame time in milliseconds.
pub const FRAME_60HZ_MS: f64 = 1000.0 / 60.0;

/// A deterministic script the harness can run repeatedly.
///
/// `build_world` is called once per run, after the generator has been
/// seeded or restored, and must reset any scenario-side state.
pub trait Scenario {
    /// World the scenario runs in.
    type World: PhysicsWorld;

    /// Build a fresh world for one run.
    fn build_world(&mut self, rng: &mut StreamRng) -> Self::World;

    /// Register handlers and render targets on a fresh stepper.
    fn install(&mut self, _stepper: &mut Stepper<Self::World>) {}

    /// Game logic run before the stepper advances on each frame.
    fn before_step(
        &mut self,
        _frame: u32,
        _stepper: &mut Stepper<Self::World>,
        _rng: &mut StreamRng,
    ) {
    }

    /// Real time elapsed for a frame, in milliseconds.
    fn frame_delta_ms(&self, _frame: u32) -> f64 {
        FRAME_60HZ_MS
    }

    /// Read the state compared by the validator.
    fn observe(&self, stepper: &Stepper<Self::World>) -> GameStateSnapshot;
}

/// Stepper + generator + validator wired for record-then-validate runs.
pub struct DeterminismHarness {
    stepper_config: StepperConfig,
    rng: StreamRng,
    validator: ReplayValidator,
}

impl Default for DeterminismHarness {
    fn default() -> Self {
        Self::new(StepperConfig::default(), ValidatorConfig::default())
    }
}

impl DeterminismHarness {
    /// Create a harness.
    pub fn new(stepper_config: StepperConfig, validator_config: ValidatorConfig) -> Self {
        Self {
            stepper_config,
            rng: StreamRng::default(),
            validator: ReplayValidator::new(validator_config),
        }
    }

    /// The harness's validator (for export/import).
    pub fn validator(&self) -> &ReplayValidator {
        &self.validator
    }

    /// The shared generator.
    pub fn rng(&self) -> &StreamRng {
        &self.rng
    }

    /// Run `options.max_frames` frames and return the recording.
    pub fn record<S: Scenario>(
        &mut self,
        scenario: &mut S,
        options: RecordingOptions,
    ) -> Result<Recording, ReplayError> {
        self.validator.start_recording(options, &mut self.rng)?;
        self.run(scenario, options.max_frames);
        self.validator
            .stop_recording(&self.rng)
            .ok_or(ReplayError::NotActive(ValidatorMode::Recording))
    }

    /// Re-run the scenario against `recording` and return the report.
    pub fn validate<S: Scenario>(
        &mut self,
        scenario: &mut S,
        recording: Recording,
    ) -> Result<ValidationReport, ReplayError> {
        let frames = recording.total_frames();
        self.validator.start_validation(recording, &mut self.rng)?;
        self.run(scenario, frames);
        self.validator
            .stop_validation()
            .ok_or(ReplayError::NotActive(ValidatorMode::Validating))
    }

    /// Record, round-trip the recording through its text encoding, then
    /// validate against the imported copy.
    pub fn verify<S: Scenario>(
        &mut self,
        scenario: &mut S,
        options: RecordingOptions,
    ) -> Result<(Recording, ValidationReport), ReplayError> {
        let recording = self.record(scenario, options)?;
        let text = self.validator.export_snapshot(&recording)?;
        let imported = self.validator.try_import_snapshot(&text)?;
        let report = self.validate(scenario, imported)?;
        info!(
            "Determinism check: digest {} -> {}",
            recording.digest_hex(),
            report
        );
        Ok((recording, report))
    }

    fn run<S: Scenario>(&mut self, scenario: &mut S, frames: u32) {
        let world = scenario.build_world(&mut self.rng);
        let mut stepper = Stepper::with_world(self.stepper_config, world);
        scenario.install(&mut stepper);

        for frame in 0..frames {
            scenario.before_step(frame, &mut stepper, &mut self.rng);
            stepper.update(scenario.frame_delta_ms(frame));

            let state = scenario.observe(&stepper);
            let physics = Some(PhysicsMetrics::from(stepper.metrics()));
            match self.validator.mode() {
                ValidatorMode::Recording => {
                    self.validator.record_frame(&state, &self.rng, physics);
                }
                ValidatorMode::Validating => {
                    self.validator.validate_frame(&state, &self.rng, physics);
                }
                ValidatorMode::Idle => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::GOLDEN_SEED;
    use crate::replay::report::DivergenceKind;
    use crate::scenario::BouncingBalls;

    #[test]
    fn test_golden_seed_600_frames() {
        let mut harness = DeterminismHarness::default();
        let mut scenario = BouncingBalls::default();

        let recording = harness
            .record(&mut scenario, RecordingOptions::new(GOLDEN_SEED, 600))
            .unwrap();
        assert_eq!(recording.total_frames(), 600);

        let report = harness.validate(&mut scenario, recording).unwrap();
        assert!(report.success, "{}", report);
        assert_eq!(report.frames_validated, 600);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_verify_through_text_encoding() {
        let mut harness = DeterminismHarness::default();
        let mut scenario = BouncingBalls::default();

        let (recording, report) = harness
            .verify(&mut scenario, RecordingOptions::new(GOLDEN_SEED, 240))
            .unwrap();
        assert!(report.success, "{}", report);
        assert_eq!(report.frames_validated, recording.total_frames());
    }

    #[test]
    fn test_same_seed_same_digest() {
        let mut scenario = BouncingBalls::default();
        let a = DeterminismHarness::default()
            .record(&mut scenario, RecordingOptions::new(77, 180))
            .unwrap();
        let b = DeterminismHarness::default()
            .record(&mut scenario, RecordingOptions::new(77, 180))
            .unwrap();
        let c = DeterminismHarness::default()
            .record(&mut scenario, RecordingOptions::new(78, 180))
            .unwrap();

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_detects_stray_draw() {
        let mut harness = DeterminismHarness::default();
        let mut scenario = BouncingBalls::default();
        let recording = harness
            .record(&mut scenario, RecordingOptions::new(GOLDEN_SEED, 120))
            .unwrap();

        scenario.stray_draw_at = Some(60);
        let report = harness.validate(&mut scenario, recording).unwrap();

        assert!(!report.success);
        let first = report.first_divergence().unwrap();
        assert_eq!(first.kind, DivergenceKind::RngState);
        assert_eq!(first.frame, 60);
        // The stray draw used a stream nothing else reads
        assert_eq!(report.count(DivergenceKind::Position), 0);
    }
}
