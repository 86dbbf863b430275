//! Record and Replay
//!
//! ## Module Structure
//!
//! - `snapshot`: host state and the reduced per-frame record
//! - `recording`: immutable recording + JSON encoding + digest
//! - `report`: divergences and the validation report
//! - `validator`: the record/validate state machine
//! - `harness`: scripted record-then-validate runs

pub mod snapshot;
pub mod recording;
pub mod report;
pub mod validator;
pub mod harness;

// Re-export key types
pub use snapshot::{EntityState, GameStateSnapshot, FrameSnapshot, PhysicsMetrics};
pub use recording::{Recording, RecordingOptions};
pub use report::{Divergence, DivergenceKind, Observed, SummaryEntry, ValidationReport};
pub use validator::{ReplayValidator, ReplayError, ValidatorConfig, ValidatorMode};
pub use harness::{DeterminismHarness, Scenario};
