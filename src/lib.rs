//! # Steadystep
//!
//! Deterministic simulation core: fixed-timestep stepping, seeded
//! multi-stream randomness, and record/replay divergence validation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        STEADYSTEP                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── vec2.rs     - 2D vector                                 │
//! │  ├── rng.rs      - Seeded multi-stream LCG                   │
//! │  ├── hash.rs     - SHA-256 state hashing                     │
//! │  └── persist.rs  - Persistable capability + registry         │
//! │                                                              │
//! │  physics/        - Simulation stepping                       │
//! │  ├── world.rs    - PhysicsWorld / RenderTarget traits        │
//! │  ├── events.rs   - Collision handler table                   │
//! │  ├── stepper.rs  - Fixed timestep + interpolation            │
//! │  └── sandbox.rs  - Minimal deterministic world               │
//! │                                                              │
//! │  replay/         - Determinism verification                  │
//! │  ├── snapshot.rs - Frame capture                             │
//! │  ├── recording.rs- Recording + JSON                          │
//! │  ├── report.rs   - Divergences + report                      │
//! │  ├── validator.rs- Record/validate state machine             │
//! │  └── harness.rs  - Scripted double runs                      │
//! │                                                              │
//! │  scenario.rs     - Bouncing balls reference scenario         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! Given the same seed, the same scenario script and the same frame
//! deltas, a run produces the same frames:
//! - All randomness comes from named `StreamRng` streams
//! - Streams are independent; drawing from one never moves another
//! - The world only advances in fixed steps
//! - Ordered maps (`BTreeMap`) everywhere iteration order matters
//!
//! Wall-clock timestamps are recorded for reference and never compared.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod physics;
pub mod replay;
pub mod scenario;

// Re-export commonly used types
pub use core::vec2::Vec2;
pub use core::rng::{StreamRng, GOLDEN_SEED};
pub use core::persist::{Persistable, PersistRegistry};
pub use physics::stepper::{Stepper, StepperConfig};
pub use physics::world::{PhysicsWorld, RenderTarget};
pub use replay::validator::{ReplayValidator, ValidatorConfig};
pub use replay::recording::{Recording, RecordingOptions};
pub use replay::report::ValidationReport;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
