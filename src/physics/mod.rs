//! Simulation Stepping
//!
//! ## Module Structure
//!
//! - `world`: collaborator traits (`PhysicsWorld`, `RenderTarget`) and contact types
//! - `events`: enum-indexed collision handler table
//! - `stepper`: fixed-timestep driver with interpolation
//! - `sandbox`: small deterministic world for demos and tests

pub mod world;
pub mod events;
pub mod stepper;
pub mod sandbox;

// Re-export key types
pub use world::{
    BodyHandle, Transform, ContactKind, ContactPair, ContactEvent, PhysicsWorld, RenderTarget,
};
pub use events::{CollisionHandlers, HandlerError, HandlerResult};
pub use stepper::{Stepper, StepperConfig, StepperMetrics, StepReport};
pub use sandbox::{SandboxWorld, BodyDesc};
