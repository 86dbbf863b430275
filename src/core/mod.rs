//! Core deterministic primitives.
//!
//! Everything here is pure and platform independent. Both the stepper and
//! the replay validator build on these types.

pub mod vec2;
pub mod rng;
pub mod hash;
pub mod persist;
pub mod env;
pub mod json_float;

// Re-export core types
pub use vec2::Vec2;
pub use rng::{StreamRng, Stream, RngState, DEFAULT_STREAM, GOLDEN_SEED};
pub use hash::{StateHash, StateHasher};
pub use persist::{Persistable, PersistRegistry, PersistError, StateBlob};
