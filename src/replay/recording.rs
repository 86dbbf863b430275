//! Recordings
//!
//! A recording is the frozen output of one recording session: the seed, the
//! generator state at both ends, and every captured frame. It serializes to
//! portable JSON:
//!
//! ```text
//! { seed, totalFrames, frames: [...], initialRNGState, finalRNGState, timestamp }
//! ```

use serde::{Serialize, Deserialize};

use crate::core::hash::{short_hex, StateHash, StateHasher};
use crate::core::persist::StateBlob;
use crate::core::rng::GOLDEN_SEED;
use super::snapshot::FrameSnapshot;
use super::validator::ReplayError;

/// Default frame cap for a recording session (60 s at 60 Hz).
pub const DEFAULT_MAX_FRAMES: u32 = 3600;

/// Parameters for a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingOptions {
    /// Seed the generator is re-initialised with.
    pub seed: u32,
    /// Frames beyond this count are silently ignored.
    pub max_frames: u32,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            seed: GOLDEN_SEED,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl RecordingOptions {
    /// Options with an explicit seed and cap.
    pub const fn new(seed: u32, max_frames: u32) -> Self {
        Self { seed, max_frames }
    }
}

/// Immutable result of a recording session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    seed: u32,
    total_frames: u32,
    frames: Vec<FrameSnapshot>,
    #[serde(rename = "initialRNGState")]
    initial_rng_state: StateBlob,
    #[serde(rename = "finalRNGState")]
    final_rng_state: StateBlob,
    timestamp: i64,
}

impl Recording {
    /// Freeze a finished session.
    pub(crate) fn new(
        seed: u32,
        frames: Vec<FrameSnapshot>,
        initial_rng_state: StateBlob,
        final_rng_state: StateBlob,
    ) -> Self {
        Self {
            seed,
            total_frames: frames.len() as u32,
            frames,
            initial_rng_state,
            final_rng_state,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Seed used for the session.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Declared frame count.
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Captured frames, in order.
    pub fn frames(&self) -> &[FrameSnapshot] {
        &self.frames
    }

    /// Generator state at session start.
    pub fn initial_rng_state(&self) -> &StateBlob {
        &self.initial_rng_state
    }

    /// Generator state at session end.
    pub fn final_rng_state(&self) -> &StateBlob {
        &self.final_rng_state
    }

    /// Wall-clock time the recording was frozen (Unix ms).
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Check the structural invariants a replay relies on.
    ///
    /// At least one frame, `totalFrames` matching the frame list, and frame
    /// indices running 0, 1, 2, ...
    pub fn check(&self) -> Result<(), ReplayError> {
        if self.frames.is_empty() {
            return Err(ReplayError::EmptyRecording);
        }
        if self.total_frames as usize != self.frames.len() {
            return Err(ReplayError::InconsistentRecording(format!(
                "totalFrames is {} but {} frames are present",
                self.total_frames,
                self.frames.len()
            )));
        }
        if let Some((pos, frame)) = self
            .frames
            .iter()
            .enumerate()
            .find(|(pos, frame)| frame.frame_index as usize != *pos)
        {
            return Err(ReplayError::InconsistentRecording(format!(
                "frame at position {} has frameIndex {}",
                pos, frame.frame_index
            )));
        }
        Ok(())
    }

    /// SHA-256 over seed, frame count and every compared frame field.
    ///
    /// Two recordings of a deterministic run share a digest even though
    /// their timestamps differ.
    pub fn digest(&self) -> StateHash {
        let mut hasher = StateHasher::for_recording();
        hasher.update_u32(self.seed);
        hasher.update_u32(self.total_frames);
        for frame in &self.frames {
            frame.hash_into(&mut hasher);
        }
        hasher.finalize()
    }

    /// Short hex form of [`Recording::digest`], for logs.
    pub fn digest_hex(&self) -> String {
        short_hex(&self.digest())
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, ReplayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(text)?)
    }
}
