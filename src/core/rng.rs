//! Seeded Multi-Stream Random Number Generator
//!
//! Randomness is partitioned into named streams, each an independent linear
//! congruential generator derived from one master seed. A subsystem that
//! draws more (or fewer) values than last run never shifts the sequence
//! seen by any other subsystem.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::persist::{decode_blob, encode_blob, PersistError, Persistable, StateBlob};

/// LCG multiplier (Numerical Recipes).
pub const LCG_MULTIPLIER: u32 = 1_664_525;

/// LCG increment (Numerical Recipes).
pub const LCG_INCREMENT: u32 = 1_013_904_223;

/// LCG modulus, 2^32, as a float divisor.
const LCG_MODULUS: f64 = 4_294_967_296.0;

/// Stream used when a caller names no stream or an unknown one.
pub const DEFAULT_STREAM: &str = "main";

/// Streams created by [`StreamRng::init`], seeded `seed + index`.
pub const DEFAULT_STREAMS: [&str; 5] = ["main", "physics", "ai", "loot", "effects"];

/// Canonical seed for reproducibility baselines.
pub const GOLDEN_SEED: u32 = 1138;

/// Lower bound applied to the first Box–Muller draw so `ln(u1)` stays finite.
pub const GAUSSIAN_U1_FLOOR: f64 = 1e-12;

/// Errors from restoring generator state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RngError {
    /// Restored state has no default stream.
    #[error("generator state is missing the '{DEFAULT_STREAM}' stream")]
    MissingDefaultStream,
}

// =============================================================================
// STREAM
// =============================================================================

/// One independent LCG sequence.
///
/// `state` only ever changes through [`Stream::next_u32`] and [`Stream::reset`],
/// so it is a pure function of `seed` and `call_count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    /// Seed this stream was created with.
    pub seed: u32,
    /// Current LCG state.
    pub state: u32,
    /// Number of draws since creation or last reset.
    pub call_count: u64,
}

impl Stream {
    /// Create a stream at its initial state.
    pub const fn new(seed: u32) -> Self {
        Self { seed, state: seed, call_count: 0 }
    }

    /// Advance and return the raw 32-bit state.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.call_count += 1;
        self.state
    }

    /// Advance and return a value in `[0, 1)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / LCG_MODULUS
    }

    /// Return to the initial state.
    pub fn reset(&mut self) {
        *self = Self::new(self.seed);
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Full generator state, as captured by [`StreamRng::serialize`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RngState {
    /// Master seed passed to `init`.
    pub master_seed: u32,
    /// All streams by name.
    pub streams: BTreeMap<String, Stream>,
    /// Offset the next auto-seeded stream will use.
    pub next_offset: u32,
}

/// Deterministic generator holding every named stream.
///
/// # Example
///
/// ```
/// use steadystep::core::rng::StreamRng;
///
/// let mut a = StreamRng::new(1138);
/// let mut b = StreamRng::new(1138);
/// a.next("ai"); // drains "ai" only
/// assert_eq!(a.next("loot"), b.next("loot"));
/// ```
#[derive(Clone, Debug)]
pub struct StreamRng {
    master_seed: u32,
    streams: BTreeMap<String, Stream>,
    next_offset: u32,
    /// Unknown names already warned about (not part of the state).
    warned: BTreeSet<String>,
}

impl Default for StreamRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl StreamRng {
    /// Create a generator initialised with `seed`.
    pub fn new(seed: u32) -> Self {
        let mut rng = Self {
            master_seed: seed,
            streams: BTreeMap::new(),
            next_offset: 0,
            warned: BTreeSet::new(),
        };
        rng.init(seed);
        rng
    }

    /// Drop every stream and recreate the defaults from `seed`.
    pub fn init(&mut self, seed: u32) {
        self.master_seed = seed;
        self.streams.clear();
        for (offset, name) in DEFAULT_STREAMS.iter().enumerate() {
            let stream_seed = seed.wrapping_add(offset as u32);
            self.streams.insert(name.to_string(), Stream::new(stream_seed));
        }
        self.next_offset = DEFAULT_STREAMS.len() as u32;
        debug!("Stream RNG initialised with seed {}", seed);
    }

    /// Master seed.
    pub fn master_seed(&self) -> u32 {
        self.master_seed
    }

    /// Create (or recreate) a stream.
    ///
    /// Without an explicit seed the stream gets `master_seed + offset`, the
    /// offset growing by one per auto-seeded stream.
    pub fn create_stream(&mut self, name: &str, seed: Option<u32>) {
        let stream_seed = seed.unwrap_or_else(|| {
            let s = self.master_seed.wrapping_add(self.next_offset);
            self.next_offset += 1;
            s
        });
        if self.streams.insert(name.to_string(), Stream::new(stream_seed)).is_some() {
            debug!("Stream '{}' recreated with seed {}", name, stream_seed);
        }
    }

    /// True if a stream with this name exists.
    pub fn has_stream(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    /// Stream names in sorted order.
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Draws taken from a stream since creation or reset.
    pub fn call_count(&self, name: &str) -> Option<u64> {
        self.streams.get(name).map(|s| s.call_count)
    }

    /// Run `f` on a stream, falling back to the default one for unknown names.
    fn with_stream<R>(&mut self, name: &str, f: impl FnOnce(&mut Stream) -> R) -> R {
        if let Some(stream) = self.streams.get_mut(name) {
            return f(stream);
        }

        if self.warned.insert(name.to_string()) {
            warn!("Unknown RNG stream '{}', falling back to '{}'", name, DEFAULT_STREAM);
        }
        // `init` always creates the default stream and `deserialize` refuses
        // states without it.
        let seed = self.master_seed;
        f(self
            .streams
            .entry(DEFAULT_STREAM.to_string())
            .or_insert_with(|| Stream::new(seed)))
    }

    /// Next value in `[0, 1)` from `stream`.
    #[inline]
    pub fn next(&mut self, stream: &str) -> f64 {
        self.with_stream(stream, Stream::next_f64)
    }

    /// Value in `[min, max)`.
    pub fn range(&mut self, min: f64, max: f64, stream: &str) -> f64 {
        min + self.next(stream) * (max - min)
    }

    /// Integer in `[min, max]`, both ends inclusive.
    ///
    /// Returns `min` when `max <= min`.
    pub fn int(&mut self, min: i64, max: i64, stream: &str) -> i64 {
        if max <= min {
            return min;
        }
        // i128: the span of a full i64 range does not fit in i64
        let width = max as i128 - min as i128;
        let offset = (self.next(stream) * (width + 1) as f64).floor() as i128;
        // Guard float rounding at the very top of the range
        (min as i128 + offset.min(width)) as i64
    }

    /// True with the given probability (`0.0..=1.0`).
    pub fn bool(&mut self, probability: f64, stream: &str) -> bool {
        self.next(stream) < probability
    }

    /// Pick a random element.
    ///
    /// An empty slice returns `None` without consuming a draw.
    pub fn pick<'a, T>(&mut self, items: &'a [T], stream: &str) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.int(0, items.len() as i64 - 1, stream) as usize;
        items.get(idx)
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, items: &mut [T], stream: &str) {
        for i in (1..items.len()).rev() {
            let j = self.int(0, i as i64, stream) as usize;
            items.swap(i, j);
        }
    }

    /// Pick an item by cumulative weight.
    ///
    /// Non-positive and non-finite weights never win. Returns `None` (without
    /// drawing) when no weight is positive.
    pub fn weighted<'a, T>(&mut self, items: &'a [(T, f64)], stream: &str) -> Option<&'a T> {
        let usable = |w: f64| w.is_finite() && w > 0.0;
        let total: f64 = items.iter().map(|(_, w)| *w).filter(|w| usable(*w)).sum();
        if total <= 0.0 {
            return None;
        }

        let roll = self.next(stream) * total;
        let mut cumulative = 0.0;
        let mut last = None;
        for (item, weight) in items {
            if !usable(*weight) {
                continue;
            }
            cumulative += weight;
            last = Some(item);
            if roll < cumulative {
                return Some(item);
            }
        }
        // Float summation can leave `roll` a hair above the final bound
        last
    }

    /// Normally distributed value (Box–Muller, two draws from `stream`).
    pub fn gaussian(&mut self, mean: f64, std_dev: f64, stream: &str) -> f64 {
        let u1 = self.next(stream).max(GAUSSIAN_U1_FLOOR);
        let u2 = self.next(stream);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + z * std_dev
    }

    /// Copy of a single stream's state.
    pub fn stream_state(&self, name: &str) -> Option<Stream> {
        self.streams.get(name).copied()
    }

    /// Overwrite (or add) a single stream's state.
    pub fn set_stream_state(&mut self, name: &str, state: Stream) {
        self.streams.insert(name.to_string(), state);
    }

    /// Return a stream to its seed with zero draws. Returns false if unknown.
    pub fn reset_stream(&mut self, name: &str) -> bool {
        match self.streams.get_mut(name) {
            Some(stream) => {
                stream.reset();
                true
            }
            None => {
                warn!("Cannot reset unknown RNG stream '{}'", name);
                false
            }
        }
    }

    /// Reset every stream.
    pub fn reset_all(&mut self) {
        for stream in self.streams.values_mut() {
            stream.reset();
        }
    }

    /// Capture master seed and all streams.
    pub fn serialize(&self) -> RngState {
        RngState {
            master_seed: self.master_seed,
            streams: self.streams.clone(),
            next_offset: self.next_offset,
        }
    }

    /// Replace the whole generator state.
    pub fn deserialize(&mut self, state: &RngState) -> Result<(), RngError> {
        if !state.streams.contains_key(DEFAULT_STREAM) {
            return Err(RngError::MissingDefaultStream);
        }
        self.master_seed = state.master_seed;
        self.streams = state.streams.clone();
        self.next_offset = state.next_offset;
        Ok(())
    }

    /// Cheap fingerprint over every stream's state and call count.
    ///
    /// Streams are folded in name order with XOR and rotation, so any
    /// extra or missing draw on any stream changes the result.
    pub fn state_hash(&self) -> u32 {
        let mut hash = self.master_seed;
        for stream in self.streams.values() {
            hash = hash.rotate_left(5) ^ stream.state;
            let calls = (stream.call_count as u32) ^ ((stream.call_count >> 32) as u32);
            hash = hash.rotate_left(11) ^ calls;
        }
        hash
    }
}

impl Persistable for StreamRng {
    fn persist_key(&self) -> &str {
        "rng"
    }

    fn save_state(&self) -> StateBlob {
        encode_blob(&self.serialize())
    }

    fn load_state(&mut self, blob: &StateBlob) -> Result<(), PersistError> {
        let state: RngState = decode_blob(self.persist_key(), blob)?;
        self.deserialize(&state).map_err(|e| PersistError::Invalid {
            key: self.persist_key().to_string(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
