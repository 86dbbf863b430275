//! JSON-safe floats
//!
//! `serde_json` writes NaN and ±infinity as `null` and then refuses `null`
//! for an `f64`, so a recording holding one could be exported but never
//! imported again. The adapters here keep finite values as plain JSON
//! numbers and write non-finite ones as the strings `"NaN"`, `"Infinity"`
//! and `"-Infinity"`.
//!
//! Use with `#[serde(with = "...")]`:
//!
//! ```text
//! #[serde(with = "json_float::number")]         f64
//! #[serde(with = "json_float::option")]         Option<f64>
//! #[serde(with = "json_float::map")]            BTreeMap<String, f64>
//! ```

use std::fmt;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// An `f64` that survives a JSON round trip, non-finite values included.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JsonF64(pub f64);

impl Serialize for JsonF64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str(NAN)
        } else if v > 0.0 {
            serializer.serialize_str(INFINITY)
        } else {
            serializer.serialize_str(NEG_INFINITY)
        }
    }
}

struct JsonF64Visitor;

impl<'de> Visitor<'de> for JsonF64Visitor {
    type Value = JsonF64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a number, \"{}\", \"{}\" or \"{}\"", NAN, INFINITY, NEG_INFINITY)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JsonF64, E> {
        Ok(JsonF64(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<JsonF64, E> {
        Ok(JsonF64(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<JsonF64, E> {
        Ok(JsonF64(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<JsonF64, E> {
        match v {
            NAN => Ok(JsonF64(f64::NAN)),
            INFINITY => Ok(JsonF64(f64::INFINITY)),
            NEG_INFINITY => Ok(JsonF64(f64::NEG_INFINITY)),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for JsonF64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(JsonF64Visitor)
    }
}

/// Adapter for `f64` fields.
pub mod number {
    use super::*;

    /// Serialize.
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        JsonF64(*value).serialize(serializer)
    }

    /// Deserialize.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        JsonF64::deserialize(deserializer).map(|v| v.0)
    }
}

/// Adapter for `Option<f64>` fields.
pub mod option {
    use super::*;

    /// Serialize.
    pub fn serialize<S: Serializer>(
        value: &Option<f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(JsonF64).serialize(serializer)
    }

    /// Deserialize.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        Option::<JsonF64>::deserialize(deserializer).map(|v| v.map(|v| v.0))
    }
}

/// Adapter for `BTreeMap<String, f64>` fields.
pub mod map {
    use std::collections::BTreeMap;
    use super::*;

    /// Serialize.
    pub fn serialize<S: Serializer>(
        value: &BTreeMap<String, f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(value.iter().map(|(k, v)| (k, JsonF64(*v))))
    }

    /// Deserialize.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, f64>, D::Error> {
        let raw = BTreeMap::<String, JsonF64>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, v)| (k, v.0)).collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
