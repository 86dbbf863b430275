//! Validation Reports
//!
//! Divergences are data. They are accumulated per frame and returned in a
//! [`ValidationReport`] when the validation session stops.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::json_float;
use crate::core::vec2::Vec2;

/// Category of a divergence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Entity position beyond tolerance.
    Position,
    /// Entity velocity beyond tolerance.
    Velocity,
    /// RNG state hash differs (always exact).
    RngState,
    /// Caller-defined metric differs (always exact).
    Metric,
    /// Number of entities differs.
    EntityCount,
    /// Stepper body count or accumulator differs.
    Physics,
}

impl fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Position => "position",
            Self::Velocity => "velocity",
            Self::RngState => "rng_state",
            Self::Metric => "metric",
            Self::EntityCount => "entity_count",
            Self::Physics => "physics",
        };
        f.write_str(name)
    }
}

/// A compared value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observed {
    /// 2D value (position, velocity).
    Point {
        /// X component.
        #[serde(with = "json_float::number")]
        x: f64,
        /// Y component.
        #[serde(with = "json_float::number")]
        y: f64,
    },
    /// Scalar value (hash, count, metric).
    Number(#[serde(with = "json_float::number")] f64),
}

impl From<Vec2> for Observed {
    fn from(v: Vec2) -> Self {
        Self::Point { x: v.x, y: v.y }
    }
}

impl From<f64> for Observed {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point { x, y } => write!(f, "({}, {})", x, y),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

/// One mismatch between a recorded frame and the live run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    /// Frame index.
    pub frame: u32,
    /// Category.
    #[serde(rename = "type")]
    pub kind: DivergenceKind,
    /// What was compared, e.g. `player`, `entities[3]`, `metrics.score`.
    pub subject: String,
    /// Recorded value.
    pub expected: Observed,
    /// Live value.
    pub actual: Observed,
    /// Magnitude for tolerance-based comparisons.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "json_float::option")]
    pub difference: Option<f64>,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} {} {}: expected {}, got {}",
            self.frame, self.kind, self.subject, self.expected, self.actual
        )?;
        if let Some(d) = self.difference {
            write!(f, " (diff {:.6})", d)?;
        }
        Ok(())
    }
}

/// Per-kind aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    /// Number of divergences of this kind.
    pub count: u64,
    /// First frame it occurred in.
    pub first_frame: u32,
    /// Last frame it occurred in.
    pub last_frame: u32,
}

/// Divergences grouped by kind.
pub type ErrorSummary = BTreeMap<DivergenceKind, SummaryEntry>;

/// Add one divergence to a summary.
pub(crate) fn summarize(summary: &mut ErrorSummary, kind: DivergenceKind, frame: u32) {
    summary
        .entry(kind)
        .and_modify(|entry| {
            entry.count += 1;
            entry.first_frame = entry.first_frame.min(frame);
            entry.last_frame = entry.last_frame.max(frame);
        })
        .or_insert(SummaryEntry {
            count: 1,
            first_frame: frame,
            last_frame: frame,
        });
}

/// Outcome of a validation session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True when no divergence was found.
    pub success: bool,
    /// Frames compared.
    pub frames_validated: u32,
    /// Frames in the recording.
    pub total_frames: u32,
    /// Stored divergences, in detection order.
    pub errors: Vec<Divergence>,
    /// Divergences grouped by kind (includes any not stored).
    pub error_summary: ErrorSummary,
    /// Divergences counted in the summary but not stored in `errors`.
    #[serde(default)]
    pub omitted_errors: u64,
}

impl ValidationReport {
    /// Earliest divergence, if any.
    pub fn first_divergence(&self) -> Option<&Divergence> {
        self.errors.first()
    }

    /// Total divergences of a kind, including omitted ones.
    pub fn count(&self, kind: DivergenceKind) -> u64 {
        self.error_summary.get(&kind).map_or(0, |entry| entry.count)
    }

    /// True if every recorded frame was compared.
    pub fn is_complete(&self) -> bool {
        self.frames_validated == self.total_frames
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.success { "PASS" } else { "FAIL" };
        write!(f, "{}: {}/{} frames validated", verdict, self.frames_validated, self.total_frames)?;
        for (kind, entry) in &self.error_summary {
            write!(
                f,
                "; {} x{} (frames {}-{})",
                kind, entry.count, entry.first_frame, entry.last_frame
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_groups_by_kind() {
        let mut summary = ErrorSummary::new();
        summarize(&mut summary, DivergenceKind::Position, 5);
        summarize(&mut summary, DivergenceKind::Position, 2);
        summarize(&mut summary, DivergenceKind::Position, 9);
        summarize(&mut summary, DivergenceKind::RngState, 7);

        assert_eq!(
            summary[&DivergenceKind::Position],
            SummaryEntry { count: 3, first_frame: 2, last_frame: 9 }
        );
        assert_eq!(summary[&DivergenceKind::RngState].count, 1);
        assert!(!summary.contains_key(&DivergenceKind::Metric));
    }

    #[test]
    fn test_report_json_uses_type_names() {
        let mut summary = ErrorSummary::new();
        summarize(&mut summary, DivergenceKind::RngState, 3);
        let report = ValidationReport {
            success: false,
            frames_validated: 4,
            total_frames: 4,
            errors: vec![Divergence {
                frame: 3,
                kind: DivergenceKind::RngState,
                subject: "rng".into(),
                expected: Observed::Number(1.0),
                actual: Observed::Number(2.0),
                difference: None,
            }],
            error_summary: summary,
            omitted_errors: 0,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["type"], "rng_state");
        assert_eq!(json["errorSummary"]["rng_state"]["firstFrame"], 3);
        assert!(json["errors"][0].get("difference").is_none());
        assert!(report.to_string().starts_with("FAIL: 4/4"));
    }

    #[test]
    fn test_observed_untagged() {
        let p: Observed = serde_json::from_str(r#"{"x":1.0,"y":2.0}"#).unwrap();
        assert_eq!(p, Observed::from(Vec2::new(1.0, 2.0)));
        let n: Observed = serde_json::from_str("3.5").unwrap();
        assert_eq!(n, Observed::Number(3.5));
    }
}
