//! Frame Snapshots
//!
//! The host hands the validator a [`GameStateSnapshot`] every tick. The
//! validator reduces it to a [`FrameSnapshot`]: what is kept is exactly what
//! later gets compared.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;
use crate::core::json_float;
use crate::core::vec2::Vec2;
use crate::physics::stepper::StepperMetrics;

/// One entity as seen by the host.
///
/// Optional fields the host leaves out are never compared.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Host-side identifier, used only to label divergences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// X position.
    #[serde(with = "json_float::number")]
    pub x: f64,
    /// Y position.
    #[serde(with = "json_float::number")]
    pub y: f64,
    /// X velocity.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "json_float::option")]
    pub velocity_x: Option<f64>,
    /// Y velocity.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "json_float::option")]
    pub velocity_y: Option<f64>,
    /// Alive/active flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl EntityState {
    /// Entity at a position.
    pub fn at(position: Vec2) -> Self {
        Self {
            x: position.x,
            y: position.y,
            ..Self::default()
        }
    }

    /// Attach an identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a velocity.
    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity_x = Some(velocity.x);
        self.velocity_y = Some(velocity.y);
        self
    }

    /// Attach an active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Position as a vector.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Velocity, if both components were supplied.
    pub fn velocity(&self) -> Option<Vec2> {
        Some(Vec2::new(self.velocity_x?, self.velocity_y?))
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_str(self.id.as_deref().unwrap_or(""));
        hasher.update_vec2(self.position());
        hasher.update_opt_f64(self.velocity_x);
        hasher.update_opt_f64(self.velocity_y);
        hasher.update_u8(match self.active {
            None => 0,
            Some(false) => 1,
            Some(true) => 2,
        });
    }
}

/// Live game state supplied by the host each tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    /// The player entity, if the game has one.
    #[serde(default)]
    pub player: Option<EntityState>,
    /// Every other tracked entity, in a stable host-defined order.
    #[serde(default)]
    pub entities: Vec<EntityState>,
    /// Named discrete game metrics (score, lives, wave, ...).
    #[serde(default, with = "json_float::map")]
    pub metrics: BTreeMap<String, f64>,
}

impl GameStateSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the player.
    pub fn with_player(mut self, player: EntityState) -> Self {
        self.player = Some(player);
        self
    }

    /// Append an entity.
    pub fn with_entity(mut self, entity: EntityState) -> Self {
        self.entities.push(entity);
        self
    }

    /// Set a metric.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Stepper values captured alongside each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsMetrics {
    /// Leftover simulated time after the tick's update.
    #[serde(with = "json_float::number")]
    pub accumulator: f64,
    /// Bodies in the world.
    pub body_count: usize,
}

impl From<StepperMetrics> for PhysicsMetrics {
    fn from(metrics: StepperMetrics) -> Self {
        Self {
            accumulator: metrics.accumulator,
            body_count: metrics.body_count,
        }
    }
}

/// Reduced per-frame record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    /// 0-based, strictly increasing within a session.
    pub frame_index: u32,
    /// Wall-clock capture time (Unix ms). Informational only.
    pub timestamp: i64,
    /// Player entity.
    #[serde(default)]
    pub player: Option<EntityState>,
    /// Captured entities (possibly truncated to the configured limit).
    #[serde(default)]
    pub entities: Vec<EntityState>,
    /// Entity count before truncation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<usize>,
    /// `StreamRng::state_hash` at capture time.
    pub rng_state_hash: u32,
    /// Stepper values, if the host runs a stepper.
    #[serde(default)]
    pub physics_metrics: Option<PhysicsMetrics>,
    /// Caller-defined metrics.
    #[serde(default, with = "json_float::map")]
    pub metrics: BTreeMap<String, f64>,
}

impl FrameSnapshot {
    /// Reduce live state to a frame record.
    pub fn capture(
        frame_index: u32,
        state: &GameStateSnapshot,
        rng_state_hash: u32,
        physics_metrics: Option<PhysicsMetrics>,
        entity_limit: Option<usize>,
    ) -> Self {
        let keep = entity_limit.unwrap_or(usize::MAX).min(state.entities.len());
        Self {
            frame_index,
            timestamp: chrono::Utc::now().timestamp_millis(),
            player: state.player.clone(),
            entities: state.entities[..keep].to_vec(),
            entity_count: Some(state.entities.len()),
            rng_state_hash,
            physics_metrics,
            metrics: state.metrics.clone(),
        }
    }

    /// Feed every compared field (not the timestamp) into a hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.frame_index);
        hasher.update_u32(self.rng_state_hash);

        hasher.update_bool(self.player.is_some());
        if let Some(player) = &self.player {
            player.hash_into(hasher);
        }

        hasher.update_u64(self.entities.len() as u64);
        for entity in &self.entities {
            entity.hash_into(hasher);
        }
        hasher.update_u64(self.entity_count.map_or(u64::MAX, |c| c as u64));

        match &self.physics_metrics {
            Some(p) => {
                hasher.update_u8(1);
                hasher.update_f64(p.accumulator);
                hasher.update_u64(p.body_count as u64);
            }
            None => hasher.update_u8(0),
        }

        // BTreeMap: sorted by name
        hasher.update_u64(self.metrics.len() as u64);
        for (name, value) in &self.metrics {
            hasher.update_str(name);
            hasher.update_f64(*value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_truncates_entities() {
        let state = GameStateSnapshot::new()
            .with_entity(EntityState::at(Vec2::new(1.0, 1.0)))
            .with_entity(EntityState::at(Vec2::new(2.0, 2.0)))
            .with_entity(EntityState::at(Vec2::new(3.0, 3.0)))
            .with_metric("score", 10.0);

        let frame = FrameSnapshot::capture(4, &state, 77, None, Some(2));
        assert_eq!(frame.frame_index, 4);
        assert_eq!(frame.entities.len(), 2);
        assert_eq!(frame.entity_count, Some(3));
        assert_eq!(frame.rng_state_hash, 77);
        assert_eq!(frame.metrics["score"], 10.0);

        let full = FrameSnapshot::capture(4, &state, 77, None, None);
        assert_eq!(full.entities.len(), 3);
    }

    #[test]
    fn test_entity_velocity_requires_both_axes() {
        let mut e = EntityState::at(Vec2::ZERO).with_velocity(Vec2::new(1.0, -1.0));
        assert_eq!(e.velocity(), Some(Vec2::new(1.0, -1.0)));
        e.velocity_y = None;
        assert_eq!(e.velocity(), None);
    }

    #[test]
    fn test_frame_json_field_names() {
        let state = GameStateSnapshot::new().with_player(EntityState::at(Vec2::new(0.5, 1.5)));
        let physics = PhysicsMetrics { accumulator: 0.0, body_count: 2 };
        let frame = FrameSnapshot::capture(0, &state, 1, Some(physics), None);
        let json = serde_json::to_value(&frame).unwrap();

        assert!(json.get("frameIndex").is_some());
        assert!(json.get("rngStateHash").is_some());
        assert_eq!(json["physicsMetrics"]["bodyCount"], 2);
        // Absent optional entity fields are left out entirely
        assert!(json["player"].get("velocityX").is_none());
    }

    #[test]
    fn test_hash_ignores_timestamp() {
        let state = GameStateSnapshot::new().with_metric("score", 3.0);
        let mut a = FrameSnapshot::capture(1, &state, 5, None, None);
        let mut b = a.clone();
        a.timestamp = 0;
        b.timestamp = 999_999;

        let digest = |f: &FrameSnapshot| {
            let mut h = StateHasher::for_recording();
            f.hash_into(&mut h);
            h.finalize()
        };
        assert_eq!(digest(&a), digest(&b));

        b.metrics.insert("score".into(), 4.0);
        assert_ne!(digest(&a), digest(&b));
    }
}
