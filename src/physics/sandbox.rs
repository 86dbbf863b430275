//! Sandbox World
//!
//! A deliberately small [`PhysicsWorld`]: circular point bodies under
//! gravity, an optional bouncing floor, and contact begin/end detection.
//! It exists so the stepper and the replay validator can be exercised
//! end to end (demo binary, tests) without a real physics engine.
//!
//! Integration is semi-implicit Euler. Pairs are checked in handle order,
//! so event order is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::vec2::Vec2;
use super::world::{BodyHandle, ContactEvent, ContactPair, PhysicsWorld, Transform};

/// Check if two circles overlap.
#[inline]
pub fn circles_overlap(pos_a: Vec2, radius_a: f64, pos_b: Vec2, radius_b: f64) -> bool {
    let combined_radius = radius_a + radius_b;
    pos_a.distance_squared(pos_b) <= combined_radius * combined_radius
}

/// Body description used when spawning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyDesc {
    /// Start position.
    pub position: Vec2,
    /// Start velocity (units/s).
    pub velocity: Vec2,
    /// Angular velocity (rad/s).
    pub angular_velocity: f64,
    /// Collision radius.
    pub radius: f64,
    /// Static bodies ignore gravity and never move.
    pub dynamic: bool,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            radius: 0.5,
            dynamic: true,
        }
    }
}

/// Live body state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SandboxBody {
    /// Current position.
    pub position: Vec2,
    /// Current velocity.
    pub velocity: Vec2,
    /// Rotation in radians.
    pub rotation: f64,
    /// Angular velocity (rad/s).
    pub angular_velocity: f64,
    /// Collision radius.
    pub radius: f64,
    /// Static bodies ignore gravity and never move.
    pub dynamic: bool,
}

/// Minimal deterministic world.
#[derive(Clone, Debug)]
pub struct SandboxWorld {
    bodies: BTreeMap<BodyHandle, SandboxBody>,
    next_handle: u32,
    /// Acceleration applied to dynamic bodies.
    pub gravity: Vec2,
    /// Height of the floor plane, if any.
    pub floor: Option<f64>,
    /// Fraction of vertical speed kept on a floor bounce.
    pub restitution: f64,
    touching: BTreeSet<ContactPair>,
    pending: Vec<ContactEvent>,
    ready: bool,
}

impl Default for SandboxWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxWorld {
    /// Create an empty, ready world with standard gravity and a floor at 0.
    pub fn new() -> Self {
        Self {
            bodies: BTreeMap::new(),
            next_handle: 0,
            gravity: Vec2::new(0.0, -9.81),
            floor: Some(0.0),
            restitution: 0.8,
            touching: BTreeSet::new(),
            pending: Vec::new(),
            ready: true,
        }
    }

    /// Create a world that reports itself not ready.
    pub fn uninitialized() -> Self {
        Self { ready: false, ..Self::new() }
    }

    /// Mark the world (not) ready.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Add a body and return its handle.
    pub fn spawn(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(handle, SandboxBody {
            position: desc.position,
            velocity: desc.velocity,
            rotation: 0.0,
            angular_velocity: desc.angular_velocity,
            radius: desc.radius,
            dynamic: desc.dynamic,
        });
        handle
    }

    /// Remove a body. Open contacts involving it end silently.
    pub fn despawn(&mut self, handle: BodyHandle) -> Option<SandboxBody> {
        self.touching.retain(|pair| !pair.involves(handle));
        self.bodies.remove(&handle)
    }

    /// Read a body.
    pub fn body(&self, handle: BodyHandle) -> Option<&SandboxBody> {
        self.bodies.get(&handle)
    }

    /// Mutate a body (e.g. apply an impulse from game logic).
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut SandboxBody> {
        self.bodies.get_mut(&handle)
    }

    /// Pairs currently in contact.
    pub fn contacts(&self) -> impl Iterator<Item = &ContactPair> {
        self.touching.iter()
    }

    fn integrate(&mut self, dt: f64) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut().filter(|b| b.dynamic) {
            body.velocity = body.velocity + gravity * dt;
            body.position = body.position + body.velocity * dt;
            body.rotation += body.angular_velocity * dt;

            if let Some(floor) = self.floor {
                if body.position.y - body.radius < floor {
                    body.position.y = floor + body.radius;
                    body.velocity.y = -body.velocity.y * self.restitution;
                }
            }
        }
    }

    /// All overlapping pairs, checked (i, j) with i < j in handle order.
    fn overlapping_pairs(&self) -> BTreeSet<ContactPair> {
        let bodies: Vec<(&BodyHandle, &SandboxBody)> = self.bodies.iter().collect();
        let mut pairs = BTreeSet::new();
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (ha, a) = bodies[i];
                let (hb, b) = bodies[j];
                if circles_overlap(a.position, a.radius, b.position, b.radius) {
                    pairs.insert(ContactPair::new(*ha, *hb));
                }
            }
        }
        pairs
    }
}

impl PhysicsWorld for SandboxWorld {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn step(&mut self, dt: f64) {
        self.integrate(dt);

        let now = self.overlapping_pairs();
        for pair in now.difference(&self.touching) {
            self.pending.push(ContactEvent::Begin(*pair));
        }
        for pair in self.touching.difference(&now) {
            self.pending.push(ContactEvent::End(*pair));
        }
        self.touching = now;
    }

    fn body_handles(&self) -> Vec<BodyHandle> {
        self.bodies.keys().copied().collect()
    }

    fn body_transform(&self, handle: BodyHandle) -> Option<Transform> {
        self.bodies
            .get(&handle)
            .map(|b| Transform::new(b.position, b.rotation))
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.pending)
    }
}
