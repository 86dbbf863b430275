//! Physics Collaborator Interfaces
//!
//! The stepper never implements collision math. It drives whatever engine
//! sits behind [`PhysicsWorld`] and pushes transforms into anything that
//! implements [`RenderTarget`].

use std::cell::RefCell;
use std::rc::Rc;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// Stable body identifier.
///
/// Implements Ord so registries iterate in a deterministic order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

impl std::fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position and rotation of a body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation.
    pub position: Vec2,
    /// Rotation in radians.
    pub rotation: f64,
}

impl Transform {
    /// Create a transform.
    pub const fn new(position: Vec2, rotation: f64) -> Self {
        Self { position, rotation }
    }

    /// Linear blend of position and rotation.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation + (other.rotation - self.rotation) * t,
        }
    }
}

/// Contact notification kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContactKind {
    /// Two bodies started touching.
    Begin = 0,
    /// Two bodies stopped touching.
    End = 1,
}

impl ContactKind {
    /// Every kind, in table order.
    pub const ALL: [ContactKind; 2] = [ContactKind::Begin, ContactKind::End];

    /// Index into per-kind tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Two bodies involved in a contact, stored lowest handle first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContactPair {
    /// Lower handle.
    pub a: BodyHandle,
    /// Higher handle.
    pub b: BodyHandle,
}

impl ContactPair {
    /// Create a pair; argument order does not matter.
    pub fn new(x: BodyHandle, y: BodyHandle) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    /// True if `handle` is one of the two bodies.
    pub fn involves(&self, handle: BodyHandle) -> bool {
        self.a == handle || self.b == handle
    }
}

/// Contact event emitted by a world step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactEvent {
    /// Contact started.
    Begin(ContactPair),
    /// Contact ended.
    End(ContactPair),
}

impl ContactEvent {
    /// Kind of this event.
    pub fn kind(&self) -> ContactKind {
        match self {
            Self::Begin(_) => ContactKind::Begin,
            Self::End(_) => ContactKind::End,
        }
    }

    /// Bodies involved.
    pub fn pair(&self) -> &ContactPair {
        match self {
            Self::Begin(pair) | Self::End(pair) => pair,
        }
    }
}

/// An externally owned physics world.
pub trait PhysicsWorld {
    /// False while the world is not yet usable; the stepper will not touch it.
    fn is_ready(&self) -> bool {
        true
    }

    /// Advance the simulation by exactly `dt` seconds.
    fn step(&mut self, dt: f64);

    /// Every body currently in the world, in a deterministic order.
    fn body_handles(&self) -> Vec<BodyHandle>;

    /// Current transform of a body, if it exists.
    fn body_transform(&self, handle: BodyHandle) -> Option<Transform>;

    /// Number of bodies.
    fn body_count(&self) -> usize {
        self.body_handles().len()
    }

    /// Contact events produced since the last call, in emission order.
    fn drain_contact_events(&mut self) -> Vec<ContactEvent>;
}

/// Anything that can be positioned on screen.
pub trait RenderTarget {
    /// Set the displayed position.
    fn set_position(&mut self, position: Vec2);

    /// Set the displayed rotation in radians.
    fn set_rotation(&mut self, rotation: f64);
}

impl<T: RenderTarget + ?Sized> RenderTarget for Box<T> {
    fn set_position(&mut self, position: Vec2) {
        (**self).set_position(position);
    }

    fn set_rotation(&mut self, rotation: f64) {
        (**self).set_rotation(rotation);
    }
}

/// Shared targets let the host keep reading what the stepper wrote.
impl<T: RenderTarget + ?Sized> RenderTarget for Rc<RefCell<T>> {
    fn set_position(&mut self, position: Vec2) {
        self.borrow_mut().set_position(position);
    }

    fn set_rotation(&mut self, rotation: f64) {
        self.borrow_mut().set_rotation(rotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_pair_is_ordered() {
        let p = ContactPair::new(BodyHandle(9), BodyHandle(2));
        assert_eq!(p.a, BodyHandle(2));
        assert_eq!(p.b, BodyHandle(9));
        assert_eq!(p, ContactPair::new(BodyHandle(2), BodyHandle(9)));
        assert!(p.involves(BodyHandle(9)));
        assert!(!p.involves(BodyHandle(3)));
    }

    #[test]
    fn test_transform_lerp() {
        let a = Transform::new(Vec2::new(0.0, 0.0), 0.0);
        let b = Transform::new(Vec2::new(4.0, -2.0), 1.0);
        let mid = a.lerp(b, 0.25);
        assert_eq!(mid.position, Vec2::new(1.0, -0.5));
        assert_eq!(mid.rotation, 0.25);
    }

    #[test]
    fn test_contact_kind_indices() {
        for (i, kind) in ContactKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        let ev = ContactEvent::End(ContactPair::new(BodyHandle(1), BodyHandle(0)));
        assert_eq!(ev.kind(), ContactKind::End);
        assert_eq!(ev.pair().a, BodyHandle(0));
    }
}
