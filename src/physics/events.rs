//! Collision Handler Dispatch
//!
//! Handlers are stored per [`ContactKind`] in an enum-indexed table and keyed
//! by name inside each kind. Every dispatch works on a point-in-time copy of
//! the table, so a handler may register or unregister other handlers while
//! it runs; the change takes effect on the next dispatch.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;
use tracing::{error, warn};

use super::world::{ContactEvent, ContactKind, ContactPair};

/// Failure reported by a collision handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Result returned by a collision handler.
pub type HandlerResult = Result<(), HandlerError>;

/// A collision handler.
pub type ContactHandler = Rc<dyn Fn(&ContactPair) -> HandlerResult>;

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers invoked.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Enum-indexed handler table.
#[derive(Default)]
struct HandlerTable {
    by_kind: [BTreeMap<String, ContactHandler>; ContactKind::ALL.len()],
}

/// Shared, cloneable handle to the collision handler table.
///
/// Clones refer to the same table, so a handler can capture one and
/// (un)register handlers from inside a dispatch.
#[derive(Clone, Default)]
pub struct CollisionHandlers {
    table: Rc<RefCell<HandlerTable>>,
}

impl CollisionHandlers {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-using a key replaces the previous handler.
    pub fn register<F>(&self, kind: ContactKind, key: impl Into<String>, handler: F)
    where
        F: Fn(&ContactPair) -> HandlerResult + 'static,
    {
        let key = key.into();
        let replaced = self.table.borrow_mut().by_kind[kind.index()]
            .insert(key.clone(), Rc::new(handler))
            .is_some();
        if replaced {
            warn!("Collision handler '{}' ({:?}) replaced", key, kind);
        }
    }

    /// Remove a handler. Returns true if it existed.
    pub fn unregister(&self, kind: ContactKind, key: &str) -> bool {
        self.table.borrow_mut().by_kind[kind.index()].remove(key).is_some()
    }

    /// Number of handlers for a kind.
    pub fn len(&self, kind: ContactKind) -> usize {
        self.table.borrow().by_kind[kind.index()].len()
    }

    /// True if no handler of any kind is registered.
    pub fn is_empty(&self) -> bool {
        self.table.borrow().by_kind.iter().all(BTreeMap::is_empty)
    }

    /// Copy of the handlers for a kind, in key order.
    fn snapshot(&self, kind: ContactKind) -> Vec<(String, ContactHandler)> {
        self.table.borrow().by_kind[kind.index()]
            .iter()
            .map(|(key, handler)| (key.clone(), Rc::clone(handler)))
            .collect()
    }

    /// Invoke every handler for the event's kind.
    ///
    /// A handler error or panic is logged and counted; the remaining
    /// handlers still run and nothing propagates to the caller.
    pub fn dispatch(&self, event: &ContactEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let pair = event.pair();

        for (key, handler) in self.snapshot(event.kind()) {
            outcome.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(pair))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    error!("Collision handler '{}' failed for {}-{}: {}", key, pair.a, pair.b, e);
                }
                Err(_) => {
                    outcome.failed += 1;
                    error!("Collision handler '{}' panicked for {}-{}", key, pair.a, pair.b);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use crate::physics::world::BodyHandle;

    fn begin(a: u32, b: u32) -> ContactEvent {
        ContactEvent::Begin(ContactPair::new(BodyHandle(a), BodyHandle(b)))
    }

    #[test]
    fn test_dispatch_by_kind() {
        let handlers = CollisionHandlers::new();
        let begins = Rc::new(Cell::new(0));
        let ends = Rc::new(Cell::new(0));

        let b = begins.clone();
        handlers.register(ContactKind::Begin, "count", move |_| {
            b.set(b.get() + 1);
            Ok(())
        });
        let e = ends.clone();
        handlers.register(ContactKind::End, "count", move |_| {
            e.set(e.get() + 1);
            Ok(())
        });

        handlers.dispatch(&begin(1, 2));
        handlers.dispatch(&begin(3, 4));
        handlers.dispatch(&ContactEvent::End(ContactPair::new(BodyHandle(1), BodyHandle(2))));

        assert_eq!(begins.get(), 2);
        assert_eq!(ends.get(), 1);
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let handlers = CollisionHandlers::new();
        let reached = Rc::new(Cell::new(false));

        handlers.register(ContactKind::Begin, "a-errors", |_| Err("boom".into()));
        handlers.register(ContactKind::Begin, "b-panics", |_| panic!("handler bug"));
        let r = reached.clone();
        handlers.register(ContactKind::Begin, "c-ok", move |_| {
            r.set(true);
            Ok(())
        });

        let outcome = handlers.dispatch(&begin(0, 1));
        assert_eq!(outcome, DispatchOutcome { invoked: 3, failed: 2 });
        assert!(reached.get());
    }

    #[test]
    fn test_registration_during_dispatch_uses_snapshot() {
        let handlers = CollisionHandlers::new();
        let late_calls = Rc::new(Cell::new(0));

        let table = handlers.clone();
        let late = late_calls.clone();
        handlers.register(ContactKind::Begin, "spawner", move |_| {
            let late = late.clone();
            table.register(ContactKind::Begin, "late", move |_| {
                late.set(late.get() + 1);
                Ok(())
            });
            table.unregister(ContactKind::Begin, "spawner");
            Ok(())
        });

        let first = handlers.dispatch(&begin(0, 1));
        assert_eq!(first.invoked, 1);
        assert_eq!(late_calls.get(), 0);

        let second = handlers.dispatch(&begin(0, 1));
        assert_eq!(second.invoked, 1);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_unregister() {
        let handlers = CollisionHandlers::new();
        handlers.register(ContactKind::Begin, "x", |_| Ok(()));
        assert_eq!(handlers.len(ContactKind::Begin), 1);
        assert!(handlers.unregister(ContactKind::Begin, "x"));
        assert!(!handlers.unregister(ContactKind::Begin, "x"));
        assert!(handlers.is_empty());
    }
}
