//! Fixed-Timestep Simulation Stepper
//!
//! Turns variable frame deltas into a deterministic sequence of fixed-size
//! world steps, then pushes interpolated transforms to render targets.
//!
//! ## Per-update order
//!
//! ```text
//! delta_ms ─► seconds ─► clamp ─► accumulator
//!                                    │
//!            ┌───────────────────────┘
//!            ▼
//!   while acc >= dt && steps < max:
//!       cache previous transforms
//!       world.step(dt)
//!       dispatch contact events
//!       acc -= dt
//!            │
//!   cap hit with time left over ─► acc = 0, warn
//!            ▼
//!   alpha = acc / dt ─► blend previous → current on every target
//! ```

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::core::env::env_parse;
use crate::core::persist::{decode_blob, encode_blob, PersistError, Persistable, StateBlob};
use super::events::{CollisionHandlers, HandlerResult};
use super::world::{BodyHandle, ContactKind, ContactPair, PhysicsWorld, RenderTarget, Transform};

/// Default simulation rate (Hz).
pub const DEFAULT_FIXED_HZ: f64 = 60.0;

/// Default cap on world steps per `update` call.
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 3;

/// Default cap on a single frame delta (seconds).
pub const DEFAULT_MAX_FRAME_DELTA: f64 = 0.25;

/// Stepper configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepperConfig {
    /// Simulated seconds per world step.
    pub fixed_time_step: f64,
    /// Maximum world steps per `update` call.
    pub max_steps_per_frame: u32,
    /// Frame deltas longer than this (seconds) are clamped.
    pub max_frame_delta: f64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            fixed_time_step: 1.0 / DEFAULT_FIXED_HZ,
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
        }
    }
}

impl StepperConfig {
    /// Create config from environment variables.
    ///
    /// - `STEADYSTEP_FIXED_HZ`: simulation rate
    /// - `STEADYSTEP_MAX_STEPS`: steps per update cap
    /// - `STEADYSTEP_MAX_DELTA_MS`: frame delta clamp in milliseconds
    ///
    /// Missing or unusable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let hz = env_parse::<f64>("STEADYSTEP_FIXED_HZ").filter(|hz| hz.is_finite() && *hz > 0.0);
        if let Some(hz) = hz {
            config.fixed_time_step = 1.0 / hz;
        }
        if let Some(steps) = env_parse::<u32>("STEADYSTEP_MAX_STEPS").filter(|s| *s > 0) {
            config.max_steps_per_frame = steps;
        }
        let max_delta_ms =
            env_parse::<f64>("STEADYSTEP_MAX_DELTA_MS").filter(|ms| ms.is_finite() && *ms > 0.0);
        if let Some(ms) = max_delta_ms {
            config.max_frame_delta = ms / 1000.0;
        }
        config
    }
}

/// Result of one `update` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    /// World steps taken.
    pub steps: u32,
    /// Blend factor used for render targets, in `[0, 1)`.
    pub interpolation: f64,
    /// Simulated seconds discarded by the delta clamp or the step cap.
    pub dropped_time: f64,
    /// True if the step cap discarded pending time.
    pub spiral_guard_tripped: bool,
}

/// Counters and current values, for diagnostics and frame snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepperMetrics {
    /// Leftover simulated time.
    pub accumulator: f64,
    /// Bodies in the attached world (0 if none).
    pub body_count: usize,
    /// Registered render targets.
    pub linked_targets: usize,
    /// World steps since creation or reset.
    pub total_steps: u64,
    /// Times the step cap discarded time.
    pub spiral_guard_trips: u64,
    /// Blend factor from the last update.
    pub last_interpolation: f64,
}

/// Registry entry linking a body to its render target.
struct RenderLink {
    target: Box<dyn RenderTarget>,
    /// Transform before the most recent fixed step; `None` until first seen.
    previous: Option<Transform>,
}

/// Persisted stepper state.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepperState {
    accumulator: f64,
    total_steps: u64,
    spiral_guard_trips: u64,
}

/// Fixed-timestep driver for a [`PhysicsWorld`].
pub struct Stepper<W: PhysicsWorld> {
    config: StepperConfig,
    world: Option<W>,
    accumulator: f64,
    links: BTreeMap<BodyHandle, RenderLink>,
    handlers: CollisionHandlers,
    total_steps: u64,
    spiral_guard_trips: u64,
    last_interpolation: f64,
}

impl<W: PhysicsWorld> Stepper<W> {
    /// Create a stepper with no world attached.
    pub fn new(config: StepperConfig) -> Self {
        Self {
            config,
            world: None,
            accumulator: 0.0,
            links: BTreeMap::new(),
            handlers: CollisionHandlers::new(),
            total_steps: 0,
            spiral_guard_trips: 0,
            last_interpolation: 0.0,
        }
    }

    /// Create a stepper driving `world`.
    pub fn with_world(config: StepperConfig, world: W) -> Self {
        let mut stepper = Self::new(config);
        stepper.attach_world(world);
        stepper
    }

    /// Configuration in use.
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Attach a world, returning the previous one.
    ///
    /// Clears the accumulator and all transform history.
    pub fn attach_world(&mut self, world: W) -> Option<W> {
        self.accumulator = 0.0;
        self.clear_history();
        info!("Stepper attached to world with {} bodies", world.body_count());
        self.world.replace(world)
    }

    /// Detach and return the world.
    pub fn detach_world(&mut self) -> Option<W> {
        self.clear_history();
        self.world.take()
    }

    /// The attached world.
    pub fn world(&self) -> Option<&W> {
        self.world.as_ref()
    }

    /// The attached world, mutably (e.g. to add bodies between updates).
    pub fn world_mut(&mut self) -> Option<&mut W> {
        self.world.as_mut()
    }

    /// True when a world is attached and reports itself ready.
    pub fn is_ready(&self) -> bool {
        self.world.as_ref().is_some_and(|w| w.is_ready())
    }

    /// Leftover simulated time.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Advance by a wall-clock delta in milliseconds.
    ///
    /// Negative or non-finite deltas count as zero. Does nothing when the
    /// stepper is not ready.
    pub fn update(&mut self, delta_ms: f64) -> StepReport {
        let mut report = StepReport::default();
        if !self.is_ready() {
            debug!("Stepper update skipped: world not ready");
            return report;
        }

        let mut delta = if delta_ms.is_finite() && delta_ms > 0.0 {
            delta_ms / 1000.0
        } else {
            0.0
        };
        if delta > self.config.max_frame_delta {
            report.dropped_time += delta - self.config.max_frame_delta;
            delta = self.config.max_frame_delta;
        }
        self.accumulator += delta;

        let dt = self.config.fixed_time_step;
        while self.accumulator >= dt && report.steps < self.config.max_steps_per_frame {
            self.fixed_step(dt);
            self.accumulator -= dt;
            report.steps += 1;
        }

        if report.steps == self.config.max_steps_per_frame && self.accumulator > 0.0 {
            warn!(
                "Stepper hit {} steps in one update; dropping {:.4}s of simulated time",
                self.config.max_steps_per_frame, self.accumulator
            );
            report.dropped_time += self.accumulator;
            report.spiral_guard_tripped = true;
            self.spiral_guard_trips += 1;
            self.accumulator = 0.0;
        }

        report.interpolation = self.accumulator / dt;
        self.last_interpolation = report.interpolation;
        self.sync_render_targets(report.interpolation);
        report
    }

    /// One world step plus contact dispatch.
    fn fixed_step(&mut self, dt: f64) {
        let Some(world) = self.world.as_mut() else {
            return;
        };

        for (handle, link) in self.links.iter_mut() {
            if let Some(current) = world.body_transform(*handle) {
                link.previous = Some(current);
            }
        }

        world.step(dt);
        self.total_steps += 1;

        let events = world.drain_contact_events();
        #[cfg(feature = "debug-tracing")]
        tracing::trace!("Step {}: {} contact events", self.total_steps, events.len());
        for event in &events {
            self.handlers.dispatch(event);
        }
    }

    /// Push blended transforms to every registered target.
    ///
    /// A body seen for the first time snaps to its current transform.
    /// Bodies missing from the world are skipped. Never modifies the
    /// previous-transform cache except to seed it on first sight.
    pub fn sync_render_targets(&mut self, interpolation: f64) {
        let Some(world) = self.world.as_ref() else {
            return;
        };
        let alpha = interpolation.clamp(0.0, 1.0);

        for (handle, link) in self.links.iter_mut() {
            let Some(current) = world.body_transform(*handle) else {
                continue;
            };
            let shown = match link.previous {
                Some(previous) => previous.lerp(current, alpha),
                None => {
                    link.previous = Some(current);
                    current
                }
            };
            link.target.set_position(shown.position);
            link.target.set_rotation(shown.rotation);
        }
    }

    /// Link a body to a render target. Re-registering replaces the link.
    pub fn register_body_target<T>(&mut self, handle: BodyHandle, target: T)
    where
        T: RenderTarget + 'static,
    {
        self.links.insert(handle, RenderLink {
            target: Box::new(target),
            previous: None,
        });
    }

    /// Link many bodies at once.
    pub fn register_body_targets<I, T>(&mut self, targets: I)
    where
        I: IntoIterator<Item = (BodyHandle, T)>,
        T: RenderTarget + 'static,
    {
        for (handle, target) in targets {
            self.register_body_target(handle, target);
        }
    }

    /// Remove a link. Returns true if it existed.
    pub fn unregister_body_target(&mut self, handle: BodyHandle) -> bool {
        self.links.remove(&handle).is_some()
    }

    /// Register a collision handler for contact-begin events.
    pub fn register_collision_handler<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&ContactPair) -> HandlerResult + 'static,
    {
        self.handlers.register(ContactKind::Begin, key, handler);
    }

    /// Remove a contact-begin handler. Returns true if it existed.
    pub fn unregister_collision_handler(&self, key: &str) -> bool {
        self.handlers.unregister(ContactKind::Begin, key)
    }

    /// Shared handle to the full handler table (all contact kinds).
    pub fn collision_handlers(&self) -> CollisionHandlers {
        self.handlers.clone()
    }

    /// Current counters.
    pub fn metrics(&self) -> StepperMetrics {
        StepperMetrics {
            accumulator: self.accumulator,
            body_count: self.world.as_ref().map_or(0, |w| w.body_count()),
            linked_targets: self.links.len(),
            total_steps: self.total_steps,
            spiral_guard_trips: self.spiral_guard_trips,
            last_interpolation: self.last_interpolation,
        }
    }

    /// Clear accumulator, counters and transform history.
    ///
    /// Links and handlers stay registered.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.total_steps = 0;
        self.spiral_guard_trips = 0;
        self.last_interpolation = 0.0;
        self.clear_history();
    }

    fn clear_history(&mut self) {
        for link in self.links.values_mut() {
            link.previous = None;
        }
    }
}

impl<W: PhysicsWorld> Persistable for Stepper<W> {
    fn persist_key(&self) -> &str {
        "stepper"
    }

    fn save_state(&self) -> StateBlob {
        encode_blob(&StepperState {
            accumulator: self.accumulator,
            total_steps: self.total_steps,
            spiral_guard_trips: self.spiral_guard_trips,
        })
    }

    fn load_state(&mut self, blob: &StateBlob) -> Result<(), PersistError> {
        let state: StepperState = decode_blob(self.persist_key(), blob)?;
        let dt = self.config.fixed_time_step;
        if !(state.accumulator.is_finite() && (0.0..dt).contains(&state.accumulator)) {
            return Err(PersistError::Invalid {
                key: self.persist_key().to_string(),
                reason: format!("accumulator {} outside [0, {})", state.accumulator, dt),
            });
        }
        self.accumulator = state.accumulator;
        self.total_steps = state.total_steps;
        self.spiral_guard_trips = state.spiral_guard_trips;
        self.clear_history();
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use crate::core::vec2::Vec2;
    use crate::physics::world::ContactEvent;

    /// World moving body 0 by +1 on x per step, counting steps.
    #[derive(Default)]
    struct LineWorld {
        ready: bool,
        steps: u32,
        x: f64,
        pending: Vec<ContactEvent>,
        contact_every: Option<u32>,
    }

    impl LineWorld {
        fn ready() -> Self {
            Self { ready: true, ..Self::default() }
        }
    }

    impl PhysicsWorld for LineWorld {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn step(&mut self, _dt: f64) {
            self.steps += 1;
            self.x += 1.0;
            if let Some(n) = self.contact_every {
                if self.steps % n == 0 {
                    let pair = ContactPair::new(BodyHandle(0), BodyHandle(1));
                    self.pending.push(ContactEvent::Begin(pair));
                }
            }
        }

        fn body_handles(&self) -> Vec<BodyHandle> {
            vec![BodyHandle(0)]
        }

        fn body_transform(&self, handle: BodyHandle) -> Option<Transform> {
            (handle == BodyHandle(0)).then(|| Transform::new(Vec2::new(self.x, 0.0), self.x * 0.1))
        }

        fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
            std::mem::take(&mut self.pending)
        }
    }

    #[derive(Default)]
    struct Sprite {
        position: Vec2,
        rotation: f64,
        writes: u32,
    }

    impl RenderTarget for Sprite {
        fn set_position(&mut self, position: Vec2) {
            self.position = position;
            self.writes += 1;
        }

        fn set_rotation(&mut self, rotation: f64) {
            self.rotation = rotation;
        }
    }

    /// 1/64 s steps: every value in these tests is exact in binary.
    fn config() -> StepperConfig {
        StepperConfig {
            fixed_time_step: 0.015625,
            max_steps_per_frame: 3,
            max_frame_delta: 0.25,
        }
    }

    const STEP_MS: f64 = 15.625;

    #[test]
    fn test_zero_delta_takes_no_steps() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        stepper.update(STEP_MS / 2.0);
        let before = stepper.accumulator();

        let report = stepper.update(0.0);
        assert_eq!(report.steps, 0);
        assert_eq!(stepper.accumulator(), before);
        assert_eq!(stepper.world().unwrap().steps, 0);
    }

    #[test]
    fn test_exact_steps_and_remainder() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let report = stepper.update(STEP_MS * 2.5);

        assert_eq!(report.steps, 2);
        assert_eq!(report.interpolation, 0.5);
        assert_eq!(stepper.accumulator(), 0.0078125);
        assert!(!report.spiral_guard_tripped);
    }

    #[test]
    fn test_accumulator_carries_between_updates() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        assert_eq!(stepper.update(STEP_MS * 0.75).steps, 0);
        assert_eq!(stepper.update(STEP_MS * 0.75).steps, 1);
        assert_eq!(stepper.accumulator(), 0.0078125);
    }

    #[test]
    fn test_huge_delta_hits_spiral_guard() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let report = stepper.update(60_000.0);

        assert_eq!(report.steps, 3);
        assert!(report.spiral_guard_tripped);
        assert_eq!(stepper.accumulator(), 0.0);
        assert_eq!(report.interpolation, 0.0);
        assert_eq!(stepper.metrics().spiral_guard_trips, 1);
        assert!(report.dropped_time > 59.0);
    }

    #[test]
    fn test_cap_hit_drops_leftover_time() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let report = stepper.update(STEP_MS * 3.5);

        assert_eq!(report.steps, 3);
        assert!(report.spiral_guard_tripped);
        assert_eq!(stepper.accumulator(), 0.0);
        assert_eq!(report.interpolation, 0.0);
        assert_eq!(report.dropped_time, 0.0078125);
        assert_eq!(stepper.metrics().spiral_guard_trips, 1);
    }

    #[test]
    fn test_cap_reached_exactly_is_not_a_trip() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let report = stepper.update(STEP_MS * 3.0);

        assert_eq!(report.steps, 3);
        assert!(!report.spiral_guard_tripped);
        assert_eq!(stepper.accumulator(), 0.0);
        assert_eq!(stepper.metrics().spiral_guard_trips, 0);
    }

    #[test]
    fn test_invalid_deltas_ignored() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        assert_eq!(stepper.update(-100.0).steps, 0);
        assert_eq!(stepper.update(f64::NAN).steps, 0);
        assert_eq!(stepper.update(f64::INFINITY).steps, 0);
        assert_eq!(stepper.accumulator(), 0.0);
    }

    #[test]
    fn test_not_ready_is_noop() {
        let mut empty: Stepper<LineWorld> = Stepper::new(config());
        assert!(!empty.is_ready());
        assert_eq!(empty.update(1000.0), StepReport::default());

        let mut stepper = Stepper::with_world(config(), LineWorld::default());
        assert_eq!(stepper.update(1000.0).steps, 0);
        assert_eq!(stepper.accumulator(), 0.0);
        assert_eq!(stepper.world().unwrap().steps, 0);
    }

    #[test]
    fn test_first_observation_snaps() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        stepper.world_mut().unwrap().x = 5.0;
        let sprite = Rc::new(RefCell::new(Sprite::default()));
        stepper.register_body_target(BodyHandle(0), sprite.clone());

        stepper.update(STEP_MS / 2.0);
        assert_eq!(sprite.borrow().position, Vec2::new(5.0, 0.0));
        assert_eq!(sprite.borrow().rotation, 0.5);
    }

    #[test]
    fn test_interpolates_between_real_steps() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let sprite = Rc::new(RefCell::new(Sprite::default()));
        stepper.register_body_target(BodyHandle(0), sprite.clone());
        stepper.update(0.0); // first sight at x = 0

        // Two steps land (x: 0 → 2), half a step left over:
        // blend between x = 1 (before last step) and x = 2.
        stepper.update(STEP_MS * 2.5);
        assert_eq!(sprite.borrow().position, Vec2::new(1.5, 0.0));

        // Render-only syncs never move the cached previous transform.
        stepper.sync_render_targets(0.25);
        assert_eq!(sprite.borrow().position, Vec2::new(1.25, 0.0));
        stepper.sync_render_targets(0.25);
        assert_eq!(sprite.borrow().position, Vec2::new(1.25, 0.0));
    }

    #[test]
    fn test_reregister_overwrites() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let first = Rc::new(RefCell::new(Sprite::default()));
        let second = Rc::new(RefCell::new(Sprite::default()));
        stepper.register_body_targets([(BodyHandle(0), first.clone())]);
        stepper.register_body_target(BodyHandle(0), second.clone());
        assert_eq!(stepper.metrics().linked_targets, 1);

        stepper.update(STEP_MS);
        assert_eq!(first.borrow().writes, 0);
        assert_eq!(second.borrow().writes, 1);

        assert!(stepper.unregister_body_target(BodyHandle(0)));
        assert_eq!(stepper.metrics().linked_targets, 0);
    }

    #[test]
    fn test_missing_body_is_skipped() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        let ghost = Rc::new(RefCell::new(Sprite::default()));
        stepper.register_body_target(BodyHandle(42), ghost.clone());
        stepper.update(STEP_MS);
        assert_eq!(ghost.borrow().writes, 0);
    }

    #[test]
    fn test_collision_handlers_run_per_step() {
        let mut world = LineWorld::ready();
        world.contact_every = Some(1);
        let mut stepper = Stepper::with_world(config(), world);

        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        stepper.register_collision_handler("count", move |pair| {
            assert_eq!(pair.a, BodyHandle(0));
            h.set(h.get() + 1);
            Ok(())
        });
        stepper.register_collision_handler("broken", |_| Err("always fails".into()));

        stepper.update(STEP_MS * 3.0);
        assert_eq!(hits.get(), 3);

        assert!(stepper.unregister_collision_handler("count"));
        stepper.update(STEP_MS);
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn test_metrics_and_reset() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        stepper.update(STEP_MS * 2.5);
        let m = stepper.metrics();
        assert_eq!(m.total_steps, 2);
        assert_eq!(m.body_count, 1);
        assert_eq!(m.last_interpolation, 0.5);

        stepper.reset();
        assert_eq!(stepper.metrics().total_steps, 0);
        assert_eq!(stepper.accumulator(), 0.0);
    }

    #[test]
    fn test_persist_roundtrip() {
        let mut stepper = Stepper::with_world(config(), LineWorld::ready());
        stepper.update(STEP_MS * 1.5);
        let blob = stepper.save_state();

        let mut other = Stepper::with_world(config(), LineWorld::ready());
        other.load_state(&blob).unwrap();
        assert_eq!(other.accumulator(), stepper.accumulator());
        assert_eq!(other.metrics().total_steps, 1);

        let bad = serde_json::json!({ "accumulator": 1.0, "totalSteps": 0, "spiralGuardTrips": 0 });
        assert!(other.load_state(&bad).is_err());
    }

    #[test]
    fn test_accumulator_invariant_random_deltas() {
        let mut stepper = Stepper::with_world(StepperConfig::default(), LineWorld::ready());
        let mut rng = crate::core::rng::StreamRng::new(99);
        for _ in 0..2000 {
            let delta = rng.range(0.0, 400.0, "main");
            stepper.update(delta);
            let acc = stepper.accumulator();
            assert!(acc >= 0.0 && acc < stepper.config().fixed_time_step);
        }
    }
}
