//! Bouncing Balls
//!
//! Reference scenario for the determinism harness and the demo binary.
//! Balls are scattered from the `physics` stream, dropped onto a floor
//! around a static peg, and periodically kicked using the `ai` stream.
//! Every contact begin adds a point to the score.

use std::cell::Cell;
use std::rc::Rc;

use crate::core::rng::StreamRng;
use crate::core::vec2::Vec2;
use crate::physics::sandbox::{BodyDesc, SandboxWorld};
use crate::physics::stepper::Stepper;
use crate::physics::world::BodyHandle;
use crate::replay::harness::Scenario;
use crate::replay::snapshot::{EntityState, GameStateSnapshot};

/// Balls dropping around a peg.
#[derive(Debug, Clone)]
pub struct BouncingBalls {
    /// Balls spawned per run.
    pub ball_count: usize,
    /// Kick a random ball every N frames.
    pub kick_every: Option<u32>,
    /// Draw once from the `effects` stream on this frame. Used to inject a
    /// divergence on purpose.
    pub stray_draw_at: Option<u32>,
    balls: Vec<BodyHandle>,
    score: Rc<Cell<u32>>,
}

impl Default for BouncingBalls {
    fn default() -> Self {
        Self {
            ball_count: 6,
            kick_every: Some(45),
            stray_draw_at: None,
            balls: Vec::new(),
            score: Rc::new(Cell::new(0)),
        }
    }
}

impl BouncingBalls {
    /// Contacts counted so far in the current run.
    pub fn score(&self) -> u32 {
        self.score.get()
    }

    /// Handles of the balls in the current run.
    pub fn balls(&self) -> &[BodyHandle] {
        &self.balls
    }
}

impl Scenario for BouncingBalls {
    type World = SandboxWorld;

    fn build_world(&mut self, rng: &mut StreamRng) -> SandboxWorld {
        self.balls.clear();
        self.score = Rc::new(Cell::new(0));

        let mut world = SandboxWorld::new();
        world.spawn(BodyDesc {
            position: Vec2::new(0.0, 1.5),
            radius: 0.8,
            dynamic: false,
            ..BodyDesc::default()
        });

        for _ in 0..self.ball_count {
            let x = rng.range(-3.0, 3.0, "physics");
            let y = rng.range(3.0, 7.0, "physics");
            let handle = world.spawn(BodyDesc {
                position: Vec2::new(x, y),
                velocity: Vec2::new(rng.range(-1.5, 1.5, "physics"), 0.0),
                angular_velocity: rng.range(-2.0, 2.0, "physics"),
                radius: 0.4,
                dynamic: true,
            });
            self.balls.push(handle);
        }
        world
    }

    fn install(&mut self, stepper: &mut Stepper<SandboxWorld>) {
        let score = Rc::clone(&self.score);
        stepper.register_collision_handler("score", move |_pair| {
            score.set(score.get() + 1);
            Ok(())
        });
    }

    fn before_step(
        &mut self,
        frame: u32,
        stepper: &mut Stepper<SandboxWorld>,
        rng: &mut StreamRng,
    ) {
        if self.stray_draw_at == Some(frame) {
            rng.next("effects");
        }

        let Some(every) = self.kick_every.filter(|n| *n > 0) else {
            return;
        };
        if frame == 0 || frame % every != 0 {
            return;
        }
        let Some(&target) = rng.pick(&self.balls, "ai") else {
            return;
        };
        let kick = Vec2::new(rng.range(-2.0, 2.0, "ai"), rng.range(3.0, 6.0, "ai"));
        if let Some(body) = stepper.world_mut().and_then(|w| w.body_mut(target)) {
            body.velocity = body.velocity + kick;
        }
    }

    fn observe(&self, stepper: &Stepper<SandboxWorld>) -> GameStateSnapshot {
        let mut state = GameStateSnapshot::new().with_metric("score", self.score.get() as f64);
        let Some(world) = stepper.world() else {
            return state;
        };

        for handle in &self.balls {
            if let Some(body) = world.body(*handle) {
                state.entities.push(
                    EntityState::at(body.position)
                        .with_id(format!("ball-{}", handle.0))
                        .with_velocity(body.velocity)
                        .with_active(true),
                );
            }
        }
        state.metrics.insert("contacts".into(), world.contacts().count() as f64);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::stepper::StepperConfig;
    use crate::physics::world::PhysicsWorld;

    #[test]
    fn test_build_world_resets_run_state() {
        let mut scenario = BouncingBalls::default();
        let mut rng = StreamRng::new(3);

        let world = scenario.build_world(&mut rng);
        assert_eq!(world.body_count(), 7);
        assert_eq!(scenario.balls().len(), 6);

        scenario.score.set(9);
        scenario.build_world(&mut rng);
        assert_eq!(scenario.balls().len(), 6);
        assert_eq!(scenario.score(), 0);
    }

    #[test]
    fn test_spawn_uses_physics_stream_only() {
        let mut scenario = BouncingBalls::default();
        let mut rng = StreamRng::new(3);
        scenario.build_world(&mut rng);

        assert_eq!(rng.call_count("physics"), Some(24));
        assert_eq!(rng.call_count("ai"), Some(0));
        assert_eq!(rng.call_count("main"), Some(0));
    }

    #[test]
    fn test_balls_collide_and_score() {
        let mut scenario = BouncingBalls {
            ball_count: 1,
            kick_every: None,
            ..BouncingBalls::default()
        };
        let mut rng = StreamRng::new(1);
        let mut world = scenario.build_world(&mut rng);
        // Drop the only ball straight onto the peg
        let ball = scenario.balls()[0];
        let body = world.body_mut(ball).unwrap();
        body.position = Vec2::new(0.0, 4.0);
        body.velocity = Vec2::ZERO;

        let mut stepper = Stepper::with_world(StepperConfig::default(), world);
        scenario.install(&mut stepper);
        for frame in 0..120 {
            scenario.before_step(frame, &mut stepper, &mut rng);
            stepper.update(1000.0 / 60.0);
        }
        assert!(scenario.score() >= 1);

        let state = scenario.observe(&stepper);
        assert_eq!(state.entities.len(), 1);
        assert_eq!(state.metrics["score"], scenario.score() as f64);
        assert_eq!(state.entities[0].id.as_deref(), Some("ball-1"));
    }
}
