//! Random drifting for free bodies.
//!
//! Every `min_step_cooldown..=max_step_cooldown` a walker gets a push in a
//! random direction. The previous velocity is kept in proportion to
//! `accumulator_ratio`, so a ratio of zero replaces it outright.
//!
//! All randomness comes from the simulation's seeded RNG, visited in entity
//! ID order, so runs with the same seed drift identically.

use std::f32::consts::TAU;
use std::time::Duration;

use glam::Vec2;
use rand::Rng;

use crate::entity::{ComponentKind, EntityId};
use crate::simulation::Simulation;

/// Stateless random walk operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomWalkEngine;

impl RandomWalkEngine {
    /// Steps every uncontained walker whose cooldown has elapsed.
    pub fn update(sim: &mut Simulation) {
        let now = sim.time();
        for id in sim.arena().ids_with(ComponentKind::RandomWalk) {
            let due = sim.arena().get(id).is_some_and(|e| {
                e.transform.is_uncontained()
                    && e.components.body.is_some()
                    && e.components
                        .random_walk
                        .as_ref()
                        .is_some_and(|w| w.next_step_time <= now)
            });
            if due {
                Self::step(sim, id, now);
            }
        }
    }

    /// Pushes one walker and schedules its next step.
    pub fn step(sim: &mut Simulation, id: EntityId, now: Duration) {
        let Some(walk) = sim
            .arena()
            .get(id)
            .and_then(|e| e.components.random_walk.clone())
        else {
            return;
        };

        let rng = sim.rng_mut();
        let angle = rng.gen_range(0.0..TAU);
        let speed = if walk.min_speed < walk.max_speed {
            rng.gen_range(walk.min_speed..=walk.max_speed)
        } else {
            walk.min_speed
        };
        let cooldown = if walk.min_step_cooldown < walk.max_step_cooldown {
            rng.gen_range(walk.min_step_cooldown..=walk.max_step_cooldown)
        } else {
            walk.min_step_cooldown
        };

        let Some(components) = sim.arena_mut().components_mut(id) else {
            return;
        };
        if let Some(body) = components.body.as_mut() {
            body.linear_velocity =
                body.linear_velocity * walk.accumulator_ratio + Vec2::from_angle(angle) * speed;
        }
        if let Some(w) = components.random_walk.as_mut() {
            w.next_step_time = now + cooldown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{
        ContainerRef, EntityComponents, EntityTag, PhysicsBody, RandomWalk, TransformState,
    };
    use crate::tests::helpers::{body_of, spawn_locker};

    fn spawn_walker(sim: &mut Simulation, walk: RandomWalk) -> EntityId {
        sim.spawn(
            EntityTag::Item,
            TransformState::at(Vec2::ZERO),
            EntityComponents::default()
                .with_body(PhysicsBody::dynamic(1.0, 0.25))
                .with_random_walk(walk),
        )
    }

    #[test]
    fn step_speed_is_within_bounds() {
        let mut sim = Simulation::with_seed(3);
        let id = spawn_walker(&mut sim, RandomWalk::default());
        RandomWalkEngine::update(&mut sim);

        let speed = body_of(&sim, id).linear_velocity.length();
        assert!((7.5 - 1e-3..=10.0 + 1e-3).contains(&speed), "speed {speed}");
        let next = sim.arena().get(id).unwrap().components.random_walk.clone().unwrap();
        assert!(next.next_step_time >= Duration::from_secs(2));
        assert!(next.next_step_time <= Duration::from_secs(5));
    }

    #[test]
    fn waits_for_cooldown() {
        let mut sim = Simulation::with_seed(3);
        let id = spawn_walker(
            &mut sim,
            RandomWalk {
                next_step_time: Duration::from_secs(1),
                ..RandomWalk::default()
            },
        );
        RandomWalkEngine::update(&mut sim);
        assert_eq!(body_of(&sim, id).linear_velocity, Vec2::ZERO);
    }

    #[test]
    fn accumulator_keeps_part_of_the_old_velocity() {
        let mut sim = Simulation::with_seed(3);
        let id = spawn_walker(
            &mut sim,
            RandomWalk {
                min_speed: 0.0,
                max_speed: 0.0,
                accumulator_ratio: 0.5,
                ..RandomWalk::default()
            },
        );
        if let Some(body) = sim.arena_mut().components_mut(id).and_then(|c| c.body.as_mut()) {
            body.linear_velocity = Vec2::new(4.0, 0.0);
        }
        RandomWalkEngine::update(&mut sim);
        assert_eq!(body_of(&sim, id).linear_velocity, Vec2::new(2.0, 0.0));
    }

    #[test]
    fn contained_walkers_stay_still() {
        let mut sim = Simulation::with_seed(3);
        let locker = spawn_locker(&mut sim, Vec2::ZERO);
        let id = spawn_walker(&mut sim, RandomWalk::default());
        assert!(sim.try_insert(id, &ContainerRef::new(locker, "storage")));
        RandomWalkEngine::update(&mut sim);
        assert_eq!(body_of(&sim, id).linear_velocity, Vec2::ZERO);
    }

    #[test]
    fn same_seed_same_drift() {
        let run = || {
            let mut sim = Simulation::with_seed(11);
            let id = spawn_walker(&mut sim, RandomWalk::default());
            RandomWalkEngine::update(&mut sim);
            body_of(&sim, id).linear_velocity
        };
        assert_eq!(run(), run());
    }
}
