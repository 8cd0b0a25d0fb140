//! Physics integration and contact detection.
//!
//! The `PhysicsEngine` handles:
//! - Force integration: `velocity += force / mass * dt` for dynamic bodies
//! - Ground friction for bodies that are not floating
//! - Position integration: `position += velocity * dt`
//! - Contact detection between overlapping circle bodies
//!
//! There is no impulse solver. Bodies pass through each other; contacts only
//! feed `StartCollide` events.
//!
//! # Fixed Timestep
//!
//! The default timestep is 1/60 seconds (60 FPS). This keeps integration
//! deterministic regardless of actual frame time.

use std::collections::BTreeSet;

use glam::Vec2;

use crate::arena::Arena;
use crate::config::PhysicsConfig;
use crate::entity::{BodyStatus, BodyType, EntityId, PhysicsBody};

/// Fixed timestep for physics integration (1/60 second = ~16.67ms).
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// Integrates bodies and finds contacts.
///
/// # Processing Order
///
/// 1. Apply accumulated forces to dynamic bodies, then clear them
/// 2. Apply ground friction to bodies that are on the ground
/// 3. Integrate positions for uncontained, unanchored bodies
///
/// # Example
///
/// ```
/// use singulo_core::systems::physics::{PhysicsEngine, FIXED_DT};
///
/// let engine = PhysicsEngine::new();
/// assert!((engine.dt() - FIXED_DT).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone)]
pub struct PhysicsEngine {
    /// Default timestep
    dt: f32,
    /// Velocity fraction lost per second on the ground
    ground_friction: f32,
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine {
    /// Creates an engine with the default fixed timestep and friction.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&PhysicsConfig::default())
    }

    /// Creates an engine from configuration.
    #[must_use]
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            dt: config.dt,
            ground_friction: config.ground_friction,
        }
    }

    /// Creates an engine with a custom timestep.
    ///
    /// Useful for testing or non-standard tick rates.
    #[must_use]
    pub fn with_dt(dt: f32) -> Self {
        Self {
            dt,
            ..Self::new()
        }
    }

    /// Returns the default timestep.
    #[must_use]
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Applies an instantaneous impulse: `v += J / m`.
    pub fn apply_impulse(body: &mut PhysicsBody, impulse: Vec2) {
        body.linear_velocity += impulse * body.inv_mass();
    }

    /// Integrates one step of `dt` seconds.
    ///
    /// After updating positions, syncs the spatial index for every entity
    /// that moved.
    pub fn integrate(&self, arena: &mut Arena, dt: f32) {
        let damping = (1.0 - self.ground_friction * dt).max(0.0);
        let mut moved: Vec<EntityId> = Vec::new();

        for entity in arena.entities_sorted_mut() {
            let free = entity.transform.is_uncontained() && !entity.transform.anchored;
            let Some(body) = entity.components.body.as_mut() else {
                continue;
            };
            let force = std::mem::take(&mut body.force);
            if !free {
                continue;
            }
            match body.body_type {
                BodyType::Static => continue,
                BodyType::Kinematic => {}
                BodyType::Dynamic => {
                    body.linear_velocity += force * body.inv_mass() * dt;
                    if body.status == BodyStatus::OnGround {
                        body.linear_velocity *= damping;
                    }
                }
            }
            if body.linear_velocity != Vec2::ZERO {
                entity.transform.position += body.linear_velocity * dt;
                moved.push(entity.id());
            }
        }

        for id in moved {
            arena.update_spatial(id);
        }
    }

    /// Overlapping body pairs whose layers and masks meet, lower ID first.
    ///
    /// Only live, uncontained bodies are considered; static pairs are skipped.
    #[must_use]
    pub fn contacts(&self, arena: &Arena) -> BTreeSet<(EntityId, EntityId)> {
        let max_radius = arena
            .entities_sorted()
            .filter_map(|e| e.components.body.as_ref())
            .map(|b| b.radius)
            .fold(0.0_f32, f32::max);

        let mut pairs = BTreeSet::new();
        for entity in arena.entities_sorted() {
            let a = entity.id();
            let (Some(body_a), Some(pos_a)) =
                (entity.components.body.as_ref(), arena.spatial().get(a))
            else {
                continue;
            };
            if !arena.exists(a) {
                continue;
            }
            for b in arena.query_radius(pos_a, body_a.radius + max_radius) {
                if b <= a {
                    continue;
                }
                let (Some(body_b), Some(pos_b)) = (
                    arena.get(b).and_then(|e| e.components.body.as_ref()),
                    arena.spatial().get(b),
                ) else {
                    continue;
                };
                if body_a.body_type == BodyType::Static && body_b.body_type == BodyType::Static {
                    continue;
                }
                let reach = body_a.radius + body_b.radius;
                if pos_a.distance_squared(pos_b) <= reach * reach && body_a.can_collide(body_b) {
                    pairs.insert((a, b));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityComponents, EntityTag, TransformState};

    fn spawn_body(arena: &mut Arena, pos: Vec2, body: PhysicsBody) -> EntityId {
        arena.spawn(
            EntityTag::Item,
            TransformState::at(pos),
            EntityComponents::default().with_body(body),
        )
    }

    fn body(arena: &Arena, id: EntityId) -> &PhysicsBody {
        arena.get(id).unwrap().components.body.as_ref().unwrap()
    }

    mod integration_tests {
        use super::*;

        #[test]
        fn force_accelerates_and_clears() {
            let mut arena = Arena::new();
            let mut floating = PhysicsBody::dynamic(2.0, 0.25);
            floating.status = BodyStatus::InAir;
            floating.force = Vec2::new(4.0, 0.0);
            let id = spawn_body(&mut arena, Vec2::ZERO, floating);

            PhysicsEngine::new().integrate(&mut arena, 0.5);
            let b = body(&arena, id);
            assert!((b.linear_velocity.x - 1.0).abs() < 1e-5);
            assert_eq!(b.force, Vec2::ZERO);
            assert!((arena.spatial().get(id).unwrap().x - 0.5).abs() < 1e-5);
        }

        #[test]
        fn ground_friction_slows_grounded_bodies() {
            let mut arena = Arena::new();
            let mut grounded = PhysicsBody::dynamic(1.0, 0.25);
            grounded.linear_velocity = Vec2::new(1.0, 0.0);
            let id = spawn_body(&mut arena, Vec2::ZERO, grounded);

            PhysicsEngine::new().integrate(&mut arena, 0.1);
            assert!(body(&arena, id).linear_velocity.x < 1.0);
        }

        #[test]
        fn static_bodies_stay_put() {
            let mut arena = Arena::new();
            let mut wall = PhysicsBody::fixed(0.5);
            wall.linear_velocity = Vec2::ONE;
            wall.force = Vec2::ONE;
            let id = spawn_body(&mut arena, Vec2::ZERO, wall);

            PhysicsEngine::new().integrate(&mut arena, 1.0);
            assert_eq!(arena.spatial().get(id), Some(Vec2::ZERO));
            assert_eq!(body(&arena, id).force, Vec2::ZERO);
        }

        #[test]
        fn impulse_scales_with_inverse_mass() {
            let mut b = PhysicsBody::dynamic(4.0, 0.25);
            PhysicsEngine::apply_impulse(&mut b, Vec2::new(8.0, 0.0));
            assert_eq!(b.linear_velocity, Vec2::new(2.0, 0.0));
        }
    }

    mod contact_tests {
        use super::*;

        #[test]
        fn overlapping_pairs_are_reported_once() {
            let mut arena = Arena::new();
            let wall = spawn_body(&mut arena, Vec2::ZERO, PhysicsBody::fixed(0.5));
            let rock = spawn_body(&mut arena, Vec2::new(0.6, 0.0), PhysicsBody::dynamic(1.0, 0.25));
            let _far = spawn_body(&mut arena, Vec2::new(5.0, 0.0), PhysicsBody::dynamic(1.0, 0.25));

            let pairs = PhysicsEngine::new().contacts(&arena);
            assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec![(wall, rock)]);
        }

        #[test]
        fn layers_must_meet() {
            let mut arena = Arena::new();
            spawn_body(&mut arena, Vec2::ZERO, PhysicsBody::dynamic(1.0, 0.5));
            spawn_body(&mut arena, Vec2::new(0.1, 0.0), PhysicsBody::dynamic(1.0, 0.5));
            // Items only mask walls and singularities.
            assert!(PhysicsEngine::new().contacts(&arena).is_empty());
        }
    }
}
