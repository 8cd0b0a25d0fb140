//! Test helper functions for setting up simulations and entities.
//!
//! This module provides factory functions and setup utilities that make
//! writing tests more ergonomic and consistent.

use glam::Vec2;

use crate::entity::{
    CollisionLayer, ContainerManager, ContainmentFieldGenerator, EntityComponents, EntityId,
    EntityTag, Grid, PhysicsBody, RandomWalk, Singularity, Tile, TransformState,
};
use crate::simulation::Simulation;

// =============================================================================
// Entity Factories
// =============================================================================

/// Spawns a bare event horizon with a hard body of the same radius.
///
/// The horizon uses the config's consume period and has no singularity, so
/// nothing resizes it.
///
/// # Arguments
///
/// * `sim` - The simulation to spawn into
/// * `pos` - World position
/// * `radius` - Event horizon and body radius
pub fn spawn_horizon(sim: &mut Simulation, pos: Vec2, radius: f32) -> EntityId {
    let horizon = sim.config().event_horizon(radius);
    sim.spawn(
        EntityTag::Singularity,
        TransformState::at(pos),
        EntityComponents::default()
            .with_event_horizon(horizon)
            .with_body(singularity_body(radius)),
    )
}

/// Spawns a full singularity: horizon, gravity well, energy, random walk,
/// distortion and radiation.
///
/// Everything derived from the level is synced at spawn.
pub fn spawn_singularity(sim: &mut Simulation, pos: Vec2, energy: f32) -> EntityId {
    let horizon = sim.config().event_horizon(0.5);
    let well = sim.config().gravity_well(4.0, 10.0, 0.0);
    let singularity: Singularity = sim.config().singularity(energy);
    sim.spawn(
        EntityTag::Singularity,
        TransformState::at(pos),
        EntityComponents::default()
            .with_event_horizon(horizon)
            .with_gravity_well(well)
            .with_singularity(singularity)
            .with_body(singularity_body(0.5))
            .with_random_walk(RandomWalk::default())
            .with_distortion()
            .with_radiation(),
    )
}

fn singularity_body(radius: f32) -> PhysicsBody {
    PhysicsBody::dynamic(10.0, radius).with_collision(
        CollisionLayer::SINGULARITY,
        CollisionLayer::ITEM | CollisionLayer::MOB | CollisionLayer::WALL | CollisionLayer::FIELD,
    )
}

/// Spawns a hard, dynamic, one-kilogram item.
pub fn spawn_item(sim: &mut Simulation, pos: Vec2) -> EntityId {
    sim.spawn(
        EntityTag::Item,
        TransformState::at(pos),
        EntityComponents::default().with_body(PhysicsBody::dynamic(1.0, 0.25)),
    )
}

/// Spawns singularity food worth `energy`.
pub fn spawn_food(sim: &mut Simulation, pos: Vec2, energy: f32) -> EntityId {
    sim.spawn(
        EntityTag::Item,
        TransformState::at(pos),
        EntityComponents::default()
            .with_body(PhysicsBody::dynamic(1.0, 0.25))
            .with_food(energy),
    )
}

/// Spawns a bodiless structure with one container named `"storage"`.
pub fn spawn_locker(sim: &mut Simulation, pos: Vec2) -> EntityId {
    sim.spawn(
        EntityTag::Structure,
        TransformState::at(pos),
        EntityComponents::default().with_containers(ContainerManager::single("storage")),
    )
}

/// Spawns a bodiless gravity well with no tangential acceleration.
///
/// # Arguments
///
/// * `sim` - The simulation to spawn into
/// * `pos` - World position
/// * `max_range` - Outer range; negative disables the well
/// * `radial` - Radial acceleration
pub fn spawn_well(sim: &mut Simulation, pos: Vec2, max_range: f32, radial: f32) -> EntityId {
    let well = sim.config().gravity_well(max_range, radial, 0.0);
    sim.spawn(
        EntityTag::Structure,
        TransformState::at(pos),
        EntityComponents::default().with_gravity_well(well),
    )
}

/// Spawns a `width` x `height` plated grid with tile (0, 0) at `origin`.
pub fn spawn_grid(sim: &mut Simulation, origin: Vec2, width: i32, height: i32) -> EntityId {
    sim.spawn(
        EntityTag::Grid,
        TransformState::at(origin),
        EntityComponents::default().with_grid(Grid::filled(width, height, Tile::PLATING)),
    )
}

/// Spawns an enabled field generator anchored to `grid`.
pub fn spawn_generator(sim: &mut Simulation, grid: EntityId, pos: Vec2) -> EntityId {
    sim.spawn(
        EntityTag::FieldGenerator,
        TransformState::at(pos).anchored_to(grid),
        EntityComponents::default()
            .with_body(PhysicsBody::fixed(0.45).with_collision(
                CollisionLayer::WALL,
                CollisionLayer::ITEM
                    | CollisionLayer::MOB
                    | CollisionLayer::SINGULARITY
                    | CollisionLayer::BOLT,
            ))
            .with_generator(ContainmentFieldGenerator::default()),
    )
}

// =============================================================================
// Accessors
// =============================================================================

/// Returns an entity's physics body.
///
/// # Panics
///
/// Panics if the entity is missing or has no body.
pub fn body_of(sim: &Simulation, id: EntityId) -> &PhysicsBody {
    sim.arena()
        .get(id)
        .and_then(|e| e.components.body.as_ref())
        .expect("entity should have a body")
}

/// Returns a singularity's stored energy.
///
/// # Panics
///
/// Panics if the entity is missing or is not a singularity.
pub fn energy_of(sim: &Simulation, id: EntityId) -> f32 {
    sim.arena()
        .get(id)
        .and_then(|e| e.components.singularity.as_ref())
        .map(|s| s.energy)
        .expect("entity should be a singularity")
}

/// Returns a singularity's level.
///
/// # Panics
///
/// Panics if the entity is missing or is not a singularity.
pub fn level_of(sim: &Simulation, id: EntityId) -> u8 {
    sim.arena()
        .get(id)
        .and_then(|e| e.components.singularity.as_ref())
        .map(|s| s.level)
        .expect("entity should be a singularity")
}

/// Runs `ticks` simulation steps.
pub fn run_ticks(sim: &mut Simulation, ticks: usize) {
    for _ in 0..ticks {
        sim.step();
    }
}
