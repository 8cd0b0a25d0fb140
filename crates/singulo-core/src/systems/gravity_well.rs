//! Gravity wells and gravitational pulses.
//!
//! A well scans for nearby dynamic bodies once per scan period, then pulls on
//! everything it captured every physics step.
//!
//! # Sign Conventions
//!
//! Both forms produce the same field; they differ only in which displacement
//! they are applied to.
//!
//! - **Continuous** ([`GravityWell::acceleration_matrix`]):
//!   `M = [[-r, -t], [t, -r]]` applied to `entity - well`.
//! - **Pulse** ([`pulse_matrix`]): `M = [[r, t], [-t, r]]` applied to
//!   `epicenter - entity`.
//!
//! Positive `r` pulls inward; positive `t` swirls counter-clockwise. Both
//! scale the result by `mass / distance²`.
//!
//! # Range Check
//!
//! An entity at squared distance `d²` is affected when
//! `max(min², MIN_GRAV_PULSE_RANGE) <= d² <= max²`. Both ends are inclusive.

use glam::{Mat2, Vec2};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::trace;

use crate::arena::Arena;
use crate::entity::{
    continuous_matrix, BodyType, ComponentKind, EntityId, GravityWell, PhysicsBody,
};
use crate::simulation::Simulation;
use crate::systems::physics::PhysicsEngine;

/// Floor for the squared inner range, keeping `1 / d²` finite.
pub const MIN_GRAV_PULSE_RANGE: f32 = 0.000_01;

/// Builds the pulse-form matrix `[[r, t], [-t, r]]`.
#[must_use]
pub fn pulse_matrix(radial: f32, tangential: f32) -> Mat2 {
    Mat2::from_cols(Vec2::new(radial, -tangential), Vec2::new(tangential, radial))
}

/// Returns true if `d²` falls in the inclusive band `[min², max²]`.
#[must_use]
pub fn in_range(distance_squared: f32, min_range: f32, max_range: f32) -> bool {
    let min2 = (min_range * min_range).max(MIN_GRAV_PULSE_RANGE);
    distance_squared >= min2 && distance_squared <= max_range * max_range
}

fn well(sim: &Simulation, id: EntityId) -> Option<&GravityWell> {
    sim.arena().get(id)?.components.gravity_well.as_ref()
}

fn well_mut(sim: &mut Simulation, id: EntityId) -> Option<&mut GravityWell> {
    sim.arena_mut().components_mut(id)?.gravity_well.as_mut()
}

/// One well's view of the world for the force pass.
struct WellJob {
    center: Vec2,
    min_range: f32,
    max_range: f32,
    matrix: Mat2,
    targets: Vec<EntityId>,
}

/// Stateless gravity operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct GravityWellEngine;

impl GravityWellEngine {
    /// Returns true if gravity may move the entity.
    ///
    /// Maps, grids, stations, ghosts, other wells, and anything without a
    /// dynamic body are left alone.
    #[must_use]
    pub fn can_be_affected(arena: &Arena, id: EntityId) -> bool {
        let Some(entity) = arena.get(id) else {
            return false;
        };
        arena.exists(id)
            && !entity.tag().is_consume_immune()
            && !entity.has(ComponentKind::GravityWell)
            && entity
                .components
                .body
                .as_ref()
                .is_some_and(|b| b.body_type == BodyType::Dynamic)
    }

    // -------------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------------

    /// Rescans every well that is due.
    pub fn update(sim: &mut Simulation) {
        let now = sim.time();
        for id in sim.arena().ids_with(ComponentKind::GravityWell) {
            if well(sim, id).is_some_and(|w| w.next_scan_time <= now) {
                Self::scan(sim, id);
            }
        }
    }

    /// Refreshes one well's captured set and schedules its next scan.
    pub fn scan(sim: &mut Simulation, id: EntityId) {
        let now = sim.time();
        let Some(max_range) = well(sim, id).map(|w| w.max_range) else {
            return;
        };
        let center = sim.arena().world_position(id);

        let captured: BTreeSet<EntityId> = match center {
            Some(center) if max_range >= 0.0 => sim
                .arena()
                .query_radius(center, max_range)
                .into_iter()
                .filter(|other| *other != id && Self::can_be_affected(sim.arena(), *other))
                .collect(),
            _ => BTreeSet::new(),
        };

        if let Some(w) = well_mut(sim, id) {
            trace!(well = %id, captured = captured.len(), "gravity scan");
            w.captured = captured;
            w.last_scan_time = now;
            w.next_scan_time = now + w.target_scan_period;
        }
    }

    /// Changes the scan period. A scan that becomes due runs immediately.
    pub fn set_scan_period(sim: &mut Simulation, id: EntityId, period: Duration) {
        let now = sim.time();
        let Some(w) = well_mut(sim, id) else {
            return;
        };
        if w.target_scan_period == period {
            return;
        }
        w.target_scan_period = period;
        w.next_scan_time = w.last_scan_time + period;
        if w.next_scan_time <= now {
            Self::scan(sim, id);
        }
    }

    /// Sets the radial acceleration and rebuilds the matrix.
    pub fn set_radial_acceleration(sim: &mut Simulation, id: EntityId, value: f32) {
        if let Some(w) = well_mut(sim, id) {
            w.base_radial_acceleration = value;
            w.acceleration_matrix = continuous_matrix(value, w.base_tangential_acceleration);
        }
    }

    /// Sets the tangential acceleration and rebuilds the matrix.
    pub fn set_tangential_acceleration(sim: &mut Simulation, id: EntityId, value: f32) {
        if let Some(w) = well_mut(sim, id) {
            w.base_tangential_acceleration = value;
            w.acceleration_matrix = continuous_matrix(w.base_radial_acceleration, value);
        }
    }

    // -------------------------------------------------------------------------
    // Continuous pull
    // -------------------------------------------------------------------------

    /// Accumulates gravity forces on captured bodies for one physics step.
    ///
    /// Forces for all (well, target) pairs are computed in parallel from an
    /// immutable view, then added to bodies in well-then-target ID order.
    pub fn update_before_solve(sim: &mut Simulation) {
        let arena = sim.arena();
        let jobs: Vec<WellJob> = arena
            .entities_sorted()
            .filter(|e| arena.exists(e.id()))
            .filter_map(|e| {
                let w = e.components.gravity_well.as_ref()?;
                if w.max_range < 0.0 || w.captured.is_empty() {
                    return None;
                }
                Some(WellJob {
                    center: arena.world_position(e.id())?,
                    min_range: w.min_range,
                    max_range: w.max_range,
                    matrix: w.acceleration_matrix,
                    targets: w.captured.iter().copied().collect(),
                })
            })
            .collect();

        let forces: Vec<(EntityId, Vec2)> = jobs
            .par_iter()
            .flat_map_iter(|job| {
                job.targets
                    .iter()
                    .filter_map(move |target| Self::continuous_force(arena, job, *target))
            })
            .collect();

        for (target, force) in forces {
            if let Some(body) = sim
                .arena_mut()
                .components_mut(target)
                .and_then(|c| c.body.as_mut())
            {
                body.force += force;
            }
        }
    }

    fn continuous_force(arena: &Arena, job: &WellJob, target: EntityId) -> Option<(EntityId, Vec2)> {
        let entity = arena.get(target)?;
        if !entity.transform.is_uncontained() || !Self::can_be_affected(arena, target) {
            return None;
        }
        let body = entity.components.body.as_ref()?;
        let displacement = arena.world_position(target)? - job.center;
        let distance2 = displacement.length_squared();
        if !in_range(distance2, job.min_range, job.max_range) {
            return None;
        }
        Some((target, job.matrix * displacement * (body.mass / distance2)))
    }

    // -------------------------------------------------------------------------
    // Pulses
    // -------------------------------------------------------------------------

    /// Applies a one-shot impulse to everything gravity can move around
    /// `epicenter`, using a pulse-form matrix. Returns how many were hit.
    pub fn grav_pulse(
        sim: &mut Simulation,
        epicenter: Vec2,
        max_range: f32,
        min_range: f32,
        matrix: Mat2,
        ignore: &[EntityId],
    ) -> usize {
        if max_range < 0.0 {
            return 0;
        }
        let impulses: Vec<(EntityId, Vec2)> = sim
            .arena()
            .query_radius(epicenter, max_range)
            .into_iter()
            .filter(|id| !ignore.contains(id) && Self::can_be_affected(sim.arena(), *id))
            .filter_map(|id| {
                let body: &PhysicsBody = sim.arena().get(id)?.components.body.as_ref()?;
                let displacement = epicenter - sim.arena().world_position(id)?;
                let distance2 = displacement.length_squared();
                in_range(distance2, min_range, max_range)
                    .then(|| (id, matrix * displacement * (body.mass / distance2)))
            })
            .collect();

        for (id, impulse) in &impulses {
            if let Some(body) = sim
                .arena_mut()
                .components_mut(*id)
                .and_then(|c| c.body.as_mut())
            {
                PhysicsEngine::apply_impulse(body, *impulse);
            }
        }
        impulses.len()
    }

    /// [`GravityWellEngine::grav_pulse`] with radial and tangential delta-V.
    pub fn grav_pulse_radial(
        sim: &mut Simulation,
        epicenter: Vec2,
        max_range: f32,
        min_range: f32,
        radial_delta_v: f32,
        tangential_delta_v: f32,
    ) -> usize {
        Self::grav_pulse(
            sim,
            epicenter,
            max_range,
            min_range,
            pulse_matrix(radial_delta_v, tangential_delta_v),
            &[],
        )
    }
}
