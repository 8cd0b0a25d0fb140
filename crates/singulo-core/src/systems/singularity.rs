//! Singularity energy and level state machine.
//!
//! Energy comes from whatever the singularity's event horizon eats and
//! drains away over time. The level is a pure function of energy:
//!
//! | energy  | level | drain/s |
//! |---------|-------|---------|
//! | < 200   | 1     | 1       |
//! | ≥ 200   | 2     | 2       |
//! | ≥ 300   | 3     | 5       |
//! | ≥ 600   | 4     | 10      |
//! | ≥ 1000  | 5     | 15      |
//! | ≥ 1500  | 6     | 20      |
//!
//! A level change raises [`Event::SingularityLevelChanged`]. Subscribers on
//! that event resize the gravity well and event horizon, float the body,
//! retune random walk, radiation and distortion, and pick the new drain rate.

use std::time::Duration;

use glam::Vec2;
use tracing::info;

use crate::bus::{Handler, SubscriberDeclaration, Subscription};
use crate::entity::{
    continuous_matrix, BodyStatus, ComponentKind, EntityId, Singularity, SingularityDistortion,
};
use crate::event::{Event, EventKind};
use crate::presentation::{
    AudioCue, SINGULARITY_AMBIENT, SINGULARITY_DISSIPATION, SINGULARITY_FORMATION,
};
use crate::simulation::Simulation;

/// Lowest level.
pub const MIN_SINGULARITY_LEVEL: u8 = 1;
/// Highest level.
pub const MAX_SINGULARITY_LEVEL: u8 = 6;

/// Energy thresholds, highest first.
const LEVEL_THRESHOLDS: [(f32, u8); 5] = [(1500.0, 6), (1000.0, 5), (600.0, 4), (300.0, 3), (200.0, 2)];

/// Exponent applied to distortion values while the singularity is contained.
pub const DISTORTION_CONTAINER_SCALING: f32 = 4.0;

/// Level for an energy value.
///
/// # Example
///
/// ```
/// use singulo_core::systems::singularity::level_for_energy;
///
/// assert_eq!(level_for_energy(199.9), 1);
/// assert_eq!(level_for_energy(200.0), 2);
/// assert_eq!(level_for_energy(1e9), 6);
/// ```
#[must_use]
pub fn level_for_energy(energy: f32) -> u8 {
    LEVEL_THRESHOLDS
        .iter()
        .find(|(threshold, _)| energy >= *threshold)
        .map_or(MIN_SINGULARITY_LEVEL, |(_, level)| *level)
}

/// Energy drained per second at a level.
#[must_use]
pub fn drain_for_level(level: u8) -> f32 {
    match level {
        0 | 1 => 1.0,
        2 => 2.0,
        3 => 5.0,
        4 => 10.0,
        5 => 15.0,
        _ => 20.0,
    }
}

/// Uncontained distortion at a level.
#[must_use]
pub fn distortion_for_level(level: u8) -> SingularityDistortion {
    let (intensity, falloff_squared) = match level {
        0 | 1 => (3645.0, 6.4),
        2 => (103_680.0, 7.0),
        3 => (1_113_920.0, 8.0),
        4 => (16_200_000.0, 10.0),
        _ => (180_000_000.0, 12.0),
    };
    SingularityDistortion {
        intensity,
        falloff_power: f32::sqrt(falloff_squared),
    }
}

/// Scales a distortion value by `|x|^exponent`, keeping its sign, when `|x| > 1`.
fn rescale(value: f32, exponent: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude > 1.0 {
        value * magnitude.powf(exponent)
    } else {
        value
    }
}

fn singularity(sim: &Simulation, id: EntityId) -> Option<&Singularity> {
    sim.arena().get(id)?.components.singularity.as_ref()
}

fn singularity_mut(sim: &mut Simulation, id: EntityId) -> Option<&mut Singularity> {
    sim.arena_mut().components_mut(id)?.singularity.as_mut()
}

/// Stateless singularity operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingularityEngine;

impl SingularityEngine {
    /// Drains energy from every singularity whose update period has elapsed.
    ///
    /// The drain covers all time accumulated since the last drain. Energy
    /// never drops below zero.
    pub fn update(sim: &mut Simulation, frame: Duration) {
        for id in sim.arena().ids_with(ComponentKind::Singularity) {
            let Some(s) = singularity_mut(sim, id) else {
                continue;
            };
            s.time_since_last_update += frame;
            if s.time_since_last_update < s.update_period {
                continue;
            }
            let elapsed = std::mem::take(&mut s.time_since_last_update);
            let energy = (s.energy - s.energy_drain * elapsed.as_secs_f32()).max(0.0);
            Self::set_energy(sim, id, energy);
        }
    }

    /// Sets energy and re-derives the level. No-op if unchanged.
    #[allow(clippy::float_cmp)]
    pub fn set_energy(sim: &mut Simulation, id: EntityId, energy: f32) {
        let Some(s) = singularity_mut(sim, id) else {
            return;
        };
        if s.energy == energy {
            return;
        }
        s.energy = energy;
        Self::set_level(sim, id, level_for_energy(energy));
    }

    /// Adds `delta` to the energy.
    pub fn adjust_energy(sim: &mut Simulation, id: EntityId, delta: f32) {
        if let Some(energy) = singularity(sim, id).map(|s| s.energy) {
            Self::set_energy(sim, id, energy + delta);
        }
    }

    /// Sets the level directly, clamped to `[1, 6]`, raising the change.
    pub fn set_level(sim: &mut Simulation, id: EntityId, level: u8) {
        let level = level.clamp(MIN_SINGULARITY_LEVEL, MAX_SINGULARITY_LEVEL);
        let Some(s) = singularity_mut(sim, id) else {
            return;
        };
        let old_level = s.level;
        if old_level == level {
            return;
        }
        s.level = level;
        info!(singularity = %id, old_level, new_level = level, "singularity level changed");
        sim.raise(Event::SingularityLevelChanged {
            singularity: id,
            new_level: level,
            old_level,
        });
    }

    /// Sets radiation per level and updates the emitter.
    pub fn set_rads_per_level(sim: &mut Simulation, id: EntityId, rads: f32) {
        let Some(s) = singularity_mut(sim, id) else {
            return;
        };
        s.rads_per_level = rads;
        let intensity = f32::from(s.level) * rads;
        if let Some(radiation) = sim
            .arena_mut()
            .components_mut(id)
            .and_then(|c| c.radiation.as_mut())
        {
            radiation.intensity = intensity;
        }
    }

    /// Bus subscriptions for energy intake, level fan-out and lifecycle.
    #[must_use]
    pub fn subscriptions() -> Vec<Subscription> {
        use ComponentKind as C;
        use EventKind as E;

        fn on(id: &str, kind: EventKind, requires: &[ComponentKind], handler: Handler) -> Subscription {
            Subscription::new(SubscriberDeclaration::on(id, kind, requires), handler)
        }

        vec![
            on("singularity.startup", E::ComponentStartup, &[C::Singularity], on_startup),
            on("singularity.shutdown", E::ComponentShutdown, &[C::Singularity], on_shutdown),
            on("singularity.eat_entity", E::EntityConsumedByEventHorizon, &[C::Singularity], eat_entity),
            on("singularity.eat_tiles", E::TilesConsumedByEventHorizon, &[C::Singularity], eat_tiles),
            on("singularity.eaten_food", E::EventHorizonConsumedEntity, &[C::SingularityFood], eaten_food),
            on("singularity.eaten_singularity", E::EventHorizonConsumedEntity, &[C::Singularity], eaten_singularity),
            on("singularity.drain", E::SingularityLevelChanged, &[C::Singularity], update_drain),
            on("singularity.gravity", E::SingularityLevelChanged, &[C::Singularity, C::GravityWell], update_gravity),
            on("singularity.horizon", E::SingularityLevelChanged, &[C::Singularity, C::EventHorizon], update_horizon),
            on("singularity.body", E::SingularityLevelChanged, &[C::Singularity, C::Physics], update_body),
            on("singularity.random_walk", E::SingularityLevelChanged, &[C::Singularity, C::RandomWalk], update_random_walk),
            on("singularity.radiation", E::SingularityLevelChanged, &[C::Singularity, C::Radiation], update_radiation),
            on("singularity.distortion", E::SingularityLevelChanged, &[C::Distortion], update_distortion),
            on("singularity.distortion_contained", E::EntInsertedIntoContainer, &[C::Distortion], shrink_distortion),
            on("singularity.distortion_released", E::EntRemovedFromContainer, &[C::Distortion], grow_distortion),
        ]
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

fn on_startup(sim: &mut Simulation, event: &mut Event) {
    let Event::ComponentStartup { entity, fresh } = *event else {
        return;
    };
    sim.play(AudioCue::PlayLoop {
        entity,
        sound: SINGULARITY_AMBIENT.to_string(),
    });
    if fresh {
        sim.play(AudioCue::PlayOnce {
            entity,
            sound: SINGULARITY_FORMATION.to_string(),
        });
    }
    let Some(s) = singularity_mut(sim, entity) else {
        return;
    };
    let level = level_for_energy(s.energy);
    s.level = level;
    sim.raise(Event::SingularityLevelChanged {
        singularity: entity,
        new_level: level,
        old_level: level,
    });
}

fn on_shutdown(sim: &mut Simulation, event: &mut Event) {
    let Event::ComponentShutdown { entity, genuine } = *event else {
        return;
    };
    if genuine {
        sim.play(AudioCue::PlayOnce {
            entity,
            sound: SINGULARITY_DISSIPATION.to_string(),
        });
    }
    sim.play(AudioCue::Stop {
        entity,
        sound: SINGULARITY_AMBIENT.to_string(),
    });
}

// =============================================================================
// Energy intake
// =============================================================================

/// Base energy for plain morsels. Food and singularities pay out through
/// their own handlers instead.
fn eat_entity(sim: &mut Simulation, event: &mut Event) {
    let Event::EntityConsumedByEventHorizon { hungry, morsel, .. } = *event else {
        return;
    };
    let special = sim.arena().get(morsel).is_some_and(|m| {
        m.has(ComponentKind::SingularityFood) || m.has(ComponentKind::Singularity)
    });
    if !special {
        let energy = sim.config().singularity.base_entity_energy;
        SingularityEngine::adjust_energy(sim, hungry, energy);
    }
}

fn eat_tiles(sim: &mut Simulation, event: &mut Event) {
    let Event::TilesConsumedByEventHorizon { hungry, ref tiles, .. } = *event else {
        return;
    };
    #[allow(clippy::cast_precision_loss)]
    let energy = tiles.len() as f32 * sim.config().singularity.base_tile_energy;
    SingularityEngine::adjust_energy(sim, hungry, energy);
}

fn eaten_food(sim: &mut Simulation, event: &mut Event) {
    let Event::EventHorizonConsumedEntity { morsel, hungry, .. } = *event else {
        return;
    };
    let Some(energy) = sim
        .arena()
        .get(morsel)
        .and_then(|e| e.components.food.as_ref())
        .map(|f| f.energy)
    else {
        return;
    };
    SingularityEngine::adjust_energy(sim, hungry, energy);
}

/// Full transfer; the eaten singularity is left empty.
fn eaten_singularity(sim: &mut Simulation, event: &mut Event) {
    let Event::EventHorizonConsumedEntity { morsel, hungry, .. } = *event else {
        return;
    };
    if singularity(sim, hungry).is_none() {
        return;
    }
    let Some(energy) = singularity(sim, morsel).map(|s| s.energy) else {
        return;
    };
    SingularityEngine::adjust_energy(sim, hungry, energy);
    SingularityEngine::set_energy(sim, morsel, 0.0);
}

// =============================================================================
// Level fan-out
// =============================================================================

fn levels(event: &Event) -> Option<(EntityId, u8, u8)> {
    match *event {
        Event::SingularityLevelChanged {
            singularity,
            new_level,
            old_level,
        } => Some((singularity, new_level, old_level)),
        _ => None,
    }
}

fn update_drain(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, _)) = levels(event) else {
        return;
    };
    if let Some(s) = singularity_mut(sim, id) {
        s.energy_drain = drain_for_level(level);
    }
}

fn update_gravity(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, _)) = levels(event) else {
        return;
    };
    let tuning = &sim.config().singularity;
    let level = f32::from(level);
    let max_range = tuning.gravity_range_per_level * (level + 1.0);
    let radial = tuning.gravity_acceleration_per_level * level;
    if let Some(well) = sim
        .arena_mut()
        .components_mut(id)
        .and_then(|c| c.gravity_well.as_mut())
    {
        well.max_range = max_range;
        well.base_radial_acceleration = radial;
        well.base_tangential_acceleration = 0.0;
        well.acceleration_matrix = continuous_matrix(radial, 0.0);
    }
}

fn update_horizon(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, _)) = levels(event) else {
        return;
    };
    let can_breach = level >= sim.config().singularity.breach_level;
    if let Some(horizon) = sim
        .arena_mut()
        .components_mut(id)
        .and_then(|c| c.event_horizon.as_mut())
    {
        horizon.radius = f32::from(level) - 0.5;
        horizon.can_breach_containment = can_breach;
    }
}

fn update_body(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, old_level)) = levels(event) else {
        return;
    };
    if let Some(body) = sim
        .arena_mut()
        .components_mut(id)
        .and_then(|c| c.body.as_mut())
    {
        body.status = if level > 1 {
            BodyStatus::InAir
        } else {
            BodyStatus::OnGround
        };
        if level <= 1 && old_level > 1 {
            body.linear_velocity = Vec2::ZERO;
        }
    }
}

fn update_random_walk(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, _)) = levels(event) else {
        return;
    };
    let scale = f32::from(level.max(4));
    if let Some(walk) = sim
        .arena_mut()
        .components_mut(id)
        .and_then(|c| c.random_walk.as_mut())
    {
        walk.min_speed = 7.5 / scale;
        walk.max_speed = 10.0 / scale;
    }
}

fn update_radiation(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, _)) = levels(event) else {
        return;
    };
    let Some(rads) = singularity(sim, id).map(|s| s.rads_per_level) else {
        return;
    };
    if let Some(radiation) = sim
        .arena_mut()
        .components_mut(id)
        .and_then(|c| c.radiation.as_mut())
    {
        radiation.intensity = f32::from(level) * rads;
    }
}

fn update_distortion(sim: &mut Simulation, event: &mut Event) {
    let Some((id, level, _)) = levels(event) else {
        return;
    };
    let contained = sim.arena().containing_container(id).is_some();
    let mut distortion = distortion_for_level(level);
    if contained {
        let exponent = 1.0 / DISTORTION_CONTAINER_SCALING - 1.0;
        distortion.intensity = rescale(distortion.intensity, exponent);
        distortion.falloff_power = rescale(distortion.falloff_power, exponent);
    }
    if let Some(slot) = sim.arena_mut().components_mut(id) {
        slot.distortion = Some(distortion);
    }
}

fn scale_distortion(sim: &mut Simulation, id: EntityId, exponent: f32) {
    if let Some(d) = sim
        .arena_mut()
        .components_mut(id)
        .and_then(|c| c.distortion.as_mut())
    {
        d.intensity = rescale(d.intensity, exponent);
        d.falloff_power = rescale(d.falloff_power, exponent);
    }
}

fn shrink_distortion(sim: &mut Simulation, event: &mut Event) {
    scale_distortion(sim, event.target(), 1.0 / DISTORTION_CONTAINER_SCALING - 1.0);
}

fn grow_distortion(sim: &mut Simulation, event: &mut Event) {
    scale_distortion(sim, event.target(), DISTORTION_CONTAINER_SCALING - 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ContainerRef, EntityComponents, EntityTag, TransformState};
    use crate::tests::helpers::{spawn_locker, spawn_singularity};

    fn state(sim: &Simulation, id: EntityId) -> Singularity {
        singularity(sim, id).cloned().unwrap()
    }

    mod table_tests {
        use super::*;

        #[test]
        fn thresholds_are_exact() {
            for (energy, level) in [
                (0.0, 1),
                (199.0, 1),
                (200.0, 2),
                (299.0, 2),
                (300.0, 3),
                (600.0, 4),
                (999.0, 4),
                (1000.0, 5),
                (1500.0, 6),
            ] {
                assert_eq!(level_for_energy(energy), level, "energy {energy}");
            }
        }

        #[test]
        fn drain_rises_with_level() {
            let drains: Vec<f32> = (1..=6).map(drain_for_level).collect();
            assert_eq!(drains, vec![1.0, 2.0, 5.0, 10.0, 15.0, 20.0]);
        }

        #[test]
        fn containment_scaling_round_trips() {
            let x = 3645.0_f32;
            let contained = rescale(x, 1.0 / DISTORTION_CONTAINER_SCALING - 1.0);
            assert!((contained - x.powf(0.25)).abs() < 1e-3);
            let released = rescale(contained, DISTORTION_CONTAINER_SCALING - 1.0);
            assert!((released - x).abs() / x < 1e-4);
            assert!((rescale(0.5, 3.0) - 0.5).abs() < f32::EPSILON);
        }
    }

    mod state_machine_tests {
        use super::*;

        #[test]
        fn startup_syncs_derived_state() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 650.0);

            let st = state(&sim, s);
            assert_eq!(st.level, 4);
            assert!((st.energy_drain - 10.0).abs() < f32::EPSILON);

            let c = &sim.arena().get(s).unwrap().components;
            let horizon = c.event_horizon.as_ref().unwrap();
            assert!((horizon.radius - 3.5).abs() < f32::EPSILON);
            assert!(!horizon.can_breach_containment);
            let well = c.gravity_well.as_ref().unwrap();
            assert!((well.max_range - 10.0).abs() < f32::EPSILON);
            assert!((well.base_radial_acceleration - 40.0).abs() < f32::EPSILON);
            assert_eq!(c.body.as_ref().unwrap().status, BodyStatus::InAir);
            assert!((c.random_walk.as_ref().unwrap().max_speed - 2.5).abs() < f32::EPSILON);
            assert!((c.radiation.as_ref().unwrap().intensity - 8.0).abs() < f32::EPSILON);
        }

        #[test]
        fn set_level_clamps_and_breaches_at_five() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 0.0);
            SingularityEngine::set_level(&mut sim, s, 9);
            assert_eq!(state(&sim, s).level, 6);
            let horizon = sim.arena().get(s).unwrap().components.event_horizon.clone().unwrap();
            assert!(horizon.can_breach_containment);

            SingularityEngine::set_level(&mut sim, s, 0);
            assert_eq!(state(&sim, s).level, 1);
        }

        #[test]
        fn dropping_to_level_one_stops_the_body() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 250.0);
            if let Some(body) = sim.arena_mut().components_mut(s).and_then(|c| c.body.as_mut()) {
                body.linear_velocity = Vec2::new(3.0, 0.0);
            }
            SingularityEngine::set_energy(&mut sim, s, 10.0);
            let body = sim.arena().get(s).unwrap().components.body.clone().unwrap();
            assert_eq!(body.linear_velocity, Vec2::ZERO);
            assert_eq!(body.status, BodyStatus::OnGround);
        }

        #[test]
        fn drain_waits_for_update_period() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 100.0);
            SingularityEngine::update(&mut sim, Duration::from_millis(400));
            assert!((state(&sim, s).energy - 100.0).abs() < f32::EPSILON);
            SingularityEngine::update(&mut sim, Duration::from_millis(600));
            assert!((state(&sim, s).energy - 99.0).abs() < 1e-4);
            assert_eq!(state(&sim, s).time_since_last_update, Duration::ZERO);
        }

        #[test]
        fn drain_stops_at_zero() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 0.5);
            SingularityEngine::update(&mut sim, Duration::from_secs(5));
            assert!(state(&sim, s).energy.abs() < f32::EPSILON);
        }

        #[test]
        fn rads_per_level_updates_emitter() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 300.0);
            SingularityEngine::set_rads_per_level(&mut sim, s, 5.0);
            let radiation = sim.arena().get(s).unwrap().components.radiation.clone().unwrap();
            assert!((radiation.intensity - 15.0).abs() < f32::EPSILON);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn fresh_spawn_plays_formation() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 0.0);
            let cues = sim.take_audio_cues();
            assert_eq!(
                cues,
                vec![
                    AudioCue::PlayLoop {
                        entity: s,
                        sound: SINGULARITY_AMBIENT.into()
                    },
                    AudioCue::PlayOnce {
                        entity: s,
                        sound: SINGULARITY_FORMATION.into()
                    },
                ]
            );
            assert!(sim.take_audio_cues().is_empty());
        }

        #[test]
        fn genuine_deletion_plays_dissipation() {
            let mut sim = Simulation::with_seed(1);
            let s = spawn_singularity(&mut sim, Vec2::ZERO, 0.0);
            sim.take_audio_cues();
            sim.queue_delete(s);
            sim.flush_deletions();
            let sounds: Vec<String> = sim.take_audio_cues().iter().map(|c| c.sound().to_string()).collect();
            assert_eq!(sounds, vec![SINGULARITY_DISSIPATION, SINGULARITY_AMBIENT]);
        }

        #[test]
        fn unloading_only_stops_ambient() {
            let mut sim = Simulation::with_seed(1);
            spawn_singularity(&mut sim, Vec2::ZERO, 0.0);
            let arena = sim.into_arena();
            let mut resumed = Simulation::from_arena(arena, crate::config::SimConfig::default());
            let sounds: Vec<String> =
                resumed.take_audio_cues().iter().map(|c| c.sound().to_string()).collect();
            assert_eq!(sounds, vec![SINGULARITY_AMBIENT]);
        }
    }

    mod distortion_tests {
        use super::*;

        #[test]
        fn containment_dims_distortion_until_release() {
            let mut sim = Simulation::with_seed(1);
            let locker = spawn_locker(&mut sim, Vec2::ZERO);
            let lens = sim.spawn(
                EntityTag::Item,
                TransformState::at(Vec2::ZERO),
                EntityComponents {
                    distortion: Some(distortion_for_level(1)),
                    ..EntityComponents::default()
                },
            );

            assert!(sim.try_insert(lens, &ContainerRef::new(locker, "storage")));
            let dimmed = sim.arena().get(lens).unwrap().components.distortion.clone().unwrap();
            assert!((dimmed.intensity - 3645.0_f32.powf(0.25)).abs() < 1e-3);

            assert!(sim.remove_from_container(lens));
            let restored = sim.arena().get(lens).unwrap().components.distortion.clone().unwrap();
            assert!((restored.intensity - 3645.0).abs() < 0.5);
        }
    }
}
