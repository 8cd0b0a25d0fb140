//! Event horizon consumption.
//!
//! An event horizon deletes whatever it touches: entities in range, entities
//! it collides with, tiles under it, and the containers it is trapped in.
//! Every consumption is preceded by a cancellable
//! [`Event::AttemptConsumeEntity`] aimed at the morsel, so immunity lives in
//! subscribers rather than in this engine.
//!
//! Consumption is split into small operations that nest:
//!
//! - `consume_everything_in_range` runs `consume_entities_in_range` and
//!   `consume_tiles_in_range`
//! - `attempt_consume_entity` runs `can_consume_entity` then `consume_entity`
//! - consuming an entity that owns containers runs
//!   `consume_entities_in_container` on each of them, ejecting the survivors
//!
//! Nothing here returns an error. Missing components make an operation a
//! no-op, and vetoes come back as `false`.

use std::time::Duration;

use glam::IVec2;
use tracing::{debug, warn};

use crate::audit::{LogImpact, LogType};
use crate::bus::{SubscriberDeclaration, Subscription};
use crate::entity::{
    ComponentKind, ContainerRef, EntityId, EntityTag, EventHorizon, Markers, Tile,
};
use crate::event::{Event, EventKind};
use crate::simulation::Simulation;

/// Most containers walked outward when ejecting immune contents.
pub const MAX_CONTAINER_DUMP_DEPTH: usize = 100;

fn horizon(sim: &Simulation, id: EntityId) -> Option<&EventHorizon> {
    sim.arena().get(id)?.components.event_horizon.as_ref()
}

fn horizon_mut(sim: &mut Simulation, id: EntityId) -> Option<&mut EventHorizon> {
    sim.arena_mut().components_mut(id)?.event_horizon.as_mut()
}

/// Stateless consumption operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumptionEngine;

impl ConsumptionEngine {
    // -------------------------------------------------------------------------
    // Waves
    // -------------------------------------------------------------------------

    /// Runs a wave for every event horizon that is due.
    pub fn update_all(sim: &mut Simulation) {
        let now = sim.time();
        for hungry in sim.arena().ids_with(ComponentKind::EventHorizon) {
            let due = sim.arena().exists(hungry)
                && horizon(sim, hungry).is_some_and(|h| h.next_consume_wave_time <= now);
            if due {
                Self::update(sim, hungry);
            }
        }
    }

    /// Runs one consume wave.
    ///
    /// The next wave is scheduled one period after the previously scheduled
    /// one; if that is already in the past it is scheduled one period from
    /// now, so missed waves never pile up.
    ///
    /// A contained horizon tries to eat its container. If that fails it eats
    /// its fellow contents and stops there; otherwise the wave carries on
    /// from wherever the horizon was dropped. The wave eats everything within
    /// the radius.
    pub fn update(sim: &mut Simulation, hungry: EntityId) {
        let now = sim.time();
        let Some(h) = horizon_mut(sim, hungry) else {
            return;
        };
        h.last_consume_wave_time = now;
        h.next_consume_wave_time += h.target_consume_period;
        if h.next_consume_wave_time <= now {
            h.next_consume_wave_time = now + h.target_consume_period;
        }
        if h.being_consumed_by_another {
            return;
        }
        let radius = h.radius;

        if let Some(container) = sim.arena().containing_container(hungry) {
            if !Self::attempt_consume_entity(sim, hungry, container.owner, None) {
                Self::consume_entities_in_container(sim, hungry, &container, Some(&container));
                return;
            }
        }

        if radius > 0.0 {
            debug!(hungry = %hungry, radius, "consume wave");
            Self::consume_everything_in_range(sim, hungry, radius);
        }
    }

    /// Changes the wave period, moving the next wave by the difference.
    ///
    /// A wave that becomes due runs immediately.
    pub fn set_consume_period(sim: &mut Simulation, hungry: EntityId, period: Duration) {
        let now = sim.time();
        let Some(h) = horizon_mut(sim, hungry) else {
            return;
        };
        if h.target_consume_period == period {
            return;
        }
        let old = std::mem::replace(&mut h.target_consume_period, period);
        h.next_consume_wave_time = h.next_consume_wave_time.saturating_sub(old) + period;
        if h.next_consume_wave_time <= now {
            Self::update(sim, hungry);
        }
    }

    /// Sets the area consumption radius.
    pub fn set_radius(sim: &mut Simulation, hungry: EntityId, radius: f32) {
        if let Some(h) = horizon_mut(sim, hungry) {
            h.radius = radius;
        }
    }

    /// Sets whether containment may be breached.
    pub fn set_can_breach_containment(sim: &mut Simulation, hungry: EntityId, can_breach: bool) {
        if let Some(h) = horizon_mut(sim, hungry) {
            h.can_breach_containment = can_breach;
        }
    }

    /// Consumes entities, then tiles, within `range`, as enabled on the horizon.
    pub fn consume_everything_in_range(sim: &mut Simulation, hungry: EntityId, range: f32) {
        let Some(h) = horizon(sim, hungry) else {
            return;
        };
        let (entities, tiles) = (h.consume_entities, h.consume_tiles);
        if entities {
            Self::consume_entities_in_range(sim, hungry, range);
        }
        if tiles {
            Self::consume_tiles_in_range(sim, hungry, range);
        }
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Destroys `morsel` and announces it to both sides.
    ///
    /// Assumes [`ConsumptionEngine::can_consume_entity`] already passed.
    pub fn consume_entity(
        sim: &mut Simulation,
        hungry: EntityId,
        morsel: EntityId,
        outer: Option<&ContainerRef>,
    ) {
        let Some(entity) = sim.arena().get(morsel) else {
            return;
        };
        let tag = entity.tag();
        let notable = entity
            .markers
            .intersects(Markers::MIND_BEARING | Markers::HIGH_RISK_ITEM)
            || entity.has(ComponentKind::FieldGenerator);

        if notable && !sim.arena().is_queued_for_deletion(morsel) {
            sim.record_audit(
                LogType::EntityDelete,
                LogImpact::High,
                format!("{tag} {morsel} entered the event horizon of {hungry} and was deleted"),
            );
        } else {
            debug!(hungry = %hungry, morsel = %morsel, %tag, "consumed");
        }

        sim.queue_delete(morsel);
        sim.raise(Event::EntityConsumedByEventHorizon {
            hungry,
            morsel,
            outer_container: outer.cloned(),
        });
        sim.raise(Event::EventHorizonConsumedEntity {
            morsel,
            hungry,
            outer_container: outer.cloned(),
        });
    }

    /// Consumes `morsel` if nothing vetoes it. Returns true on success.
    pub fn attempt_consume_entity(
        sim: &mut Simulation,
        hungry: EntityId,
        morsel: EntityId,
        outer: Option<&ContainerRef>,
    ) -> bool {
        if !Self::can_consume_entity(sim, hungry, morsel) {
            return false;
        }
        Self::consume_entity(sim, hungry, morsel, outer);
        true
    }

    /// Asks the morsel's subscribers whether it may be consumed.
    ///
    /// Always false when the horizon is itself being consumed, or either
    /// side is gone or already queued for deletion.
    pub fn can_consume_entity(sim: &mut Simulation, hungry: EntityId, morsel: EntityId) -> bool {
        let Some(h) = horizon(sim, hungry) else {
            return false;
        };
        if h.being_consumed_by_another
            || !sim.arena().exists(hungry)
            || !sim.arena().exists(morsel)
        {
            return false;
        }
        !sim.raise(Event::attempt_consume(morsel, hungry)).is_cancelled()
    }

    /// Consumes uncontained entities within `range` of the horizon.
    ///
    /// When the horizon has a body, only entities whose bodies it would hit
    /// are eaten. Entities without a body are always candidates.
    pub fn consume_entities_in_range(sim: &mut Simulation, hungry: EntityId, range: f32) {
        let Some(center) = sim.arena().world_position(hungry) else {
            return;
        };
        let hungry_body = sim
            .arena()
            .get(hungry)
            .and_then(|e| e.components.body.clone());

        for morsel in sim.arena().query_radius(center, range) {
            if morsel == hungry || !sim.arena().exists(morsel) {
                continue;
            }
            if let (Some(ours), Some(theirs)) = (
                hungry_body.as_ref(),
                sim.arena().get(morsel).and_then(|e| e.components.body.as_ref()),
            ) {
                if !ours.hard_collides_with(theirs) {
                    continue;
                }
            }
            Self::attempt_consume_entity(sim, hungry, morsel, None);
        }
    }

    /// Consumes the contents of a container.
    ///
    /// Contents that cannot be consumed are immune. After the pass they are
    /// moved into the innermost container at or above `outer` that accepts
    /// them, or dropped onto the grid or map. Immune contents already inside
    /// their target stay where they are.
    pub fn consume_entities_in_container(
        sim: &mut Simulation,
        hungry: EntityId,
        container: &ContainerRef,
        outer: Option<&ContainerRef>,
    ) {
        let mut immune = Vec::new();
        for entity in sim.arena().container_contents(container) {
            if sim.arena().is_queued_for_deletion(entity) {
                continue;
            }
            if entity == hungry || !Self::attempt_consume_entity(sim, hungry, entity, outer) {
                immune.push(entity);
            }
        }

        for entity in immune {
            Self::eject(sim, entity, outer);
        }
    }

    /// Moves an immune entity outward starting at `outer`.
    fn eject(sim: &mut Simulation, entity: EntityId, outer: Option<&ContainerRef>) {
        let mut target = outer.cloned();
        let mut depth = 0;
        while let Some(container) = target {
            if sim.arena().containing_container(entity).as_ref() == Some(&container) {
                return;
            }
            if sim.try_insert(entity, &container) {
                return;
            }
            depth += 1;
            if depth >= MAX_CONTAINER_DUMP_DEPTH {
                warn!(entity = %entity, "container ejection gave up; dropping to map");
                break;
            }
            target = sim.arena().containing_container(container.owner);
        }
        sim.attach_to_grid_or_map(entity);
    }

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------

    /// Empties one tile after announcing it.
    pub fn consume_tile(sim: &mut Simulation, hungry: EntityId, grid: EntityId, index: IVec2) {
        Self::consume_tiles(sim, hungry, grid, &[index]);
    }

    /// Announces then empties a batch of tiles in a single grid edit.
    pub fn consume_tiles(sim: &mut Simulation, hungry: EntityId, grid: EntityId, tiles: &[IVec2]) {
        if tiles.is_empty() {
            return;
        }
        sim.raise(Event::TilesConsumedByEventHorizon {
            hungry,
            grid,
            tiles: tiles.to_vec(),
        });
        let edits: Vec<(IVec2, Tile)> = tiles.iter().map(|index| (*index, Tile::EMPTY)).collect();
        sim.set_tiles(grid, &edits);
        debug!(hungry = %hungry, grid = %grid, count = tiles.len(), "consumed tiles");
    }

    /// Returns true if every entity anchored to the tile may be consumed.
    pub fn can_consume_tile(
        sim: &mut Simulation,
        hungry: EntityId,
        grid: EntityId,
        index: IVec2,
    ) -> bool {
        sim.arena()
            .anchored_entities(grid, index)
            .into_iter()
            .all(|blocker| Self::can_consume_entity(sim, hungry, blocker))
    }

    /// Consumes the candidate tiles that pass [`ConsumptionEngine::can_consume_tile`].
    ///
    /// Returns how many were consumed.
    pub fn attempt_consume_tiles(
        sim: &mut Simulation,
        hungry: EntityId,
        grid: EntityId,
        candidates: &[(IVec2, Tile)],
    ) -> usize {
        let accepted: Vec<IVec2> = candidates
            .iter()
            .filter(|(_, tile)| !tile.is_empty())
            .map(|(index, _)| *index)
            .filter(|index| Self::can_consume_tile(sim, hungry, grid, *index))
            .collect();
        Self::consume_tiles(sim, hungry, grid, &accepted);
        accepted.len()
    }

    /// Consumes tiles of every grid that touches the circle of `range`.
    pub fn consume_tiles_in_range(sim: &mut Simulation, hungry: EntityId, range: f32) {
        let Some(center) = sim.arena().world_position(hungry) else {
            return;
        };
        for grid in sim.arena().grids_intersecting_circle(center, range) {
            let tiles = sim.arena().tiles_intersecting_circle(grid, center, range);
            Self::attempt_consume_tiles(sim, hungry, grid, &tiles);
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Bus subscriptions for immunity, collisions and containers.
    #[must_use]
    pub fn subscriptions() -> Vec<Subscription> {
        vec![
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.tag_immunity",
                    EventKind::AttemptConsumeEntity,
                    &[],
                )
                .for_tags(&[
                    EntityTag::Map,
                    EntityTag::Grid,
                    EntityTag::Station,
                    EntityTag::Ghost,
                ]),
                veto_immune_tag,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.protect_horizon",
                    EventKind::AttemptConsumeEntity,
                    &[ComponentKind::EventHorizon],
                ),
                protect_horizon,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.mark_consumed",
                    EventKind::EventHorizonConsumedEntity,
                    &[ComponentKind::EventHorizon],
                ),
                mark_consumed,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.container_cascade",
                    EventKind::EventHorizonConsumedEntity,
                    &[ComponentKind::ContainerManager],
                ),
                consume_owned_containers,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.start_collide",
                    EventKind::StartCollide,
                    &[ComponentKind::EventHorizon],
                ),
                consume_on_collide,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.inserted",
                    EventKind::EntInsertedIntoContainer,
                    &[ComponentKind::EventHorizon],
                ),
                defer_contained,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "event_horizon.contained",
                    EventKind::EventHorizonContained,
                    &[ComponentKind::EventHorizon],
                ),
                escape_container,
            ),
        ]
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn veto_immune_tag(_sim: &mut Simulation, event: &mut Event) {
    event.cancel();
}

/// Horizons never eat themselves, and one already being eaten is spoken for.
fn protect_horizon(sim: &mut Simulation, event: &mut Event) {
    let Event::AttemptConsumeEntity { morsel, hungry, .. } = *event else {
        return;
    };
    let spoken_for = horizon(sim, morsel).is_some_and(|h| h.being_consumed_by_another);
    if morsel == hungry || spoken_for {
        event.cancel();
    }
}

fn mark_consumed(sim: &mut Simulation, event: &mut Event) {
    if let Some(h) = horizon_mut(sim, event.target()) {
        h.being_consumed_by_another = true;
    }
}

fn consume_owned_containers(sim: &mut Simulation, event: &mut Event) {
    let Event::EventHorizonConsumedEntity {
        morsel,
        hungry,
        outer_container,
    } = event.clone()
    else {
        return;
    };
    let drop = outer_container.or_else(|| sim.arena().containing_container(morsel));
    for container in sim.arena().owned_containers(morsel) {
        ConsumptionEngine::consume_entities_in_container(sim, hungry, &container, drop.as_ref());
    }
}

fn consume_on_collide(sim: &mut Simulation, event: &mut Event) {
    let Event::StartCollide { ours, other } = *event else {
        return;
    };
    if horizon(sim, ours).is_some_and(|h| h.being_consumed_by_another) {
        return;
    }
    ConsumptionEngine::attempt_consume_entity(sim, ours, other, None);
}

fn defer_contained(sim: &mut Simulation, event: &mut Event) {
    if let Event::EntInsertedIntoContainer { entity, container } = event.clone() {
        sim.queue_event(Event::EventHorizonContained { entity, container });
    }
}

/// Eat the container we were stuffed into, or failing that, its other contents.
fn escape_container(sim: &mut Simulation, event: &mut Event) {
    let Event::EventHorizonContained { entity, container } = event.clone() else {
        return;
    };
    let free = horizon(sim, entity).is_some_and(|h| !h.being_consumed_by_another);
    if !free || !sim.arena().exists(entity) {
        return;
    }
    if !ConsumptionEngine::attempt_consume_entity(sim, entity, container.owner, None) {
        ConsumptionEngine::consume_entities_in_container(sim, entity, &container, Some(&container));
    }
}
