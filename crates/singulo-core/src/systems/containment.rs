//! Containment field generators and the segment chains between them.
//!
//! Generators store power from emitter bolts. Once a generator holds its
//! minimum, it searches each free cardinal direction for another static,
//! anchored generator on the same grid and, on a hit, spawns a
//! [`ContainmentFieldLink`] owning a chain of field segments between the
//! pair. Power decays over time; dropping below the minimum, being
//! unanchored, or being deleted tears every connection down.
//!
//! Hard segments and connected generators veto consumption by any event
//! horizon that cannot breach containment.

use tracing::{debug, info};

use crate::audit::{LogImpact, LogType};
use crate::bus::{SubscriberDeclaration, Subscription};
use crate::entity::{
    BodyType, CollisionLayer, ComponentKind, ContainmentFieldGenerator, ContainmentFieldLink,
    Direction, EntityComponents, EntityId, EntityTag, FieldConnection, Markers, Parent,
    PhysicsBody, TransformState,
};
use crate::event::{Event, EventKind};
use crate::simulation::Simulation;

/// Radius of one field segment body.
pub const FIELD_SEGMENT_RADIUS: f32 = 0.5;

fn generator(sim: &Simulation, id: EntityId) -> Option<&ContainmentFieldGenerator> {
    sim.arena().get(id)?.components.generator.as_ref()
}

fn generator_mut(sim: &mut Simulation, id: EntityId) -> Option<&mut ContainmentFieldGenerator> {
    sim.arena_mut().components_mut(id)?.generator.as_mut()
}

fn link_mut(sim: &mut Simulation, id: EntityId) -> Option<&mut ContainmentFieldLink> {
    sim.arena_mut().components_mut(id)?.field_link.as_mut()
}

fn can_breach(sim: &Simulation, hungry: EntityId) -> bool {
    sim.arena()
        .get(hungry)
        .and_then(|e| e.components.event_horizon.as_ref())
        .is_some_and(|h| h.can_breach_containment)
}

/// Stateless containment field operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainmentFieldEngine;

impl ContainmentFieldEngine {
    // -------------------------------------------------------------------------
    // Segment chains
    // -------------------------------------------------------------------------

    /// Rebuilds a link's chain between two generators.
    ///
    /// Existing segments are deleted first. The chain is only spawned when
    /// both generators are given.
    pub fn populate_generators(
        sim: &mut Simulation,
        link: EntityId,
        generator1: Option<EntityId>,
        generator2: Option<EntityId>,
    ) {
        Self::delete_fields(sim, link);
        let Some(record) = link_mut(sim, link) else {
            return;
        };
        record.generator1 = generator1;
        record.generator2 = generator2;
        if generator1.is_some() && generator2.is_some() {
            Self::on_connect(sim, link);
        }
    }

    /// Spawns segments at unit steps from `generator1` toward `generator2`.
    ///
    /// Steps stop strictly short of the full distance. Segments are attached
    /// to `generator1`, so they move and die with it.
    pub fn on_connect(sim: &mut Simulation, link: EntityId) {
        let Some((Some(gen1), Some(gen2))) = sim
            .arena()
            .get(link)
            .and_then(|e| e.components.field_link.as_ref())
            .map(|l| (l.generator1, l.generator2))
        else {
            return;
        };
        let (Some(from), Some(to)) = (
            sim.arena().world_position(gen1),
            sim.arena().world_position(gen2),
        ) else {
            return;
        };
        let delta = to - from;
        let distance = delta.length();
        let Some(direction) = delta.try_normalize() else {
            return;
        };

        let mut fields = Vec::new();
        let mut step = 1.0_f32;
        while step < distance {
            let segment = sim.spawn(
                EntityTag::ContainmentField,
                TransformState {
                    position: direction * step,
                    parent: Parent::Attached(gen1),
                    ..TransformState::default()
                },
                EntityComponents::default()
                    .with_containment_field(true)
                    .with_body(PhysicsBody::fixed(FIELD_SEGMENT_RADIUS).with_collision(
                        CollisionLayer::FIELD,
                        CollisionLayer::ITEM | CollisionLayer::MOB | CollisionLayer::SINGULARITY,
                    )),
            );
            fields.push(segment);
            step += 1.0;
        }
        debug!(%link, %gen1, %gen2, segments = fields.len(), "field chain spawned");
        if let Some(record) = link_mut(sim, link) {
            record.fields = fields;
        }
    }

    /// Deletes a link's segments and forgets both generators.
    pub fn delete_fields(sim: &mut Simulation, link: EntityId) {
        let Some(record) = link_mut(sim, link) else {
            return;
        };
        let fields = std::mem::take(&mut record.fields);
        record.generator1 = None;
        record.generator2 = None;
        for field in fields {
            sim.queue_delete(field);
        }
    }

    // -------------------------------------------------------------------------
    // Power
    // -------------------------------------------------------------------------

    /// Decays power on every charged generator.
    ///
    /// Each generator accumulates `dt` while its buffer is positive and loses
    /// `power_loss` every time the accumulator reaches its threshold.
    pub fn update_generators(sim: &mut Simulation, dt: f32) {
        for id in sim.arena().ids_with(ComponentKind::FieldGenerator) {
            let Some(g) = generator_mut(sim, id) else {
                continue;
            };
            if g.power_buffer <= 0 {
                continue;
            }
            g.accumulator += dt;
            if g.accumulator < g.threshold {
                continue;
            }
            g.accumulator -= g.threshold;
            let loss = g.power_loss;
            Self::lose_power(sim, id, loss);
        }
    }

    /// Adds power and, at the minimum, searches every free direction.
    pub fn receive_power(sim: &mut Simulation, id: EntityId, power: i32) {
        let Some(g) = generator_mut(sim, id) else {
            return;
        };
        g.power_buffer += power;
        if g.power_buffer < g.power_minimum {
            return;
        }
        let free: Vec<Direction> = Direction::CARDINALS
            .into_iter()
            .filter(|dir| !g.connections.contains_key(dir))
            .collect();
        for dir in free {
            Self::try_generate(sim, id, dir);
        }
    }

    /// Removes power, never below zero. Below the minimum, connections drop.
    pub fn lose_power(sim: &mut Simulation, id: EntityId, power: i32) {
        let Some(g) = generator_mut(sim, id) else {
            return;
        };
        g.power_buffer = (g.power_buffer - power).max(0);
        if g.power_buffer < g.power_minimum && !g.connections.is_empty() {
            Self::remove_connections(sim, id);
        }
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Tries to connect to the first generator found in `dir`.
    ///
    /// The ray must hit a static generator on the same grid with no
    /// connection facing back. Returns true if a link was made.
    pub fn try_generate(sim: &mut Simulation, id: EntityId, dir: Direction) -> bool {
        let Some(entity) = sim.arena().get(id) else {
            return false;
        };
        let Some(g) = entity.components.generator.as_ref() else {
            return false;
        };
        if !g.enabled || !entity.transform.anchored || g.connections.contains_key(&dir) {
            return false;
        }
        let grid = entity.transform.grid;
        let (max_length, mask) = (g.max_length, g.collision_mask);
        let Some(origin) = sim.arena().world_position(id) else {
            return false;
        };

        let Some((other, _)) = sim
            .arena()
            .ray_cast(origin, dir.to_vec(), max_length, mask, id)
        else {
            return false;
        };
        let accepts = sim.arena().get(other).is_some_and(|e| {
            let is_static = e
                .components
                .body
                .as_ref()
                .is_some_and(|b| b.body_type == BodyType::Static);
            let facing_free = e
                .components
                .generator
                .as_ref()
                .is_some_and(|og| !og.connections.contains_key(&dir.opposite()));
            is_static && facing_free && e.transform.grid == grid
        });
        if !accepts {
            return false;
        }

        let link = sim.spawn(
            EntityTag::FieldLink,
            TransformState::nullspace(),
            EntityComponents::default().with_field_link(ContainmentFieldLink::default()),
        );
        Self::populate_generators(sim, link, Some(id), Some(other));

        if let Some(g) = generator_mut(sim, id) {
            g.connections.insert(dir, FieldConnection { other, link });
            g.is_connected = true;
        }
        if let Some(og) = generator_mut(sim, other) {
            og.connections
                .insert(dir.opposite(), FieldConnection { other: id, link });
            og.is_connected = true;
        }
        info!(generator = %id, %other, ?dir, %link, "containment field connected");
        true
    }

    /// Tears down every connection of a generator, on both ends.
    pub fn remove_connections(sim: &mut Simulation, id: EntityId) {
        let Some(g) = generator_mut(sim, id) else {
            return;
        };
        let connections = std::mem::take(&mut g.connections);
        g.is_connected = false;
        if connections.is_empty() {
            return;
        }

        for (dir, connection) in &connections {
            Self::delete_fields(sim, connection.link);
            sim.queue_delete(connection.link);
            if let Some(og) = generator_mut(sim, connection.other) {
                og.connections.remove(&dir.opposite());
                if og.connections.is_empty() {
                    og.is_connected = false;
                }
            }
        }
        sim.record_audit(
            LogType::FieldGeneration,
            LogImpact::Medium,
            format!("{id} lost field connections"),
        );
    }

    /// Bus subscriptions for vetoes, power intake and teardown triggers.
    #[must_use]
    pub fn subscriptions() -> Vec<Subscription> {
        vec![
            Subscription::new(
                SubscriberDeclaration::on(
                    "containment.field_veto",
                    EventKind::AttemptConsumeEntity,
                    &[ComponentKind::ContainmentField],
                ),
                veto_hard_field,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "containment.generator_veto",
                    EventKind::AttemptConsumeEntity,
                    &[ComponentKind::FieldGenerator],
                ),
                veto_connected_generator,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "containment.emitter_hit",
                    EventKind::StartCollide,
                    &[ComponentKind::FieldGenerator],
                ),
                absorb_bolt,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "containment.unanchored",
                    EventKind::AnchorStateChanged,
                    &[ComponentKind::FieldGenerator],
                ),
                disconnect_unanchored,
            ),
            Subscription::new(
                SubscriberDeclaration::on(
                    "containment.terminating",
                    EventKind::EntityTerminating,
                    &[ComponentKind::FieldGenerator],
                ),
                disconnect_terminating,
            ),
        ]
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn veto_hard_field(sim: &mut Simulation, event: &mut Event) {
    let Event::AttemptConsumeEntity { morsel, hungry, .. } = *event else {
        return;
    };
    let hard = sim
        .arena()
        .get(morsel)
        .and_then(|e| e.components.containment_field.as_ref())
        .is_some_and(|f| f.hard);
    if hard && !can_breach(sim, hungry) {
        event.cancel();
    }
}

fn veto_connected_generator(sim: &mut Simulation, event: &mut Event) {
    let Event::AttemptConsumeEntity { morsel, hungry, .. } = *event else {
        return;
    };
    let connected = generator(sim, morsel).is_some_and(|g| g.is_connected);
    if connected && !can_breach(sim, hungry) {
        event.cancel();
    }
}

fn absorb_bolt(sim: &mut Simulation, event: &mut Event) {
    let Event::StartCollide { ours, other } = *event else {
        return;
    };
    let is_bolt = sim
        .arena()
        .get(other)
        .is_some_and(|e| e.markers.contains(Markers::EMITTER_BOLT));
    if !is_bolt {
        return;
    }
    let Some(g) = generator_mut(sim, ours) else {
        return;
    };
    g.accumulator = 0.0;
    let received = g.power_received;
    ContainmentFieldEngine::receive_power(sim, ours, received);
}

fn disconnect_unanchored(sim: &mut Simulation, event: &mut Event) {
    if let Event::AnchorStateChanged {
        entity,
        anchored: false,
    } = *event
    {
        ContainmentFieldEngine::remove_connections(sim, entity);
    }
}

fn disconnect_terminating(sim: &mut Simulation, event: &mut Event) {
    ContainmentFieldEngine::remove_connections(sim, event.target());
}
