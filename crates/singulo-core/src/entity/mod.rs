//! Entity types for the singularity simulation.
//!
//! This module provides the core entity types:
//! - [`EntityId`]: Unique identifier for entities
//! - [`EntityTag`]: Classification used by immunity rules and subscriber routing
//! - [`Markers`]: Flag set for audit-relevant properties (mind-bearing, high-risk)
//! - [`Entity`]: The complete entity container
//!
//! # Architecture
//!
//! Every entity carries a [`TransformState`] and an [`EntityComponents`] bundle of
//! optional components. Subscribers on the event bus are routed by tag and by
//! which components are present (see [`ComponentKind`]), so an entity opts into
//! behavior simply by having the component attached.
//!
//! # Example
//!
//! ```
//! use singulo_core::entity::{Entity, EntityComponents, EntityId, EntityTag, TransformState};
//! use glam::Vec2;
//!
//! let rock = Entity::new(
//!     EntityId::new(42),
//!     EntityTag::Item,
//!     TransformState::at(Vec2::new(1.0, 2.0)),
//!     EntityComponents::default(),
//! );
//!
//! assert_eq!(rock.id().as_u64(), 42);
//! assert_eq!(rock.tag(), EntityTag::Item);
//! ```

pub mod components;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use components::{
    continuous_matrix, BodyStatus, BodyType, CollisionLayer, Container, ContainerManager,
    ContainerRef, ContainmentField, ContainmentFieldGenerator, ContainmentFieldLink, Direction,
    EntityComponents, EventHorizon, FieldConnection, GravityWell, Grid, Parent, PhysicsBody,
    RadiationSource, RandomWalk, Singularity, SingularityDistortion, SingularityFood, Tile,
    TransformState,
};

/// Unique identifier for an entity.
///
/// `EntityId` is a newtype wrapper around `u64`. Entity IDs are immutable once
/// assigned and never reused within an arena.
///
/// # Ordering
///
/// Entity IDs are ordered by their numeric value, which is used to ensure
/// deterministic iteration order across all entities.
///
/// # Example
///
/// ```
/// use singulo_core::entity::EntityId;
///
/// let id1 = EntityId::new(1);
/// let id2 = EntityId::new(2);
///
/// assert!(id1 < id2);
/// assert_eq!(id1.as_u64(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new `EntityId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Entity classification.
///
/// Tags drive the generic immunity rules: maps, grids, stations and ghosts can
/// never be consumed and are never pulled by gravity wells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityTag {
    /// Loose object (tools, debris, lockers when unanchored)
    Item,
    /// Living creature
    Mob,
    /// Anchored construction (walls, machines, emitters)
    Structure,
    /// A whole map
    Map,
    /// A tile grid
    Grid,
    /// Station bookkeeping entity
    Station,
    /// Observer without physical presence
    Ghost,
    /// Gravitational singularity
    Singularity,
    /// One segment of a containment field chain
    ContainmentField,
    /// Containment field generator
    FieldGenerator,
    /// Owner record for a generator pair and its segments
    FieldLink,
}

impl EntityTag {
    /// Returns true for tags that are always immune to consumption.
    #[must_use]
    pub const fn is_consume_immune(self) -> bool {
        matches!(self, Self::Map | Self::Grid | Self::Station | Self::Ghost)
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Item => "Item",
            Self::Mob => "Mob",
            Self::Structure => "Structure",
            Self::Map => "Map",
            Self::Grid => "Grid",
            Self::Station => "Station",
            Self::Ghost => "Ghost",
            Self::Singularity => "Singularity",
            Self::ContainmentField => "ContainmentField",
            Self::FieldGenerator => "FieldGenerator",
            Self::FieldLink => "FieldLink",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Per-entity marker flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Markers: u8 {
        /// Carries a mind (player or ghost-role controlled)
        const MIND_BEARING = 0b0000_0001;
        /// Objective-critical item
        const HIGH_RISK_ITEM = 0b0000_0010;
        /// Emitter bolt that powers containment field generators on contact
        const EMITTER_BOLT = 0b0000_0100;
    }
}

/// Component type identifiers used for subscriber routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// [`PhysicsBody`]
    Physics,
    /// [`EventHorizon`]
    EventHorizon,
    /// [`GravityWell`]
    GravityWell,
    /// [`Singularity`]
    Singularity,
    /// [`SingularityFood`]
    SingularityFood,
    /// [`ContainerManager`]
    ContainerManager,
    /// [`Grid`]
    Grid,
    /// [`ContainmentField`]
    ContainmentField,
    /// [`ContainmentFieldLink`]
    ContainmentFieldLink,
    /// [`ContainmentFieldGenerator`]
    FieldGenerator,
    /// [`RandomWalk`]
    RandomWalk,
    /// [`SingularityDistortion`]
    Distortion,
    /// [`RadiationSource`]
    Radiation,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A complete entity with identity, classification, and components.
///
/// The `id` and `tag` are fixed at spawn. Components are public so systems can
/// read and write them directly through [`Arena::get_mut`](crate::arena::Arena::get_mut).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    tag: EntityTag,
    /// Marker flags.
    pub markers: Markers,
    /// Placement in the world.
    pub transform: TransformState,
    /// Optional component bundle.
    pub components: EntityComponents,
    /// Entities attached to this one (see [`Parent::Attached`]).
    attached: BTreeSet<EntityId>,
}

impl Entity {
    /// Creates a new entity.
    #[must_use]
    pub fn new(
        id: EntityId,
        tag: EntityTag,
        transform: TransformState,
        components: EntityComponents,
    ) -> Self {
        Self {
            id,
            tag,
            markers: Markers::empty(),
            transform,
            components,
            attached: BTreeSet::new(),
        }
    }

    /// Returns the entity's unique identifier.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the entity's tag.
    #[must_use]
    pub const fn tag(&self) -> EntityTag {
        self.tag
    }

    /// Returns the entities currently attached to this one.
    #[must_use]
    pub fn attached(&self) -> &BTreeSet<EntityId> {
        &self.attached
    }

    pub(crate) fn attached_mut(&mut self) -> &mut BTreeSet<EntityId> {
        &mut self.attached
    }

    /// Returns true if the entity carries the given component.
    #[must_use]
    pub fn has(&self, kind: ComponentKind) -> bool {
        let c = &self.components;
        match kind {
            ComponentKind::Physics => c.body.is_some(),
            ComponentKind::EventHorizon => c.event_horizon.is_some(),
            ComponentKind::GravityWell => c.gravity_well.is_some(),
            ComponentKind::Singularity => c.singularity.is_some(),
            ComponentKind::SingularityFood => c.food.is_some(),
            ComponentKind::ContainerManager => c.containers.is_some(),
            ComponentKind::Grid => c.grid.is_some(),
            ComponentKind::ContainmentField => c.containment_field.is_some(),
            ComponentKind::ContainmentFieldLink => c.field_link.is_some(),
            ComponentKind::FieldGenerator => c.generator.is_some(),
            ComponentKind::RandomWalk => c.random_walk.is_some(),
            ComponentKind::Distortion => c.distortion.is_some(),
            ComponentKind::Radiation => c.radiation.is_some(),
        }
    }

    /// Returns true if the entity carries every component in `kinds`.
    #[must_use]
    pub fn has_all(&self, kinds: &[ComponentKind]) -> bool {
        kinds.iter().all(|kind| self.has(*kind))
    }

    /// Adds marker flags, builder style.
    #[must_use]
    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers |= markers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    mod entity_id_tests {
        use super::*;

        #[test]
        fn ordering_follows_raw_value() {
            assert!(EntityId::new(3) < EntityId::new(10));
        }

        #[test]
        fn round_trips_through_u64() {
            let id: EntityId = 7u64.into();
            let raw: u64 = id.into();
            assert_eq!(raw, 7);
        }

        #[test]
        fn debug_and_display() {
            let id = EntityId::new(5);
            assert_eq!(format!("{id:?}"), "EntityId(5)");
            assert_eq!(format!("{id}"), "5");
        }
    }

    mod tag_tests {
        use super::*;

        #[test]
        fn immune_tags() {
            assert!(EntityTag::Map.is_consume_immune());
            assert!(EntityTag::Grid.is_consume_immune());
            assert!(EntityTag::Station.is_consume_immune());
            assert!(EntityTag::Ghost.is_consume_immune());
            assert!(!EntityTag::Item.is_consume_immune());
            assert!(!EntityTag::Singularity.is_consume_immune());
        }
    }

    mod component_presence_tests {
        use super::*;

        #[test]
        fn has_reflects_attached_components() {
            let components = EntityComponents::default()
                .with_body(PhysicsBody::dynamic(1.0, 0.5))
                .with_event_horizon(EventHorizon::new(1.0));
            let entity = Entity::new(
                EntityId::new(1),
                EntityTag::Singularity,
                TransformState::at(Vec2::ZERO),
                components,
            );

            assert!(entity.has(ComponentKind::Physics));
            assert!(entity.has(ComponentKind::EventHorizon));
            assert!(!entity.has(ComponentKind::GravityWell));
            assert!(entity.has_all(&[ComponentKind::Physics, ComponentKind::EventHorizon]));
            assert!(!entity.has_all(&[ComponentKind::Physics, ComponentKind::Singularity]));
        }

        #[test]
        fn new_entity_is_uncontained_on_map() {
            let entity = Entity::new(
                EntityId::new(2),
                EntityTag::Item,
                TransformState::at(Vec2::new(3.0, 4.0)),
                EntityComponents::default(),
            );
            assert_eq!(entity.transform.position, Vec2::new(3.0, 4.0));
            assert!(entity.transform.is_uncontained());
            assert!(entity.attached().is_empty());
        }

        #[test]
        fn markers_builder() {
            let entity = Entity::new(
                EntityId::new(3),
                EntityTag::Mob,
                TransformState::default(),
                EntityComponents::default(),
            )
            .with_markers(Markers::MIND_BEARING);
            assert!(entity.markers.contains(Markers::MIND_BEARING));
            assert!(!entity.markers.contains(Markers::HIGH_RISK_ITEM));
        }
    }
}
