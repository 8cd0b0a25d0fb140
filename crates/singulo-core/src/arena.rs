//! Arena module: entity storage and the host-side world queries.
//!
//! The Arena is the container for all entities in a simulation. It provides:
//! - Entity storage with deterministic iteration order (`BTreeMap`)
//! - Spatial indexing for proximity queries over uncontained entities
//! - Container bookkeeping (containing container, insert, remove, detach)
//! - Tile grid queries (grids and tiles intersecting a circle, anchored entities)
//! - Queued deletion, flushed at a fixed point of the tick
//!
//! The arena performs raw mutations only. Anything that other systems must
//! observe (insertions, anchoring changes, deletions) goes through
//! [`Simulation`](crate::simulation::Simulation), which raises the matching events.
//!
//! # Spatial Index Synchronization
//!
//! The spatial index is NOT automatically synchronized when a transform is
//! edited through [`Arena::get_mut`]. Call [`Arena::update_spatial`] afterward.
//! Spawning, despawning and the container operations keep it in sync.
//!
//! # Example
//!
//! ```
//! use singulo_core::arena::Arena;
//! use singulo_core::entity::{EntityComponents, EntityTag, TransformState};
//! use glam::Vec2;
//!
//! let mut arena = Arena::new();
//! let rock = arena.spawn(
//!     EntityTag::Item,
//!     TransformState::at(Vec2::new(100.0, 200.0)),
//!     EntityComponents::default(),
//! );
//!
//! let nearby = arena.query_radius(Vec2::new(100.0, 200.0), 5.0);
//! assert!(nearby.contains(&rock));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::entity::{
    CollisionLayer, ComponentKind, Container, ContainerRef, Entity, EntityComponents, EntityId,
    EntityTag, Grid, Parent, Tile, TransformState,
};

/// Deepest parent chain followed before giving up.
pub const MAX_PARENT_DEPTH: usize = 100;

// =============================================================================
// Spatial Index
// =============================================================================

/// Position index over uncontained entities.
///
/// `HashMap` is acceptable here because radius queries sort their results by
/// ID before returning, so iteration order never leaks into simulation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialIndex {
    positions: HashMap<EntityId, Vec2>,
}

impl SpatialIndex {
    /// Creates a new empty spatial index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates an entity's position.
    pub fn insert(&mut self, id: EntityId, pos: Vec2) {
        self.positions.insert(id, pos);
    }

    /// Removes an entity.
    pub fn remove(&mut self, id: EntityId) {
        self.positions.remove(&id);
    }

    /// Returns the indexed position of an entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Vec2> {
        self.positions.get(&id).copied()
    }

    /// Entities within `radius` of `center` (inclusive), sorted by ID.
    #[must_use]
    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        let mut results: Vec<EntityId> = self
            .positions
            .iter()
            .filter(|(_, pos)| center.distance_squared(**pos) <= radius_sq)
            .map(|(id, _)| *id)
            .collect();

        // Sort for deterministic order
        results.sort();
        results
    }

    /// Returns the number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// =============================================================================
// Arena
// =============================================================================

/// All simulation entities plus world-query helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arena {
    /// Entity storage (`BTreeMap` for deterministic iteration).
    entities: BTreeMap<EntityId, Entity>,
    /// Spatial index over uncontained entities.
    spatial: SpatialIndex,
    /// Next ID to assign.
    next_id: u64,
    /// Current simulation tick.
    current_tick: u64,
    /// Simulated time since start.
    time: Duration,
    /// Entities queued for deletion at the end of the tick.
    pending_deletion: BTreeSet<EntityId>,
}

impl Arena {
    /// Creates an empty arena at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Spawns an entity and returns its ID.
    ///
    /// A container parent that cannot accept the entity is replaced by the
    /// container owner's position on the map.
    pub fn spawn(
        &mut self,
        tag: EntityTag,
        transform: TransformState,
        components: EntityComponents,
    ) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;

        let mut transform = transform;
        match transform.parent.clone() {
            Parent::Container(container) => {
                if self.container(&container).is_some_and(|c| !c.is_full()) {
                    if let Some(slot) = self.container_mut(&container) {
                        slot.contents.push(id);
                    }
                } else {
                    transform.position = self.world_position(container.owner).unwrap_or_default();
                    transform.parent = Parent::Map;
                }
            }
            Parent::Attached(parent) => {
                if let Some(parent) = self.entities.get_mut(&parent) {
                    parent.attached_mut().insert(id);
                } else {
                    transform.parent = Parent::Map;
                }
            }
            Parent::Map | Parent::Nullspace => {}
        }

        self.entities
            .insert(id, Entity::new(id, tag, transform, components));
        self.update_spatial(id);
        id
    }

    /// Removes an entity immediately.
    ///
    /// The entity is unlinked from its container and parent. Entities that
    /// were inside it or attached to it are left dangling; callers that need
    /// recursive deletion go through
    /// [`Simulation::flush_deletions`](crate::simulation::Simulation::flush_deletions).
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        self.unlink_parent(id);
        self.spatial.remove(id);
        self.pending_deletion.remove(&id);
        self.entities.remove(&id)
    }

    /// Marks an entity for deletion. Returns false if it is missing or already queued.
    pub fn queue_delete(&mut self, id: EntityId) -> bool {
        self.entities.contains_key(&id) && self.pending_deletion.insert(id)
    }

    /// Returns true if the entity is queued for deletion.
    #[must_use]
    pub fn is_queued_for_deletion(&self, id: EntityId) -> bool {
        self.pending_deletion.contains(&id)
    }

    /// Returns true if any deletions are pending.
    #[must_use]
    pub fn has_pending_deletions(&self) -> bool {
        !self.pending_deletion.is_empty()
    }

    /// Snapshot of the entities queued for deletion, in ID order.
    ///
    /// Entities stay queued until [`Arena::despawn`] removes them.
    #[must_use]
    pub fn pending_deletions(&self) -> Vec<EntityId> {
        self.pending_deletion.iter().copied().collect()
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Returns an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns a mutable entity by ID.
    ///
    /// Call [`Arena::update_spatial`] after editing the transform.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Returns a mutable reference to an entity's components.
    pub fn components_mut(&mut self, id: EntityId) -> Option<&mut EntityComponents> {
        self.entities.get_mut(&id).map(|e| &mut e.components)
    }

    /// Returns true if the entity is stored, queued or not.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Returns true if the entity is stored and not queued for deletion.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.contains(id) && !self.is_queued_for_deletion(id)
    }

    /// Returns true if the entity exists and has every listed component.
    #[must_use]
    pub fn has_components(&self, id: EntityId, kinds: &[ComponentKind]) -> bool {
        self.get(id).is_some_and(|e| e.has_all(kinds))
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entities are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates entities in ID order.
    pub fn entities_sorted(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterates entities mutably in ID order.
    pub fn entities_sorted_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// IDs of live entities carrying a component, in ID order.
    #[must_use]
    pub fn ids_with(&self, kind: ComponentKind) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.has(kind) && !self.is_queued_for_deletion(e.id()))
            .map(Entity::id)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Time
    // -------------------------------------------------------------------------

    /// Current tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Simulated time since start.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Advances the tick counter and the clock.
    pub fn advance(&mut self, dt: Duration) {
        self.current_tick += 1;
        self.time += dt;
    }

    /// Sets the clock directly. Intended for scenario setup.
    pub fn set_time(&mut self, time: Duration) {
        self.time = time;
    }

    // -------------------------------------------------------------------------
    // Spatial
    // -------------------------------------------------------------------------

    /// Returns the spatial index.
    #[must_use]
    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Re-syncs one entity (and everything attached to it) with the spatial index.
    pub fn update_spatial(&mut self, id: EntityId) {
        let mut stack = vec![id];
        let mut visited = 0;
        while let Some(current) = stack.pop() {
            visited += 1;
            if visited > MAX_PARENT_DEPTH * 16 {
                tracing::warn!(entity = %id, "spatial sync aborted on attachment cycle");
                break;
            }
            let Some(entity) = self.entities.get(&current) else {
                self.spatial.remove(current);
                continue;
            };
            let uncontained = entity.transform.is_uncontained();
            stack.extend(entity.attached().iter().copied());
            match self.world_position(current) {
                Some(pos) if uncontained => self.spatial.insert(current, pos),
                _ => self.spatial.remove(current),
            }
        }
    }

    /// World position of an entity, following attachments and containers.
    ///
    /// Contained entities report their outermost owner's position. Returns
    /// `None` for missing entities, nullspace, or overly deep chains.
    #[must_use]
    pub fn world_position(&self, id: EntityId) -> Option<Vec2> {
        let mut offset = Vec2::ZERO;
        let mut current = id;
        for _ in 0..MAX_PARENT_DEPTH {
            let entity = self.entities.get(&current)?;
            match &entity.transform.parent {
                Parent::Map => return Some(entity.transform.position + offset),
                Parent::Attached(parent) => {
                    offset += entity.transform.position;
                    current = *parent;
                }
                Parent::Container(container) => {
                    offset = Vec2::ZERO;
                    current = container.owner;
                }
                Parent::Nullspace => return None,
            }
        }
        None
    }

    /// Live uncontained entities within `radius` of `center`, sorted by ID.
    #[must_use]
    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<EntityId> {
        self.spatial
            .query_radius(center, radius)
            .into_iter()
            .filter(|id| !self.is_queued_for_deletion(*id))
            .collect()
    }

    /// First body hit by a ray, with its distance along the ray.
    ///
    /// Only uncontained bodies whose layer intersects `mask` are tested;
    /// `ignore` is skipped. Ties are broken by ID.
    #[must_use]
    pub fn ray_cast(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_length: f32,
        mask: CollisionLayer,
        ignore: EntityId,
    ) -> Option<(EntityId, f32)> {
        let direction = direction.try_normalize()?;
        let mut best: Option<(EntityId, f32)> = None;
        for id in self.query_radius(origin, max_length + 8.0) {
            if id == ignore {
                continue;
            }
            let Some(body) = self.get(id).and_then(|e| e.components.body.as_ref()) else {
                continue;
            };
            if !body.layer.intersects(mask) {
                continue;
            }
            let Some(center) = self.spatial.get(id) else {
                continue;
            };
            let to_center = center - origin;
            let along = to_center.dot(direction);
            if along < 0.0 {
                continue;
            }
            let perp_sq = to_center.length_squared() - along * along;
            let radius_sq = body.radius * body.radius;
            if perp_sq > radius_sq {
                continue;
            }
            let hit = (along - (radius_sq - perp_sq).max(0.0).sqrt()).max(0.0);
            if hit > max_length {
                continue;
            }
            if best.map_or(true, |(_, d)| hit < d) {
                best = Some((id, hit));
            }
        }
        best
    }

    // -------------------------------------------------------------------------
    // Containers
    // -------------------------------------------------------------------------

    /// Returns a container slot.
    #[must_use]
    pub fn container(&self, container: &ContainerRef) -> Option<&Container> {
        self.get(container.owner)?
            .components
            .containers
            .as_ref()?
            .containers
            .get(&container.name)
    }

    fn container_mut(&mut self, container: &ContainerRef) -> Option<&mut Container> {
        self.entities
            .get_mut(&container.owner)?
            .components
            .containers
            .as_mut()?
            .containers
            .get_mut(&container.name)
    }

    /// The container directly holding an entity.
    #[must_use]
    pub fn containing_container(&self, id: EntityId) -> Option<ContainerRef> {
        self.get(id)?.transform.container().cloned()
    }

    /// Snapshot of a container's contents.
    #[must_use]
    pub fn container_contents(&self, container: &ContainerRef) -> Vec<EntityId> {
        self.container(container)
            .map(|c| c.contents.clone())
            .unwrap_or_default()
    }

    /// All containers owned by an entity, in name order.
    #[must_use]
    pub fn owned_containers(&self, id: EntityId) -> Vec<ContainerRef> {
        self.get(id)
            .and_then(|e| e.components.containers.as_ref())
            .map(|manager| {
                manager
                    .containers
                    .keys()
                    .map(|name| ContainerRef::new(id, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if `ancestor` holds `id` through containers or attachments.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut current = id;
        for _ in 0..MAX_PARENT_DEPTH {
            let Some(entity) = self.get(current) else {
                return false;
            };
            current = match &entity.transform.parent {
                Parent::Container(container) => container.owner,
                Parent::Attached(parent) => *parent,
                Parent::Map | Parent::Nullspace => return false,
            };
            if current == ancestor {
                return true;
            }
        }
        false
    }

    /// Returns true if `entity` may be inserted into `container`.
    ///
    /// Fails when either side is missing or queued for deletion, the container
    /// is full, the entity is already inside it, or the insertion would create
    /// a containment cycle.
    #[must_use]
    pub fn can_insert(&self, entity: EntityId, container: &ContainerRef) -> bool {
        if !self.exists(entity) || !self.exists(container.owner) || entity == container.owner {
            return false;
        }
        let Some(slot) = self.container(container) else {
            return false;
        };
        !slot.is_full()
            && !slot.contents.contains(&entity)
            && !self.is_ancestor(entity, container.owner)
    }

    /// Moves an entity into a container.
    ///
    /// Returns the container it previously occupied on success (`Some(None)`
    /// when it came from outside any container), or `None` if refused.
    #[allow(clippy::option_option)]
    pub fn insert(
        &mut self,
        entity: EntityId,
        container: &ContainerRef,
    ) -> Option<Option<ContainerRef>> {
        if !self.can_insert(entity, container) {
            return None;
        }
        let previous = self.unlink_parent(entity);
        let slot = self.container_mut(container)?;
        slot.contents.push(entity);
        if let Some(e) = self.entities.get_mut(&entity) {
            e.transform.parent = Parent::Container(container.clone());
            e.transform.anchored = false;
            e.transform.grid = None;
        }
        self.update_spatial(entity);
        Some(previous)
    }

    /// Takes an entity out of its container and places it on the map at its
    /// current world position. Returns the container it left.
    pub fn remove_from_container(&mut self, entity: EntityId) -> Option<ContainerRef> {
        let container = self.containing_container(entity)?;
        let position = self.world_position(entity).unwrap_or_default();
        self.unlink_parent(entity);
        let grid = self.grid_at(position);
        if let Some(e) = self.entities.get_mut(&entity) {
            e.transform.parent = Parent::Map;
            e.transform.position = position;
            e.transform.grid = grid;
        }
        self.update_spatial(entity);
        Some(container)
    }

    /// Places an entity on whatever grid lies under its world position, or
    /// on the bare map. Returns the container it left, if any.
    pub fn attach_to_grid_or_map(&mut self, entity: EntityId) -> Option<ContainerRef> {
        let position = self.world_position(entity)?;
        let previous = self.unlink_parent(entity);
        let grid = self.grid_at(position);
        if let Some(e) = self.entities.get_mut(&entity) {
            e.transform.parent = Parent::Map;
            e.transform.position = position;
            e.transform.grid = grid;
            e.transform.anchored = false;
        }
        self.update_spatial(entity);
        previous
    }

    /// Removes an entity from its container or attachment parent without
    /// re-parenting it. Returns the container it left.
    fn unlink_parent(&mut self, entity: EntityId) -> Option<ContainerRef> {
        let parent = self.entities.get(&entity)?.transform.parent.clone();
        match parent {
            Parent::Container(container) => {
                if let Some(slot) = self.container_mut(&container) {
                    slot.contents.retain(|id| *id != entity);
                }
                Some(container)
            }
            Parent::Attached(parent) => {
                if let Some(parent) = self.entities.get_mut(&parent) {
                    parent.attached_mut().remove(&entity);
                }
                None
            }
            Parent::Map | Parent::Nullspace => None,
        }
    }

    // -------------------------------------------------------------------------
    // Grids
    // -------------------------------------------------------------------------

    /// Returns a grid component.
    #[must_use]
    pub fn grid(&self, grid: EntityId) -> Option<&Grid> {
        self.get(grid)?.components.grid.as_ref()
    }

    /// Live grids whose tile bounds touch a circle, in ID order.
    #[must_use]
    pub fn grids_intersecting_circle(&self, center: Vec2, radius: f32) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        self.entities
            .values()
            .filter(|e| !self.is_queued_for_deletion(e.id()))
            .filter_map(|e| {
                let (lo, hi) = e.components.grid.as_ref()?.bounds()?;
                let origin = self.world_position(e.id())?;
                let min = origin + lo.as_vec2();
                let max = origin + hi.as_vec2() + Vec2::ONE;
                let closest = center.clamp(min, max);
                (closest.distance_squared(center) <= radius_sq).then_some(e.id())
            })
            .collect()
    }

    /// Non-empty tiles of `grid` touching a world-space circle.
    #[must_use]
    pub fn tiles_intersecting_circle(
        &self,
        grid: EntityId,
        center: Vec2,
        radius: f32,
    ) -> Vec<(IVec2, Tile)> {
        let (Some(tiles), Some(origin)) = (self.grid(grid), self.world_position(grid)) else {
            return Vec::new();
        };
        tiles.tiles_intersecting_circle(center - origin, radius)
    }

    /// Live entities anchored to one tile of `grid`, in ID order.
    #[must_use]
    pub fn anchored_entities(&self, grid: EntityId, index: IVec2) -> Vec<EntityId> {
        let Some(origin) = self.world_position(grid) else {
            return Vec::new();
        };
        self.entities
            .values()
            .filter(|e| {
                e.transform.anchored
                    && e.transform.grid == Some(grid)
                    && e.transform.parent == Parent::Map
                    && !self.is_queued_for_deletion(e.id())
                    && Grid::index_at(e.transform.position - origin) == index
            })
            .map(Entity::id)
            .collect()
    }

    /// Lowest-ID live grid with a non-empty tile under a world position.
    #[must_use]
    pub fn grid_at(&self, position: Vec2) -> Option<EntityId> {
        self.entities
            .values()
            .filter(|e| !self.is_queued_for_deletion(e.id()))
            .find(|e| {
                let (Some(grid), Some(origin)) =
                    (e.components.grid.as_ref(), self.world_position(e.id()))
                else {
                    return false;
                };
                !grid.tile(Grid::index_at(position - origin)).is_empty()
            })
            .map(Entity::id)
    }

    /// Writes tiles to a grid in one batch. Returns false if the grid is missing.
    pub fn set_tiles(&mut self, grid: EntityId, tiles: &[(IVec2, Tile)]) -> bool {
        let Some(target) = self.components_mut(grid).and_then(|c| c.grid.as_mut()) else {
            return false;
        };
        for (index, tile) in tiles {
            target.set_tile(*index, *tile);
        }
        true
    }
}
