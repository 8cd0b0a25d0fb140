//! Simulation module with the fixed-timestep tick.
//!
//! The `Simulation` owns the [`Arena`], the [`EventBus`] and the deferred
//! event queue. Engines are stateless; they read and write the simulation
//! through the helpers here so that every observable change raises the
//! matching [`Event`].
//!
//! # Tick Phases
//!
//! 1. **PHYSICS**: for each substep, gravity wells accumulate forces, bodies
//!    integrate, and new contacts raise `StartCollide`
//! 2. **TIMED**: consume waves, capture scans, energy drain, random walk and
//!    generator power run for whatever is due
//! 3. **DEFERRED**: queued events are dispatched
//! 4. **DELETION**: queued deletions are flushed, then deferred events again
//! 5. **ADVANCE**: tick counter and clock move forward
//!
//! # Determinism
//!
//! - Entities are visited in ID order (via `BTreeMap`)
//! - Spatial queries return sorted IDs
//! - Parallel gravity force results are applied in a fixed order
//! - Random walk draws from a `ChaCha8Rng` seeded from the config
//!
//! # Example
//!
//! ```
//! use singulo_core::simulation::Simulation;
//! use singulo_core::entity::{EntityComponents, EntityTag, PhysicsBody, TransformState};
//! use glam::Vec2;
//!
//! let mut sim = Simulation::with_seed(42);
//! let rock = sim.spawn(
//!     EntityTag::Item,
//!     TransformState::at(Vec2::new(3.0, 0.0)),
//!     EntityComponents::default().with_body(PhysicsBody::dynamic(5.0, 0.25)),
//! );
//!
//! for _ in 0..10 {
//!     sim.step();
//! }
//!
//! assert_eq!(sim.tick(), 10);
//! assert!(sim.arena().exists(rock));
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use glam::IVec2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::arena::{Arena, MAX_PARENT_DEPTH};
use crate::audit::{AuditLog, LogImpact, LogType};
use crate::bus::{EventBus, Subscriber};
use crate::config::SimConfig;
use crate::entity::{
    ContainerRef, EntityComponents, EntityId, EntityTag, Markers, Tile, TransformState,
};
use crate::event::Event;
use crate::presentation::AudioCue;
use crate::systems::{
    self, ConsumptionEngine, ContainmentFieldEngine, GravityWellEngine, PhysicsEngine,
    RandomWalkEngine, SingularityEngine,
};

/// Most deferred-event rounds flushed in one go.
pub const MAX_DEFERRED_ROUNDS: usize = 100;

// =============================================================================
// Simulation
// =============================================================================

/// World state plus the systems that drive it.
pub struct Simulation {
    arena: Arena,
    bus: Arc<EventBus>,
    deferred: VecDeque<Event>,
    config: SimConfig,
    physics: PhysicsEngine,
    audit: AuditLog,
    audio: Vec<AudioCue>,
    /// Touching body pairs from the last contact pass, lower ID first.
    contacts: BTreeSet<(EntityId, EntityId)>,
    rng: ChaCha8Rng,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick())
            .field("entities", &self.arena.len())
            .field("bus", &self.bus)
            .field("deferred", &self.deferred.len())
            .field("seed", &self.config.seed)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Creates a simulation with every engine subscribed.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    ///
    /// # Example
    ///
    /// ```
    /// use singulo_core::config::SimConfig;
    /// use singulo_core::simulation::Simulation;
    ///
    /// let sim = Simulation::new(SimConfig::with_seed(12345));
    /// assert_eq!(sim.tick(), 0);
    /// assert_eq!(sim.config().seed, 12345);
    /// ```
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let mut sim = Self::without_subscribers(config);
        let bus = Arc::make_mut(&mut sim.bus);
        bus.subscribe_all(systems::subscriptions());
        sim
    }

    /// Creates a simulation with default config and the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::new(SimConfig::with_seed(seed))
    }

    /// Creates a simulation with an empty bus. Engines still run on `step`,
    /// but nothing reacts to events.
    #[must_use]
    pub fn bare(seed: u64) -> Self {
        Self::without_subscribers(SimConfig::with_seed(seed))
    }

    fn without_subscribers(config: SimConfig) -> Self {
        Self {
            arena: Arena::new(),
            bus: Arc::new(EventBus::new()),
            deferred: VecDeque::new(),
            physics: PhysicsEngine::from_config(&config.physics),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            audit: AuditLog::new(),
            audio: Vec::new(),
            contacts: BTreeSet::new(),
        }
    }

    /// Resumes a simulation from saved state.
    ///
    /// Every entity receives a non-fresh `ComponentStartup`, so derived state
    /// is rebuilt without replaying spawn-only effects.
    #[must_use]
    pub fn from_arena(arena: Arena, config: SimConfig) -> Self {
        let mut sim = Self::new(config);
        sim.arena = arena;
        let ids: Vec<EntityId> = sim.arena.entities_sorted().map(|e| e.id()).collect();
        for entity in ids {
            sim.raise(Event::ComponentStartup {
                entity,
                fresh: false,
            });
        }
        sim.flush_deferred();
        sim
    }

    /// Unloads the simulation, returning its state.
    ///
    /// Every entity receives a non-genuine `ComponentShutdown`.
    #[must_use]
    pub fn into_arena(mut self) -> Arena {
        let ids: Vec<EntityId> = self.arena.entities_sorted().map(|e| e.id()).collect();
        for entity in ids {
            self.raise(Event::ComponentShutdown {
                entity,
                genuine: false,
            });
        }
        self.arena
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Executes one tick.
    ///
    /// See the module docs for the phase order.
    pub fn step(&mut self) {
        let dt = self.config.physics.dt;
        let substeps = self.config.physics.substeps.max(1);
        #[allow(clippy::cast_precision_loss)]
        let sub_dt = dt / substeps as f32;

        // PHASE 1: PHYSICS
        for _ in 0..substeps {
            GravityWellEngine::update_before_solve(self);
            self.physics.integrate(&mut self.arena, sub_dt);
            self.detect_contacts();
        }

        // PHASE 2: TIMED
        let frame = self.config.tick_duration();
        ConsumptionEngine::update_all(self);
        GravityWellEngine::update(self);
        SingularityEngine::update(self, frame);
        RandomWalkEngine::update(self);
        ContainmentFieldEngine::update_generators(self, dt);

        // PHASE 3 + 4: DEFERRED, DELETION
        self.flush_deferred();
        self.flush_deletions();
        self.flush_deferred();

        // PHASE 5: ADVANCE
        self.arena.advance(frame);
    }

    /// Raises `StartCollide` on both sides of every new contact.
    fn detect_contacts(&mut self) {
        let current = self.physics.contacts(&self.arena);
        let new: Vec<(EntityId, EntityId)> = current.difference(&self.contacts).copied().collect();
        self.contacts = current;
        for (a, b) in new {
            for (ours, other) in [(a, b), (b, a)] {
                if self.arena.exists(ours) && self.arena.exists(other) {
                    self.raise(Event::StartCollide { ours, other });
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Registers a subscriber after the engine subscribers.
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        Arc::make_mut(&mut self.bus).subscribe(subscriber);
    }

    /// Dispatches an event synchronously and returns it, so callers can read
    /// back cancellation.
    pub fn raise(&mut self, mut event: Event) -> Event {
        let bus = Arc::clone(&self.bus);
        bus.dispatch(self, &mut event);
        event
    }

    /// Queues an event for the next deferred flush.
    pub fn queue_event(&mut self, event: Event) {
        self.deferred.push_back(event);
    }

    /// Number of queued deferred events.
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Dispatches queued events, including ones queued while flushing.
    ///
    /// Stops after [`MAX_DEFERRED_ROUNDS`] rounds; anything still queued is
    /// kept for the next flush.
    pub fn flush_deferred(&mut self) {
        for _ in 0..MAX_DEFERRED_ROUNDS {
            if self.deferred.is_empty() {
                return;
            }
            let round = std::mem::take(&mut self.deferred);
            for event in round {
                self.raise(event);
            }
        }
        if !self.deferred.is_empty() {
            tracing::warn!(
                remaining = self.deferred.len(),
                "deferred event flush hit the round limit"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Spawns an entity and raises a fresh `ComponentStartup` for it.
    pub fn spawn(
        &mut self,
        tag: EntityTag,
        transform: TransformState,
        components: EntityComponents,
    ) -> EntityId {
        let id = self.arena.spawn(tag, transform, components);
        self.raise(Event::ComponentStartup {
            entity: id,
            fresh: true,
        });
        id
    }

    /// Spawns an entity with marker flags already set.
    pub fn spawn_marked(
        &mut self,
        tag: EntityTag,
        markers: Markers,
        transform: TransformState,
        components: EntityComponents,
    ) -> EntityId {
        let id = self.arena.spawn(tag, transform, components);
        if let Some(entity) = self.arena.get_mut(id) {
            entity.markers |= markers;
        }
        self.raise(Event::ComponentStartup {
            entity: id,
            fresh: true,
        });
        id
    }

    /// Queues an entity for deletion at the end of the tick.
    pub fn queue_delete(&mut self, id: EntityId) -> bool {
        self.arena.queue_delete(id)
    }

    /// Deletes everything queued, along with container contents and attached
    /// entities.
    ///
    /// Each entity sees `EntityTerminating` and a genuine `ComponentShutdown`
    /// before it is removed.
    pub fn flush_deletions(&mut self) {
        let mut rounds = 0;
        while self.arena.has_pending_deletions() {
            rounds += 1;
            if rounds > MAX_PARENT_DEPTH {
                tracing::warn!("deletion flush hit the round limit");
                return;
            }
            for id in self.arena.pending_deletions() {
                if !self.arena.contains(id) {
                    continue;
                }
                self.raise(Event::EntityTerminating { entity: id });
                self.raise(Event::ComponentShutdown {
                    entity: id,
                    genuine: true,
                });

                let mut children: Vec<EntityId> = self
                    .arena
                    .owned_containers(id)
                    .iter()
                    .flat_map(|c| self.arena.container_contents(c))
                    .collect();
                if let Some(entity) = self.arena.get(id) {
                    children.extend(entity.attached().iter().copied());
                }
                for child in children {
                    self.arena.queue_delete(child);
                }

                self.contacts.retain(|(a, b)| *a != id && *b != id);
                self.arena.despawn(id);
                tracing::trace!(entity = %id, "despawned");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Containers, anchoring and tiles
    // -------------------------------------------------------------------------

    /// Inserts an entity into a container, raising the removal from its old
    /// container and then the insertion. Returns false if refused.
    pub fn try_insert(&mut self, entity: EntityId, container: &ContainerRef) -> bool {
        let was_anchored = self
            .arena
            .get(entity)
            .is_some_and(|e| e.transform.anchored);
        let Some(previous) = self.arena.insert(entity, container) else {
            return false;
        };
        self.contacts.retain(|(a, b)| *a != entity && *b != entity);
        if was_anchored {
            self.raise(Event::AnchorStateChanged {
                entity,
                anchored: false,
            });
        }
        if let Some(previous) = previous {
            self.raise(Event::EntRemovedFromContainer {
                entity,
                container: previous,
            });
        }
        self.raise(Event::EntInsertedIntoContainer {
            entity,
            container: container.clone(),
        });
        true
    }

    /// Takes an entity out of its container onto the map. Returns false if it
    /// was not contained.
    pub fn remove_from_container(&mut self, entity: EntityId) -> bool {
        let Some(container) = self.arena.remove_from_container(entity) else {
            return false;
        };
        self.raise(Event::EntRemovedFromContainer { entity, container });
        true
    }

    /// Drops an entity onto the grid or map under its outermost ancestor.
    pub fn attach_to_grid_or_map(&mut self, entity: EntityId) {
        let was_anchored = self
            .arena
            .get(entity)
            .is_some_and(|e| e.transform.anchored);
        let previous = self.arena.attach_to_grid_or_map(entity);
        if was_anchored {
            self.raise(Event::AnchorStateChanged {
                entity,
                anchored: false,
            });
        }
        if let Some(container) = previous {
            self.raise(Event::EntRemovedFromContainer { entity, container });
        }
    }

    /// Anchors or unanchors an entity to the grid under it.
    ///
    /// Anchoring needs an uncontained entity over a non-empty tile. Returns
    /// true if the state changed.
    pub fn set_anchored(&mut self, entity: EntityId, anchored: bool) -> bool {
        let Some(current) = self.arena.get(entity) else {
            return false;
        };
        if current.transform.anchored == anchored {
            return false;
        }
        let grid = if anchored {
            if current.transform.container().is_some() {
                return false;
            }
            let Some(grid) = self
                .arena
                .world_position(entity)
                .and_then(|pos| self.arena.grid_at(pos))
            else {
                return false;
            };
            Some(grid)
        } else {
            current.transform.grid
        };
        if let Some(e) = self.arena.get_mut(entity) {
            e.transform.anchored = anchored;
            e.transform.grid = grid;
        }
        self.raise(Event::AnchorStateChanged { entity, anchored });
        true
    }

    /// Writes tiles in one batch. Entities anchored to tiles that become
    /// empty are unanchored. Returns false if the grid is missing.
    pub fn set_tiles(&mut self, grid: EntityId, tiles: &[(IVec2, Tile)]) -> bool {
        let unanchored: Vec<EntityId> = tiles
            .iter()
            .filter(|(_, tile)| tile.is_empty())
            .flat_map(|(index, _)| self.arena.anchored_entities(grid, *index))
            .collect();
        if !self.arena.set_tiles(grid, tiles) {
            return false;
        }
        for entity in unanchored {
            if let Some(e) = self.arena.get_mut(entity) {
                e.transform.anchored = false;
            }
            self.raise(Event::AnchorStateChanged {
                entity,
                anchored: false,
            });
        }
        true
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Read-only world state.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Mutable world state, for scenario setup.
    ///
    /// Edits made here raise no events.
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.arena.current_tick()
    }

    /// Current simulated time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.arena.time()
    }

    /// Audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Records an audit entry stamped with the current tick.
    pub fn record_audit(&mut self, log_type: LogType, impact: LogImpact, message: String) {
        let tick = self.tick();
        self.audit.record(tick, log_type, impact, message);
    }

    /// Records an audio cue.
    pub fn play(&mut self, cue: AudioCue) {
        self.audio.push(cue);
    }

    /// Drains the recorded audio cues.
    pub fn take_audio_cues(&mut self) -> Vec<AudioCue> {
        std::mem::take(&mut self.audio)
    }

    /// Simulation RNG.
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SubscriberDeclaration, Subscription};
    use crate::entity::{ComponentKind, ContainerManager, Grid, PhysicsBody};
    use crate::event::EventKind;
    use glam::Vec2;

    fn item(sim: &mut Simulation, pos: Vec2) -> EntityId {
        sim.spawn(
            EntityTag::Item,
            TransformState::at(pos),
            EntityComponents::default().with_body(PhysicsBody::dynamic(1.0, 0.25)),
        )
    }

    fn locker(sim: &mut Simulation, pos: Vec2) -> EntityId {
        sim.spawn(
            EntityTag::Structure,
            TransformState::at(pos),
            EntityComponents::default().with_containers(ContainerManager::single("storage")),
        )
    }

    mod step_tests {
        use super::*;

        #[test]
        fn step_advances_clock() {
            let mut sim = Simulation::with_seed(1);
            sim.step();
            sim.step();
            assert_eq!(sim.tick(), 2);
            assert_eq!(sim.time(), sim.config().tick_duration() * 2);
        }

        #[test]
        fn bodies_move_under_velocity() {
            let mut sim = Simulation::bare(1);
            let rock = item(&mut sim, Vec2::ZERO);
            if let Some(body) = sim
                .arena_mut()
                .components_mut(rock)
                .and_then(|c| c.body.as_mut())
            {
                body.status = crate::entity::BodyStatus::InAir;
                body.linear_velocity = Vec2::new(60.0, 0.0);
            }
            sim.step();
            let pos = sim.arena().world_position(rock).unwrap();
            assert!((pos.x - 1.0).abs() < 1e-4);
        }
    }

    mod deletion_tests {
        use super::*;

        #[test]
        fn deleting_container_deletes_contents() {
            let mut sim = Simulation::bare(1);
            let outer = locker(&mut sim, Vec2::ZERO);
            let inner = locker(&mut sim, Vec2::ZERO);
            let rock = item(&mut sim, Vec2::ZERO);
            assert!(sim.try_insert(inner, &ContainerRef::new(outer, "storage")));
            assert!(sim.try_insert(rock, &ContainerRef::new(inner, "storage")));

            sim.queue_delete(outer);
            sim.flush_deletions();
            assert!(sim.arena().is_empty());
        }

        #[test]
        fn terminating_is_raised_before_despawn() {
            fn check_alive(sim: &mut Simulation, event: &mut Event) {
                assert!(sim.arena().contains(event.target()));
                sim.record_audit(LogType::EntityDelete, LogImpact::Low, "seen".into());
            }

            let mut sim = Simulation::bare(1);
            sim.subscribe(Arc::new(Subscription::new(
                SubscriberDeclaration::on(
                    "test.terminating",
                    EventKind::EntityTerminating,
                    &[ComponentKind::Physics],
                ),
                check_alive,
            )));
            let rock = item(&mut sim, Vec2::ZERO);
            sim.queue_delete(rock);
            sim.flush_deletions();
            assert_eq!(sim.audit().len(), 1);
            assert!(!sim.arena().contains(rock));
        }
    }

    mod deferred_tests {
        use super::*;

        fn requeue(sim: &mut Simulation, event: &mut Event) {
            sim.queue_event(event.clone());
        }

        #[test]
        fn runaway_requeue_is_capped() {
            let mut sim = Simulation::bare(1);
            sim.subscribe(Arc::new(Subscription::new(
                SubscriberDeclaration::on("test.requeue", EventKind::AnchorStateChanged, &[]),
                requeue,
            )));
            let rock = item(&mut sim, Vec2::ZERO);
            sim.queue_event(Event::AnchorStateChanged {
                entity: rock,
                anchored: false,
            });
            sim.flush_deferred();
            assert_eq!(sim.deferred_len(), 1);
        }
    }

    mod container_event_tests {
        use super::*;

        fn count(sim: &mut Simulation, _event: &mut Event) {
            sim.record_audit(LogType::EntityDelete, LogImpact::Low, "moved".into());
        }

        #[test]
        fn moving_between_containers_raises_removed_then_inserted() {
            let mut sim = Simulation::bare(1);
            for kind in [EventKind::EntRemovedFromContainer, EventKind::EntInsertedIntoContainer] {
                sim.subscribe(Arc::new(Subscription::new(
                    SubscriberDeclaration::on("test.count", kind, &[]),
                    count,
                )));
            }
            let first = locker(&mut sim, Vec2::ZERO);
            let second = locker(&mut sim, Vec2::ZERO);
            let rock = item(&mut sim, Vec2::ZERO);

            assert!(sim.try_insert(rock, &ContainerRef::new(first, "storage")));
            assert_eq!(sim.audit().len(), 1);
            assert!(sim.try_insert(rock, &ContainerRef::new(second, "storage")));
            assert_eq!(sim.audit().len(), 3);
            assert!(sim.remove_from_container(rock));
            assert_eq!(sim.audit().len(), 4);
            assert!(!sim.remove_from_container(rock));
        }
    }

    mod anchoring_tests {
        use super::*;

        #[test]
        fn emptied_tiles_unanchor() {
            let mut sim = Simulation::bare(1);
            let grid = sim.spawn(
                EntityTag::Grid,
                TransformState::at(Vec2::ZERO),
                EntityComponents::default().with_grid(Grid::filled(2, 2, Tile::PLATING)),
            );
            let wall = sim.spawn(
                EntityTag::Structure,
                TransformState::at(Vec2::new(0.5, 0.5)),
                EntityComponents::default().with_body(PhysicsBody::fixed(0.5)),
            );
            assert!(sim.set_anchored(wall, true));
            assert!(!sim.set_anchored(wall, true));
            assert_eq!(sim.arena().get(wall).unwrap().transform.grid, Some(grid));

            assert!(sim.set_tiles(grid, &[(IVec2::ZERO, Tile::EMPTY)]));
            assert!(!sim.arena().get(wall).unwrap().transform.anchored);
            assert!(!sim.set_anchored(wall, true));
        }
    }

    mod persistence_tests {
        use super::*;

        #[test]
        fn arena_round_trips_through_simulation() {
            let mut sim = Simulation::with_seed(3);
            let rock = item(&mut sim, Vec2::new(2.0, 2.0));
            let arena = sim.into_arena();
            let resumed = Simulation::from_arena(arena, SimConfig::with_seed(3));
            assert!(resumed.arena().exists(rock));
        }
    }
}
