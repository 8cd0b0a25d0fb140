//! Component definitions.
//!
//! Components are plain data. Behavior lives in [`crate::systems`], which read
//! and write these structs through the arena and react to bus events.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bitflags::bitflags;
use glam::{IVec2, Mat2, Vec2};
use serde::{Deserialize, Serialize};

use super::EntityId;

// =============================================================================
// Transform
// =============================================================================

/// Reference to a named container on an owning entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    /// Entity that owns the container.
    pub owner: EntityId,
    /// Container slot name on the owner.
    pub name: String,
}

impl ContainerRef {
    /// Creates a container reference.
    #[must_use]
    pub fn new(owner: EntityId, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

/// Where an entity lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parent {
    /// Directly on the map; `position` is a world position.
    #[default]
    Map,
    /// Inside a container; `position` is ignored.
    Container(ContainerRef),
    /// Attached to another entity; `position` is an offset from it.
    Attached(EntityId),
    /// Outside of the world entirely (bookkeeping entities).
    Nullspace,
}

/// Placement of an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformState {
    /// World position, or local offset when attached.
    pub position: Vec2,
    /// Parent relationship.
    pub parent: Parent,
    /// Whether the entity is anchored to a grid tile.
    pub anchored: bool,
    /// Grid the entity stands on, if any.
    pub grid: Option<EntityId>,
}

impl TransformState {
    /// Creates a transform on the map at the given world position.
    #[must_use]
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Creates a transform in nullspace.
    #[must_use]
    pub fn nullspace() -> Self {
        Self {
            parent: Parent::Nullspace,
            ..Self::default()
        }
    }

    /// Anchors the transform to a tile of `grid`.
    #[must_use]
    pub fn anchored_to(mut self, grid: EntityId) -> Self {
        self.anchored = true;
        self.grid = Some(grid);
        self
    }

    /// Returns true if the entity is on the map (directly or attached), not
    /// contained and not in nullspace.
    #[must_use]
    pub fn is_uncontained(&self) -> bool {
        matches!(self.parent, Parent::Map | Parent::Attached(_))
    }

    /// Returns the containing container, if any.
    #[must_use]
    pub fn container(&self) -> Option<&ContainerRef> {
        match &self.parent {
            Parent::Container(container) => Some(container),
            _ => None,
        }
    }
}

// =============================================================================
// Physics
// =============================================================================

/// How a body participates in the physics step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves.
    Static,
    /// Moves only by velocity.
    Kinematic,
    /// Fully simulated.
    #[default]
    Dynamic,
}

/// Ground contact status of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyStatus {
    /// Subject to ground friction.
    #[default]
    OnGround,
    /// Floating; no friction.
    InAir,
}

bitflags! {
    /// Collision layers and masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CollisionLayer: u16 {
        /// Small loose objects
        const ITEM = 1 << 0;
        /// Creatures
        const MOB = 1 << 1;
        /// Walls and anchored machines
        const WALL = 1 << 2;
        /// Singularities
        const SINGULARITY = 1 << 3;
        /// Containment field segments
        const FIELD = 1 << 4;
        /// Emitter bolts
        const BOLT = 1 << 5;
    }
}

/// Circle body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    /// Body type.
    pub body_type: BodyType,
    /// Mass in kilograms. Zero means immovable.
    pub mass: f32,
    /// Circle radius.
    pub radius: f32,
    /// Hard bodies block; soft bodies only sense.
    pub hard: bool,
    /// Layers this body occupies.
    pub layer: CollisionLayer,
    /// Layers this body collides with.
    pub mask: CollisionLayer,
    /// Ground status.
    pub status: BodyStatus,
    /// Linear velocity.
    pub linear_velocity: Vec2,
    /// Force accumulated for the current step.
    pub force: Vec2,
}

impl PhysicsBody {
    /// Creates a hard dynamic item body.
    #[must_use]
    pub fn dynamic(mass: f32, radius: f32) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            mass,
            radius,
            hard: true,
            layer: CollisionLayer::ITEM,
            mask: CollisionLayer::WALL | CollisionLayer::SINGULARITY,
            status: BodyStatus::OnGround,
            linear_velocity: Vec2::ZERO,
            force: Vec2::ZERO,
        }
    }

    /// Creates a hard static wall body.
    #[must_use]
    pub fn fixed(radius: f32) -> Self {
        Self {
            body_type: BodyType::Static,
            mass: 0.0,
            layer: CollisionLayer::WALL,
            mask: CollisionLayer::ITEM | CollisionLayer::MOB | CollisionLayer::SINGULARITY,
            ..Self::dynamic(0.0, radius)
        }
    }

    /// Sets the collision layer and mask, builder style.
    #[must_use]
    pub fn with_collision(mut self, layer: CollisionLayer, mask: CollisionLayer) -> Self {
        self.layer = layer;
        self.mask = mask;
        self
    }

    /// Marks the body soft (sensor-only), builder style.
    #[must_use]
    pub fn soft(mut self) -> Self {
        self.hard = false;
        self
    }

    /// Inverse mass; zero for immovable bodies.
    #[must_use]
    pub fn inv_mass(&self) -> f32 {
        if self.body_type == BodyType::Dynamic && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Returns true if either body's mask covers the other's layer.
    #[must_use]
    pub fn can_collide(&self, other: &Self) -> bool {
        self.mask.intersects(other.layer) || other.mask.intersects(self.layer)
    }

    /// Returns true if `other` is hard and can collide with this body.
    #[must_use]
    pub fn hard_collides_with(&self, other: &Self) -> bool {
        other.hard && self.can_collide(other)
    }
}

// =============================================================================
// Containers
// =============================================================================

/// A single named container slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Container {
    /// Contained entities in insertion order.
    pub contents: Vec<EntityId>,
    /// Maximum number of entities, if limited.
    pub capacity: Option<usize>,
}

impl Container {
    /// Creates a container with a capacity limit.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contents: Vec::new(),
            capacity: Some(capacity),
        }
    }

    /// Returns true if no more entities fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.contents.len() >= cap)
    }
}

/// The set of containers an entity owns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerManager {
    /// Containers by slot name.
    pub containers: BTreeMap<String, Container>,
}

impl ContainerManager {
    /// Creates a manager with one unlimited container.
    #[must_use]
    pub fn single(name: impl Into<String>) -> Self {
        let mut containers = BTreeMap::new();
        containers.insert(name.into(), Container::default());
        Self { containers }
    }

    /// Adds a container, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, container: Container) -> Self {
        self.containers.insert(name.into(), container);
        self
    }
}

// =============================================================================
// Grids
// =============================================================================

/// A 1x1 grid tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tile(pub u16);

impl Tile {
    /// Space; what consumed tiles become.
    pub const EMPTY: Self = Self(0);
    /// Plain plating.
    pub const PLATING: Self = Self(1);

    /// Returns true for the empty tile.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Sparse tile grid. Tile `(x, y)` covers `[origin + (x, y), origin + (x + 1, y + 1))`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Grid {
    /// Non-empty tiles keyed by `(x, y)` index.
    #[serde(with = "tile_entries")]
    tiles: BTreeMap<(i32, i32), Tile>,
}

/// Tiles as a list of `((x, y), tile)` entries, since JSON map keys must be strings.
mod tile_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::Tile;

    pub fn serialize<S: Serializer>(
        tiles: &BTreeMap<(i32, i32), Tile>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(tiles)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(i32, i32), Tile>, D::Error> {
        let entries: Vec<((i32, i32), Tile)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

const fn key(index: IVec2) -> (i32, i32) {
    (index.x, index.y)
}

impl Grid {
    /// Creates a rectangular grid of `tile` with `width * height` cells from index (0, 0).
    #[must_use]
    pub fn filled(width: i32, height: i32, tile: Tile) -> Self {
        let tiles = (0..width)
            .flat_map(|x| (0..height).map(move |y| ((x, y), tile)))
            .collect();
        Self { tiles }
    }

    /// Returns the tile at `index` (empty if unset).
    #[must_use]
    pub fn tile(&self, index: IVec2) -> Tile {
        self.tiles.get(&key(index)).copied().unwrap_or(Tile::EMPTY)
    }

    /// Sets a tile; empty tiles are removed from storage.
    pub fn set_tile(&mut self, index: IVec2, tile: Tile) {
        if tile.is_empty() {
            self.tiles.remove(&key(index));
        } else {
            self.tiles.insert(key(index), tile);
        }
    }

    /// Number of non-empty tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Non-empty tiles in index order.
    pub fn iter(&self) -> impl Iterator<Item = (IVec2, Tile)> + '_ {
        self.tiles
            .iter()
            .map(|((x, y), tile)| (IVec2::new(*x, *y), *tile))
    }

    /// Returns the tile index containing a local position.
    #[must_use]
    pub fn index_at(local: Vec2) -> IVec2 {
        local.floor().as_ivec2()
    }

    /// Inclusive bounds of the non-empty tile indices.
    #[must_use]
    pub fn bounds(&self) -> Option<(IVec2, IVec2)> {
        let mut iter = self.iter().map(|(idx, _)| idx);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), idx| (lo.min(idx), hi.max(idx))))
    }

    /// Non-empty tiles whose square touches a circle given in grid-local space.
    #[must_use]
    pub fn tiles_intersecting_circle(&self, center: Vec2, radius: f32) -> Vec<(IVec2, Tile)> {
        let radius_sq = radius * radius;
        self.iter()
            .filter(|(idx, _)| {
                let min = idx.as_vec2();
                let closest = center.clamp(min, min + Vec2::ONE);
                closest.distance_squared(center) <= radius_sq
            })
            .collect()
    }
}

// =============================================================================
// Singularity components
// =============================================================================

/// Consumes entities and tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHorizon {
    /// Area consumption radius; zero disables area waves.
    pub radius: f32,
    /// Time between consume waves.
    pub target_consume_period: Duration,
    /// When the last wave ran.
    pub last_consume_wave_time: Duration,
    /// When the next wave is due.
    pub next_consume_wave_time: Duration,
    /// Whether waves consume entities.
    pub consume_entities: bool,
    /// Whether waves consume tiles.
    pub consume_tiles: bool,
    /// Whether containment may be breached.
    pub can_breach_containment: bool,
    /// Set once another event horizon has started consuming this one.
    pub being_consumed_by_another: bool,
}

impl EventHorizon {
    /// Creates an event horizon with the given radius and a 0.5 s wave period.
    #[must_use]
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            target_consume_period: Duration::from_millis(500),
            last_consume_wave_time: Duration::ZERO,
            next_consume_wave_time: Duration::ZERO,
            consume_entities: true,
            consume_tiles: true,
            can_breach_containment: false,
            being_consumed_by_another: false,
        }
    }

    /// Sets the wave period, builder style.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.target_consume_period = period;
        self
    }
}

/// Pulls nearby dynamic bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GravityWell {
    /// Inner range; closer entities are left alone.
    pub min_range: f32,
    /// Outer range; negative disables the well.
    pub max_range: f32,
    /// Time between capture scans.
    pub target_scan_period: Duration,
    /// When the last scan ran.
    pub last_scan_time: Duration,
    /// When the next scan is due.
    pub next_scan_time: Duration,
    /// Radial acceleration; positive pulls inward.
    pub base_radial_acceleration: f32,
    /// Tangential acceleration; positive swirls counter-clockwise.
    pub base_tangential_acceleration: f32,
    /// Continuous-form matrix, applied to the well-to-entity displacement.
    pub acceleration_matrix: Mat2,
    /// Entities found by the last scan.
    pub captured: BTreeSet<EntityId>,
}

impl GravityWell {
    /// Creates a gravity well.
    #[must_use]
    pub fn new(max_range: f32, radial: f32, tangential: f32) -> Self {
        Self {
            min_range: 0.0,
            max_range,
            target_scan_period: Duration::from_millis(500),
            last_scan_time: Duration::ZERO,
            next_scan_time: Duration::ZERO,
            base_radial_acceleration: radial,
            base_tangential_acceleration: tangential,
            acceleration_matrix: continuous_matrix(radial, tangential),
            captured: BTreeSet::new(),
        }
    }
}

/// Builds `[[-r, -t], [t, -r]]`.
#[must_use]
pub fn continuous_matrix(radial: f32, tangential: f32) -> Mat2 {
    Mat2::from_cols(
        Vec2::new(-radial, tangential),
        Vec2::new(-tangential, -radial),
    )
}

/// Energy-driven state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Singularity {
    /// Stored energy.
    pub energy: f32,
    /// Current level, 1 to 6.
    pub level: u8,
    /// Energy lost per second.
    pub energy_drain: f32,
    /// Minimum time between drain applications.
    pub update_period: Duration,
    /// Time accumulated since the last drain.
    pub time_since_last_update: Duration,
    /// Radiation emitted per level.
    pub rads_per_level: f32,
}

impl Singularity {
    /// Creates a singularity with the given energy. The level is synced at startup.
    #[must_use]
    pub fn new(energy: f32) -> Self {
        Self {
            energy,
            level: 1,
            energy_drain: 1.0,
            update_period: Duration::from_secs(1),
            time_since_last_update: Duration::ZERO,
            rads_per_level: 2.0,
        }
    }
}

/// Bonus energy granted to a singularity that eats this entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingularityFood {
    /// Energy granted.
    pub energy: f32,
}

/// Gravitational lensing shader parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SingularityDistortion {
    /// Lensing intensity.
    pub intensity: f32,
    /// Falloff power.
    pub falloff_power: f32,
}

/// Radiation emitter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RadiationSource {
    /// Emitted intensity.
    pub intensity: f32,
}

/// Random drifting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalk {
    /// Lower push speed.
    pub min_speed: f32,
    /// Upper push speed.
    pub max_speed: f32,
    /// Shortest time between pushes.
    pub min_step_cooldown: Duration,
    /// Longest time between pushes.
    pub max_step_cooldown: Duration,
    /// When the next push is due.
    pub next_step_time: Duration,
    /// Fraction of the previous velocity kept on each push.
    pub accumulator_ratio: f32,
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            min_speed: 7.5,
            max_speed: 10.0,
            min_step_cooldown: Duration::from_secs(2),
            max_step_cooldown: Duration::from_secs(5),
            next_step_time: Duration::ZERO,
            accumulator_ratio: 0.0,
        }
    }
}

// =============================================================================
// Containment
// =============================================================================

/// One segment of a containment field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentField {
    /// Hard segments veto consumption by non-breaching event horizons.
    pub hard: bool,
}

/// Owner record for a generator pair and its field segments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainmentFieldLink {
    /// First generator; segments are attached to it.
    pub generator1: Option<EntityId>,
    /// Second generator.
    pub generator2: Option<EntityId>,
    /// Spawned segments, nearest to `generator1` first.
    pub fields: Vec<EntityId>,
}

/// Cardinal direction for generator connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// +y
    North,
    /// +x
    East,
    /// -y
    South,
    /// -x
    West,
}

impl Direction {
    /// All four cardinals.
    pub const CARDINALS: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Unit vector.
    #[must_use]
    pub const fn to_vec(self) -> Vec2 {
        match self {
            Self::North => Vec2::Y,
            Self::East => Vec2::X,
            Self::South => Vec2::NEG_Y,
            Self::West => Vec2::NEG_X,
        }
    }

    /// Opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }
}

/// One active generator connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConnection {
    /// Generator on the other end.
    pub other: EntityId,
    /// Link entity owning the segments.
    pub link: EntityId,
}

/// Containment field generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentFieldGenerator {
    /// Switched on.
    pub enabled: bool,
    /// Stored power.
    pub power_buffer: i32,
    /// Buffer needed to hold connections.
    pub power_minimum: i32,
    /// Power gained per emitter bolt.
    pub power_received: i32,
    /// Power lost each threshold interval.
    pub power_loss: i32,
    /// Seconds accumulated toward the next loss.
    pub accumulator: f32,
    /// Seconds between losses.
    pub threshold: f32,
    /// Longest connection distance.
    pub max_length: f32,
    /// Layers the connection ray can hit.
    pub collision_mask: CollisionLayer,
    /// At least one connection is active.
    pub is_connected: bool,
    /// Active connections by direction.
    pub connections: BTreeMap<Direction, FieldConnection>,
}

impl Default for ContainmentFieldGenerator {
    fn default() -> Self {
        Self {
            enabled: true,
            power_buffer: 0,
            power_minimum: 6,
            power_received: 3,
            power_loss: 2,
            accumulator: 0.0,
            threshold: 10.0,
            max_length: 8.0,
            collision_mask: CollisionLayer::WALL
                | CollisionLayer::ITEM
                | CollisionLayer::MOB
                | CollisionLayer::SINGULARITY,
            is_connected: false,
            connections: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Component bundle
// =============================================================================

/// Optional components carried by an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct EntityComponents {
    pub body: Option<PhysicsBody>,
    pub event_horizon: Option<EventHorizon>,
    pub gravity_well: Option<GravityWell>,
    pub singularity: Option<Singularity>,
    pub food: Option<SingularityFood>,
    pub containers: Option<ContainerManager>,
    pub grid: Option<Grid>,
    pub containment_field: Option<ContainmentField>,
    pub field_link: Option<ContainmentFieldLink>,
    pub generator: Option<ContainmentFieldGenerator>,
    pub random_walk: Option<RandomWalk>,
    pub distortion: Option<SingularityDistortion>,
    pub radiation: Option<RadiationSource>,
}

impl EntityComponents {
    /// Attaches a physics body.
    #[must_use]
    pub fn with_body(mut self, body: PhysicsBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Attaches an event horizon.
    #[must_use]
    pub fn with_event_horizon(mut self, event_horizon: EventHorizon) -> Self {
        self.event_horizon = Some(event_horizon);
        self
    }

    /// Attaches a gravity well.
    #[must_use]
    pub fn with_gravity_well(mut self, gravity_well: GravityWell) -> Self {
        self.gravity_well = Some(gravity_well);
        self
    }

    /// Attaches a singularity.
    #[must_use]
    pub fn with_singularity(mut self, singularity: Singularity) -> Self {
        self.singularity = Some(singularity);
        self
    }

    /// Marks the entity as singularity food.
    #[must_use]
    pub fn with_food(mut self, energy: f32) -> Self {
        self.food = Some(SingularityFood { energy });
        self
    }

    /// Attaches containers.
    #[must_use]
    pub fn with_containers(mut self, containers: ContainerManager) -> Self {
        self.containers = Some(containers);
        self
    }

    /// Attaches a tile grid.
    #[must_use]
    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Marks the entity as a containment field segment.
    #[must_use]
    pub fn with_containment_field(mut self, hard: bool) -> Self {
        self.containment_field = Some(ContainmentField { hard });
        self
    }

    /// Attaches a field link record.
    #[must_use]
    pub fn with_field_link(mut self, link: ContainmentFieldLink) -> Self {
        self.field_link = Some(link);
        self
    }

    /// Attaches a containment field generator.
    #[must_use]
    pub fn with_generator(mut self, generator: ContainmentFieldGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Attaches a random walk.
    #[must_use]
    pub fn with_random_walk(mut self, random_walk: RandomWalk) -> Self {
        self.random_walk = Some(random_walk);
        self
    }

    /// Attaches distortion parameters.
    #[must_use]
    pub fn with_distortion(mut self) -> Self {
        self.distortion = Some(SingularityDistortion::default());
        self
    }

    /// Attaches a radiation source.
    #[must_use]
    pub fn with_radiation(mut self) -> Self {
        self.radiation = Some(RadiationSource::default());
        self
    }
}
