//! Events carried by the [`EventBus`](crate::bus::EventBus).
//!
//! Every event is directed at a target entity (see [`Event::target`]). The bus
//! routes it to subscribers that listen for its [`EventKind`] and whose tag and
//! component requirements the target satisfies.
//!
//! # Cancellable events
//!
//! [`Event::AttemptConsumeEntity`] is a pre-notification: any subscriber may
//! call [`Event::cancel`], and the caller reads the verdict back with
//! [`Event::is_cancelled`] once dispatch returns. Cancelling never rolls
//! anything back because nothing is mutated during the check.
//!
//! # Example
//!
//! ```
//! use singulo_core::event::{Event, EventKind};
//! use singulo_core::entity::EntityId;
//!
//! let mut attempt = Event::attempt_consume(EntityId::new(2), EntityId::new(1));
//! assert_eq!(attempt.kind(), EventKind::AttemptConsumeEntity);
//! assert_eq!(attempt.target(), EntityId::new(2));
//!
//! attempt.cancel();
//! assert!(attempt.is_cancelled());
//! ```

use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{ContainerRef, EntityId};

// =============================================================================
// Subscriber Identification
// =============================================================================

/// Unique identifier for a subscriber on the bus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Creates a new subscriber ID.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Something that happened, or is about to happen, to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// An event horizon wants to consume `morsel`. Cancellable.
    AttemptConsumeEntity {
        /// Entity that would be consumed (the target)
        morsel: EntityId,
        /// Event horizon attempting the consumption
        hungry: EntityId,
        /// Set by any subscriber to veto
        cancelled: bool,
    },
    /// `hungry` consumed `morsel`. Directed at `hungry`.
    EntityConsumedByEventHorizon {
        /// Event horizon that ate (the target)
        hungry: EntityId,
        /// Entity that was eaten
        morsel: EntityId,
        /// Innermost container of the morsel that is not itself being consumed
        outer_container: Option<ContainerRef>,
    },
    /// `morsel` was consumed by `hungry`. Directed at `morsel`.
    EventHorizonConsumedEntity {
        /// Entity that was eaten (the target)
        morsel: EntityId,
        /// Event horizon that ate
        hungry: EntityId,
        /// Innermost container of the morsel that is not itself being consumed
        outer_container: Option<ContainerRef>,
    },
    /// `hungry` is about to turn `tiles` of `grid` into space. Directed at `hungry`.
    TilesConsumedByEventHorizon {
        /// Event horizon that ate (the target)
        hungry: EntityId,
        /// Grid hosting the tiles
        grid: EntityId,
        /// Tile indices being consumed
        tiles: Vec<IVec2>,
    },
    /// A singularity changed level. `old_level == new_level` on startup sync.
    SingularityLevelChanged {
        /// Singularity (the target)
        singularity: EntityId,
        /// Level after the change
        new_level: u8,
        /// Level before the change
        old_level: u8,
    },
    /// `entity` finished being inserted into `container`.
    EntInsertedIntoContainer {
        /// Inserted entity (the target)
        entity: EntityId,
        /// Container it now occupies
        container: ContainerRef,
    },
    /// `entity` left `container`.
    EntRemovedFromContainer {
        /// Removed entity (the target)
        entity: EntityId,
        /// Container it left
        container: ContainerRef,
    },
    /// Deferred follow-up to an event horizon being inserted into a container.
    EventHorizonContained {
        /// Contained event horizon (the target)
        entity: EntityId,
        /// Container it was inserted into
        container: ContainerRef,
    },
    /// Two bodies started touching. Raised once for each side.
    StartCollide {
        /// Body this copy of the event is directed at (the target)
        ours: EntityId,
        /// Body on the other side
        other: EntityId,
    },
    /// Components were started. `fresh` is false when reloading existing state.
    ComponentStartup {
        /// Started entity (the target)
        entity: EntityId,
        /// True for a genuine new spawn
        fresh: bool,
    },
    /// Components are shutting down. `genuine` is false when unloading state.
    ComponentShutdown {
        /// Entity shutting down (the target)
        entity: EntityId,
        /// True for a genuine in-world destruction
        genuine: bool,
    },
    /// An entity was anchored to or unanchored from its tile.
    AnchorStateChanged {
        /// Entity whose anchoring changed (the target)
        entity: EntityId,
        /// New state
        anchored: bool,
    },
    /// An entity is about to be removed from the arena.
    EntityTerminating {
        /// Dying entity (the target)
        entity: EntityId,
    },
}

impl Event {
    /// Creates an uncancelled consumption attempt.
    #[must_use]
    pub const fn attempt_consume(morsel: EntityId, hungry: EntityId) -> Self {
        Self::AttemptConsumeEntity {
            morsel,
            hungry,
            cancelled: false,
        }
    }

    /// Returns the routing kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::AttemptConsumeEntity { .. } => EventKind::AttemptConsumeEntity,
            Self::EntityConsumedByEventHorizon { .. } => EventKind::EntityConsumedByEventHorizon,
            Self::EventHorizonConsumedEntity { .. } => EventKind::EventHorizonConsumedEntity,
            Self::TilesConsumedByEventHorizon { .. } => EventKind::TilesConsumedByEventHorizon,
            Self::SingularityLevelChanged { .. } => EventKind::SingularityLevelChanged,
            Self::EntInsertedIntoContainer { .. } => EventKind::EntInsertedIntoContainer,
            Self::EntRemovedFromContainer { .. } => EventKind::EntRemovedFromContainer,
            Self::EventHorizonContained { .. } => EventKind::EventHorizonContained,
            Self::StartCollide { .. } => EventKind::StartCollide,
            Self::ComponentStartup { .. } => EventKind::ComponentStartup,
            Self::ComponentShutdown { .. } => EventKind::ComponentShutdown,
            Self::AnchorStateChanged { .. } => EventKind::AnchorStateChanged,
            Self::EntityTerminating { .. } => EventKind::EntityTerminating,
        }
    }

    /// Returns the entity this event is directed at.
    #[must_use]
    pub const fn target(&self) -> EntityId {
        match self {
            Self::AttemptConsumeEntity { morsel, .. }
            | Self::EventHorizonConsumedEntity { morsel, .. } => *morsel,
            Self::EntityConsumedByEventHorizon { hungry, .. }
            | Self::TilesConsumedByEventHorizon { hungry, .. } => *hungry,
            Self::SingularityLevelChanged { singularity, .. } => *singularity,
            Self::EntInsertedIntoContainer { entity, .. }
            | Self::EntRemovedFromContainer { entity, .. }
            | Self::EventHorizonContained { entity, .. }
            | Self::ComponentStartup { entity, .. }
            | Self::ComponentShutdown { entity, .. }
            | Self::AnchorStateChanged { entity, .. }
            | Self::EntityTerminating { entity } => *entity,
            Self::StartCollide { ours, .. } => *ours,
        }
    }

    /// Vetoes a cancellable event. No effect on other events.
    pub fn cancel(&mut self) {
        if let Self::AttemptConsumeEntity { cancelled, .. } = self {
            *cancelled = true;
        }
    }

    /// Returns true if a cancellable event was vetoed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::AttemptConsumeEntity { cancelled: true, .. })
    }
}

/// Event kind for subscriber routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum EventKind {
    AttemptConsumeEntity,
    EntityConsumedByEventHorizon,
    EventHorizonConsumedEntity,
    TilesConsumedByEventHorizon,
    SingularityLevelChanged,
    EntInsertedIntoContainer,
    EntRemovedFromContainer,
    EventHorizonContained,
    StartCollide,
    ComponentStartup,
    ComponentShutdown,
    AnchorStateChanged,
    EntityTerminating,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_follow_direction() {
        let hungry = EntityId::new(1);
        let morsel = EntityId::new(2);

        let consumed = Event::EntityConsumedByEventHorizon {
            hungry,
            morsel,
            outer_container: None,
        };
        let consumed_by = Event::EventHorizonConsumedEntity {
            morsel,
            hungry,
            outer_container: None,
        };
        assert_eq!(consumed.target(), hungry);
        assert_eq!(consumed_by.target(), morsel);
        assert_eq!(Event::attempt_consume(morsel, hungry).target(), morsel);
    }

    #[test]
    fn only_attempts_can_be_cancelled() {
        let mut startup = Event::ComponentStartup {
            entity: EntityId::new(1),
            fresh: true,
        };
        startup.cancel();
        assert!(!startup.is_cancelled());

        let mut attempt = Event::attempt_consume(EntityId::new(1), EntityId::new(2));
        assert!(!attempt.is_cancelled());
        attempt.cancel();
        attempt.cancel();
        assert!(attempt.is_cancelled());
    }

    #[test]
    fn subscriber_id_display() {
        let id = SubscriberId::from("event_horizon.immunity");
        assert_eq!(id.to_string(), "event_horizon.immunity");
        assert_eq!(id.as_str(), "event_horizon.immunity");
    }
}
