//! Publish/subscribe event bus.
//!
//! Systems never call each other directly when reacting to state changes.
//! Instead they subscribe to [`Event`]s on the [`EventBus`], keyed by event
//! kind plus the tags and components the target entity must carry. This keeps
//! the singularity, event horizon, gravity well and containment systems
//! decoupled even though their behaviors feed into each other.
//!
//! # Subscriber Declaration
//!
//! Each subscriber declares:
//! - Its unique identifier ([`SubscriberId`])
//! - The event kinds it listens for
//! - Tags the target must have one of (empty means any)
//! - Components the target must carry all of
//!
//! # Dispatch
//!
//! Dispatch visits subscribers in registration order. The target is
//! re-checked before every subscriber, so a subscriber that strips a
//! component stops later subscribers that require it.
//!
//! # Example
//!
//! ```
//! use singulo_core::bus::{EventBus, Subscription, SubscriberDeclaration};
//! use singulo_core::event::{Event, EventKind, SubscriberId};
//! use singulo_core::entity::ComponentKind;
//! use singulo_core::simulation::Simulation;
//! use std::sync::Arc;
//!
//! fn veto_everything(_sim: &mut Simulation, event: &mut Event) {
//!     event.cancel();
//! }
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(Arc::new(Subscription::new(
//!     SubscriberDeclaration {
//!         id: SubscriberId::new("veto"),
//!         listens: vec![EventKind::AttemptConsumeEntity],
//!         required_tags: vec![],
//!         requires: vec![ComponentKind::Physics],
//!     },
//!     veto_everything,
//! )));
//! assert_eq!(bus.len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::entity::{ComponentKind, EntityTag};
use crate::event::{Event, EventKind, SubscriberId};
use crate::simulation::Simulation;

// =============================================================================
// Subscriber Declaration
// =============================================================================

/// What a subscriber listens for and which targets it applies to.
#[derive(Debug, Clone)]
pub struct SubscriberDeclaration {
    /// Unique identifier for this subscriber.
    pub id: SubscriberId,
    /// Event kinds this subscriber handles.
    pub listens: Vec<EventKind>,
    /// The target must carry one of these tags. Empty accepts any tag.
    pub required_tags: Vec<EntityTag>,
    /// The target must carry all of these components.
    pub requires: Vec<ComponentKind>,
}

impl SubscriberDeclaration {
    /// Declaration listening for one event kind on targets with the given components.
    #[must_use]
    pub fn on(id: &str, kind: EventKind, requires: &[ComponentKind]) -> Self {
        Self {
            id: SubscriberId::new(id),
            listens: vec![kind],
            required_tags: Vec::new(),
            requires: requires.to_vec(),
        }
    }

    /// Restricts the declaration to targets with one of `tags`, builder style.
    #[must_use]
    pub fn for_tags(mut self, tags: &[EntityTag]) -> Self {
        self.required_tags = tags.to_vec();
        self
    }

    /// Checks if this subscriber listens for the given kind.
    #[must_use]
    pub fn listens_to(&self, kind: EventKind) -> bool {
        self.listens.contains(&kind)
    }

    /// Checks if this subscriber accepts a target tag.
    #[must_use]
    pub fn supports_tag(&self, tag: EntityTag) -> bool {
        self.required_tags.is_empty() || self.required_tags.contains(&tag)
    }
}

// =============================================================================
// Subscriber Trait
// =============================================================================

/// Reacts to events on the bus.
///
/// Subscribers get full mutable access to the simulation. They may raise
/// further events (dispatch is re-entrant) or queue deferred ones with
/// [`Simulation::queue_event`].
pub trait Subscriber: Send + Sync {
    /// Returns the subscriber's declaration.
    fn declaration(&self) -> &SubscriberDeclaration;

    /// Handles one event whose target matched the declaration.
    fn handle(&self, sim: &mut Simulation, event: &mut Event);
}

/// Handler signature used by [`Subscription`].
pub type Handler = fn(&mut Simulation, &mut Event);

/// A [`Subscriber`] backed by a plain function.
pub struct Subscription {
    declaration: SubscriberDeclaration,
    handler: Handler,
}

impl Subscription {
    /// Creates a subscription.
    #[must_use]
    pub fn new(declaration: SubscriberDeclaration, handler: Handler) -> Self {
        Self {
            declaration,
            handler,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.declaration.id)
            .finish_non_exhaustive()
    }
}

impl Subscriber for Subscription {
    fn declaration(&self) -> &SubscriberDeclaration {
        &self.declaration
    }

    fn handle(&self, sim: &mut Simulation, event: &mut Event) {
        (self.handler)(sim, event);
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Ordered registry of subscribers.
#[derive(Default, Clone)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber.
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Appends a batch of function-backed subscriptions.
    pub fn subscribe_all(&mut self, subscriptions: Vec<Subscription>) {
        for subscription in subscriptions {
            self.subscribe(Arc::new(subscription));
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true if no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Returns true if a subscriber with this ID is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.subscribers
            .iter()
            .any(|s| s.declaration().id.as_str() == id)
    }

    /// Delivers an event to every matching subscriber, in registration order.
    ///
    /// A subscriber matches when it listens for the event's kind and the
    /// target entity exists, carries one of its required tags, and carries all
    /// of its required components.
    pub fn dispatch(&self, sim: &mut Simulation, event: &mut Event) {
        let kind = event.kind();
        for subscriber in &self.subscribers {
            let decl = subscriber.declaration();
            if !decl.listens_to(kind) {
                continue;
            }
            let matches = sim
                .arena()
                .get(event.target())
                .is_some_and(|e| decl.supports_tag(e.tag()) && e.has_all(&decl.requires));
            if matches {
                subscriber.handle(sim, event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self
            .subscribers
            .iter()
            .map(|s| s.declaration().id.as_str())
            .collect();
        f.debug_struct("EventBus").field("subscribers", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityComponents, EntityId, PhysicsBody, TransformState};
    use glam::Vec2;

    fn veto(_sim: &mut Simulation, event: &mut Event) {
        event.cancel();
    }

    fn veto_subscription(tags: &[EntityTag], requires: &[ComponentKind]) -> Subscription {
        Subscription::new(
            SubscriberDeclaration::on("test.veto", EventKind::AttemptConsumeEntity, requires)
                .for_tags(tags),
            veto,
        )
    }

    #[test]
    fn bus_is_object_safe() {
        fn _accepts(_s: &[Arc<dyn Subscriber>]) {}
    }

    mod declaration_tests {
        use super::*;

        #[test]
        fn empty_tags_accept_everything() {
            let decl = SubscriberDeclaration::on("x", EventKind::StartCollide, &[]);
            assert!(decl.supports_tag(EntityTag::Item));
            assert!(decl.listens_to(EventKind::StartCollide));
            assert!(!decl.listens_to(EventKind::EntityTerminating));
        }

        #[test]
        fn tag_filter() {
            let decl = SubscriberDeclaration::on("x", EventKind::StartCollide, &[])
                .for_tags(&[EntityTag::Ghost]);
            assert!(decl.supports_tag(EntityTag::Ghost));
            assert!(!decl.supports_tag(EntityTag::Item));
        }
    }

    mod dispatch_tests {
        use super::*;

        fn sim_with(subscription: Subscription) -> Simulation {
            let mut sim = Simulation::bare(0);
            sim.subscribe(Arc::new(subscription));
            sim
        }

        #[test]
        fn routes_by_component() {
            let mut sim = sim_with(veto_subscription(&[], &[ComponentKind::Physics]));
            let with_body = sim.spawn(
                EntityTag::Item,
                TransformState::at(Vec2::ZERO),
                EntityComponents::default().with_body(PhysicsBody::dynamic(1.0, 0.5)),
            );
            let without = sim.spawn(
                EntityTag::Item,
                TransformState::at(Vec2::ZERO),
                EntityComponents::default(),
            );

            let hungry = EntityId::new(999);
            assert!(sim.raise(Event::attempt_consume(with_body, hungry)).is_cancelled());
            assert!(!sim.raise(Event::attempt_consume(without, hungry)).is_cancelled());
        }

        #[test]
        fn routes_by_tag() {
            let mut sim = sim_with(veto_subscription(&[EntityTag::Ghost], &[]));
            let ghost = sim.spawn(
                EntityTag::Ghost,
                TransformState::at(Vec2::ZERO),
                EntityComponents::default(),
            );
            let item = sim.spawn(
                EntityTag::Item,
                TransformState::at(Vec2::ZERO),
                EntityComponents::default(),
            );
            let hungry = EntityId::new(999);
            assert!(sim.raise(Event::attempt_consume(ghost, hungry)).is_cancelled());
            assert!(!sim.raise(Event::attempt_consume(item, hungry)).is_cancelled());
        }

        #[test]
        fn missing_targets_reach_nobody() {
            let mut sim = sim_with(veto_subscription(&[], &[]));
            let event = sim.raise(Event::attempt_consume(EntityId::new(42), EntityId::new(1)));
            assert!(!event.is_cancelled());
        }
    }
}
