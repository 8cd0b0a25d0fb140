//! # Singulo Core
//!
//! Deterministic simulation of singularities, event horizons, gravity wells
//! and containment fields.
//!
//! This crate provides the headless simulation engine: a small entity host
//! (arena, containers, tile grids, circle physics), an event bus, and the
//! engines that react to it.
//!
//! ## Architecture
//!
//! - **Entities**: An [`Arena`] of entities, each carrying a transform and an
//!   optional bundle of components
//! - **Events**: Engines talk through an [`EventBus`]; subscribers are routed
//!   by the components on the event's target and may veto cancellable events
//! - **Engines**: Stateless operations over the [`Simulation`]: consumption,
//!   gravity, singularity growth, containment fields, random walk
//!
//! ## Usage
//!
//! ```
//! use glam::Vec2;
//! use singulo_core::entity::{EntityComponents, EntityTag, PhysicsBody, TransformState};
//! use singulo_core::Simulation;
//!
//! let mut sim = Simulation::with_seed(7);
//! let horizon = sim.config().event_horizon(1.0);
//! let hungry = sim.spawn(
//!     EntityTag::Singularity,
//!     TransformState::at(Vec2::ZERO),
//!     EntityComponents::default().with_event_horizon(horizon),
//! );
//! let rock = sim.spawn(
//!     EntityTag::Item,
//!     TransformState::at(Vec2::new(0.5, 0.0)),
//!     EntityComponents::default().with_body(PhysicsBody::dynamic(1.0, 0.25)),
//! );
//!
//! sim.step();
//! assert!(sim.arena().contains(hungry));
//! assert!(!sim.arena().contains(rock));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod audit;
pub mod bus;
pub mod config;
pub mod entity;
pub mod event;
pub mod presentation;
pub mod simulation;
pub mod systems;

#[cfg(test)]
mod tests;

pub use arena::Arena;
pub use bus::{EventBus, Subscriber, SubscriberDeclaration, Subscription};
pub use config::{ConfigError, SimConfig};
pub use entity::{Entity, EntityId, EntityTag};
pub use event::{Event, EventKind};
pub use simulation::Simulation;
