//! Engines that run the singularity simulation.
//!
//! Each engine is a stateless unit struct whose operations take the
//! [`Simulation`](crate::simulation::Simulation) they act on. Component state
//! lives on entities; engines read and write it through the arena and talk to
//! each other over the event bus.
//!
//! - [`ConsumptionEngine`]: event horizons eating entities, containers and tiles
//! - [`GravityWellEngine`]: continuous gravity, capture scans and pulses
//! - [`SingularityEngine`]: energy, levels and everything derived from them
//! - [`ContainmentFieldEngine`]: generators, power and field segment chains
//! - [`RandomWalkEngine`]: random drifting
//! - [`PhysicsEngine`]: integration and contact detection
//!
//! # Registration
//!
//! [`subscriptions()`] returns every bus subscription the engines need, in the
//! order they must run. [`Simulation::new`](crate::simulation::Simulation::new)
//! registers them.

pub mod containment;
pub mod event_horizon;
pub mod gravity_well;
pub mod physics;
pub mod random_walk;
pub mod singularity;

pub use containment::ContainmentFieldEngine;
pub use event_horizon::ConsumptionEngine;
pub use gravity_well::GravityWellEngine;
pub use physics::{PhysicsEngine, FIXED_DT};
pub use random_walk::RandomWalkEngine;
pub use singularity::SingularityEngine;

use crate::bus::Subscription;

/// All engine subscriptions.
///
/// Vetoes come first so that every `AttemptConsumeEntity` handler sees the
/// final cancellation state of earlier ones.
#[must_use]
pub fn subscriptions() -> Vec<Subscription> {
    let mut all = ContainmentFieldEngine::subscriptions();
    all.extend(ConsumptionEngine::subscriptions());
    all.extend(SingularityEngine::subscriptions());
    all
}
