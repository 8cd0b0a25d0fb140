//! Audio cues requested by the simulation.
//!
//! Playback is the host's job. The simulation only records what it asked for;
//! callers drain the list with
//! [`Simulation::take_audio_cues`](crate::simulation::Simulation::take_audio_cues).

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Looping hum of an active singularity.
pub const SINGULARITY_AMBIENT: &str = "singularity_ambient";
/// One-shot played when a singularity forms.
pub const SINGULARITY_FORMATION: &str = "singularity_form";
/// One-shot played when a singularity dissipates.
pub const SINGULARITY_DISSIPATION: &str = "singularity_collapse";

/// A request to the host's audio system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCue {
    /// Start a loop on an entity.
    PlayLoop {
        /// Emitting entity
        entity: EntityId,
        /// Sound identifier
        sound: String,
    },
    /// Play once at an entity.
    PlayOnce {
        /// Emitting entity
        entity: EntityId,
        /// Sound identifier
        sound: String,
    },
    /// Stop a loop.
    Stop {
        /// Emitting entity
        entity: EntityId,
        /// Sound identifier
        sound: String,
    },
}

impl AudioCue {
    /// Entity the cue belongs to.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::PlayLoop { entity, .. } | Self::PlayOnce { entity, .. } | Self::Stop { entity, .. } => {
                *entity
            }
        }
    }

    /// Sound identifier.
    #[must_use]
    pub fn sound(&self) -> &str {
        match self {
            Self::PlayLoop { sound, .. } | Self::PlayOnce { sound, .. } | Self::Stop { sound, .. } => {
                sound
            }
        }
    }
}
