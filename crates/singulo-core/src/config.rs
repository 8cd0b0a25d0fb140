//! Simulation configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```
//! use singulo_core::config::SimConfig;
//!
//! let config = SimConfig::from_json_str(r#"{ "seed": 7, "physics": { "substeps": 2 } }"#)
//!     .expect("valid config");
//! assert_eq!(config.seed, 7);
//! assert_eq!(config.physics.substeps, 2);
//! assert!((config.singularity.base_tile_energy - 1.0).abs() < f32::EPSILON);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EventHorizon, GravityWell, Singularity};
use crate::systems::physics::FIXED_DT;

/// Errors raised while loading a [`SimConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The JSON was malformed or had the wrong shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value was out of range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the simulation RNG.
    pub seed: u64,
    /// Physics step settings.
    pub physics: PhysicsConfig,
    /// Singularity energy tuning.
    pub singularity: SingularityTuning,
    /// Event horizon defaults.
    pub event_horizon: EventHorizonDefaults,
    /// Gravity well defaults.
    pub gravity_well: GravityWellDefaults,
}

/// Physics step settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Seconds per tick.
    pub dt: f32,
    /// Physics substeps per tick.
    pub substeps: u32,
    /// Velocity fraction lost per second by bodies on the ground.
    pub ground_friction: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            dt: FIXED_DT,
            substeps: 1,
            ground_friction: 1.5,
        }
    }
}

/// Singularity energy and level tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingularityTuning {
    /// Energy gained from a plain entity.
    pub base_entity_energy: f32,
    /// Energy gained per tile.
    pub base_tile_energy: f32,
    /// Gravity well range per level above zero.
    pub gravity_range_per_level: f32,
    /// Radial gravity acceleration per level.
    pub gravity_acceleration_per_level: f32,
    /// Lowest level that can breach containment.
    pub breach_level: u8,
    /// Radiation emitted per level.
    pub rads_per_level: f32,
    /// Seconds between energy drains.
    pub update_period_secs: f32,
}

impl Default for SingularityTuning {
    fn default() -> Self {
        Self {
            base_entity_energy: 1.0,
            base_tile_energy: 1.0,
            gravity_range_per_level: 2.0,
            gravity_acceleration_per_level: 10.0,
            breach_level: 5,
            rads_per_level: 2.0,
            update_period_secs: 1.0,
        }
    }
}

/// Event horizon defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventHorizonDefaults {
    /// Seconds between consume waves.
    pub consume_period_secs: f32,
}

impl Default for EventHorizonDefaults {
    fn default() -> Self {
        Self {
            consume_period_secs: 0.5,
        }
    }
}

/// Gravity well defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityWellDefaults {
    /// Seconds between capture scans.
    pub scan_period_secs: f32,
    /// Inner range below which nothing is pulled.
    pub min_range: f32,
}

impl Default for GravityWellDefaults {
    fn default() -> Self {
        Self {
            scan_period_secs: 0.5,
            min_range: 0.0,
        }
    }
}

impl SimConfig {
    /// Default configuration with a specific seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`SimConfig::from_json_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), seed = config.seed, "loaded config");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("physics.dt", self.physics.dt)?;
        if self.physics.substeps == 0 {
            return Err(invalid("physics.substeps", "must be at least 1"));
        }
        non_negative("physics.ground_friction", self.physics.ground_friction)?;

        let s = &self.singularity;
        non_negative("singularity.base_entity_energy", s.base_entity_energy)?;
        non_negative("singularity.base_tile_energy", s.base_tile_energy)?;
        non_negative("singularity.gravity_range_per_level", s.gravity_range_per_level)?;
        non_negative("singularity.rads_per_level", s.rads_per_level)?;
        positive("singularity.update_period_secs", s.update_period_secs)?;
        if !(1..=6).contains(&s.breach_level) {
            return Err(invalid(
                "singularity.breach_level",
                format!("{} is outside 1..=6", s.breach_level),
            ));
        }

        positive(
            "event_horizon.consume_period_secs",
            self.event_horizon.consume_period_secs,
        )?;
        positive("gravity_well.scan_period_secs", self.gravity_well.scan_period_secs)?;
        non_negative("gravity_well.min_range", self.gravity_well.min_range)?;
        Ok(())
    }

    /// Duration of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(self.physics.dt)
    }

    /// Event horizon using the configured wave period.
    #[must_use]
    pub fn event_horizon(&self, radius: f32) -> EventHorizon {
        EventHorizon::new(radius)
            .with_period(Duration::from_secs_f32(self.event_horizon.consume_period_secs))
    }

    /// Gravity well using the configured scan period and inner range.
    ///
    /// Range and acceleration are overwritten by the singularity's level
    /// when the well belongs to one.
    #[must_use]
    pub fn gravity_well(&self, max_range: f32, radial: f32, tangential: f32) -> GravityWell {
        GravityWell {
            min_range: self.gravity_well.min_range,
            target_scan_period: Duration::from_secs_f32(self.gravity_well.scan_period_secs),
            ..GravityWell::new(max_range, radial, tangential)
        }
    }

    /// Singularity using the configured drain period and radiation.
    #[must_use]
    pub fn singularity(&self, energy: f32) -> Singularity {
        Singularity {
            update_period: Duration::from_secs_f32(self.singularity.update_period_secs),
            rads_per_level: self.singularity.rads_per_level,
            ..Singularity::new(energy)
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} must be positive")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} must not be negative")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.physics.dt - FIXED_DT).abs() < f32::EPSILON);
        assert_eq!(config.singularity.breach_level, 5);
    }

    #[test]
    fn empty_object_is_default() {
        let config = SimConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let err = SimConfig::from_json_str(r#"{ "physics": { "dt": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "physics.dt", .. }));

        let err =
            SimConfig::from_json_str(r#"{ "singularity": { "breach_level": 9 } }"#).unwrap_err();
        assert!(err.to_string().contains("breach_level"));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = SimConfig::from_json_str("{ seed: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SimConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn component_factories_use_tuning() {
        let mut config = SimConfig::default();
        config.event_horizon.consume_period_secs = 2.0;
        config.singularity.rads_per_level = 5.0;

        assert_eq!(
            config.event_horizon(1.0).target_consume_period,
            Duration::from_secs(2)
        );
        assert!((config.singularity(0.0).rads_per_level - 5.0).abs() < f32::EPSILON);
        assert_eq!(
            config.gravity_well(4.0, 1.0, 0.0).target_scan_period,
            Duration::from_millis(500)
        );
    }
}
