//! Static configuration: bus settings and per-actuator calibration.
//!
//! Loaded from JSON by the caller and validated once into an
//! [`ActuatorTable`], whose length is the actuator count used everywhere
//! else in the crate.

use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::math::position::DYN_ROTATION_TICKS;

fn default_baud_rate() -> u32 {
    1_000_000
}

fn default_tolerance() -> u16 {
    5
}

fn default_rotation_ticks() -> u16 {
    DYN_ROTATION_TICKS
}

/// Calibration for one servo on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub id: u8,
    /// Added to every raw reading before wrapping into one rotation.
    #[serde(default)]
    pub offset: i32,
    /// Mounting inverts the commanded direction.
    #[serde(default)]
    pub reversed: bool,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    NoActuators,
    DuplicateId(u8),
    ZeroRotationTicks,
    ZeroTolerance,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "bad config JSON: {}", e),
            ConfigError::NoActuators => f.write_str("at least one actuator is required"),
            ConfigError::DuplicateId(id) => write!(f, "actuator id {} listed twice", id),
            ConfigError::ZeroRotationTicks => f.write_str("rotation_ticks must be non-zero"),
            ConfigError::ZeroTolerance => f.write_str("tolerance must be non-zero"),
        }
    }
}

/// Index-aligned, immutable list of actuators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorTable {
    actuators: Vec<ActuatorConfig>,
}

impl ActuatorTable {
    /// Build a table, rejecting empty lists and repeated ids.
    pub fn new(actuators: Vec<ActuatorConfig>) -> Result<Self, ConfigError> {
        if actuators.is_empty() {
            return Err(ConfigError::NoActuators);
        }
        for (i, a) in actuators.iter().enumerate() {
            if actuators[..i].iter().any(|b| b.id == a.id) {
                return Err(ConfigError::DuplicateId(a.id));
            }
        }
        Ok(Self { actuators })
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<&ActuatorConfig> {
        self.actuators.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, ActuatorConfig> {
        self.actuators.iter()
    }

    /// Bus ids in table order.
    pub fn ids(&self) -> Vec<u8> {
        self.actuators.iter().map(|a| a.id).collect()
    }
}

/// Everything the coordination engine needs at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Strict bound on |position - goal| for an actuator to count as arrived.
    #[serde(default = "default_tolerance")]
    pub tolerance: u16,
    #[serde(default = "default_rotation_ticks")]
    pub rotation_ticks: u16,
    pub actuators: Vec<ActuatorConfig>,
}

impl EngineConfig {
    pub fn new(actuators: Vec<ActuatorConfig>) -> Self {
        Self {
            baud_rate: default_baud_rate(),
            tolerance: default_tolerance(),
            rotation_ticks: default_rotation_ticks(),
            actuators,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clone().into_table().map(|_| ())
    }

    /// Validate and split off the actuator table.
    pub fn into_table(self) -> Result<(BusSettings, ActuatorTable), ConfigError> {
        let settings = BusSettings::new(self.baud_rate, self.tolerance, self.rotation_ticks)?;
        let table = ActuatorTable::new(self.actuators)?;
        Ok((settings, table))
    }
}

/// Scalar settings kept by the engine after the table is split off.
///
/// Only constructible through [`BusSettings::new`], so a zero tolerance or
/// rotation size never reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSettings {
    baud_rate: u32,
    tolerance: u16,
    rotation_ticks: u16,
}

impl BusSettings {
    pub fn new(
        baud_rate: u32,
        tolerance: u16,
        rotation_ticks: u16,
    ) -> Result<Self, ConfigError> {
        if rotation_ticks == 0 {
            return Err(ConfigError::ZeroRotationTicks);
        }
        if tolerance == 0 {
            return Err(ConfigError::ZeroTolerance);
        }
        Ok(BusSettings {
            baud_rate,
            tolerance,
            rotation_ticks,
        })
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn tolerance(&self) -> u16 {
        self.tolerance
    }

    pub fn rotation_ticks(&self) -> u16 {
        self.rotation_ticks
    }
}
