//! Utility re-exports for the servo coordinator.
//!
//! - `config`: bus settings and per-actuator calibration
//! - `controllers`: the bus contract, the coordination engine and the
//!   Protocol 1.0 adapter
//! - `error`: error taxonomy and the centralized transport check
//! - `math`: position normalization and velocity encoding

pub mod config;
pub mod controllers;
pub mod error;
pub mod math;

pub use config::{ActuatorConfig, ActuatorTable, EngineConfig};
pub use controllers::{CoordinationEngine, MotionCommand};
pub use error::DxlError;
