//! Module Exports
//!
//! This file exports the modules that drive the servo bus.
//!
//! - `bus`: the `BusAdapter` contract and control-table addresses.
//! - `engine`: the tick-driven coordination state machine.
//! - `protocol`: a Protocol 1.0 `BusAdapter` over a serial link.

pub mod bus;
pub mod engine;
pub mod protocol;

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

pub use bus::{BusAdapter, CommResult};
pub use engine::{ActuatorRuntimeState, CoordinationEngine, EngineState, MotionInstruction};
pub use protocol::{Protocol1Bus, SerialLink};

/// Driver commands, serialized as JSON with tag `"mc"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mc", rename_all = "snake_case")] // mc = motion command
pub enum MotionCommand {
    /// Start a synchronized move: goal positions `p`, goal velocities `v`.
    Move { p: Vec<u16>, v: Vec<u16> },
    /// Release torque and close the port once idle.
    Shutdown,
}

impl<B: BusAdapter> CoordinationEngine<B> {
    /// Dispatch a `MotionCommand`. Returns whether it was accepted.
    pub fn execute_command(
        &mut self,
        command: MotionCommand,
    ) -> bool {
        tracing::info!("Received motion command: {:?}", command);
        match command {
            MotionCommand::Move { p, v } => self.submit_instruction(&p, &v),
            MotionCommand::Shutdown => {
                self.shutdown();
                true
            }
        }
    }
}
