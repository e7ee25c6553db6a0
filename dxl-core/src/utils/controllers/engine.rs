//! Tick-driven coordination of a synchronized multi-servo move.
//!
//! The driver submits a [`MotionInstruction`] while the engine is idle and
//! then keeps calling [`CoordinationEngine::tick`]. Each tick runs exactly
//! one state's action:
//!
//! ```text
//! Init -> Idle -> SendInstruction -> ReadData <-> EvaluateConvergence
//!          ^                                          |
//!          +---------------- Finished <---------------+
//! ```
//!
//! Any failed bus transaction moves the engine to `Invalid`, where it stays
//! without touching the bus again. A shutdown request is honoured from
//! `Idle` and releases torque before closing the port.

use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use super::bus::{BusAdapter, CommResult, ADDR_MX_VEL_SET};
use crate::utils::{
    config::{ActuatorTable, BusSettings, ConfigError, EngineConfig},
    error::{check_result, DxlError, TransportFault},
    math::position::{encode_velocity, goal_reachable, normalize_position, within_tolerance},
};

/// Lifecycle of the coordination engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineState {
    /// Port not opened yet.
    #[default]
    Init,
    /// Ready for a new instruction.
    Idle,
    SendInstruction,
    ReadData,
    EvaluateConvergence,
    Finished,
    /// Torque released and port closed (or about to be).
    Shutdown,
    /// A bus transaction failed. Needs a fresh engine.
    Invalid,
}

/// Goal positions and velocities, index-aligned with the actuator table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionInstruction {
    pub goal_positions: Vec<u16>,
    pub goal_velocities: Vec<u16>,
}

/// Live state of one actuator during a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorRuntimeState {
    /// Last normalized reading, in `[0, rotation_ticks)`.
    pub current_position: u16,
    /// Arrived and stopped. Only cleared when the next move starts.
    pub finished: bool,
}

/// Synchronized velocity move over one servo bus.
///
/// Ownership of the flags: the driver writes the instruction, the run
/// request and the shutdown request (through `submit_instruction`,
/// `execute_command` and `shutdown`); the engine alone writes the runtime
/// state, the finished flag and the last error.
pub struct CoordinationEngine<B> {
    bus: B,
    actuators: ActuatorTable,
    settings: BusSettings,
    state: EngineState,

    instr: MotionInstruction,
    run_command: bool,
    shutdown_requested: bool,

    runtime: Vec<ActuatorRuntimeState>,
    cmd_finished: bool,
    last_error: Option<DxlError>,
    port_closed: bool,

    /// Torque toggle and velocity batches address every actuator in table order.
    ids: Vec<u8>,
    /// Ids registered for the batched position read during `Init`.
    position_read: Vec<u8>,
    velocity_batch: Vec<u16>,
}

impl<B: BusAdapter> CoordinationEngine<B> {
    /// Build an engine from a validated configuration.
    ///
    /// No bus traffic happens until the first [`tick`](Self::tick).
    pub fn new(
        bus: B,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let (settings, actuators) = config.into_table()?;
        Ok(Self::with_table(bus, settings, actuators))
    }

    pub fn with_table(
        bus: B,
        settings: BusSettings,
        actuators: ActuatorTable,
    ) -> Self {
        let n = actuators.len();
        let ids = actuators.ids();
        CoordinationEngine {
            bus,
            actuators,
            settings,
            state: EngineState::Init,
            instr: MotionInstruction::default(),
            run_command: false,
            shutdown_requested: false,
            runtime: alloc::vec![ActuatorRuntimeState::default(); n],
            cmd_finished: false,
            last_error: None,
            port_closed: false,
            ids,
            position_read: Vec::with_capacity(n),
            velocity_batch: Vec::with_capacity(n),
        }
    }

    /// Store a new move and raise the run request.
    ///
    /// Only accepted while idle with one goal per actuator; anything else
    /// is ignored and `false` is returned so the caller can poll again.
    pub fn submit_instruction(
        &mut self,
        goal_positions: &[u16],
        goal_velocities: &[u16],
    ) -> bool {
        if self.state != EngineState::Idle || self.shutdown_requested {
            tracing::warn!(state = ?self.state, "instruction ignored, engine not idle");
            return false;
        }
        let n = self.actuators.len();
        if goal_positions.len() != n || goal_velocities.len() != n {
            tracing::warn!(
                expected = n,
                positions = goal_positions.len(),
                velocities = goal_velocities.len(),
                "instruction ignored, wrong number of goals"
            );
            return false;
        }
        let (tolerance, ticks) = (self.settings.tolerance(), self.settings.rotation_ticks());
        for (cfg, &goal) in self.actuators.iter().zip(goal_positions) {
            if !goal_reachable(goal, tolerance, ticks) {
                tracing::warn!(id = cfg.id, goal, ticks, "goal outside one rotation, move will not settle");
            }
        }

        self.instr.goal_positions.clear();
        self.instr.goal_positions.extend_from_slice(goal_positions);
        self.instr.goal_velocities.clear();
        self.instr.goal_velocities.extend_from_slice(goal_velocities);
        self.run_command = true;
        true
    }

    /// Request torque release and port close on the next idle tick.
    pub fn shutdown(&mut self) {
        if self.state == EngineState::Invalid {
            tracing::warn!("shutdown requested while invalid, bus left untouched");
        }
        self.shutdown_requested = true;
    }

    /// Advance the state machine by one step.
    #[tracing::instrument(level = "trace", skip_all, fields(state = ?self.state))]
    pub fn tick(&mut self) {
        let step = match self.state {
            EngineState::Init => self.init(),
            EngineState::Idle => Ok(self.idle()),
            EngineState::SendInstruction => self.send_instruction(),
            EngineState::ReadData => self.read_pos_data().map(|()| EngineState::EvaluateConvergence),
            EngineState::EvaluateConvergence => self.compare_pos_data(),
            EngineState::Finished => Ok(self.finish()),
            EngineState::Shutdown => Ok(self.close_bus()),
            EngineState::Invalid => {
                tracing::debug!("Dynamixel interface in invalid state! Errcode = {}", self.last_error_code());
                Ok(EngineState::Invalid)
            }
        };

        match step {
            Ok(next) => {
                if next != self.state {
                    tracing::debug!(from = ?self.state, to = ?next, "state transition");
                }
                self.state = next;
            }
            Err(err) => self.fail(err),
        }
    }

    /// True right after a move completes, until the next idle tick.
    pub fn is_finished(&self) -> bool {
        self.cmd_finished
    }

    /// Idle with no move pending, so a new instruction will be taken.
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Idle && !self.run_command && !self.shutdown_requested
    }

    /// Originating code of the failure that made the engine invalid, or 0.
    pub fn last_error_code(&self) -> i32 {
        self.last_error.map(|e| e.code()).unwrap_or(0)
    }

    pub fn last_error(&self) -> Option<DxlError> {
        self.last_error
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn runtime(&self) -> &[ActuatorRuntimeState] {
        &self.runtime
    }

    pub fn actuators(&self) -> &ActuatorTable {
        &self.actuators
    }

    pub fn instruction(&self) -> &MotionInstruction {
        &self.instr
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Tick until the current move finishes, pausing `period_us` between ticks.
    ///
    /// Returns the number of ticks spent. Fails with the engine's error if it
    /// goes invalid, or with [`DxlError::NotSettled`] after `max_ticks`.
    pub fn run_until_settled<D: DelayNs>(
        &mut self,
        delay: &mut D,
        period_us: u32,
        max_ticks: usize,
    ) -> Result<usize, DxlError> {
        for n in 1..=max_ticks {
            self.tick();
            if self.cmd_finished {
                return Ok(n);
            }
            if let Some(err) = self.last_error {
                return Err(err);
            }
            delay.delay_us(period_us);
        }
        Err(DxlError::NotSettled(max_ticks))
    }

    fn fail(
        &mut self,
        err: DxlError,
    ) {
        tracing::error!(code = err.code(), "{}", err);
        self.last_error = Some(err);
        self.state = EngineState::Invalid;
    }

    fn init(&mut self) -> Result<EngineState, DxlError> {
        if !self.bus.open() {
            return Err(DxlError::PortOpenFailed);
        }
        tracing::info!("Successfully opened port");

        if !self.bus.set_baud_rate(self.settings.baud_rate()) {
            return Err(DxlError::BaudSetFailed(self.settings.baud_rate()));
        }
        tracing::info!(baud = self.settings.baud_rate(), "Successfully set baud rate");

        let res = self.bus.enable_torque_batch(&self.ids);
        check_result(0, res)?;
        tracing::info!(count = self.ids.len(), "torque enabled");

        // The read list never changes, so it is registered once here.
        self.position_read.clear();
        self.position_read.extend_from_slice(&self.ids);

        Ok(EngineState::Idle)
    }

    fn idle(&mut self) -> EngineState {
        self.cmd_finished = false;

        if self.shutdown_requested {
            EngineState::Shutdown
        } else if self.run_command {
            EngineState::SendInstruction
        } else {
            EngineState::Idle
        }
    }

    fn send_instruction(&mut self) -> Result<EngineState, DxlError> {
        self.run_command = false;
        for rt in self.runtime.iter_mut() {
            *rt = ActuatorRuntimeState::default();
        }
        tracing::info!(
            goals = ?self.instr.goal_positions,
            velocities = ?self.instr.goal_velocities,
            "starting move"
        );

        self.run_velocity_command()?;
        Ok(EngineState::ReadData)
    }

    /// Batched velocity write for every actuator, reversal applied.
    fn run_velocity_command(&mut self) -> Result<(), DxlError> {
        self.velocity_batch.clear();
        for (cfg, &vel) in self.actuators.iter().zip(self.instr.goal_velocities.iter()) {
            self.velocity_batch.push(encode_velocity(vel, cfg.reversed));
        }

        let res = self.bus.write_velocity_batch(&self.ids, &self.velocity_batch);
        self.velocity_batch.clear();

        check_result(0, res).map_err(DxlError::VelocityCommandError)
    }

    /// Batched position read, offset and wrapped per actuator.
    fn read_pos_data(&mut self) -> Result<(), DxlError> {
        let res = self.bus.read_position_batch(&self.position_read);
        check_result(0, res).map_err(DxlError::PositionReadError)?;

        let ticks = self.settings.rotation_ticks();
        for (rt, cfg) in self.runtime.iter_mut().zip(self.actuators.iter()) {
            let raw = self.bus.position(cfg.id).ok_or_else(|| {
                tracing::debug!(id = cfg.id, "no position data in batch reply");
                DxlError::PositionReadError(TransportFault::Communication(CommResult::RxCorrupt))
            })?;
            rt.current_position = normalize_position(raw, cfg.offset, ticks);
        }
        tracing::trace!(positions = ?self.runtime, "positions read");

        Ok(())
    }

    /// Stop every actuator that reached its goal; finish once all have.
    fn compare_pos_data(&mut self) -> Result<EngineState, DxlError> {
        let tolerance = self.settings.tolerance();
        for (i, cfg) in self.actuators.iter().enumerate() {
            let rt = &mut self.runtime[i];
            if rt.finished {
                continue;
            }

            let goal = self.instr.goal_positions[i];
            if within_tolerance(rt.current_position, goal, tolerance) {
                rt.finished = true;
                tracing::debug!(id = cfg.id, position = rt.current_position, goal, "actuator arrived");

                let (dxl_err, res) = self.bus.write_single(cfg.id, ADDR_MX_VEL_SET, 0);
                check_result(dxl_err, res).map_err(DxlError::VelocityCommandError)?;
            }
        }

        if self.runtime.iter().all(|rt| rt.finished) {
            Ok(EngineState::Finished)
        } else {
            Ok(EngineState::ReadData)
        }
    }

    fn finish(&mut self) -> EngineState {
        self.cmd_finished = true;
        tracing::info!("move finished");
        EngineState::Idle
    }

    fn close_bus(&mut self) -> EngineState {
        if self.port_closed {
            return EngineState::Shutdown;
        }

        let res = self.bus.disable_torque_batch(&self.ids);
        if let Err(fault) = check_result(0, res) {
            tracing::warn!(%fault, "torque disable failed during shutdown");
        }
        self.bus.close();
        self.port_closed = true;
        tracing::info!("torque released, port closed");

        EngineState::Shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_init() {
        assert_eq!(EngineState::default(), EngineState::Init);
    }

    #[test]
    fn test_instruction_json_shape() {
        let instr: MotionInstruction =
            serde_json::from_str(r#"{"goal_positions":[1,2],"goal_velocities":[3,4]}"#).unwrap();
        assert_eq!(instr.goal_positions, [1, 2]);
        assert_eq!(instr.goal_velocities, [3, 4]);
    }
}
