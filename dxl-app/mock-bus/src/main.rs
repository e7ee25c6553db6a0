use clap::Parser;
use dxl_core::utils::config::{ActuatorConfig, EngineConfig};
use dxl_core::utils::controllers::bus::{ADDR_MX_TORQUE_EN, ADDR_MX_VEL_SET, BusAdapter, CommResult};
use dxl_core::utils::controllers::{CoordinationEngine, EngineState, MotionCommand};
use dxl_core::utils::math::position::REVERSE_DIRECTION_OFFSET;
use embedded_hal_mock::eh1::delay::StdSleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Path to an engine config JSON file (defaults to a two-wheel rig)
    #[clap(long)]
    config: Option<String>,
    /// Motion command as JSON, e.g. '{"mc":"move","p":[1024,3000],"v":[300,300]}'.
    /// Repeat to queue several moves.
    #[clap(long = "cmd")]
    commands: Vec<String>,
    /// Pause between engine ticks, in microseconds
    #[clap(long, default_value_t = 2_000)]
    period_us: u32,
    /// Give up on a move after this many ticks
    #[clap(long, default_value_t = 20_000)]
    max_ticks: usize,
    /// Simulated travel per position read, in ticks
    #[clap(long, default_value_t = 8)]
    step: u16,
}

/// One simulated MX servo in wheel mode.
struct SimServo {
    id: u8,
    raw: u16,
    speed: u16,
    torque: bool,
}

impl SimServo {
    /// Advance by `step` ticks in the commanded direction.
    fn advance(
        &mut self,
        step: u16,
        rotation_ticks: u16,
    ) {
        let magnitude = self.speed & (REVERSE_DIRECTION_OFFSET - 1);
        if !self.torque || magnitude == 0 {
            return;
        }
        let ticks = i32::from(rotation_ticks);
        let delta = if self.speed & REVERSE_DIRECTION_OFFSET != 0 {
            -i32::from(step)
        } else {
            i32::from(step)
        };
        self.raw = (i32::from(self.raw) + delta).rem_euclid(ticks) as u16;
    }
}

/// Bus that moves its servos a little on every batched read.
struct SimBus {
    servos: Vec<SimServo>,
    step: u16,
    rotation_ticks: u16,
    is_open: bool,
}

impl SimBus {
    fn new(
        config: &EngineConfig,
        step: u16,
    ) -> Self {
        SimBus {
            servos: config
                .actuators
                .iter()
                .map(|a| SimServo {
                    id: a.id,
                    raw: 0,
                    speed: 0,
                    torque: false,
                })
                .collect(),
            step,
            rotation_ticks: config.rotation_ticks,
            is_open: false,
        }
    }

    fn servo_mut(
        &mut self,
        id: u8,
    ) -> Option<&mut SimServo> {
        self.servos.iter_mut().find(|s| s.id == id)
    }

    fn set_torque(
        &mut self,
        ids: &[u8],
        enable: bool,
    ) -> CommResult {
        if !self.is_open {
            return CommResult::PortBusy;
        }
        for &id in ids {
            if let Some(servo) = self.servo_mut(id) {
                servo.torque = enable;
            }
        }
        CommResult::Success
    }
}

impl BusAdapter for SimBus {
    fn open(&mut self) -> bool {
        self.is_open = true;
        true
    }

    fn set_baud_rate(
        &mut self,
        baud_rate: u32,
    ) -> bool {
        info!(baud_rate, "simulated baud rate");
        true
    }

    fn enable_torque_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult {
        self.set_torque(ids, true)
    }

    fn disable_torque_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult {
        self.set_torque(ids, false)
    }

    fn write_velocity_batch(
        &mut self,
        ids: &[u8],
        values: &[u16],
    ) -> CommResult {
        if !self.is_open {
            return CommResult::PortBusy;
        }
        for (&id, &value) in ids.iter().zip(values) {
            if let Some(servo) = self.servo_mut(id) {
                servo.speed = value;
            }
        }
        CommResult::Success
    }

    fn read_position_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult {
        if !self.is_open {
            return CommResult::PortBusy;
        }
        let (step, ticks) = (self.step, self.rotation_ticks);
        for servo in self.servos.iter_mut().filter(|s| ids.contains(&s.id)) {
            servo.advance(step, ticks);
        }
        CommResult::Success
    }

    fn position(
        &self,
        id: u8,
    ) -> Option<u16> {
        self.servos.iter().find(|s| s.id == id).map(|s| s.raw)
    }

    fn write_single(
        &mut self,
        id: u8,
        address: u8,
        value: u16,
    ) -> (u8, CommResult) {
        if !self.is_open {
            return (0, CommResult::PortBusy);
        }
        let Some(servo) = self.servo_mut(id) else {
            return (0, CommResult::RxTimeout);
        };
        match address {
            ADDR_MX_VEL_SET => servo.speed = value,
            ADDR_MX_TORQUE_EN => servo.torque = value != 0,
            _ => warn!(id, address, "write to unsimulated register"),
        }
        (0, CommResult::Success)
    }

    fn close(&mut self) {
        self.is_open = false;
    }
}

fn default_config() -> EngineConfig {
    EngineConfig::new(vec![
        ActuatorConfig {
            id: 1,
            offset: 0,
            reversed: false,
        },
        ActuatorConfig {
            id: 2,
            offset: 512,
            reversed: true,
        },
    ])
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
            EngineConfig::from_json(&json).map_err(|e| format!("{path}: {e}"))
        }
        None => Ok(default_config()),
    }
}

fn parse_commands(raw: &[String]) -> Result<Vec<MotionCommand>, String> {
    if raw.is_empty() {
        return Ok(vec![MotionCommand::Move {
            p: vec![1024, 3000],
            v: vec![300, 300],
        }]);
    }
    raw.iter()
        .map(|s| serde_json::from_str::<MotionCommand>(s).map_err(|e| format!("{s}: {e}")))
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let opts: Opts = Opts::parse();

    let config = match load_config(opts.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("config error: {}", e);
            std::process::exit(1);
        }
    };
    let commands = match parse_commands(&opts.commands) {
        Ok(commands) => commands,
        Err(e) => {
            error!("invalid command: {}", e);
            std::process::exit(1);
        }
    };

    let bus = SimBus::new(&config, opts.step);
    let mut engine = match CoordinationEngine::new(bus, config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("config error: {}", e);
            std::process::exit(1);
        }
    };

    engine.tick();
    if engine.state() == EngineState::Invalid {
        error!(code = engine.last_error_code(), "initialization failed");
        std::process::exit(1);
    }

    let mut delay = StdSleep::new();
    let mut failed = false;
    for command in commands {
        if matches!(command, MotionCommand::Shutdown) {
            break;
        }
        if !engine.execute_command(command) {
            warn!("command rejected");
            continue;
        }
        match engine.run_until_settled(&mut delay, opts.period_us, opts.max_ticks) {
            Ok(ticks) => {
                let positions: Vec<u16> = engine
                    .runtime()
                    .iter()
                    .map(|rt| rt.current_position)
                    .collect();
                info!(ticks, ?positions, "move settled");
            }
            Err(e) => {
                // An unsettled move keeps the engine busy; later commands
                // would all be rejected.
                error!(code = e.code(), "move failed: {}", e);
                failed = true;
                break;
            }
        }
    }

    engine.shutdown();
    let mut closed = false;
    for _ in 0..opts.max_ticks {
        if engine.state() == EngineState::Invalid {
            break;
        }
        engine.tick();
        if !engine.bus().is_open {
            closed = true;
            break;
        }
    }
    if !closed {
        warn!(state = ?engine.state(), "port not closed, torque may still be enabled");
    }
    if failed {
        std::process::exit(2);
    }
    info!("done");
}
