//! Error taxonomy for the coordination engine.
//!
//! Every bus-facing step funnels its outcome through
//! [`check_result`], which turns a device error byte or a failed
//! [`CommResult`] into a [`DxlError`]. The step then wraps that cause in
//! its own kind (`VelocityCommandError`, `PositionReadError`) so the
//! originating code survives all the way to [`DxlError::code`].

use core::fmt;

use crate::utils::controllers::bus::CommResult;

/// Code reported when the serial port could not be opened.
pub const PORT_OPEN_FAILED_CODE: i32 = -10;
/// Code reported when the baud rate could not be applied.
pub const BAUD_SET_FAILED_CODE: i32 = -11;

/// Errors surfaced by the coordination engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DxlError {
    PortOpenFailed,
    BaudSetFailed(u32),
    /// Non-zero error byte from a servo status packet.
    DeviceError(u8),
    /// Transport-level failure reported by the bus adapter.
    CommunicationError(CommResult),
    /// Batched velocity write or per-actuator stop failed.
    VelocityCommandError(TransportFault),
    /// Batched position read failed.
    PositionReadError(TransportFault),
    /// The driver gave up waiting for a move to settle.
    NotSettled(usize),
}

/// Underlying cause of a failed bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Device(u8),
    Communication(CommResult),
}

impl TransportFault {
    pub fn code(self) -> i32 {
        match self {
            TransportFault::Device(err) => i32::from(err),
            TransportFault::Communication(res) => res.code(),
        }
    }
}

impl DxlError {
    /// Numeric code of the failure that started the error chain.
    pub fn code(&self) -> i32 {
        match *self {
            DxlError::PortOpenFailed => PORT_OPEN_FAILED_CODE,
            DxlError::BaudSetFailed(_) => BAUD_SET_FAILED_CODE,
            DxlError::DeviceError(err) => i32::from(err),
            DxlError::CommunicationError(res) => res.code(),
            DxlError::VelocityCommandError(cause) | DxlError::PositionReadError(cause) => {
                cause.code()
            }
            DxlError::NotSettled(_) => CommResult::RxWaiting.code(),
        }
    }
}

impl From<TransportFault> for DxlError {
    fn from(fault: TransportFault) -> Self {
        match fault {
            TransportFault::Device(err) => DxlError::DeviceError(err),
            TransportFault::Communication(res) => DxlError::CommunicationError(res),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFault::Device(err) => write!(f, "device error 0x{:02X}", err),
            TransportFault::Communication(res) => write!(f, "{}", res),
        }
    }
}

impl fmt::Display for DxlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DxlError::PortOpenFailed => f.write_str("failed to open port"),
            DxlError::BaudSetFailed(rate) => write!(f, "failed to set baud rate {}", rate),
            DxlError::DeviceError(err) => write!(f, "DXL error 0x{:02X}", err),
            DxlError::CommunicationError(res) => write!(f, "DXL comm error: {}", res),
            DxlError::VelocityCommandError(cause) => write!(f, "velocity command failed: {}", cause),
            DxlError::PositionReadError(cause) => write!(f, "position read failed: {}", cause),
            DxlError::NotSettled(ticks) => write!(f, "move not settled after {} ticks", ticks),
        }
    }
}

/// Centralized check of one transport outcome.
///
/// The device error byte takes precedence over the communication result,
/// matching the order in which a status packet is interpreted. Failures are
/// only traced at debug level here; the engine reports them once when it
/// goes invalid.
pub fn check_result(
    device_error: u8,
    comm: CommResult,
) -> Result<(), TransportFault> {
    if device_error != 0 {
        tracing::debug!("DXL Error, {}", device_error);
        return Err(TransportFault::Device(device_error));
    }
    if !comm.is_success() {
        tracing::debug!("DXL Comm Error, {}", comm);
        return Err(TransportFault::Communication(comm));
    }
    Ok(())
}
