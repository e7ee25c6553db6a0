//! Bus adapter contract consumed by the coordination engine.
//!
//! The engine never touches bytes on the wire. Everything physical goes
//! through a [`BusAdapter`]: open/close, baud configuration, batched
//! writes, the batched position read, and single-servo writes.

use core::fmt;

/// Torque enable register (1 byte) on MX-series servos, protocol 1.0.
pub const ADDR_MX_TORQUE_EN: u8 = 24;
/// Moving speed register (2 bytes). In wheel mode bit 10 selects direction.
pub const ADDR_MX_VEL_SET: u8 = 32;
/// Present position register (2 bytes).
pub const ADDR_MX_POS_GET: u8 = 36;

pub const TORQ_EN_PKT_LEN: u8 = 1;
pub const VEL_SET_PKT_LEN: u8 = 2;
pub const POS_GET_PKT_LEN: u8 = 2;

/// Outcome of one bus transaction, with the vendor SDK's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommResult {
    Success,
    PortBusy,
    TxFail,
    RxFail,
    TxError,
    RxWaiting,
    RxTimeout,
    RxCorrupt,
    NotAvailable,
    /// Any code outside the known set, kept verbatim.
    Other(i32),
}

impl CommResult {
    pub fn code(self) -> i32 {
        match self {
            CommResult::Success => 0,
            CommResult::PortBusy => -1000,
            CommResult::TxFail => -1001,
            CommResult::RxFail => -1002,
            CommResult::TxError => -2000,
            CommResult::RxWaiting => -3000,
            CommResult::RxTimeout => -3001,
            CommResult::RxCorrupt => -3002,
            CommResult::NotAvailable => -9000,
            CommResult::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CommResult::Success,
            -1000 => CommResult::PortBusy,
            -1001 => CommResult::TxFail,
            -1002 => CommResult::RxFail,
            -2000 => CommResult::TxError,
            -3000 => CommResult::RxWaiting,
            -3001 => CommResult::RxTimeout,
            -3002 => CommResult::RxCorrupt,
            -9000 => CommResult::NotAvailable,
            other => CommResult::Other(other),
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, CommResult::Success)
    }
}

impl fmt::Display for CommResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommResult::Success => "[TxRxResult] Communication success.",
            CommResult::PortBusy => "[TxRxResult] Port is in use!",
            CommResult::TxFail => "[TxRxResult] Failed transmit instruction packet!",
            CommResult::RxFail => "[TxRxResult] Failed get status packet from device!",
            CommResult::TxError => "[TxRxResult] Incorrect instruction packet!",
            CommResult::RxWaiting => "[TxRxResult] Now receiving status packet!",
            CommResult::RxTimeout => "[TxRxResult] There is no status packet!",
            CommResult::RxCorrupt => "[TxRxResult] Incorrect status packet!",
            CommResult::NotAvailable => "[TxRxResult] Protocol does not support this function!",
            CommResult::Other(code) => return write!(f, "[TxRxResult] Unknown result {}", code),
        };
        f.write_str(text)
    }
}

/// Physical side of the servo bus.
///
/// Implementations own framing, checksums and timeouts. Every call blocks
/// until the transaction completes or the implementation's own timeout
/// policy gives up.
pub trait BusAdapter {
    fn open(&mut self) -> bool;

    fn set_baud_rate(
        &mut self,
        baud_rate: u32,
    ) -> bool;

    /// Switch torque on for every id in one batched write.
    fn enable_torque_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult;

    /// Switch torque off for every id in one batched write.
    fn disable_torque_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult;

    /// Write one moving-speed value per id in one batched write.
    ///
    /// `ids` and `values` are index-aligned.
    fn write_velocity_batch(
        &mut self,
        ids: &[u8],
        values: &[u16],
    ) -> CommResult;

    /// Transmit the batched position read and collect every reply.
    fn read_position_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult;

    /// Raw position captured for `id` by the last successful batched read.
    fn position(
        &self,
        id: u8,
    ) -> Option<u16>;

    /// Write a 2-byte register on a single servo and wait for its status.
    ///
    /// Returns the servo's error byte alongside the transport outcome.
    fn write_single(
        &mut self,
        id: u8,
        address: u8,
        value: u16,
    ) -> (u8, CommResult);

    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comm_codes_match_sdk() {
        assert_eq!(CommResult::Success.code(), 0);
        assert_eq!(CommResult::TxFail.code(), -1001);
        assert_eq!(CommResult::from_code(-3001), CommResult::RxTimeout);
        assert_eq!(CommResult::from_code(-7), CommResult::Other(-7));
        assert_eq!(CommResult::Other(-7).code(), -7);
        assert!(!CommResult::RxCorrupt.is_success());
    }
}
