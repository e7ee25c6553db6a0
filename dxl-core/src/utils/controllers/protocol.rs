//! Dynamixel Protocol 1.0 packet layer over a blocking serial link.
//!
//! Instruction packet: `FF FF id len instr params… checksum`, where `len`
//! counts the instruction, the params and the checksum, and the checksum
//! is the bitwise NOT of the byte sum from `id` onwards. Status packets
//! carry the servo's error byte in place of the instruction.

use alloc::vec::Vec;

use embedded_io::{Read, ReadExactError, Write};

use super::bus::{
    BusAdapter, CommResult, ADDR_MX_POS_GET, ADDR_MX_TORQUE_EN, ADDR_MX_VEL_SET,
    POS_GET_PKT_LEN, TORQ_EN_PKT_LEN, VEL_SET_PKT_LEN,
};

/* ───── Packet anatomy ──────────────────────────────────────────────── */
pub const HEADER: [u8; 2] = [0xFF, 0xFF];
pub const BROADCAST_ID: u8 = 0xFE;

pub const TXPACKET_MAX_LEN: usize = 250;
pub const RXPACKET_MAX_LEN: usize = 250;

/* ───── Instructions ────────────────────────────────────────────────── */
pub const INST_WRITE: u8 = 0x03;
pub const INST_SYNC_WRITE: u8 = 0x83;
pub const INST_BULK_READ: u8 = 0x92;

/// Serial port underneath a [`Protocol1Bus`].
///
/// Byte I/O comes from `embedded-io`; the lifecycle hooks cover what a
/// UART driver or host serial port needs beyond plain reads and writes.
/// Reads are expected to honour the port's own timeout and return `Ok(0)`
/// once it expires.
pub trait SerialLink: Read + Write {
    fn open(&mut self) -> bool;

    fn set_baud_rate(
        &mut self,
        baud_rate: u32,
    ) -> bool;

    fn close(&mut self);

    /// Drop stale input before a new transaction.
    fn clear_input(&mut self) {}
}

/// Decoded status packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    pub error: u8,
    pub params: Vec<u8>,
}

pub fn checksum(data: &[u8]) -> u8 {
    !data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Encode an instruction packet into `out`, replacing its contents.
pub fn build_packet(
    out: &mut Vec<u8>,
    id: u8,
    instruction: u8,
    params: &[u8],
) -> Result<(), CommResult> {
    let length = params.len() + 2;
    if length + 4 > TXPACKET_MAX_LEN {
        return Err(CommResult::TxError);
    }
    out.clear();
    out.extend_from_slice(&HEADER);
    out.push(id);
    out.push(length as u8);
    out.push(instruction);
    out.extend_from_slice(params);
    let sum = checksum(&out[2..]);
    out.push(sum);
    Ok(())
}

fn map_read_err<E>(err: ReadExactError<E>) -> CommResult {
    match err {
        ReadExactError::UnexpectedEof => CommResult::RxTimeout,
        ReadExactError::Other(_) => CommResult::RxFail,
    }
}

/// Read one status packet from `port` and validate it against `expected_id`.
pub fn read_status<P: Read>(
    port: &mut P,
    expected_id: u8,
) -> Result<StatusPacket, CommResult> {
    let mut hdr = [0u8; 4];
    port.read_exact(&mut hdr).map_err(map_read_err)?;
    if hdr[..2] != HEADER || hdr[2] != expected_id {
        return Err(CommResult::RxCorrupt);
    }
    let len = hdr[3] as usize;
    if len < 2 || len + 4 > RXPACKET_MAX_LEN {
        return Err(CommResult::RxCorrupt);
    }

    let mut rest = alloc::vec![0u8; len];
    port.read_exact(&mut rest).map_err(map_read_err)?;

    let (body, sum) = rest.split_at(len - 1);
    let expected = !hdr[2..]
        .iter()
        .chain(body.iter())
        .fold(0u8, |acc, &b| acc.wrapping_add(b));
    if expected != sum[0] {
        return Err(CommResult::RxCorrupt);
    }

    Ok(StatusPacket {
        id: hdr[2],
        error: body[0],
        params: body[1..].to_vec(),
    })
}

/// [`BusAdapter`] speaking Protocol 1.0 to MX-series servos.
pub struct Protocol1Bus<P> {
    port: P,
    tx: Vec<u8>,
    params: Vec<u8>,
    positions: Vec<(u8, u16)>,
    is_open: bool,
}

impl<P: SerialLink> Protocol1Bus<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            tx: Vec::with_capacity(TXPACKET_MAX_LEN),
            params: Vec::new(),
            positions: Vec::new(),
            is_open: false,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Encode `self.params` under `instruction` and push it out.
    fn tx_packet(
        &mut self,
        id: u8,
        instruction: u8,
    ) -> CommResult {
        if !self.is_open {
            return CommResult::PortBusy;
        }
        if let Err(res) = build_packet(&mut self.tx, id, instruction, &self.params) {
            return res;
        }
        self.port.clear_input();
        if self.port.write_all(&self.tx).is_err() || self.port.flush().is_err() {
            return CommResult::TxFail;
        }
        CommResult::Success
    }

    fn sync_write(
        &mut self,
        address: u8,
        data_len: u8,
        ids: &[u8],
        mut data: impl FnMut(usize, &mut Vec<u8>),
    ) -> CommResult {
        self.params.clear();
        self.params.push(address);
        self.params.push(data_len);
        for (i, &id) in ids.iter().enumerate() {
            self.params.push(id);
            data(i, &mut self.params);
        }
        let res = self.tx_packet(BROADCAST_ID, INST_SYNC_WRITE);
        self.params.clear();
        res
    }

    fn torque_batch(
        &mut self,
        ids: &[u8],
        enable: bool,
    ) -> CommResult {
        let value = u8::from(enable);
        self.sync_write(ADDR_MX_TORQUE_EN, TORQ_EN_PKT_LEN, ids, |_, buf| {
            buf.push(value)
        })
    }
}

impl<P: SerialLink> BusAdapter for Protocol1Bus<P> {
    fn open(&mut self) -> bool {
        self.is_open = self.port.open();
        self.is_open
    }

    fn set_baud_rate(
        &mut self,
        baud_rate: u32,
    ) -> bool {
        self.port.set_baud_rate(baud_rate)
    }

    fn enable_torque_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult {
        self.torque_batch(ids, true)
    }

    fn disable_torque_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult {
        self.torque_batch(ids, false)
    }

    fn write_velocity_batch(
        &mut self,
        ids: &[u8],
        values: &[u16],
    ) -> CommResult {
        if ids.len() != values.len() {
            return CommResult::TxError;
        }
        self.sync_write(ADDR_MX_VEL_SET, VEL_SET_PKT_LEN, ids, |i, buf| {
            buf.extend_from_slice(&values[i].to_le_bytes())
        })
    }

    fn read_position_batch(
        &mut self,
        ids: &[u8],
    ) -> CommResult {
        self.positions.clear();
        self.params.clear();
        self.params.push(0x00);
        for &id in ids {
            self.params
                .extend_from_slice(&[POS_GET_PKT_LEN, id, ADDR_MX_POS_GET]);
        }
        let res = self.tx_packet(BROADCAST_ID, INST_BULK_READ);
        self.params.clear();
        if !res.is_success() {
            return res;
        }

        for &id in ids {
            let status = match read_status(&mut self.port, id) {
                Ok(status) => status,
                Err(res) => {
                    self.positions.clear();
                    return res;
                }
            };
            if status.params.len() != POS_GET_PKT_LEN as usize {
                self.positions.clear();
                return CommResult::RxCorrupt;
            }
            if status.error != 0 {
                tracing::debug!(id, error = status.error, "status error bits on position read");
            }
            let raw = u16::from_le_bytes([status.params[0], status.params[1]]);
            self.positions.push((id, raw));
        }
        CommResult::Success
    }

    fn position(
        &self,
        id: u8,
    ) -> Option<u16> {
        self.positions
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|&(_, raw)| raw)
    }

    fn write_single(
        &mut self,
        id: u8,
        address: u8,
        value: u16,
    ) -> (u8, CommResult) {
        self.params.clear();
        self.params.push(address);
        self.params.extend_from_slice(&value.to_le_bytes());
        let res = self.tx_packet(id, INST_WRITE);
        self.params.clear();
        if !res.is_success() || id == BROADCAST_ID {
            return (0, res);
        }
        match read_status(&mut self.port, id) {
            Ok(status) => (status.error, CommResult::Success),
            Err(res) => (0, res),
        }
    }

    fn close(&mut self) {
        self.port.close();
        self.is_open = false;
    }
}
