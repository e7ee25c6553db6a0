use std::collections::VecDeque;

use dxl_core::utils::config::{ActuatorConfig, EngineConfig};
use dxl_core::utils::controllers::bus::{BusAdapter, CommResult, ADDR_MX_VEL_SET};
use dxl_core::utils::controllers::protocol::{
    build_packet, checksum, read_status, Protocol1Bus, SerialLink, BROADCAST_ID, INST_BULK_READ,
    INST_SYNC_WRITE,
};
use dxl_core::utils::controllers::{CoordinationEngine, EngineState};
use embedded_io::{ErrorKind, ErrorType, Read, Write};

/// Serial link with a scripted receive queue and a captured transmit log.
#[derive(Default)]
struct FakeSerial {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    refuse_open: bool,
    fail_writes: bool,
    opened: bool,
    baud: Option<u32>,
}

impl FakeSerial {
    fn reply(
        &mut self,
        bytes: &[u8],
    ) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl ErrorType for FakeSerial {
    type Error = ErrorKind;
}

impl Read for FakeSerial {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for FakeSerial {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(ErrorKind::Other);
        }
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SerialLink for FakeSerial {
    fn open(&mut self) -> bool {
        self.opened = !self.refuse_open;
        self.opened
    }

    fn set_baud_rate(
        &mut self,
        baud_rate: u32,
    ) -> bool {
        self.baud = Some(baud_rate);
        true
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Encode a status packet the way a servo would send it.
fn status(
    id: u8,
    error: u8,
    params: &[u8],
) -> Vec<u8> {
    let mut body = vec![id, (params.len() + 2) as u8, error];
    body.extend_from_slice(params);
    let sum = checksum(&body);
    let mut pkt = vec![0xFF, 0xFF];
    pkt.extend_from_slice(&body);
    pkt.push(sum);
    pkt
}

fn open_bus(serial: FakeSerial) -> Protocol1Bus<FakeSerial> {
    let mut bus = Protocol1Bus::new(serial);
    assert!(bus.open());
    bus
}

#[test]
fn test_ping_packet_layout() {
    let mut out = Vec::new();
    build_packet(&mut out, 1, 0x01, &[]).unwrap();
    assert_eq!(out, vec![0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
}

#[test]
fn test_oversized_packet_rejected() {
    let mut out = Vec::new();
    let params = [0u8; 250];
    assert_eq!(build_packet(&mut out, 1, 0x03, &params), Err(CommResult::TxError));
}

#[test]
fn test_velocity_sync_write_bytes() {
    let mut bus = open_bus(FakeSerial::default());
    assert_eq!(bus.write_velocity_batch(&[1, 2], &[200, 1224]), CommResult::Success);
    assert_eq!(
        bus.port().tx,
        vec![
            0xFF, 0xFF, BROADCAST_ID, 0x0A, INST_SYNC_WRITE, 0x20, 0x02, 0x01, 0xC8, 0x00, 0x02,
            0xC8, 0x04, 0xBB,
        ]
    );
}

#[test]
fn test_torque_sync_write_bytes() {
    let mut bus = open_bus(FakeSerial::default());
    assert_eq!(bus.enable_torque_batch(&[1, 2, 3]), CommResult::Success);
    let tx = bus.port().tx.clone();
    assert_eq!(&tx[..5], &[0xFF, 0xFF, BROADCAST_ID, 0x0A, INST_SYNC_WRITE]);
    assert_eq!(&tx[5..13], &[24, 1, 1, 1, 2, 1, 3, 1]);
    assert_eq!(tx[13], checksum(&tx[2..13]));

    bus.port_mut().tx.clear();
    assert_eq!(bus.disable_torque_batch(&[1]), CommResult::Success);
    assert_eq!(&bus.port().tx[5..9], &[24, 1, 1, 0]);
}

#[test]
fn test_bulk_read_positions() {
    let mut serial = FakeSerial::default();
    serial.reply(&status(1, 0, &[0x23, 0x01]));
    serial.reply(&status(2, 0, &[0xFF, 0x0F]));
    let mut bus = open_bus(serial);

    assert_eq!(bus.read_position_batch(&[1, 2]), CommResult::Success);
    assert_eq!(bus.position(1), Some(0x0123));
    assert_eq!(bus.position(2), Some(0x0FFF));
    assert_eq!(bus.position(3), None);

    let tx = &bus.port().tx;
    assert_eq!(tx[4], INST_BULK_READ);
    assert_eq!(&tx[5..12], &[0x00, 2, 1, 36, 2, 2, 36]);
}

#[test]
fn test_bulk_read_bad_checksum_is_corrupt() {
    let mut serial = FakeSerial::default();
    let mut pkt = status(1, 0, &[0x10, 0x00]);
    let last = pkt.len() - 1;
    pkt[last] ^= 0xFF;
    serial.reply(&pkt);
    let mut bus = open_bus(serial);

    assert_eq!(bus.read_position_batch(&[1]), CommResult::RxCorrupt);
    assert_eq!(bus.position(1), None);
}

#[test]
fn test_bulk_read_wrong_id_is_corrupt() {
    let mut serial = FakeSerial::default();
    serial.reply(&status(2, 0, &[0x10, 0x00]));
    let mut bus = open_bus(serial);
    assert_eq!(bus.read_position_batch(&[1]), CommResult::RxCorrupt);
}

#[test]
fn test_bulk_read_missing_reply_times_out() {
    let mut serial = FakeSerial::default();
    serial.reply(&status(1, 0, &[0x10, 0x00]));
    let mut bus = open_bus(serial);
    assert_eq!(bus.read_position_batch(&[1, 2]), CommResult::RxTimeout);
    assert_eq!(bus.position(1), None);
}

#[test]
fn test_write_single_returns_device_error() {
    let mut serial = FakeSerial::default();
    serial.reply(&status(3, 0x04, &[]));
    let mut bus = open_bus(serial);

    assert_eq!(bus.write_single(3, ADDR_MX_VEL_SET, 0), (0x04, CommResult::Success));
    let tx = &bus.port().tx;
    assert_eq!(&tx[..8], &[0xFF, 0xFF, 0x03, 0x05, 0x03, 0x20, 0x00, 0x00]);
    assert_eq!(tx[8], checksum(&tx[2..8]));
}

#[test]
fn test_transmit_failures() {
    let mut bus = Protocol1Bus::new(FakeSerial::default());
    assert_eq!(bus.write_velocity_batch(&[1], &[10]), CommResult::PortBusy);

    let mut bus = open_bus(FakeSerial {
        fail_writes: true,
        ..FakeSerial::default()
    });
    assert_eq!(bus.write_velocity_batch(&[1], &[10]), CommResult::TxFail);
    assert_eq!(bus.write_single(1, ADDR_MX_VEL_SET, 0), (0, CommResult::TxFail));
}

#[test]
fn test_read_status_parses_params() {
    let mut serial = FakeSerial::default();
    serial.reply(&status(7, 0x20, &[1, 2, 3]));
    let pkt = read_status(&mut serial, 7).unwrap();
    assert_eq!(pkt.id, 7);
    assert_eq!(pkt.error, 0x20);
    assert_eq!(pkt.params, vec![1, 2, 3]);
}

#[test]
fn test_engine_over_protocol_bus() {
    let mut serial = FakeSerial::default();
    serial.reply(&status(1, 0, &[0x64, 0x00]));
    serial.reply(&status(2, 0, &[0x62, 0x00]));
    serial.reply(&status(1, 0, &[]));
    serial.reply(&status(2, 0, &[]));

    let config = EngineConfig {
        baud_rate: 57_600,
        tolerance: 5,
        rotation_ticks: 4096,
        actuators: vec![
            ActuatorConfig { id: 1, offset: 0, reversed: false },
            ActuatorConfig { id: 2, offset: 0, reversed: true },
        ],
    };
    let mut engine = CoordinationEngine::new(Protocol1Bus::new(serial), config).unwrap();
    engine.tick();
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.bus().port().baud, Some(57_600));

    assert!(engine.submit_instruction(&[100, 100], &[200, 200]));
    for _ in 0..5 {
        engine.tick();
    }
    assert!(engine.is_finished());
    assert!(engine.bus().port().rx.is_empty());

    engine.shutdown();
    engine.tick();
    engine.tick();
    assert!(!engine.bus().port().opened);
}

#[test]
fn test_engine_refused_port() {
    let serial = FakeSerial {
        refuse_open: true,
        ..FakeSerial::default()
    };
    let config = EngineConfig::new(vec![ActuatorConfig { id: 1, offset: 0, reversed: false }]);
    let mut engine = CoordinationEngine::new(Protocol1Bus::new(serial), config).unwrap();
    engine.tick();
    assert_eq!(engine.state(), EngineState::Invalid);
    assert!(engine.bus().port().tx.is_empty());
}
