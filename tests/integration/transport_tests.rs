//! End-to-end runs over the host builds of the real transports: UART
//! buffers, the simulated GATT server and loopback sockets.

use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arctic_link::adapters::ble::BluedroidGatt;
use arctic_link::adapters::ble_transport::BleTransport;
use arctic_link::adapters::firmware::FlashTarget;
use arctic_link::adapters::md5_digest::Md5Digest;
use arctic_link::adapters::serial_transport::SerialTransport;
use arctic_link::adapters::socket_transport::SocketTransport;
use arctic_link::adapters::time::SystemClock;
use arctic_link::adapters::uart::UartPort;
use arctic_link::app::ports::Access;
use arctic_link::link::codec::encode_chunk;
use arctic_link::link::{io_task, DeviceInfo, OtaOutcome};
use arctic_link::protocol::{
    ENABLE_UPLINK, GET_DEVICE, INTERFACE_READY, OTA_DIGEST_FLAG, OTA_SETUP, OTA_SIZE_FLAG,
};
use arctic_link::{Console, LinkConfig, Session, Transport, TransportKind};

use super::mock_link::{md5_hex, FLASH_CAPACITY};

fn running_session(config: LinkConfig, transport: Box<dyn Transport>) -> (Session, Arc<Console>) {
    let mut session = Session::new(
        config,
        DeviceInfo::new("Bench", [0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]),
        Box::new(FlashTarget::new(FLASH_CAPACITY)),
        Box::new(Md5Digest::new()),
    );
    session.begin(transport).unwrap();
    let console = Arc::new(Console::new("Main"));
    session.add(console.clone()).unwrap();
    session.start().unwrap();
    (session, console)
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ── Serial ────────────────────────────────────────────────────

#[test]
fn serial_link_comes_up_on_first_traffic() {
    let uart = UartPort::new();
    let config = LinkConfig {
        transport: TransportKind::Serial,
        ..LinkConfig::default()
    };
    let timeout = config.serial_activity_timeout_ms;
    let transport = SerialTransport::new(uart.clone(), timeout);
    let (mut session, console) = running_session(config, Box::new(transport));

    session.poll_once(0);
    assert!(uart.take_tx().is_empty());

    uart.inject_rx(format!("SYR00:{GET_DEVICE}\n").as_bytes());
    session.poll_once(10);
    assert_eq!(
        String::from_utf8(uart.take_tx()).unwrap(),
        format!("SYT00:{INTERFACE_READY}\nSYT00:Bench,24:6F:28:01:02:03\n")
    );

    uart.inject_rx(b"RXM00:sta");
    session.poll_once(20);
    assert!(!console.available());
    uart.inject_rx(b"tus\n");
    session.poll_once(30);
    assert!(console.available());
    assert_eq!(console.read(), "status");

    uart.inject_rx(format!("SYR00:{ENABLE_UPLINK}\n").as_bytes());
    session.poll_once(40);
    uart.take_tx();
    console.single("ok").unwrap();
    assert_eq!(uart.take_tx(), b"TXS00:ok\n");

    session.poll_once(40 + u64::from(timeout) + 1);
    assert!(!session.context().unwrap().is_connected());
    assert!(console.single("late").is_err());
}

#[test]
fn serial_echo_is_one_line() {
    let uart = UartPort::new();
    let config = LinkConfig {
        transport: TransportKind::Serial,
        ..LinkConfig::default()
    };
    let transport = SerialTransport::new(uart.clone(), config.serial_activity_timeout_ms);
    let (mut session, console) = running_session(config, Box::new(transport));

    uart.inject_rx(format!("SYR00:{ENABLE_UPLINK}\nRXM00:status\n").as_bytes());
    session.poll_once(10);
    uart.take_tx();
    assert!(console.available());
    let line = console.read();
    console.printf(format_args!("> {}", line)).unwrap();
    assert_eq!(uart.take_tx(), b"TXM00:> status\n");
}

#[test]
fn serial_ota_image_with_line_bytes() {
    let uart = UartPort::new();
    let config = LinkConfig {
        transport: TransportKind::Serial,
        ..LinkConfig::default()
    };
    let transport = SerialTransport::new(uart.clone(), config.serial_activity_timeout_ms);
    let (mut session, _console) = running_session(config, Box::new(transport));

    let image = [0xE9, 0x01, 0x0A, 0x02, 0x0D, 0x0D, 0x0A, 0x03, 0x0D];
    let setup = format!(
        "OTR00:{OTA_SETUP} {OTA_SIZE_FLAG} {} {OTA_DIGEST_FLAG} {}\n",
        image.len(),
        md5_hex(&image)
    );
    uart.inject_rx(setup.as_bytes());
    session.poll_once(10);

    // the image travels in two chunks, each split across reads
    let mut wire = Vec::new();
    for chunk in image.chunks(5) {
        wire.extend_from_slice(b"OTR00:");
        wire.extend_from_slice(&encode_chunk(chunk));
        wire.push(b'\n');
    }
    let (first, rest) = wire.split_at(9);
    uart.inject_rx(first);
    session.poll_once(20);
    uart.inject_rx(rest);
    session.poll_once(30);

    let tx = String::from_utf8(uart.take_tx()).unwrap();
    let acks: Vec<&str> = tx.lines().filter_map(|l| l.strip_prefix("OTT00:")).collect();
    assert_eq!(acks, ["READY[0]", "ACK[1]", "ACK[2]", "DONE[3]"]);
    assert_eq!(session.ota().last_outcome(), Some(OtaOutcome::Completed));
}

// ── BLE ───────────────────────────────────────────────────────

const OTA_SERVICE: &str = "4fafc201-1fb5-459e-2000-c5c9c3319f00";
const OTA_OUT: &str = "4fafc201-1fb5-459e-2000-c5c9c3319a00";
const OTA_IN: &str = "4fafc201-1fb5-459e-2000-c5c9c3319b00";
const BACKEND_OUT: &str = "4fafc201-1fb5-459e-1000-c5c9c3319a00";
const CONSOLE_SERVICE: &str = "4fafc201-1fb5-459e-3000-c5c9c3319f00";
const CONSOLE_SINGLE: &str = "4fafc201-1fb5-459e-3000-c5c9c3319b00";
const CONSOLE_IN: &str = "4fafc201-1fb5-459e-3000-c5c9c3319c00";

#[test]
fn ble_services_mirror_channel_registrations() {
    let gatt = BluedroidGatt::new("Bench");
    let central = gatt.sim_central();
    let config = LinkConfig {
        transport: TransportKind::Ble,
        ..LinkConfig::default()
    };
    let params = config.connection_params();
    let (_session, _console) = running_session(config, Box::new(BleTransport::new(gatt, params)));

    assert!(central.is_advertising());
    assert_eq!(central.connection_params(), Some(params));
    let services = central.services();
    assert_eq!(services.len(), 3);
    assert_eq!(services[0], OTA_SERVICE);
    assert_eq!(services[2], CONSOLE_SERVICE);

    let chars = central.characteristics(CONSOLE_SERVICE);
    let accesses: Vec<Access> = chars.iter().map(|(_, a)| *a).collect();
    assert_eq!(accesses, [Access::Notify, Access::Notify, Access::Write]);
    assert_eq!(chars[2].0, CONSOLE_IN);
}

#[test]
fn ble_round_trip_through_simulated_central() {
    let gatt = BluedroidGatt::new("Bench");
    let central = gatt.sim_central();
    let config = LinkConfig {
        transport: TransportKind::Ble,
        ..LinkConfig::default()
    };
    let params = config.connection_params();
    let (mut session, console) =
        running_session(config, Box::new(BleTransport::new(gatt, params)));

    central.connect();
    session.poll_once(10);
    assert_eq!(
        central.take_notifications(),
        [(BACKEND_OUT.to_owned(), INTERFACE_READY.as_bytes().to_vec())]
    );

    assert!(central.write(CONSOLE_IN, b"ping"));
    assert!(!central.write(CONSOLE_SINGLE, b"not writable"));
    session.poll_once(20);
    assert!(console.available());
    assert_eq!(console.read(), "ping");

    console.single("pong").unwrap();
    assert_eq!(
        central.take_notifications(),
        [(CONSOLE_SINGLE.to_owned(), b"pong".to_vec())]
    );

    central.disconnect();
    session.poll_once(30);
    assert!(!session.context().unwrap().is_connected());
    assert!(central.is_advertising());
}

#[test]
fn ble_ota_chunk_arrives_as_long_write() {
    let gatt = BluedroidGatt::new("Bench");
    let central = gatt.sim_central();
    let config = LinkConfig {
        transport: TransportKind::Ble,
        ..LinkConfig::default()
    };
    let params = config.connection_params();
    let (mut session, _console) =
        running_session(config, Box::new(BleTransport::new(gatt, params)));
    central.connect();
    session.poll_once(10);
    central.take_notifications();

    let image: Vec<u8> = (0..300u32).map(|i| if i == 0 { 0xE9 } else { (i % 251) as u8 }).collect();
    let setup = format!(
        "{OTA_SETUP} {OTA_SIZE_FLAG} {} {OTA_DIGEST_FLAG} {}",
        image.len(),
        md5_hex(&image)
    );
    assert!(central.write(OTA_IN, setup.as_bytes()));
    session.poll_once(20);

    // one 300-byte chunk, carried as 20-byte prepare writes
    assert!(central.write_long(OTA_IN, &image, 20));
    session.poll_once(30);

    let acks: Vec<(String, Vec<u8>)> = central.take_notifications();
    let acks: Vec<String> = acks
        .into_iter()
        .filter(|(uuid, _)| uuid == OTA_OUT)
        .map(|(_, v)| String::from_utf8(v).unwrap())
        .collect();
    assert_eq!(acks, ["READY[0]", "ACK[1]", "DONE[2]"]);
    assert_eq!(session.ota().last_outcome(), Some(OtaOutcome::Completed));
}

// ── Socket ────────────────────────────────────────────────────

/// A port `p` with `p` and `p + 1` both free right now.
fn free_port_pair() -> u16 {
    for _ in 0..32 {
        let Ok(spare) = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)) else {
            continue;
        };
        let port = spare.local_addr().unwrap().port();
        if port == u16::MAX {
            continue;
        }
        if TcpListener::bind((Ipv4Addr::UNSPECIFIED, port + 1)).is_ok() {
            return port;
        }
    }
    panic!("no free port pair");
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end_matches('\n').to_owned()
}

#[test]
fn socket_pair_over_loopback_with_io_task() {
    let port = free_port_pair();
    let config = LinkConfig {
        transport: TransportKind::Socket,
        socket_port: port,
        poll_interval_ms: 2,
        keepalive_interval_ms: 60_000,
        ..LinkConfig::default()
    };
    let (session, console) = running_session(config, Box::new(SocketTransport::new(port)));
    let ctx = Arc::clone(session.context().unwrap());
    let _io = io_task::spawn(session, Arc::new(SystemClock::new())).unwrap();

    let uplink = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    uplink.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    let mut up = BufReader::new(uplink);
    let mut down = TcpStream::connect((Ipv4Addr::LOCALHOST, port + 1)).unwrap();

    assert_eq!(read_line(&mut up), format!("SYT00:{INTERFACE_READY}"));

    writeln!(down, "SYR00:{ENABLE_UPLINK}").unwrap();
    assert_eq!(read_line(&mut up), "SYT00:DONE");

    writeln!(down, "RXM00:hello").unwrap();
    assert!(wait_for(|| console.available()));
    assert_eq!(console.read(), "hello");

    console.single("world").unwrap();
    assert_eq!(read_line(&mut up), "TXS00:world");

    drop(down);
    drop(up);
    assert!(wait_for(|| !ctx.is_connected()));
    assert!(!ctx.uplink_enabled());
}
