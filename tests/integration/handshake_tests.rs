//! Connection lifecycle, readiness handshake, uplink gating and routing.

use arctic_link::error::SendError;
use arctic_link::protocol::{
    DISABLE_UPLINK, DONE, ENABLE_UPLINK, GET_NAME, INTERFACE_READY, REQ_NAME,
};
use arctic_link::{Channel, LinkConfig, TransportKind};

use super::mock_link::Harness;

#[test]
fn ready_announced_once_per_connection() {
    let mut h = Harness::new(TransportKind::Socket);
    h.poll(10);
    assert_eq!(h.wire.sent_count(), 0, "nothing sent before a peer attaches");

    h.wire.connect();
    h.poll(10);
    h.poll(10);
    assert_eq!(h.wire.sent_to("SYT00"), [INTERFACE_READY]);

    h.wire.drop_link();
    h.poll(10);
    h.wire.connect();
    h.poll(10);
    assert_eq!(h.wire.sent_to("SYT00"), [INTERFACE_READY, INTERFACE_READY]);
}

#[test]
fn socket_console_waits_for_enable_uplink() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();

    assert_eq!(h.console.single("boot"), Err(SendError::UplinkDisabled));
    h.backend(ENABLE_UPLINK);
    assert_eq!(h.wire.sent_to("SYT00"), [DONE]);

    h.console.single("boot").unwrap();
    assert_eq!(h.wire.sent_to("TXS00"), ["boot"]);

    h.backend(DISABLE_UPLINK);
    assert_eq!(h.console.single("again"), Err(SendError::UplinkDisabled));
}

#[test]
fn reconnect_requires_new_enable() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    h.backend(ENABLE_UPLINK);
    h.console.print("x").unwrap();

    h.wire.drop_link();
    h.poll(10);
    h.wire.connect();
    h.poll(10);
    assert_eq!(h.console.print("y"), Err(SendError::UplinkDisabled));
}

#[test]
fn ble_output_flows_without_enable() {
    let mut h = Harness::new(TransportKind::Ble);
    h.connect();
    let ids = h.console.identifiers().unwrap().clone();
    h.console.single("hello").unwrap();
    assert_eq!(h.wire.sent_to(&ids.single_out.unwrap()), ["hello"]);
}

#[test]
fn sends_while_disconnected_are_silent() {
    let mut h = Harness::new(TransportKind::Ble);
    h.poll(10);
    assert_eq!(h.console.single("x"), Err(SendError::NotConnected));
    assert_eq!(h.map.location(1.0, 2.0), Err(SendError::NotConnected));
    assert_eq!(h.wire.sent_count(), 0);
}

#[test]
fn inbound_command_reaches_console() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    h.wire.inject("RXM00", "led on");
    h.poll(10);
    assert!(h.console.available());
    assert_eq!(h.console.read(), "led on");
}

#[test]
fn malformed_and_unknown_frames_are_dropped() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    h.wire.inject("XXX00", "nobody home");
    h.wire.inject("TXM00", "outbound id, not routable");
    h.poll(10);
    assert!(!h.console.available());
    assert_eq!(h.wire.sent_count(), 0);
}

#[test]
fn name_query_answered_on_single_line() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    h.wire.inject("RXM00", GET_NAME);
    h.poll(10);
    assert_eq!(h.wire.sent_to("TXS00"), [format!("{REQ_NAME}:Main")]);
    assert!(!h.console.available());
}

#[test]
fn graphics_and_map_share_the_gate() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    h.graphics.setup("speed", &[], &["v"]);
    assert_eq!(h.graphics.plot("speed", &[3.5]), Err(SendError::UplinkDisabled));

    h.backend(ENABLE_UPLINK);
    h.graphics.plot("speed", &[3.5]).unwrap();
    h.map.location(60.169_857, 24.938_379).unwrap();
    assert_eq!(h.wire.sent_to("GRM00"), ["speed:v:3.5"]);
    assert_eq!(h.wire.sent_to("MPM00"), ["60.169857,24.938379"]);
}

#[test]
fn keepalive_only_while_connected() {
    let mut h = Harness::new(TransportKind::Socket);
    h.session.send_keepalive();
    assert_eq!(h.wire.keepalives(), 0);
    h.connect();
    h.session.send_keepalive();
    assert_eq!(h.wire.keepalives(), 1);
}

#[test]
fn explicit_disconnect_tears_down_and_resets() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    h.backend(ENABLE_UPLINK);
    h.session.disconnect();
    assert_eq!(h.wire.disconnects(), 1);
    assert!(!h.session.context().unwrap().is_connected());
    assert!(!h.session.context().unwrap().uplink_enabled());
}

#[test]
fn long_console_output_is_chunked() {
    let mut h = Harness::with_config(LinkConfig {
        transport: TransportKind::Serial,
        max_payload_len: 64,
        ..LinkConfig::default()
    });
    h.connect();
    h.backend(ENABLE_UPLINK);
    let text: String = "0123456789".repeat(20);
    h.console.print(&text).unwrap();
    let parts = h.wire.sent_to("TXM00");
    assert_eq!(parts.len(), 4);
    assert!(parts.iter().all(|p| p.len() <= 64));
    assert_eq!(parts.concat(), text);
}
