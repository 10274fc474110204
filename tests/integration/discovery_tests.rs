//! Backend discovery commands answered by a running session.

use arctic_link::protocol::{GET_CONSOLES, GET_DEVICE, GET_SERVICES};
use arctic_link::TransportKind;

use super::mock_link::Harness;

#[test]
fn device_reports_name_and_mac() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    h.backend(GET_DEVICE);
    assert_eq!(h.wire.sent_to("SYT00"), ["Bench,24:6F:28:01:02:03"]);
}

#[test]
fn services_list_every_channel_in_registration_order() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    h.backend(GET_SERVICES);
    assert_eq!(
        h.wire.sent_to("SYT00"),
        ["Main,ATS00,TXM00,TXS00,RXM00:Plots,GRS00,GRM00:Route,MPS00,MPM00"]
    );
}

#[test]
fn consoles_list_names_only() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    h.backend(GET_CONSOLES);
    assert_eq!(h.wire.sent_to("SYT00"), ["Main:Plots:Route"]);
}

#[test]
fn discovery_replies_bypass_the_uplink_gate() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    assert!(!h.session.context().unwrap().uplink_enabled());
    h.backend(GET_DEVICE);
    assert_eq!(h.wire.sent_to("SYT00").len(), 1);
}

#[test]
fn ble_services_use_long_identifiers() {
    let mut h = Harness::new(TransportKind::Ble);
    h.connect();
    h.backend(GET_SERVICES);
    let backend_out = h.backend_ids().multi_out;
    let reply = h.wire.sent_to(&backend_out);
    assert_eq!(reply.len(), 1);

    let main = reply[0].split(':').next().unwrap();
    let fields: Vec<&str> = main.split(',').collect();
    assert_eq!(
        fields,
        [
            "Main",
            "4fafc201-1fb5-459e-3000-c5c9c3319f00",
            "4fafc201-1fb5-459e-3000-c5c9c3319a00",
            "4fafc201-1fb5-459e-3000-c5c9c3319b00",
            "4fafc201-1fb5-459e-3000-c5c9c3319c00",
        ]
    );
}

#[test]
fn fixed_channels_registered_before_application_channels() {
    let h = Harness::new(TransportKind::Serial);
    let registered = h.wire.registered();
    assert_eq!(registered.len(), 5);
    assert_eq!(registered[0].inbound.as_deref(), Some("OTR00"));
    assert_eq!(registered[1].inbound.as_deref(), Some("SYR00"));
    assert_eq!(registered[2].scope.as_str(), "ATS00");
}

#[test]
fn unknown_backend_command_is_ignored() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    h.backend("ARCTIC_COMMAND_REBOOT");
    assert_eq!(h.wire.sent_count(), 0);
}
