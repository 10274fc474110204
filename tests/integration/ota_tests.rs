//! Firmware update driven through a running session.

use arctic_link::error::OtaError;
use arctic_link::link::{OtaOutcome, OtaState};
use arctic_link::protocol::{OTA_DIGEST_FLAG, OTA_SETUP, OTA_SIZE_FLAG};
use arctic_link::TransportKind;

use super::mock_link::{firmware_image, md5_hex, Harness, FLASH_CAPACITY};

const CHUNK: usize = 256;

fn setup_line(size: usize, digest: &str) -> String {
    format!("{OTA_SETUP} {OTA_SIZE_FLAG} {size} {OTA_DIGEST_FLAG} {digest}")
}

fn send_setup(h: &mut Harness, size: usize, digest: &str) {
    let inbound = h.ota_ids().inbound.unwrap();
    h.wire.inject(&inbound, setup_line(size, digest));
    h.poll(10);
}

fn send_chunks(h: &mut Harness, image: &[u8]) {
    for chunk in image.chunks(CHUNK) {
        h.ota_chunk(chunk);
    }
}

fn acks(h: &Harness) -> Vec<String> {
    h.wire.sent_to(&h.ota_ids().multi_out)
}

#[test]
fn full_transfer_acknowledges_every_chunk() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    let image = firmware_image(CHUNK * 4);

    send_setup(&mut h, image.len(), &md5_hex(&image));
    assert_eq!(h.session.ota().state(), OtaState::Transferring);
    send_chunks(&mut h, &image);

    assert_eq!(
        acks(&h),
        ["READY[0]", "ACK[1]", "ACK[2]", "ACK[3]", "ACK[4]", "DONE[5]"]
    );
    assert_eq!(h.session.ota().last_outcome(), Some(OtaOutcome::Completed));
    assert!(h.session.ota().take_completed());
    assert!(!h.session.ota().take_completed());
}

#[test]
fn acks_do_not_wait_for_uplink() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    assert!(!h.session.context().unwrap().uplink_enabled());
    let image = firmware_image(CHUNK);
    send_setup(&mut h, image.len(), &md5_hex(&image));
    assert_eq!(acks(&h), ["READY[0]"]);
}

#[test]
fn uppercase_digest_is_accepted() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    let image = firmware_image(CHUNK + 17);
    send_setup(&mut h, image.len(), &md5_hex(&image).to_uppercase());
    send_chunks(&mut h, &image);
    assert_eq!(h.session.ota().last_outcome(), Some(OtaOutcome::Completed));
}

#[test]
fn digest_mismatch_reports_error() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    let image = firmware_image(CHUNK * 2);

    send_setup(&mut h, image.len(), &"0".repeat(32));
    send_chunks(&mut h, &image);

    assert_eq!(acks(&h), ["READY[0]", "ACK[1]", "ACK[2]", "ERROR[3]"]);
    assert_eq!(
        h.session.ota().last_outcome(),
        Some(OtaOutcome::Failed(OtaError::DigestMismatch))
    );
    assert!(!h.session.ota().available());
}

#[test]
fn oversized_image_rejected_at_setup() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    send_setup(&mut h, FLASH_CAPACITY as usize + 1, &"a".repeat(32));
    assert_eq!(acks(&h), ["ERROR[0]"]);
    assert!(matches!(
        h.session.ota().last_outcome(),
        Some(OtaOutcome::Failed(OtaError::Begin(_)))
    ));
}

#[test]
fn malformed_setup_rejected() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    send_setup(&mut h, 0, &"a".repeat(32));
    assert_eq!(
        h.session.ota().last_outcome(),
        Some(OtaOutcome::Failed(OtaError::InvalidSize))
    );

    send_setup(&mut h, 1024, "not-a-digest");
    assert_eq!(
        h.session.ota().last_outcome(),
        Some(OtaOutcome::Failed(OtaError::InvalidDigest))
    );
    assert_eq!(acks(&h), ["ERROR[0]", "ERROR[0]"]);
}

#[test]
fn overflowing_chunk_fails_transfer() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    let image = firmware_image(CHUNK * 2);
    send_setup(&mut h, CHUNK, &md5_hex(&image[..CHUNK]));
    h.ota_chunk(&image);
    assert_eq!(acks(&h), ["READY[0]", "ERROR[1]"]);
    assert_eq!(
        h.session.ota().last_outcome(),
        Some(OtaOutcome::Failed(OtaError::Overflow))
    );
}

#[test]
fn idle_transfer_times_out() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    let image = firmware_image(CHUNK * 2);
    send_setup(&mut h, image.len(), &md5_hex(&image));
    send_chunks(&mut h, &image[..CHUNK]);

    h.poll(5_000);
    assert_eq!(h.session.ota().state(), OtaState::Transferring);
    h.poll(1);
    assert_eq!(acks(&h), ["READY[0]", "ACK[1]", "TIMEOUT[2]"]);
    assert_eq!(h.session.ota().state(), OtaState::Idle);
    assert_eq!(h.session.ota().last_outcome(), Some(OtaOutcome::TimedOut));
}

#[test]
fn disconnect_aborts_silently() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    let image = firmware_image(CHUNK * 2);
    send_setup(&mut h, image.len(), &md5_hex(&image));
    send_chunks(&mut h, &image[..CHUNK]);

    h.wire.drop_link();
    h.poll(10);
    assert_eq!(h.session.ota().state(), OtaState::Idle);
    assert_eq!(
        h.session.ota().last_outcome(),
        Some(OtaOutcome::Failed(OtaError::ConnectionLost))
    );
    assert_eq!(acks(&h), ["READY[0]", "ACK[1]"]);
}

#[test]
fn line_link_chunks_keep_cr_and_lf_bytes() {
    for kind in [TransportKind::Serial, TransportKind::Socket] {
        let mut h = Harness::new(kind);
        h.connect();
        let image = [0xE9, 1, 2, 3, 0x0D];
        send_setup(&mut h, image.len(), &md5_hex(&image));
        h.ota_chunk(&image);
        assert_eq!(acks(&h), ["READY[0]", "ACK[1]", "DONE[2]"], "{kind}");
        assert_eq!(h.session.ota().last_outcome(), Some(OtaOutcome::Completed));
    }
}

#[test]
fn ble_chunks_stay_raw() {
    let mut h = Harness::new(TransportKind::Ble);
    h.connect();
    let image = [0xE9, 0x0A, 0x0D, 0x0A];
    send_setup(&mut h, image.len(), &md5_hex(&image));
    h.ota_chunk(&image);
    assert_eq!(acks(&h), ["READY[0]", "ACK[1]", "DONE[2]"]);
}

#[test]
fn raw_chunk_on_line_link_is_dropped() {
    let mut h = Harness::new(TransportKind::Serial);
    h.connect();
    let image = firmware_image(CHUNK);
    send_setup(&mut h, image.len(), &md5_hex(&image));
    let inbound = h.ota_ids().inbound.unwrap();
    h.wire.inject(&inbound, &image[..]);
    h.poll(10);
    assert_eq!(acks(&h), ["READY[0]"]);
    assert_eq!(h.session.ota().progress(), Some((0, CHUNK as u32)));
}

#[test]
fn second_setup_restarts_from_zero() {
    let mut h = Harness::new(TransportKind::Socket);
    h.connect();
    let image = firmware_image(CHUNK * 2);
    send_setup(&mut h, image.len(), &md5_hex(&image));
    send_chunks(&mut h, &image[..CHUNK]);

    send_setup(&mut h, image.len(), &md5_hex(&image));
    assert_eq!(h.session.ota().progress(), Some((0, image.len() as u32)));
    send_chunks(&mut h, &image);
    assert_eq!(h.session.ota().last_outcome(), Some(OtaOutcome::Completed));
    assert_eq!(
        acks(&h),
        ["READY[0]", "ACK[1]", "READY[0]", "ACK[1]", "ACK[2]", "DONE[3]"]
    );
}
