//! End-to-end tests that don't require real hardware: URI validation,
//! packet boundary behavior, and default settings. The multiplexing engine
//! itself (safelink retransmission, send-queue ordering, the detach
//! handshake) is covered by the `#[cfg(test)]` unit tests next to
//! `DongleWorker` and `ConnectionState`, which run against a fake radio.

use crazyflie_link::{Connection, LinkError, Packet, Settings};

#[test]
fn rejects_malformed_datarate_in_uri() {
    // S2: a uri naming an unsupported datarate must fail construction.
    let err = Connection::open("radio://0/80/3M/E7E7E7E7E7").unwrap_err();
    assert!(matches!(err, LinkError::InvalidUri(_)));
}

#[test]
fn rejects_garbage_uri() {
    let err = Connection::open("not-a-uri").unwrap_err();
    assert!(matches!(err, LinkError::InvalidUri(_)));
}

#[test]
fn rejects_short_address() {
    let err = Connection::open("radio://0/80/2M/E7E7").unwrap_err();
    assert!(matches!(err, LinkError::InvalidUri(_)));
}

#[test]
fn rejects_out_of_range_channel() {
    let err = Connection::open("radio://0/200/2M/E7E7E7E7E7").unwrap_err();
    assert!(matches!(err, LinkError::InvalidUri(_)));
}

#[test]
fn payload_of_30_bytes_is_accepted_31_is_rejected() {
    assert!(Packet::new(0, 0, vec![0u8; 30]).is_ok());
    assert!(matches!(
        Packet::new(0, 0, vec![0u8; 31]),
        Err(LinkError::PayloadTooLarge(31))
    ));
}

#[test]
fn ping_and_safelink_enable_frames_match_the_wire_layout() {
    assert_eq!(Packet::ping().raw(), vec![0xFF]);
    assert_eq!(Packet::safelink_enable().raw(), vec![0xFF, 0x05, 0x01]);
}

#[test]
fn settings_default_to_no_safelink_and_unbounded_queue() {
    let settings = Settings::default();
    assert!(!settings.use_safelink);
    assert_eq!(settings.send_queue_bound, None);
}
