use std::sync::Arc;

use mavwire_frame::{
    DecodeError, ParseEvent, SecretKey, SignatureFailure, SigningConfig, SigningContext,
};
use mavwire_link::{Link, LinkConfig};
use mavwire_registry::{Message, Registry};

const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

fn keyed_link(system_id: u8) -> Link {
    let registry = Registry::builtin().unwrap();
    let config = LinkConfig::new(system_id, 1)
        .with_secret_key_hex(KEY_HEX)
        .unwrap();
    Link::from_registry(&registry, "common", config).unwrap()
}

fn timesync(link: &Link, ts1: i64) -> Message {
    Message::new(Arc::clone(link.dialect().lookup("TIMESYNC").unwrap()))
        .with("ts1", ts1)
        .unwrap()
}

fn rejection(events: &[ParseEvent]) -> Option<&DecodeError> {
    events.iter().find_map(|event| match event {
        ParseEvent::Bad(bad) => Some(&bad.error),
        _ => None,
    })
}

#[test]
fn replayed_frame_is_rejected() {
    let mut gcs = keyed_link(255);
    let mut vehicle = keyed_link(1);

    let first = gcs.pack(&timesync(&gcs, 1)).unwrap();
    let second = gcs.pack(&timesync(&gcs, 2)).unwrap();

    assert!(matches!(vehicle.parse_buffer(&first)[..], [ParseEvent::Message(_)]));
    assert!(matches!(vehicle.parse_buffer(&second)[..], [ParseEvent::Message(_)]));

    let replay = vehicle.parse_buffer(&first);
    assert!(matches!(
        rejection(&replay),
        Some(DecodeError::SignatureRejected(SignatureFailure::Replay { .. }))
    ));

    let counters = vehicle.signing().unwrap().counters();
    assert_eq!(counters.goodsig_count, 2);
    assert_eq!(counters.reject_count, 1);
}

#[test]
fn unsigned_peer_needs_policy() {
    let registry = Registry::builtin().unwrap();
    let mut plain = Link::from_registry(&registry, "common", LinkConfig::new(7, 1)).unwrap();
    let mut vehicle = keyed_link(1);

    let frame = plain.pack(&timesync(&plain, 5)).unwrap();
    assert!(matches!(
        rejection(&vehicle.parse_buffer(&frame)),
        Some(DecodeError::SignatureRejected(SignatureFailure::Unsigned))
    ));
    assert_eq!(vehicle.signing().unwrap().counters().unsigned_count, 1);

    let key = SecretKey::from_hex(KEY_HEX).unwrap();
    let lenient = SigningContext::new(SigningConfig::with_key(key))
        .with_allow_unsigned(|header| header.system_id == 7);
    vehicle.set_signing(Some(lenient));

    let frame = plain.pack(&timesync(&plain, 6)).unwrap();
    assert!(matches!(vehicle.parse_buffer(&frame)[..], [ParseEvent::Message(_)]));
}

#[test]
fn legacy_frames_are_never_signed() {
    let registry = Registry::builtin().unwrap();
    let config = LinkConfig {
        force_legacy: true,
        ..LinkConfig::new(255, 1).with_secret_key_hex(KEY_HEX).unwrap()
    };
    let mut gcs = Link::from_registry(&registry, "common", config).unwrap();

    let frame = gcs.pack(&timesync(&gcs, 1)).unwrap();
    assert_eq!(frame[0], 0xFE);
    assert_eq!(gcs.signing().unwrap().counters().sig_count, 0);
}
