#![cfg(feature = "async")]

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use mavwire_frame::{ParseEvent, SecretKey, SigningConfig};
use mavwire_link::{Link, LinkCodec, LinkConfig};
use mavwire_registry::{Message, Registry};
use tokio_util::codec::Framed;

fn link(system_id: u8, key: Option<SecretKey>) -> Link {
    let registry = Registry::builtin().unwrap();
    let config = LinkConfig {
        signing: key.map(SigningConfig::with_key),
        ..LinkConfig::new(system_id, 1)
    };
    Link::from_registry(&registry, "common", config).unwrap()
}

fn command_long(link: &Link, command: u16) -> Message {
    Message::new(Arc::clone(link.dialect().lookup("COMMAND_LONG").unwrap()))
        .with("command", command)
        .unwrap()
        .with("target_system", 2u8)
        .unwrap()
        .with("param1", 1.0f32)
        .unwrap()
}

#[tokio::test]
async fn framed_round_trip() {
    let (left, right) = tokio::io::duplex(1024);
    let mut gcs = Framed::new(left, LinkCodec::new(link(255, None)));
    let mut vehicle = Framed::new(right, LinkCodec::new(link(1, None)));

    for command in [400u16, 176, 22] {
        let msg = command_long(gcs.codec().link(), command);
        gcs.send(msg).await.unwrap();
    }

    for (seq, command) in [(0u8, 400u64), (1, 176), (2, 22)] {
        let event = vehicle.next().await.unwrap().unwrap();
        let ParseEvent::Message(packet) = event else {
            panic!("unexpected event {event:?}");
        };
        assert_eq!(packet.header.sequence, seq);
        assert_eq!(packet.header.system_id, 255);
        assert_eq!(
            packet.message.get("command").and_then(|v| v.as_u64()),
            Some(command)
        );
    }
    assert_eq!(vehicle.codec().link().stats().packets_received, 3);
}

#[tokio::test]
async fn signed_traffic_over_framed() {
    let key = SecretKey::from_passphrase("field test");
    let (left, right) = tokio::io::duplex(1024);
    let mut gcs = Framed::new(left, LinkCodec::new(link(255, Some(key.clone()))));
    let mut vehicle = Framed::new(right, LinkCodec::new(link(1, Some(key))));

    let msg = command_long(gcs.codec().link(), 400);
    gcs.send(&msg).await.unwrap();

    let event = vehicle.next().await.unwrap().unwrap();
    assert!(matches!(&event, ParseEvent::Message(p) if p.signature.is_some()));
    let counters = vehicle.codec().link().signing().unwrap().counters();
    assert_eq!(counters.goodsig_count, 1);
}

#[tokio::test]
async fn closed_stream_ends() {
    let (left, right) = tokio::io::duplex(64);
    let mut vehicle = Framed::new(right, LinkCodec::new(link(1, None)));
    drop(left);
    assert!(vehicle.next().await.is_none());
}
