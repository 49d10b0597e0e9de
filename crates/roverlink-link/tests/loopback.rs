use std::net::UdpSocket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use roverlink_frame::{
    decode_compact, CompactKind, ExtendedMessage, FieldValue, HeartbeatPayload, MessageType,
    Payload, ProtocolVersion, TelemetryPayload,
};
use roverlink_link::{CommunicationManager, LinkConfig, LinkState, Message};
use roverlink_transport::{Transport, UdpTransport};

fn udp_pair() -> (UdpTransport, UdpTransport) {
    let a = UdpSocket::bind("127.0.0.1:0").expect("socket a should bind");
    let b = UdpSocket::bind("127.0.0.1:0").expect("socket b should bind");
    let a_addr = a.local_addr().expect("socket a should have an address");
    let b_addr = b.local_addr().expect("socket b should have an address");
    (
        UdpTransport::from_socket(a, b_addr).expect("transport a"),
        UdpTransport::from_socket(b, a_addr).expect("transport b"),
    )
}

fn config(protocol: ProtocolVersion, heartbeat: bool) -> LinkConfig {
    let mut config = LinkConfig {
        protocol,
        receive_poll_ms: 20,
        ..LinkConfig::default()
    };
    config.heartbeat.enabled = heartbeat;
    config.heartbeat.interval_ms = 50;
    config.heartbeat.timeout_ms = 200;
    config.heartbeat.check_interval_ms = 20;
    config
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn controller_frame_arrives_as_one_datagram() {
    let wire = [0xDE, 0x80, 0x40, 0x01, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04];
    let (a, b) = udp_pair();

    a.send(&wire).expect("send should succeed");
    let received = b
        .receive(Duration::from_secs(2))
        .expect("peer should receive the frame");

    assert_eq!(received.as_ref(), &wire);
    let frame = decode_compact(&received).expect("frame should decode");
    assert_eq!(frame.kind, CompactKind::Controller);
    let fields: Vec<u32> = frame
        .fields
        .iter()
        .map(|field| field.as_uint().expect("controller fields are integers"))
        .collect();
    assert_eq!(fields, vec![0x80, 0x40, 0x01, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn controller_frame_dispatched_between_managers() {
    let (a, b) = udp_pair();
    let sender = CommunicationManager::with_transport(
        config(ProtocolVersion::Compact, false),
        Arc::new(a),
    )
    .expect("sender should build");
    let receiver = CommunicationManager::with_transport(
        config(ProtocolVersion::Compact, false),
        Arc::new(b),
    )
    .expect("receiver should build");

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    receiver.on_message(CompactKind::Controller, move |message: &Message| {
        if let Message::Compact(frame) = message {
            sink.lock().unwrap().push(frame.clone());
        }
    });
    receiver.start().expect("receiver should start");

    let fields: Vec<FieldValue> = [0x80, 0x40, 0x01, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04]
        .into_iter()
        .map(FieldValue::Uint)
        .collect();
    sender
        .send_compact(0xDE, &fields)
        .expect("send should succeed");

    assert!(wait_for(Duration::from_secs(2), || {
        frames.lock().unwrap().len() == 1
    }));
    assert_eq!(frames.lock().unwrap()[0].fields, fields);
    receiver.shutdown();
}

#[test]
fn duplicate_msg_id_dispatched_once() {
    let (raw_peer, link_side) = udp_pair();
    let manager = CommunicationManager::with_transport(
        config(ProtocolVersion::Extended, false),
        Arc::new(link_side),
    )
    .expect("manager should build");

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    manager.on_message(MessageType::Telemetry, move |_: &Message| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    manager.start().expect("manager should start");

    let msg = ExtendedMessage::new(42, 0, Payload::Telemetry(TelemetryPayload::default()));
    let mut wire = BytesMut::new();
    msg.encode(&mut wire).expect("message should encode");
    raw_peer.send(&wire).expect("first send");
    raw_peer.send(&wire).expect("second send");

    let next = ExtendedMessage::new(43, 0, Payload::Telemetry(TelemetryPayload::default()));
    let mut wire = BytesMut::new();
    next.encode(&mut wire).expect("message should encode");
    raw_peer.send(&wire).expect("third send");

    assert!(wait_for(Duration::from_secs(2), || {
        count.load(Ordering::SeqCst) == 2
    }));
    // give a late duplicate a chance to show up
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(manager.stats().duplicates_dropped, 1);
    manager.shutdown();
}

#[test]
fn extended_receiver_accepts_compact_heartbeat() {
    let (raw_peer, link_side) = udp_pair();
    let manager = CommunicationManager::with_transport(
        config(ProtocolVersion::Extended, false),
        Arc::new(link_side),
    )
    .expect("manager should build");

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    manager.on_message(CompactKind::Heartbeat, move |_: &Message| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    manager.start().expect("manager should start");

    raw_peer.send(&[0xAA, 0x12, 0x34]).expect("send");
    assert!(wait_for(Duration::from_secs(2), || {
        count.load(Ordering::SeqCst) == 1
    }));
    manager.shutdown();
}

#[test]
fn heartbeats_connect_and_silence_disconnects() {
    let (a, b) = udp_pair();
    let left = CommunicationManager::with_transport(
        config(ProtocolVersion::Extended, true),
        Arc::new(a),
    )
    .expect("left should build");
    let right = CommunicationManager::with_transport(
        config(ProtocolVersion::Extended, true),
        Arc::new(b),
    )
    .expect("right should build");

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    left.on_link_state(move |transition| sink.lock().unwrap().push(transition.to));

    assert_eq!(left.current_link_state(), LinkState::Disconnected);
    left.start().expect("left should start");
    right.start().expect("right should start");

    assert!(wait_for(Duration::from_secs(2), || {
        left.current_link_state() == LinkState::Connected
    }));
    assert!(left.stats().heartbeats_sent >= 1);

    right.shutdown();
    assert!(wait_for(Duration::from_secs(3), || {
        left.current_link_state() == LinkState::Disconnected
    }));

    let seen = states.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            LinkState::Connected,
            LinkState::Degraded,
            LinkState::Disconnected
        ]
    );
    left.shutdown();
}

#[test]
fn extended_heartbeat_payload_on_the_wire() {
    let (a, raw_peer) = udp_pair();
    let manager = CommunicationManager::with_transport(
        config(ProtocolVersion::Extended, false),
        Arc::new(a),
    )
    .expect("manager should build");

    manager.send_heartbeat().expect("heartbeat should send");
    let bytes = raw_peer
        .receive(Duration::from_secs(2))
        .expect("heartbeat should arrive");
    let msg = ExtendedMessage::decode(&bytes).expect("heartbeat should decode");
    assert_eq!(msg.msg_id, 0);
    assert_eq!(msg.payload, Payload::Heartbeat(HeartbeatPayload::default()));
}
