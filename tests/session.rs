//! Session Integration Tests
//!
//! Drive the framer and both session pumps with realistic streams: frames
//! split at every possible byte, unknown and corrupted frames mixed with
//! valid ones, and loopback TCP connections.

use openigtlink_codec::config::SessionConfig;
use openigtlink_codec::io::{AsyncSession, FrameAssembler, Session, SessionEvent, TcpTransport};
use openigtlink_codec::protocol::crc::Crc64;
use openigtlink_codec::protocol::header::{Timestamp, TypeName};
use openigtlink_codec::protocol::message::IgtlMessage;
use openigtlink_codec::protocol::types::{
    ImageBody, PolyDataBody, ScalarType, StringBody, TransformBody,
};
use openigtlink_codec::protocol::{AnyMessage, Metadata};
use openigtlink_codec::IgtlError;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio_test::io::Builder;

fn sample_stream() -> Vec<Vec<u8>> {
    vec![
        IgtlMessage::new(TransformBody::translation(1.0, 2.0, 3.0), "Tracker")
            .unwrap()
            .with_timestamp(Timestamp::new(1, 0))
            .encode()
            .unwrap(),
        IgtlMessage::new(
            ImageBody::new(ScalarType::Int16, 1, [3, 2, 1], vec![0; 12]).unwrap(),
            "Scanner",
        )
        .unwrap()
        .with_metadata(Metadata::new().with_ascii("ModelName", "Scanner"))
        .encode()
        .unwrap(),
        IgtlMessage::new(
            PolyDataBody::new(vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
                .with_polygons(vec![vec![0, 1, 2]]),
            "Mesh",
        )
        .unwrap()
        .encode()
        .unwrap(),
        IgtlMessage::new(StringBody::utf8("done ✓"), "Console")
            .unwrap()
            .encode()
            .unwrap(),
    ]
}

fn drain(assembler: &mut FrameAssembler) -> Vec<AnyMessage> {
    let mut messages = Vec::new();
    while let Some(frame) = assembler.next_frame().unwrap() {
        messages.push(frame.decode(Crc64::ecma182(), true).unwrap());
    }
    messages
}

/// One-byte chunks decode to exactly what a single chunk does
#[test]
fn test_fragmentation_equivalence() {
    let stream: Vec<u8> = sample_stream().concat();

    let mut whole = FrameAssembler::new(1 << 20);
    whole.push(&stream);
    let expected = drain(&mut whole);
    assert_eq!(expected.len(), 4);

    let mut fragmented = FrameAssembler::new(1 << 20);
    let mut received = Vec::new();
    for byte in &stream {
        fragmented.push(std::slice::from_ref(byte));
        received.extend(drain(&mut fragmented));
    }
    assert_eq!(received, expected);
    assert_eq!(fragmented.buffered(), 0);
}

/// Every split point of a two-frame stream yields both frames
#[test]
fn test_every_split_point() {
    let frames = sample_stream();
    let stream = [frames[0].clone(), frames[3].clone()].concat();

    for split in 0..=stream.len() {
        let mut assembler = FrameAssembler::new(1 << 20);
        assembler.push(&stream[..split]);
        let mut messages = drain(&mut assembler);
        assembler.push(&stream[split..]);
        messages.extend(drain(&mut assembler));
        assert_eq!(messages.len(), 2, "split at {}", split);
    }
}

/// Bad frames are reported and skipped; the session keeps going
#[test]
fn test_bad_frames_do_not_end_session() {
    let frames = sample_stream();

    let mut unknown = IgtlMessage::new(StringBody::new("?"), "Dev").unwrap();
    unknown.header.type_name = TypeName::new("FOOBAR").unwrap();
    let mut corrupt = frames[0].clone();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    let stream = [
        unknown.encode().unwrap(),
        frames[1].clone(),
        corrupt,
        frames[3].clone(),
    ]
    .concat();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let peer = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        for chunk in stream.chunks(7) {
            socket.write_all(chunk).unwrap();
        }
    });

    let transport = TcpTransport::connect("127.0.0.1", port).unwrap();
    let config = SessionConfig::default().with_stall_timeout(Duration::ZERO);
    let mut session = Session::new(transport, &config).unwrap();

    let cancel = AtomicBool::new(false);
    let mut events = Vec::new();
    session.run(&cancel, |event| events.push(event)).unwrap();
    peer.join().unwrap();

    assert_eq!(events.len(), 4);
    assert!(matches!(
        &events[0],
        SessionEvent::Dropped(IgtlError::UnknownMessageType(name)) if name == "FOOBAR"
    ));
    assert!(matches!(&events[1], SessionEvent::Message(AnyMessage::Image(_))));
    assert!(matches!(
        &events[2],
        SessionEvent::Dropped(IgtlError::CorruptMessage { .. })
    ));
    match &events[3] {
        SessionEvent::Message(AnyMessage::String(msg)) => {
            assert_eq!(msg.content.as_str(), "done ✓")
        }
        other => panic!("unexpected event {:?}", other),
    }
}

/// The blocking session sends complete frames with ModelName metadata
#[test]
fn test_blocking_send_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let peer = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut bytes = Vec::new();
        socket.read_to_end(&mut bytes).unwrap();
        bytes
    });

    let config = SessionConfig::default().with_port(port);
    let mut session = Session::connect(&config).unwrap();
    let msg = IgtlMessage::new(TransformBody::translation(5.0, 0.0, 0.0), "Needle").unwrap();
    assert!(session.send(&msg).unwrap());
    assert!(!session.send(&msg).unwrap());
    session.close().unwrap();

    let bytes = peer.join().unwrap();
    let decoded = IgtlMessage::<TransformBody>::decode(&bytes).unwrap();
    assert_eq!(decoded.content.position(), [5.0, 0.0, 0.0]);
    assert_eq!(
        decoded.metadata.get("ModelName").unwrap().value_str().unwrap(),
        "Needle"
    );
}

/// Cancelling a blocking run works on a connection that stays silent
#[test]
fn test_blocking_run_cancelled_on_silent_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = SessionConfig::default()
        .with_port(port)
        .with_stall_timeout(Duration::ZERO);

    let cancel = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel();
    let worker_cancel = Arc::clone(&cancel);
    let worker = std::thread::spawn(move || {
        let mut session = Session::connect(&config).unwrap();
        let result = session.run(&worker_cancel, |_| {});
        done_tx.send(result.is_ok()).unwrap();
    });

    let (_socket, _) = listener.accept().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    cancel.store(true, Ordering::Release);

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)), Ok(true));
    worker.join().unwrap();
}

/// The async session over a scripted stream
#[tokio::test]
async fn test_async_scripted_stream() {
    let frames = sample_stream();
    let mut mock = Builder::new();
    for frame in &frames {
        let (head, tail) = frame.split_at(frame.len() / 2);
        mock.read(head).read(tail);
    }
    let mut session = AsyncSession::new(
        mock.build(),
        &SessionConfig::default().with_stall_timeout(Duration::ZERO),
    )
    .unwrap();

    let mut kinds = Vec::new();
    session
        .run_until(std::future::pending::<()>(), |event| {
            if let SessionEvent::Message(msg) = event {
                kinds.push(msg.message_type());
            }
        })
        .await
        .unwrap();
    assert_eq!(kinds, vec!["TRANSFORM", "IMAGE", "POLYDATA", "STRING"]);
}

/// Async round trip between two sessions over loopback TCP
#[tokio::test]
async fn test_async_loopback() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = SessionConfig::default()
        .with_port(port)
        .with_stall_timeout(Duration::ZERO);

    let server_config = config.clone();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut session = AsyncSession::new(socket, &server_config).unwrap();
        let reply = IgtlMessage::new(StringBody::new("ack"), "Server").unwrap();
        match session.recv().await.unwrap() {
            SessionEvent::Message(AnyMessage::Transform(_)) => {
                session.send(&reply).await.unwrap();
            }
            other => panic!("unexpected event {:?}", other),
        }
    });

    let mut client = AsyncSession::connect(&config).await.unwrap();
    let pose = IgtlMessage::new(TransformBody::identity(), "Client").unwrap();
    assert!(client.send(&pose).await.unwrap());

    match client.recv().await.unwrap() {
        SessionEvent::Message(AnyMessage::String(msg)) => {
            assert_eq!(msg.content.as_str(), "ack");
            assert_eq!(msg.metadata.get("ModelName").unwrap().value, b"Server");
        }
        other => panic!("unexpected event {:?}", other),
    }
    server.await.unwrap();
}

/// A runaway body length ends the session
#[tokio::test]
async fn test_async_oversized_body() {
    let mut header =
        openigtlink_codec::protocol::Header::for_kind(openigtlink_codec::protocol::MessageKind::Image, "Big")
            .unwrap();
    header.body_size = u64::MAX;
    let mock = Builder::new().read(&header.encode()).build();
    let mut session = AsyncSession::new(
        mock,
        &SessionConfig::default().with_max_body_size(1 << 20),
    )
    .unwrap();
    assert!(matches!(
        session.recv().await,
        Err(IgtlError::BodyTooLarge { size: u64::MAX, max: 1_048_576 })
    ));
}
