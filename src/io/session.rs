//! Blocking session pump
//!
//! One [`Session`] owns one connection. Reading, framing, verification and
//! dispatch happen sequentially on the calling thread; decoding never blocks
//! and shares nothing but the read-only CRC engine.

use crate::config::SessionConfig;
use crate::error::{IgtlError, Result};
use crate::io::framer::{Frame, FrameAssembler};
use crate::io::outbound::{ChangeTracker, OutboundEncoder};
use crate::io::transport::{TcpTransport, Transport};
use crate::protocol::any_message::AnyMessage;
use crate::protocol::crc::Crc64;
use crate::protocol::message::{IgtlMessage, Message};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest a blocking read may wait before the pump looks at `cancel` again
pub const IDLE_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// What a single [`Session::poll`] produced
#[derive(Debug)]
pub enum SessionEvent {
    /// A verified, decoded message
    Message(AnyMessage),
    /// A frame that was received whole but could not be used
    ///
    /// The error is always frame-local; the session carries on with the next
    /// header.
    Dropped(IgtlError),
    /// A partial frame has been waiting longer than the stall timeout
    Stalled {
        buffered: usize,
        expected: Option<usize>,
        elapsed: Duration,
    },
}

/// Turn a complete frame into an event, or a terminal error
pub(crate) fn frame_event(frame: &Frame, crc: &Crc64, verify_crc: bool) -> Result<SessionEvent> {
    match frame.decode(crc, verify_crc) {
        Ok(message) => Ok(SessionEvent::Message(message)),
        Err(e) if e.is_frame_local() => Ok(SessionEvent::Dropped(e)),
        Err(e) => Err(e),
    }
}

/// Pump one stall report out of the assembler, if due
pub(crate) fn stall_event(
    assembler: &mut FrameAssembler,
    timeout: Option<Duration>,
) -> Option<SessionEvent> {
    let stall = assembler.stall(timeout?)?;
    warn!(
        buffered = stall.buffered,
        expected = ?stall.expected,
        elapsed_ms = stall.elapsed.as_millis() as u64,
        "Incomplete frame stalled"
    );
    Some(SessionEvent::Stalled {
        buffered: stall.buffered,
        expected: stall.expected,
        elapsed: stall.elapsed,
    })
}

/// Blocking OpenIGTLink session over any [`Transport`]
///
/// # Examples
///
/// ```no_run
/// use openigtlink_codec::config::SessionConfig;
/// use openigtlink_codec::io::{Session, SessionEvent};
///
/// let mut session = Session::connect(&SessionConfig::default())?;
/// loop {
///     match session.poll()? {
///         SessionEvent::Message(msg) => println!("{} from {}", msg.message_type(), msg.device_name()?),
///         SessionEvent::Dropped(err) => eprintln!("dropped: {err}"),
///         SessionEvent::Stalled { buffered, .. } => eprintln!("{buffered} bytes waiting"),
///     }
/// }
/// # Ok::<(), openigtlink_codec::IgtlError>(())
/// ```
pub struct Session<T: Transport> {
    transport: T,
    assembler: FrameAssembler,
    crc: Crc64,
    verify_crc: bool,
    stall_timeout: Option<Duration>,
    read_buf: Vec<u8>,
    outbound: OutboundEncoder,
}

impl Session<TcpTransport> {
    /// Connect over TCP to the configured host and port
    ///
    /// Socket reads time out after the stall timeout or [`IDLE_READ_TIMEOUT`],
    /// whichever is shorter, so that stalls and cancellation are noticed on
    /// an idle connection.
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let transport = TcpTransport::connect(&config.host, config.port)?;
        let read_timeout = config
            .stall_timeout()
            .map_or(IDLE_READ_TIMEOUT, |stall| stall.min(IDLE_READ_TIMEOUT));
        transport.set_read_timeout(Some(read_timeout))?;
        Session::new(transport, config)
    }
}

impl<T: Transport> Session<T> {
    /// Session over an already connected transport
    pub fn new(transport: T, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let crc = config.crc_engine()?;
        if !config.verify_crc {
            warn!("CRC verification disabled - use only in trusted environments");
        }
        Ok(Session {
            transport,
            assembler: FrameAssembler::new(config.max_body_size),
            outbound: OutboundEncoder::new(
                crc.clone(),
                config.max_body_size,
                config.model_name_metadata,
            ),
            crc,
            verify_crc: config.verify_crc,
            stall_timeout: config.stall_timeout(),
            read_buf: vec![0u8; config.read_chunk_size],
        })
    }

    /// Block until the next event
    ///
    /// # Errors
    /// Only terminal errors: transport failures, `ConnectionClosed`, or
    /// `BodyTooLarge` from a header whose length cannot be trusted.
    pub fn poll(&mut self) -> Result<SessionEvent> {
        loop {
            if let Some(event) = self.try_poll()? {
                return Ok(event);
            }
        }
    }

    /// Produce an event from buffered bytes, or read from the transport once
    ///
    /// Returns `Ok(None)` when that read timed out or did not complete an
    /// event. Errors are the same as for [`Session::poll`].
    pub fn try_poll(&mut self) -> Result<Option<SessionEvent>> {
        if let Some(frame) = self.assembler.next_frame()? {
            return frame_event(&frame, &self.crc, self.verify_crc).map(Some);
        }
        if let Some(event) = stall_event(&mut self.assembler, self.stall_timeout) {
            return Ok(Some(event));
        }

        match self.transport.read(&mut self.read_buf) {
            Ok(0) => {
                if self.assembler.buffered() > 0 {
                    warn!(
                        buffered = self.assembler.buffered(),
                        "Connection closed mid-frame"
                    );
                }
                Err(IgtlError::ConnectionClosed)
            }
            Ok(n) => {
                self.assembler.push(&self.read_buf[..n]);
                Ok(None)
            }
            Err(IgtlError::Io(e))
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until `cancel` is set or the connection ends, handing every event
    /// to `handler`
    ///
    /// `cancel` is checked after every read attempt, so an idle connection
    /// notices it within one read timeout; a frame is never abandoned
    /// half-decoded. A peer that closes the connection on a frame boundary
    /// ends the run cleanly.
    pub fn run<F>(&mut self, cancel: &AtomicBool, mut handler: F) -> Result<()>
    where
        F: FnMut(SessionEvent),
    {
        info!("Session pump started");
        while !cancel.load(Ordering::Acquire) {
            match self.try_poll() {
                Ok(Some(event)) => handler(event),
                Ok(None) => {}
                Err(IgtlError::ConnectionClosed) if self.assembler.buffered() == 0 => {
                    info!("Peer closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        debug!("Session pump cancelled");
        Ok(())
    }

    /// Encode and send `message`
    ///
    /// Returns `false` when the content is identical to the last message sent
    /// for the same device and kind, in which case nothing is written. The
    /// frame is fully built and checksummed before any byte reaches the
    /// transport.
    pub fn send<M: Message + Clone>(&mut self, message: &IgtlMessage<M>) -> Result<bool> {
        let frame = match self.outbound.prepare(message)? {
            Some(frame) => frame,
            None => return Ok(false),
        };
        if let Err(e) = self.transport.write(&frame.bytes) {
            self.outbound.sent_failed(frame);
            return Err(e);
        }
        Ok(true)
    }

    /// Outbound change records, e.g. to force a resend
    pub fn change_tracker(&mut self) -> &mut ChangeTracker {
        self.outbound.tracker_mut()
    }

    /// Bytes received but not yet part of a complete frame
    pub fn buffered(&self) -> usize {
        self.assembler.buffered()
    }

    /// Close the transport
    pub fn close(mut self) -> Result<()> {
        self.transport.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::TypeName;
    use crate::protocol::types::{StringBody, TransformBody};
    use std::collections::VecDeque;
    use std::sync::{mpsc, Arc};

    #[derive(Default)]
    struct MockTransport {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<Vec<u8>>,
        fail_writes: bool,
    }

    impl MockTransport {
        fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
            MockTransport {
                chunks: chunks.into(),
                ..Default::default()
            }
        }
    }

    impl Transport for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            if self.fail_writes {
                return Err(std::io::Error::new(ErrorKind::BrokenPipe, "closed").into());
            }
            self.written.push(data.to_vec());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Connected peer that never sends anything
    struct IdleTransport;

    impl Transport for IdleTransport {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            std::thread::sleep(Duration::from_millis(10));
            Err(std::io::Error::new(ErrorKind::WouldBlock, "no data").into())
        }

        fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::default().with_stall_timeout(Duration::ZERO)
    }

    fn string_frame(text: &str) -> Vec<u8> {
        IgtlMessage::new(StringBody::new(text), "Console")
            .unwrap()
            .encode()
            .unwrap()
    }

    #[test]
    fn test_poll_whole_frame() {
        let transport = MockTransport::with_chunks(vec![string_frame("hi")]);
        let mut session = Session::new(transport, &config()).unwrap();
        match session.poll().unwrap() {
            SessionEvent::Message(AnyMessage::String(msg)) => assert_eq!(msg.content.as_str(), "hi"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(session.poll(), Err(IgtlError::ConnectionClosed)));
    }

    #[test]
    fn test_poll_small_read_buffer() {
        let transport = MockTransport::with_chunks(vec![string_frame("fragmented")]);
        let mut session =
            Session::new(transport, &config().with_read_chunk_size(3)).unwrap();
        assert!(matches!(session.poll().unwrap(), SessionEvent::Message(_)));
    }

    #[test]
    fn test_unknown_type_dropped_then_next_decodes() {
        let mut bad = IgtlMessage::new(StringBody::new("x"), "Dev").unwrap();
        bad.header.type_name = TypeName::new("FOOBAR").unwrap();
        let mut stream = bad.encode().unwrap();
        stream.extend(string_frame("after"));

        let mut session = Session::new(MockTransport::with_chunks(vec![stream]), &config()).unwrap();
        assert!(matches!(
            session.poll().unwrap(),
            SessionEvent::Dropped(IgtlError::UnknownMessageType(_))
        ));
        assert!(matches!(
            session.poll().unwrap(),
            SessionEvent::Message(AnyMessage::String(_))
        ));
    }

    #[test]
    fn test_corrupt_frame_dropped() {
        let mut frame = string_frame("payload");
        let last = frame.len() - 1;
        frame[last] ^= 0x20;
        let mut session = Session::new(MockTransport::with_chunks(vec![frame]), &config()).unwrap();
        assert!(matches!(
            session.poll().unwrap(),
            SessionEvent::Dropped(IgtlError::CorruptMessage { .. })
        ));
    }

    #[test]
    fn test_close_mid_frame() {
        let frame = string_frame("partial");
        let transport = MockTransport::with_chunks(vec![frame[..40].to_vec()]);
        let mut session = Session::new(transport, &config()).unwrap();
        assert!(matches!(session.poll(), Err(IgtlError::ConnectionClosed)));
        assert_eq!(session.buffered(), 40);
    }

    #[test]
    fn test_stall_event_once_per_frame() {
        let frame = string_frame("partial");
        let mut assembler = FrameAssembler::new(1024);
        assembler.push(&frame[..40]);
        assert!(stall_event(&mut assembler, None).is_none());
        assert!(matches!(
            stall_event(&mut assembler, Some(Duration::ZERO)),
            Some(SessionEvent::Stalled { buffered: 40, expected: None, .. })
        ));
        assert!(stall_event(&mut assembler, Some(Duration::ZERO)).is_none());
    }

    #[test]
    fn test_oversized_header_is_terminal() {
        let mut header =
            crate::protocol::Header::for_kind(crate::protocol::MessageKind::Image, "Scanner").unwrap();
        header.body_size = 1 << 30;
        let transport = MockTransport::with_chunks(vec![header.encode().to_vec()]);
        let mut session =
            Session::new(transport, &config().with_max_body_size(1024)).unwrap();
        assert!(matches!(session.poll(), Err(IgtlError::BodyTooLarge { .. })));
    }

    #[test]
    fn test_run_until_close() {
        let mut stream = string_frame("one");
        stream.extend(string_frame("two"));
        let mut session = Session::new(MockTransport::with_chunks(vec![stream]), &config()).unwrap();

        let cancel = AtomicBool::new(false);
        let mut texts = Vec::new();
        session
            .run(&cancel, |event| {
                if let SessionEvent::Message(AnyMessage::String(msg)) = event {
                    texts.push(msg.content.as_str().to_string());
                }
            })
            .unwrap();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_run_cancelled_between_frames() {
        let mut stream = string_frame("one");
        stream.extend(string_frame("two"));
        let mut session = Session::new(MockTransport::with_chunks(vec![stream]), &config()).unwrap();

        let cancel = AtomicBool::new(false);
        let mut count = 0;
        session
            .run(&cancel, |_| {
                count += 1;
                cancel.store(true, Ordering::Release);
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_try_poll_idle() {
        let mut session = Session::new(IdleTransport, &config()).unwrap();
        assert!(session.try_poll().unwrap().is_none());
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_run_cancelled_while_idle() {
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let worker_cancel = Arc::clone(&cancel);
        let worker = std::thread::spawn(move || {
            let mut session = Session::new(IdleTransport, &config()).unwrap();
            let mut events = 0;
            let result = session.run(&worker_cancel, |_| events += 1);
            done_tx.send((result.is_ok(), events)).unwrap();
        });

        std::thread::sleep(Duration::from_millis(100));
        cancel.store(true, Ordering::Release);
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)), Ok((true, 0)));
        worker.join().unwrap();
    }

    #[test]
    fn test_send_suppresses_unchanged() {
        let mut session = Session::new(MockTransport::default(), &config()).unwrap();
        let msg = IgtlMessage::new(TransformBody::translation(1.0, 0.0, 0.0), "Needle").unwrap();
        assert!(session.send(&msg).unwrap());
        assert!(!session.send(&msg).unwrap());

        session
            .change_tracker()
            .forget("Needle", crate::protocol::MessageKind::Transform);
        assert!(session.send(&msg).unwrap());
        assert_eq!(session.transport.written.len(), 2);

        let decoded = IgtlMessage::<TransformBody>::decode(&session.transport.written[0]).unwrap();
        assert_eq!(decoded.content, msg.content);
        assert!(decoded.metadata.get("ModelName").is_some());
    }

    #[test]
    fn test_failed_write_not_recorded() {
        let transport = MockTransport {
            fail_writes: true,
            ..Default::default()
        };
        let mut session = Session::new(transport, &config()).unwrap();
        let msg = IgtlMessage::new(StringBody::new("x"), "Console").unwrap();
        assert!(matches!(session.send(&msg), Err(IgtlError::Io(_))));

        session.transport.fail_writes = false;
        assert!(session.send(&msg).unwrap());
    }
}
