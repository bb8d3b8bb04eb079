//! RTMP publish engine implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, TryRecvError};
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult,
    PublishRequestType,
};
use rml_rtmp::time::RtmpTimestamp;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, trace, warn};

use uplink_api::{CaptureTarget, ConnectionEvent, ConnectionEventSender, StreamParameters};
use uplink_engine::{EngineFactory, StreamEngine};

use crate::endpoint::{parse_destination, Endpoint};
use crate::error::RtmpError;
use crate::meter::BitrateMeter;
use crate::{RtmpResult, CONNECT_TIMEOUT, ESTABLISH_TIMEOUT, SAMPLE_WINDOW};

/// A packet to publish over RTMP.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Packet data.
    pub data: Bytes,

    /// Presentation timestamp in milliseconds.
    pub timestamp_ms: u32,

    /// Whether this is a video packet.
    pub is_video: bool,

    /// Whether this is a keyframe (for video).
    pub is_keyframe: bool,
}

/// Stream engine that publishes to an RTMP server.
///
/// Each publish request runs on its own worker thread holding the
/// connection for the whole attempt. A failed or dropped connection
/// ends the attempt with a terminal event; the engine never retries
/// on its own.
pub struct RtmpEngine {
    events: ConnectionEventSender,
    feed: Option<Receiver<MediaPacket>>,
    target: Option<CaptureTarget>,
    previewing: bool,
    audio_enabled: bool,
    live: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl RtmpEngine {
    /// Creates an engine reporting through `events`, publishing media
    /// from `feed` if one is given.
    pub fn new(events: ConnectionEventSender, feed: Option<Receiver<MediaPacket>>) -> Self {
        Self {
            events,
            feed,
            target: None,
            previewing: false,
            audio_enabled: true,
            live: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl StreamEngine for RtmpEngine {
    fn prepare(&mut self, params: &StreamParameters) -> bool {
        if params.width == 0 || params.height == 0 || params.fps == 0 {
            warn!("Rejecting empty stream parameters");
            return false;
        }

        self.audio_enabled = params.audio_enabled;

        debug!(
            width = params.width,
            height = params.height,
            fps = params.fps,
            bitrate_bps = params.bitrate_bps,
            audio = params.audio_enabled,
            "RTMP pipeline prepared"
        );
        true
    }

    fn attach_target(&mut self, target: CaptureTarget) {
        debug!(target = %target.label(), "Capture target bound");
        self.target = Some(target);
    }

    fn detach_target(&mut self) {
        self.target = None;
    }

    fn start_preview(&mut self) {
        self.previewing = true;
    }

    fn stop_preview(&mut self) {
        self.previewing = false;
    }

    #[instrument(name = "rtmp_publish", skip(self, destination))]
    fn start_publish(&mut self, destination: &str) {
        if self.live.load(Ordering::SeqCst) {
            debug!("Already publishing, ignoring publish request");
            return;
        }

        // A previous attempt may have ended on its own; reap it.
        self.reap_worker();

        info!(destination = %destination, "Starting RTMP publish");
        self.should_stop.store(false, Ordering::SeqCst);
        self.live.store(true, Ordering::SeqCst);

        let destination = destination.to_string();
        let events = self.events.clone();
        let feed = self.feed.clone();
        let audio_enabled = self.audio_enabled;
        let live = Arc::clone(&self.live);
        let should_stop = Arc::clone(&self.should_stop);

        self.worker = Some(thread::spawn(move || {
            publish_worker(destination, events, feed, audio_enabled, live, should_stop);
        }));
    }

    #[instrument(name = "rtmp_stop", skip(self))]
    fn stop_publish(&mut self) {
        if self.worker.is_none() {
            return;
        }

        debug!("Stopping RTMP publish");
        self.should_stop.store(true, Ordering::SeqCst);
        self.reap_worker();
        self.live.store(false, Ordering::SeqCst);
        info!("RTMP publish stopped");
    }

    fn switch_device(&mut self) {
        debug!("RTMP engine has no capture devices to switch");
    }

    fn is_previewing(&self) -> bool {
        self.previewing
    }

    fn is_publishing(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for RtmpEngine {
    fn drop(&mut self) {
        self.stop_publish();
    }
}

/// Builds RTMP engines sharing one media feed.
#[derive(Default)]
pub struct RtmpEngineFactory {
    feed: Option<Receiver<MediaPacket>>,
}

impl RtmpEngineFactory {
    /// Creates a factory for engines without a media feed.
    pub fn new() -> Self {
        Self { feed: None }
    }

    /// Creates a factory whose engines publish packets from `feed`.
    pub fn with_feed(feed: Receiver<MediaPacket>) -> Self {
        Self { feed: Some(feed) }
    }
}

impl EngineFactory for RtmpEngineFactory {
    fn create(&mut self, events: ConnectionEventSender) -> Box<dyn StreamEngine> {
        Box::new(RtmpEngine::new(events.clone(), self.feed.clone()))
    }
}

/// How a publish attempt ended.
enum PublishEnd {
    /// Stop was requested through the engine.
    Stopped,
    /// The attempt never became live.
    Refused(RtmpError),
    /// The live connection ended on its own.
    Dropped(RtmpError),
}

fn publish_worker(
    destination: String,
    events: ConnectionEventSender,
    feed: Option<Receiver<MediaPacket>>,
    audio_enabled: bool,
    live: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
) {
    events.emit(ConnectionEvent::Started {
        destination: destination.clone(),
    });

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build publish runtime: {}", e);
            events.emit(ConnectionEvent::Failed {
                reason: e.to_string(),
            });
            live.store(false, Ordering::SeqCst);
            return;
        }
    };

    let end = runtime.block_on(run_publish(
        &destination,
        &events,
        feed,
        audio_enabled,
        &should_stop,
    ));
    live.store(false, Ordering::SeqCst);

    match end {
        PublishEnd::Stopped => debug!("Publish worker stopped"),
        PublishEnd::Refused(e) => {
            warn!("Publish refused: {}", e);
            events.emit(ConnectionEvent::Failed {
                reason: e.to_string(),
            });
        }
        PublishEnd::Dropped(e) => {
            warn!("Publish connection lost: {}", e);
            events.emit(ConnectionEvent::Disconnected);
        }
    }
}

async fn run_publish(
    destination: &str,
    events: &ConnectionEventSender,
    feed: Option<Receiver<MediaPacket>>,
    audio_enabled: bool,
    should_stop: &AtomicBool,
) -> PublishEnd {
    let endpoint = match parse_destination(destination) {
        Ok(endpoint) => endpoint,
        Err(e) => return PublishEnd::Refused(e),
    };

    info!(host = %endpoint.host, port = endpoint.port, app = %endpoint.app, "Publishing");

    let mut connection = match timeout(ESTABLISH_TIMEOUT, establish(&endpoint, should_stop)).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(RtmpError::Stopped)) => return PublishEnd::Stopped,
        Ok(Err(e)) => return PublishEnd::Refused(e),
        Err(_) => {
            return PublishEnd::Refused(RtmpError::Timeout(
                "establishing the publish".to_string(),
            ))
        }
    };

    events.emit(ConnectionEvent::Succeeded);

    pump(&mut connection, events, feed, audio_enabled, should_stop).await
}

/// RTMP connection with session state.
struct PublishConnection {
    stream: TcpStream,
    session: ClientSession,
}

async fn dial(addr: &str, should_stop: &AtomicBool) -> RtmpResult<TcpStream> {
    let connect = TcpStream::connect(addr);
    tokio::pin!(connect);

    // Short polls so a stop request can abandon the dial.
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        if should_stop.load(Ordering::SeqCst) {
            return Err(RtmpError::Stopped);
        }
        if Instant::now() >= deadline {
            return Err(RtmpError::Timeout(format!("connecting to {}", addr)));
        }

        match timeout(Duration::from_millis(100), &mut connect).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => return Err(RtmpError::Connection(format!("TCP connect failed: {}", e))),
            Err(_) => {}
        }
    }
}

async fn establish(endpoint: &Endpoint, should_stop: &AtomicBool) -> RtmpResult<PublishConnection> {
    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    debug!(addr = %addr, "Dialing RTMP server");

    let mut stream = dial(&addr, should_stop).await?;

    debug!("TCP connection established, starting handshake");

    let mut handshake = Handshake::new(PeerType::Client);
    let p0_p1 = handshake
        .generate_outbound_p0_and_p1()
        .map_err(|e| RtmpError::Protocol(format!("Handshake generation failed: {:?}", e)))?;
    stream.write_all(&p0_p1).await.map_err(RtmpError::Io)?;

    let mut buf = vec![0u8; 4096];
    let leftover;

    loop {
        if should_stop.load(Ordering::SeqCst) {
            return Err(RtmpError::Stopped);
        }

        let n = match timeout(Duration::from_millis(100), stream.read(&mut buf)).await {
            Ok(Ok(0)) => {
                return Err(RtmpError::Connection(
                    "Connection closed during handshake".to_string(),
                ))
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(RtmpError::Io(e)),
            Err(_) => continue,
        };

        match handshake.process_bytes(&buf[..n]) {
            Ok(HandshakeProcessResult::InProgress { response_bytes }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await.map_err(RtmpError::Io)?;
                }
            }
            Ok(HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await.map_err(RtmpError::Io)?;
                }
                leftover = remaining_bytes;
                break;
            }
            Err(e) => return Err(RtmpError::Protocol(format!("Handshake failed: {:?}", e))),
        }
    }

    debug!("Handshake complete, creating RTMP session");

    let config = ClientSessionConfig::new();
    let (mut session, initial_results) = ClientSession::new(config)
        .map_err(|e| RtmpError::Protocol(format!("Session creation failed: {:?}", e)))?;

    // Send initial session packets (chunk size, etc.)
    for result in initial_results {
        if let ClientSessionResult::OutboundResponse(packet) = result {
            stream.write_all(&packet.bytes).await.map_err(RtmpError::Io)?;
        }
    }

    // Process any leftover bytes from the handshake
    if !leftover.is_empty() {
        let _ = session.handle_input(&leftover);
    }

    debug!(app = %endpoint.app, "Requesting RTMP connection");
    let connect_result = session
        .request_connection(endpoint.app.clone())
        .map_err(|e| RtmpError::Protocol(format!("Connection request failed: {:?}", e)))?;
    if let ClientSessionResult::OutboundResponse(packet) = connect_result {
        stream.write_all(&packet.bytes).await.map_err(RtmpError::Io)?;
    }

    wait_for_acceptance(&mut stream, &mut session, Acceptance::Connection, should_stop).await?;

    debug!("Requesting publish");
    let publish_result = session
        .request_publishing(endpoint.key.clone(), PublishRequestType::Live)
        .map_err(|e| RtmpError::Protocol(format!("Publish request failed: {:?}", e)))?;
    if let ClientSessionResult::OutboundResponse(packet) = publish_result {
        stream.write_all(&packet.bytes).await.map_err(RtmpError::Io)?;
    }

    wait_for_acceptance(&mut stream, &mut session, Acceptance::Publish, should_stop).await?;

    info!("RTMP connection established and publish accepted");

    Ok(PublishConnection { stream, session })
}

/// Which server response an establish step is waiting on.
#[derive(Debug)]
enum Acceptance {
    Connection,
    Publish,
}

async fn wait_for_acceptance(
    stream: &mut TcpStream,
    session: &mut ClientSession,
    waiting_for: Acceptance,
    should_stop: &AtomicBool,
) -> RtmpResult<()> {
    let mut buf = vec![0u8; 4096];

    for _ in 0..50 {
        if should_stop.load(Ordering::SeqCst) {
            return Err(RtmpError::Stopped);
        }

        let n = match timeout(Duration::from_millis(100), stream.read(&mut buf)).await {
            Ok(Ok(0)) => return Err(RtmpError::Connection("Connection closed".to_string())),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(RtmpError::Io(e)),
            Err(_) => continue,
        };

        let results = session
            .handle_input(&buf[..n])
            .map_err(|e| RtmpError::Protocol(format!("Session input error: {:?}", e)))?;

        for result in results {
            match result {
                ClientSessionResult::OutboundResponse(packet) => {
                    stream.write_all(&packet.bytes).await.map_err(RtmpError::Io)?;
                }
                ClientSessionResult::RaisedEvent(event) => {
                    if is_acceptance(&waiting_for, &event) {
                        debug!(?event, "Server accepted request");
                        return Ok(());
                    }
                    if let ClientSessionEvent::ConnectionRequestRejected { description } = event {
                        return Err(RtmpError::Connection(format!(
                            "Connection rejected: {}",
                            description
                        )));
                    }
                    trace!("Received event: {:?}", event);
                }
                _ => {}
            }
        }
    }

    Err(RtmpError::Timeout(format!(
        "waiting for {:?} acceptance",
        waiting_for
    )))
}

fn is_acceptance(waiting_for: &Acceptance, event: &ClientSessionEvent) -> bool {
    matches!(
        (waiting_for, event),
        (
            Acceptance::Connection,
            ClientSessionEvent::ConnectionRequestAccepted
        ) | (
            Acceptance::Publish,
            ClientSessionEvent::PublishRequestAccepted
        )
    )
}

async fn pump(
    connection: &mut PublishConnection,
    events: &ConnectionEventSender,
    feed: Option<Receiver<MediaPacket>>,
    audio_enabled: bool,
    should_stop: &AtomicBool,
) -> PublishEnd {
    let mut meter = BitrateMeter::new(SAMPLE_WINDOW);
    let mut read_buf = vec![0u8; 4096];

    loop {
        if should_stop.load(Ordering::SeqCst) {
            return PublishEnd::Stopped;
        }

        // Drain queued media before touching the socket.
        if let Some(rx) = &feed {
            loop {
                match rx.try_recv() {
                    Ok(packet) => {
                        if !should_send(audio_enabled, &packet) {
                            continue;
                        }
                        if let Err(e) = send_media(connection, &packet).await {
                            return PublishEnd::Dropped(e);
                        }
                        meter.record(packet.data.len());
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        return PublishEnd::Dropped(RtmpError::ConnectionLost(
                            "media feed closed".to_string(),
                        ));
                    }
                }
            }
        }

        // Service server traffic without holding off the feed for long.
        match timeout(Duration::from_millis(100), connection.stream.read(&mut read_buf)).await {
            Ok(Ok(0)) => {
                return PublishEnd::Dropped(RtmpError::ConnectionLost(
                    "server closed the connection".to_string(),
                ));
            }
            Ok(Ok(n)) => {
                if let Err(e) = service_input(connection, &read_buf[..n]).await {
                    return PublishEnd::Dropped(e);
                }
            }
            Ok(Err(e)) => return PublishEnd::Dropped(RtmpError::Io(e)),
            Err(_) => {}
        }

        let now = Instant::now();
        if meter.due(now) {
            events.emit(ConnectionEvent::BitrateSample {
                bits_per_second: meter.sample(now),
            });
        }
    }
}

async fn service_input(connection: &mut PublishConnection, bytes: &[u8]) -> RtmpResult<()> {
    let results = connection
        .session
        .handle_input(bytes)
        .map_err(|e| RtmpError::Protocol(format!("Session input error: {:?}", e)))?;

    for result in results {
        match result {
            ClientSessionResult::OutboundResponse(packet) => {
                connection
                    .stream
                    .write_all(&packet.bytes)
                    .await
                    .map_err(RtmpError::Io)?;
            }
            ClientSessionResult::RaisedEvent(event) => {
                trace!("Received event: {:?}", event);
            }
            _ => {}
        }
    }

    Ok(())
}

fn should_send(audio_enabled: bool, packet: &MediaPacket) -> bool {
    packet.is_video || audio_enabled
}

async fn send_media(connection: &mut PublishConnection, packet: &MediaPacket) -> RtmpResult<()> {
    let timestamp = RtmpTimestamp::new(packet.timestamp_ms);

    let result = if packet.is_video {
        connection.session.publish_video_data(
            packet.data.clone(),
            timestamp,
            !packet.is_keyframe, // can_be_dropped: true for non-keyframes
        )
    } else {
        connection.session.publish_audio_data(
            packet.data.clone(),
            timestamp,
            false, // can_be_dropped: audio is important
        )
    };

    let session_result =
        result.map_err(|e| RtmpError::Protocol(format!("Failed to publish data: {:?}", e)))?;

    if let ClientSessionResult::OutboundResponse(rtmp_packet) = session_result {
        connection
            .stream
            .write_all(&rtmp_packet.bytes)
            .await
            .map_err(RtmpError::Io)?;
    }

    Ok(())
}
