//! Loopback engine for dry runs and tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use uplink_api::{CaptureTarget, ConnectionEvent, ConnectionEventSender, StreamParameters};

use crate::{EngineFactory, StreamEngine};

/// Interval between bitrate samples from the loopback engine.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// An engine that publishes nowhere.
///
/// Confirms every publish immediately and echoes the configured
/// bitrate back as periodic samples, which makes it useful for
/// exercising a session without a server.
pub struct LoopbackEngine {
    events: ConnectionEventSender,
    target: Option<CaptureTarget>,
    previewing: bool,
    publishing: bool,
    bitrate_bps: Arc<AtomicU64>,
    sampler: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
}

impl LoopbackEngine {
    /// Creates a loopback engine reporting through `events`.
    pub fn new(events: ConnectionEventSender) -> Self {
        Self {
            events,
            target: None,
            previewing: false,
            publishing: false,
            bitrate_bps: Arc::new(AtomicU64::new(0)),
            sampler: None,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stop_sampler(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.sampler.take() {
            let _ = handle.join();
        }
    }
}

impl StreamEngine for LoopbackEngine {
    fn prepare(&mut self, params: &StreamParameters) -> bool {
        if params.width == 0 || params.height == 0 || params.fps == 0 {
            warn!("Rejecting empty stream parameters");
            return false;
        }

        self.bitrate_bps.store(params.bitrate_bps, Ordering::SeqCst);
        debug!(
            width = params.width,
            height = params.height,
            fps = params.fps,
            "Loopback pipeline prepared"
        );
        true
    }

    fn attach_target(&mut self, target: CaptureTarget) {
        debug!(target = %target.label(), "Loopback target bound");
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

    #[instrument(name = "loopback_publish", skip(self, destination))]
    fn start_publish(&mut self, destination: &str) {
        if self.publishing {
            debug!("Already publishing, ignoring publish request");
            return;
        }

        info!(destination = %destination, "Loopback publish started");
        self.publishing = true;

        self.events.emit(ConnectionEvent::Started {
            destination: destination.to_string(),
        });
        self.events.emit(ConnectionEvent::AuthSucceeded);
        self.events.emit(ConnectionEvent::Succeeded);

        let events = self.events.clone();
        let bitrate = Arc::clone(&self.bitrate_bps);
        let should_stop = Arc::clone(&self.should_stop);
        should_stop.store(false, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            sampler_loop(events, bitrate, should_stop);
        });
        self.sampler = Some(handle);
    }

    fn stop_publish(&mut self) {
        if !self.publishing {
            return;
        }

        self.publishing = false;
        self.stop_sampler();
        info!("Loopback publish stopped");
    }

    fn switch_device(&mut self) {
        debug!("Loopback has no capture devices to switch");
    }

    fn is_previewing(&self) -> bool {
        self.previewing
    }

    fn is_publishing(&self) -> bool {
        self.publishing
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        self.stop_sampler();
    }
}

fn sampler_loop(
    events: ConnectionEventSender,
    bitrate: Arc<AtomicU64>,
    should_stop: Arc<AtomicBool>,
) {
    debug!("Loopback sampler thread started");
    let mut last_sample = Instant::now();

    while !should_stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));

        if last_sample.elapsed() >= SAMPLE_INTERVAL {
            events.emit(ConnectionEvent::BitrateSample {
                bits_per_second: bitrate.load(Ordering::SeqCst),
            });
            last_sample = Instant::now();
        }
    }

    debug!("Loopback sampler thread exiting");
}

/// Builds loopback engines.
#[derive(Default)]
pub struct LoopbackEngineFactory;

impl LoopbackEngineFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl EngineFactory for LoopbackEngineFactory {
    fn create(&mut self, events: ConnectionEventSender) -> Box<dyn StreamEngine> {
        Box::new(LoopbackEngine::new(events))
    }
}
