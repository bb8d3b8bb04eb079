//! The session controller actor.
//!
//! One controller owns the whole streaming session: the engine, the
//! capture target, system locks, the execution indicator, and the
//! status feed. It consumes host commands and engine connection events
//! from a single inbox, so every decision is made on one timeline.

use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, instrument, warn};

use uplink_api::{
    CaptureTarget, ConnectionEvent, ConnectionEventSender, SessionCommand, SessionMessage,
    StreamParameters,
};
use uplink_config::{SessionSettings, SettingsStore};
use uplink_engine::{EngineFactory, StreamEngine};
use uplink_platform::{ExecutionModePresenter, ResourceGuard};

use crate::state::SessionState;
use crate::status::{live_status, StatusReporter};
use crate::{StatusSlot, INBOX_POLL_INTERVAL, STATUS_REFRESH_INTERVAL};

/// Where the host currently runs the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// The host UI is visible.
    #[default]
    Foreground,

    /// The host has been backgrounded.
    Background,
}

/// Everything the controller borrows from its host.
pub struct SessionDeps {
    /// Builds stream engines wired to the session inbox.
    pub engine_factory: Box<dyn EngineFactory>,

    /// Source of session settings.
    pub settings: Box<dyn SettingsStore>,

    /// Keeps system locks held while the session lives.
    pub guard: ResourceGuard,

    /// Surfaces publish state and carries the final shutdown signal.
    pub presenter: ExecutionModePresenter,

    /// Delivery point for status lines.
    pub status: StatusSlot,
}

/// Drives a streaming session from creation to teardown.
///
/// The controller is an actor: hosts talk to it through a
/// [`SessionHandle`](crate::SessionHandle) and observe it through
/// status lines. It never blocks on the pipeline; engines report
/// connection progress asynchronously as [`ConnectionEvent`]s on the
/// same inbox the commands arrive on.
pub struct SessionController {
    inbox: Receiver<SessionMessage>,
    events: ConnectionEventSender,
    engine_factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn StreamEngine>>,
    state: SessionState,
    execution_mode: ExecutionMode,
    want_to_stream: bool,
    connection_live: bool,
    last_bitrate_bps: u64,
    target: Option<CaptureTarget>,
    params: StreamParameters,
    settings: SessionSettings,
    settings_store: Box<dyn SettingsStore>,
    guard: ResourceGuard,
    presenter: ExecutionModePresenter,
    status: StatusReporter,
    next_status_refresh: Option<Instant>,
}

impl SessionController {
    /// Creates a controller reading from `inbox`.
    ///
    /// `events` is the sender half of the same inbox; it is handed to
    /// every engine the controller creates.
    pub fn new(
        inbox: Receiver<SessionMessage>,
        events: ConnectionEventSender,
        deps: SessionDeps,
    ) -> Self {
        Self {
            inbox,
            events,
            engine_factory: deps.engine_factory,
            engine: None,
            state: SessionState::default(),
            execution_mode: ExecutionMode::default(),
            want_to_stream: false,
            connection_live: false,
            last_bitrate_bps: 0,
            target: None,
            params: StreamParameters::default(),
            settings: SessionSettings::default(),
            settings_store: deps.settings,
            guard: deps.guard,
            presenter: deps.presenter,
            status: StatusReporter::new(deps.status),
            next_status_refresh: None,
        }
    }

    /// Runs the controller until the session ends.
    ///
    /// Consumes inbox messages until the session reaches
    /// [`SessionState::Terminating`] or every sender is gone.
    #[instrument(name = "session_run", skip(self))]
    pub fn run(&mut self) {
        info!("Session controller started");
        self.boot();

        loop {
            match self.inbox.recv_timeout(INBOX_POLL_INTERVAL) {
                Ok(SessionMessage::Command(command)) => {
                    self.handle_command(command);
                    if self.state.is_terminating() {
                        break;
                    }
                }
                Ok(SessionMessage::Connection(event)) => {
                    self.handle_connection_event(event);
                    if self.state.is_terminating() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.refresh_status_if_due();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Session inbox closed");
                    self.teardown();
                    break;
                }
            }
        }

        info!("Session controller stopped");
    }

    fn boot(&mut self) {
        self.reload_settings();
        self.guard.acquire();
        self.status.report("Status: Stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(?command, "Handling command");

        match command {
            SessionCommand::AttachTarget { target } => self.attach_target(target),
            SessionCommand::StartPublish { destination } => self.start_publish(destination),
            SessionCommand::StopPublish => self.stop_publish(),
            SessionCommand::EnterBackground => self.enter_background(),
            SessionCommand::EnterForeground { target } => self.enter_foreground(target),
            SessionCommand::SwitchCaptureDevice => self.switch_capture_device(),
            SessionCommand::Shutdown => self.shutdown(),
        }
    }

    fn attach_target(&mut self, target: CaptureTarget) {
        if self.state.is_terminating() {
            return;
        }

        let target = checked_target(target);
        self.bind_target(target);

        if self.state.is_publishing_any() {
            // The active publish keeps running on the new target.
            return;
        }

        if !self.prepare_engine() {
            return;
        }
        self.start_preview_if_needed();
        self.transition_to(SessionState::PreviewOnly);
        self.status.report("Status: Ready");
    }

    #[instrument(name = "session_publish", skip(self, destination))]
    fn start_publish(&mut self, destination: String) {
        if self.state.is_terminating() {
            return;
        }
        if self.engine_publishing() {
            debug!("Publish already active, ignoring start request");
            return;
        }

        info!("Starting publish");
        self.want_to_stream = true;

        if self.target.is_none() {
            self.bind_target(CaptureTarget::Headless);
        }

        self.params.destination = destination;
        if !self.prepare_engine() {
            self.want_to_stream = false;
            return;
        }
        self.start_preview_if_needed();

        self.presenter.activate();
        self.connection_live = false;
        self.last_bitrate_bps = 0;

        if let Some(engine) = self.engine.as_mut() {
            engine.start_publish(&self.params.destination);
        }

        let next = match self.execution_mode {
            ExecutionMode::Foreground => SessionState::Publishing,
            ExecutionMode::Background => SessionState::BackgroundPublishing,
        };
        self.transition_to(next);
        self.next_status_refresh = Some(Instant::now() + STATUS_REFRESH_INTERVAL);
        self.status.report("Status: Connecting...");
    }

    #[instrument(name = "session_stop", skip(self))]
    fn stop_publish(&mut self) {
        let was_backgrounded = self.state == SessionState::BackgroundPublishing;

        info!("Stopping publish");
        self.end_publish_attempt("Status: Stopped");

        if was_backgrounded {
            self.teardown();
        } else {
            self.settle_after_publish();
        }
    }

    #[instrument(name = "session_background", skip(self))]
    fn enter_background(&mut self) {
        if self.state.is_terminating() {
            return;
        }

        self.execution_mode = ExecutionMode::Background;

        if self.want_to_stream && self.settings.allow_background_publish {
            info!("Continuing publish in the background");
            self.bind_target(CaptureTarget::Headless);
            self.transition_to(SessionState::BackgroundPublishing);
            return;
        }

        if self.want_to_stream {
            info!("Background publishing disallowed, stopping publish");
            self.end_publish_attempt("Status: Stopped");
        }
        self.teardown();
    }

    #[instrument(name = "session_foreground", skip(self, target))]
    fn enter_foreground(&mut self, target: CaptureTarget) {
        if self.state.is_terminating() {
            return;
        }

        self.execution_mode = ExecutionMode::Foreground;
        self.reload_settings();

        let target = checked_target(target);
        self.bind_target(target);

        if self.want_to_stream {
            self.presenter.activate();
        }

        if self.state == SessionState::BackgroundPublishing {
            self.transition_to(SessionState::Publishing);
        } else if !self.state.is_publishing_any() {
            if !self.prepare_engine() {
                return;
            }
            self.start_preview_if_needed();
            self.transition_to(SessionState::PreviewOnly);
        }

        // A returning UI has no history; re-deliver the current line.
        self.refresh_status();
    }

    fn switch_capture_device(&mut self) {
        match self.engine.as_mut() {
            Some(engine) => engine.switch_device(),
            None => debug!("No engine active, ignoring device switch"),
        }
    }

    #[instrument(name = "session_shutdown", skip(self))]
    fn shutdown(&mut self) {
        info!("Shutting down session");

        if self.state.is_publishing_any() {
            self.end_publish_attempt("Status: Stopped");
        }
        self.teardown();
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        debug!(?event, "Handling connection event");

        // The gauge tracks the engine even when the event is stale.
        if let ConnectionEvent::BitrateSample { bits_per_second } = &event {
            self.last_bitrate_bps = *bits_per_second;
        }

        if !self.state.is_publishing_any() {
            debug!(event = event.name(), "No publish active, ignoring event");
            return;
        }

        match event {
            ConnectionEvent::Started { .. } => self.status.report("Status: Connecting..."),
            ConnectionEvent::Succeeded => {
                info!("Publish connection established");
                self.connection_live = true;
                let line = live_status(&self.params, self.last_bitrate_bps);
                self.status.report(&line);
            }
            ConnectionEvent::BitrateSample { .. } => {
                if self.connection_live {
                    let line = live_status(&self.params, self.last_bitrate_bps);
                    self.status.report(&line);
                }
            }
            ConnectionEvent::AuthRequired => self.status.report("Status: Authenticating..."),
            ConnectionEvent::AuthSucceeded => self.status.report("Status: Connecting..."),
            ConnectionEvent::Failed { reason } => {
                warn!(reason = %reason, "Publish failed");
                self.finish_terminal_event(&format!("Error: {}", reason));
            }
            ConnectionEvent::Disconnected => {
                warn!("Publish connection lost");
                self.finish_terminal_event("Status: Disconnected");
            }
        }
    }

    /// Ends the publish attempt without touching preview or target.
    fn end_publish_attempt(&mut self, status: &str) {
        self.want_to_stream = false;
        self.connection_live = false;

        if self.next_status_refresh.take().is_some() {
            debug!("Status refresh timer cancelled");
        }

        if let Some(engine) = self.engine.as_mut() {
            if engine.is_publishing() {
                engine.stop_publish();
            }
        }

        self.presenter.deactivate(false);
        self.status.report(status);
    }

    /// Picks the post-publish state from what is left of the target.
    fn settle_after_publish(&mut self) {
        let surface_live = matches!(
            &self.target,
            Some(CaptureTarget::Surface(handle)) if handle.is_live()
        );

        if surface_live {
            self.transition_to(SessionState::PreviewOnly);
        } else {
            if let Some(engine) = self.engine.as_mut() {
                engine.stop_preview();
                engine.detach_target();
            }
            self.target = None;
            self.transition_to(SessionState::Idle);
        }
    }

    fn finish_terminal_event(&mut self, status: &str) {
        let was_backgrounded = self.state == SessionState::BackgroundPublishing;

        self.end_publish_attempt(status);

        if was_backgrounded {
            info!("Stream ended while backgrounded, ending session");
            self.teardown();
        } else {
            self.settle_after_publish();
        }
    }

    /// Releases everything the session holds, in dependency order.
    #[instrument(name = "session_teardown", skip(self))]
    fn teardown(&mut self) {
        if self.state.is_terminating() {
            return;
        }

        info!("Tearing down session");

        self.want_to_stream = false;
        self.connection_live = false;
        self.next_status_refresh = None;

        if let Some(engine) = self.engine.as_mut() {
            if engine.is_publishing() {
                engine.stop_publish();
            }
            engine.stop_preview();
            engine.detach_target();
        }
        self.engine = None;
        self.target = None;

        self.presenter.deactivate(true);
        self.guard.release();
        self.transition_to(SessionState::Terminating);

        info!("Session torn down");
    }

    fn refresh_status_if_due(&mut self) {
        let due = self
            .next_status_refresh
            .is_some_and(|deadline| Instant::now() >= deadline);
        if !due {
            return;
        }

        self.next_status_refresh = Some(Instant::now() + STATUS_REFRESH_INTERVAL);
        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        let line = self.compute_status();
        self.status.refresh(&line);
    }

    fn compute_status(&self) -> String {
        if self.state.is_publishing_any() {
            if self.connection_live {
                live_status(&self.params, self.last_bitrate_bps)
            } else {
                "Status: Connecting...".to_string()
            }
        } else if self.state.is_preview_only() {
            "Status: Ready".to_string()
        } else {
            "Status: Stopped".to_string()
        }
    }

    fn transition_to(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }

        debug!(
            previous = self.state.name(),
            current = next.name(),
            "Session state changed"
        );
        self.state = next;
    }

    fn reload_settings(&mut self) {
        match self.settings_store.load() {
            Ok(settings) => {
                debug!(?settings, "Settings loaded");
                self.settings = settings;
            }
            Err(e) => {
                warn!("Failed to load settings, keeping current values: {}", e);
            }
        }
    }

    fn bind_target(&mut self, target: CaptureTarget) {
        debug!(target = %target.label(), "Binding capture target");
        self.ensure_engine();
        if let Some(engine) = self.engine.as_mut() {
            engine.attach_target(target.clone());
        }
        self.target = Some(target);
    }

    fn ensure_engine(&mut self) {
        if self.engine.is_none() {
            debug!("Creating stream engine");
            self.engine = Some(self.engine_factory.create(self.events.clone()));
        }
    }

    fn prepare_engine(&mut self) -> bool {
        self.ensure_engine();
        self.params.audio_enabled = self.settings.audio_enabled;

        let prepared = match self.engine.as_mut() {
            Some(engine) => engine.prepare(&self.params),
            None => false,
        };

        if !prepared {
            warn!("Engine rejected stream parameters");
            self.status.report("Error: Failed to prepare stream pipeline");
        }
        prepared
    }

    fn start_preview_if_needed(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if !engine.is_previewing() {
                engine.start_preview();
            }
        }
    }

    fn engine_publishing(&self) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|engine| engine.is_publishing())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Downgrades a dead surface to the headless target.
fn checked_target(target: CaptureTarget) -> CaptureTarget {
    if let CaptureTarget::Surface(handle) = &target {
        if !handle.is_live() {
            warn!(surface = handle.id(), "Capture surface is gone, binding headless");
            return CaptureTarget::Headless;
        }
    }
    target
}
