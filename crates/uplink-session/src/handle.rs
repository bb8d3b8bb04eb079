//! Cloneable handle for driving a running session.

use crossbeam_channel::Sender;

use uplink_api::{CaptureTarget, SessionCommand, SessionMessage};

use crate::status::{StatusSink, StatusSlot};
use crate::{SessionError, SessionResult};

/// Drives a session from the host side.
///
/// Every method queues a command on the session inbox and returns
/// immediately; effects are observed through the status sink. Handles
/// are cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<SessionMessage>,
    status: StatusSlot,
}

impl SessionHandle {
    /// Creates a handle over the session inbox and status slot.
    pub fn new(tx: Sender<SessionMessage>, status: StatusSlot) -> Self {
        Self { tx, status }
    }

    /// Binds a capture target.
    pub fn attach_target(&self, target: CaptureTarget) -> SessionResult<()> {
        self.send(SessionCommand::AttachTarget { target })
    }

    /// Starts publishing to the destination.
    pub fn start_publish(&self, destination: &str) -> SessionResult<()> {
        self.send(SessionCommand::StartPublish {
            destination: destination.to_string(),
        })
    }

    /// Stops the active publish.
    pub fn stop_publish(&self) -> SessionResult<()> {
        self.send(SessionCommand::StopPublish)
    }

    /// Moves the session to background execution.
    pub fn enter_background(&self) -> SessionResult<()> {
        self.send(SessionCommand::EnterBackground)
    }

    /// Moves the session to foreground execution with a real target.
    pub fn enter_foreground(&self, target: CaptureTarget) -> SessionResult<()> {
        self.send(SessionCommand::EnterForeground { target })
    }

    /// Switches to the next capture device.
    pub fn switch_capture_device(&self) -> SessionResult<()> {
        self.send(SessionCommand::SwitchCaptureDevice)
    }

    /// Ends the session and stops the controller loop.
    pub fn shutdown(&self) -> SessionResult<()> {
        self.send(SessionCommand::Shutdown)
    }

    /// Attaches a status sink, replacing any current one.
    pub fn set_status_sink(&self, sink: Box<dyn StatusSink>) {
        self.status.attach(sink);
    }

    /// Detaches the current status sink.
    pub fn clear_status_sink(&self) {
        self.status.detach();
    }

    fn send(&self, command: SessionCommand) -> SessionResult<()> {
        self.tx
            .send(SessionMessage::Command(command))
            .map_err(|_| SessionError::Closed)
    }
}
