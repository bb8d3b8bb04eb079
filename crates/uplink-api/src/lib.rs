//! Typed host<->session messages for uplink.
//!
//! This crate defines the message types exchanged between a host
//! application and the session controller, plus the small value types
//! they carry.

mod commands;
mod events;
mod types;

pub use commands::SessionCommand;
pub use events::{ConnectionEvent, ConnectionEventSender};
pub use types::{CaptureTarget, StreamParameters, Surface, SurfaceHandle};

use crossbeam_channel::{Receiver, Sender};

/// Messages delivered to the session inbox.
///
/// Host commands and engine connection events share one queue, so the
/// controller observes them in arrival order on a single timeline.
#[derive(Debug)]
pub enum SessionMessage {
    /// A command from the host.
    Command(SessionCommand),

    /// A connection event from the active engine.
    Connection(ConnectionEvent),
}

/// Channel capacity for the session inbox.
pub const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Creates the bounded session inbox.
pub fn session_channel() -> (Sender<SessionMessage>, Receiver<SessionMessage>) {
    crossbeam_channel::bounded(SESSION_CHANNEL_CAPACITY)
}
