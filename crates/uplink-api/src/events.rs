//! Connection events reported by stream engines.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::SessionMessage;

/// Connection lifecycle events emitted by a stream engine.
///
/// Events arrive on the engine's own schedule, in an order the session
/// does not control. Engines without a distinct authentication
/// round-trip fold auth problems into `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// A connection attempt has started.
    Started {
        /// Destination being contacted.
        destination: String,
    },

    /// The connection is established and publishing.
    Succeeded,

    /// Measured outbound bitrate, at most once per sampling interval.
    BitrateSample {
        /// Bits per second over the last interval.
        bits_per_second: u64,
    },

    /// The server requires authentication.
    AuthRequired,

    /// Authentication completed.
    AuthSucceeded,

    /// The attempt failed. Terminal for the current publish.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },

    /// An established connection dropped. Terminal for the current
    /// publish.
    Disconnected,
}

impl ConnectionEvent {
    /// Returns true if this event ends the publish attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Disconnected)
    }

    /// Returns a simple string representation of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "Started",
            Self::Succeeded => "Succeeded",
            Self::BitrateSample { .. } => "BitrateSample",
            Self::AuthRequired => "AuthRequired",
            Self::AuthSucceeded => "AuthSucceeded",
            Self::Failed { .. } => "Failed",
            Self::Disconnected => "Disconnected",
        }
    }
}

/// Funnels engine events into the session inbox.
///
/// Cloneable so every engine worker thread can own one. Sending never
/// blocks: a full inbox drops the event with a warning.
#[derive(Debug, Clone)]
pub struct ConnectionEventSender {
    tx: Sender<SessionMessage>,
}

impl ConnectionEventSender {
    /// Wraps an inbox sender.
    pub fn new(tx: Sender<SessionMessage>) -> Self {
        Self { tx }
    }

    /// Emits a connection event.
    pub fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.tx.try_send(SessionMessage::Connection(event)) {
            warn!("Failed to deliver connection event: {}", e);
        }
    }
}
