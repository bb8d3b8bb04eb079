//! Commands sent from the host to the session.

use crate::types::CaptureTarget;

/// Commands that a host can send to the session controller.
///
/// All commands return immediately; their effects are observed through
/// the status feed.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Bind a capture target, replacing the current one.
    AttachTarget { target: CaptureTarget },

    /// Start publishing to the given destination.
    StartPublish { destination: String },

    /// Stop the active publish.
    StopPublish,

    /// The host is moving to the background.
    EnterBackground,

    /// The host returned to the foreground with a fresh target.
    EnterForeground { target: CaptureTarget },

    /// Switch to the next capture device.
    SwitchCaptureDevice,

    /// Shut the session down completely.
    Shutdown,
}
