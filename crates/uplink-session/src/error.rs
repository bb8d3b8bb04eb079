//! Error types for the session.

use thiserror::Error;

/// Errors from driving a session through its handle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The controller is gone and takes no more commands.
    #[error("Session is closed")]
    Closed,
}
