//! Error types for the RTMP engine.

use thiserror::Error;

/// Errors that can occur while publishing over RTMP.
#[derive(Debug, Error)]
pub enum RtmpError {
    /// Invalid destination URI.
    #[error("Invalid RTMP URL: {0}")]
    InvalidUrl(String),

    /// Connection error (general).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection lost after it was established.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// RTMP protocol error.
    #[error("RTMP protocol error: {0}")]
    Protocol(String),

    /// A step did not finish within its deadline.
    #[error("Timed out {0}")]
    Timeout(String),

    /// Stop was requested while the attempt was still in flight.
    ///
    /// Unwinds the establish phase without ever reaching the host as
    /// a failure.
    #[error("Publish stopped")]
    Stopped,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
