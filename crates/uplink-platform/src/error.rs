//! Error types for platform locks.

use thiserror::Error;

/// Errors that can occur while acquiring or renewing a system lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock kind does not exist on this platform.
    #[error("Lock not supported: {0}")]
    Unsupported(String),

    /// The platform refused to grant the lock.
    #[error("Lock denied: {0}")]
    Denied(String),

    /// Platform error.
    #[error("Platform error: {0}")]
    Platform(String),
}
