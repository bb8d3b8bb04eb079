//! Platform services for the session.
//!
//! A publish must survive the host dimming its display or idling its
//! network interface, so the session holds platform locks for its
//! whole life, acquired at boot and released at teardown. This crate
//! owns those locks, the guard that keeps them renewed, and the
//! presenter that surfaces background publishing to the operator.

mod error;
mod guard;
mod presenter;

pub use error::LockError;
pub use guard::{ResourceGuard, SystemLock, UnsupportedLock};
pub use presenter::{
    ExecutionModePresenter, IndicatorBackend, LogIndicator, INDICATOR_BODY, INDICATOR_TITLE,
};

use std::time::Duration;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// How often the keeper thread checks held locks for renewal.
pub const KEEPER_POLL_INTERVAL: Duration = Duration::from_millis(200);
