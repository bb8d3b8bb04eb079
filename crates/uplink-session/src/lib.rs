//! Live session controller.
//!
//! One session owns one outbound stream: the controller runs on a
//! dedicated thread, executes host commands from its inbox, reacts to
//! connection events reported by the engine, and keeps the
//! operator-facing status line current. The publish must survive the
//! host process moving to the background, so streaming intent, not
//! surface visibility, decides when resources are released.

mod controller;
mod error;
mod handle;
mod state;
mod status;

pub use controller::{ExecutionMode, SessionController, SessionDeps};
pub use error::SessionError;
pub use handle::SessionHandle;
pub use state::SessionState;
pub use status::{StatusSink, StatusSlot};

use std::time::Duration;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// How often the live status line is refreshed while publishing.
pub const STATUS_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// How long one inbox poll waits before periodic work runs.
pub const INBOX_POLL_INTERVAL: Duration = Duration::from_millis(100);
