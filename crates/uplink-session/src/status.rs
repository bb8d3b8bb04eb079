//! Operator-facing status reporting.
//!
//! Status flows one way: the controller renders a line, the attached
//! sink receives it. The sink slot is the only piece of session state
//! touched from outside the controller thread; a host may attach,
//! replace, or drop the sink at any time.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use uplink_api::StreamParameters;

/// Receives status line changes.
pub trait StatusSink: Send {
    /// Called with the new status line.
    fn on_status_changed(&self, status: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send,
{
    fn on_status_changed(&self, status: &str) {
        self(status)
    }
}

/// Cloneable slot holding the currently attached status sink.
#[derive(Clone, Default)]
pub struct StatusSlot {
    sink: Arc<Mutex<Option<Box<dyn StatusSink>>>>,
}

impl StatusSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sink, replacing any current one.
    pub fn attach(&self, sink: Box<dyn StatusSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// Detaches the current sink, if any.
    pub fn detach(&self) {
        *self.sink.lock() = None;
    }

    /// Delivers a status line to the attached sink, if any.
    pub fn deliver(&self, status: &str) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.on_status_changed(status);
        }
    }
}

/// Deduplicating reporter the controller pushes status lines through.
pub(crate) struct StatusReporter {
    slot: StatusSlot,
    last: Option<String>,
}

impl StatusReporter {
    pub(crate) fn new(slot: StatusSlot) -> Self {
        Self { slot, last: None }
    }

    /// Reports a status line unless it matches the previous one.
    pub(crate) fn report(&mut self, status: &str) {
        if self.last.as_deref() == Some(status) {
            trace!(status = status, "Status unchanged, not delivering");
            return;
        }

        self.last = Some(status.to_string());
        self.slot.deliver(status);
    }

    /// Delivers a status line even when unchanged.
    pub(crate) fn refresh(&mut self, status: &str) {
        self.last = Some(status.to_string());
        self.slot.deliver(status);
    }
}

/// Renders the live status line.
pub(crate) fn live_status(params: &StreamParameters, bits_per_second: u64) -> String {
    format!(
        "Live: {}x{} | {} FPS | {} kbps",
        params.width,
        params.height,
        params.fps,
        bits_per_second / 1000
    )
}
