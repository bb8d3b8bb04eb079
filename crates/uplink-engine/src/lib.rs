//! Stream engine boundary.
//!
//! The session controller drives the capture/encode/publish pipeline
//! through the `StreamEngine` trait; concrete pipelines live in their
//! own crates. This crate also ships a loopback engine that publishes
//! nowhere, for dry runs and tests.

mod loopback;

pub use loopback::{LoopbackEngine, LoopbackEngineFactory};

use uplink_api::{CaptureTarget, ConnectionEventSender, StreamParameters};

/// The capture/encode/publish pipeline, as seen by the session.
///
/// Every call returns immediately. Connection progress is reported
/// asynchronously through the event sender the engine was created
/// with; the session never blocks on the pipeline.
pub trait StreamEngine: Send {
    /// Applies stream parameters, returning false if the pipeline
    /// rejects them. Must not be called while publishing.
    fn prepare(&mut self, params: &StreamParameters) -> bool;

    /// Binds a capture target, replacing the current one.
    fn attach_target(&mut self, target: CaptureTarget);

    /// Unbinds the current capture target.
    fn detach_target(&mut self);

    /// Starts local preview rendering.
    fn start_preview(&mut self);

    /// Stops local preview rendering.
    fn stop_preview(&mut self);

    /// Requests a publish to the destination. A request while one is
    /// already active is a no-op, not an error.
    fn start_publish(&mut self, destination: &str);

    /// Stops the active publish, waiting for the attempt to wind down.
    fn stop_publish(&mut self);

    /// Switches to the next capture device.
    fn switch_device(&mut self);

    /// Returns true while preview is running.
    fn is_previewing(&self) -> bool;

    /// Returns true from a publish request until it is stopped or a
    /// terminal event is reported.
    fn is_publishing(&self) -> bool;
}

/// Builds engines wired to the session inbox.
pub trait EngineFactory: Send {
    /// Creates an engine that reports through `events`.
    fn create(&mut self, events: ConnectionEventSender) -> Box<dyn StreamEngine>;
}
