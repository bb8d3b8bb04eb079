//! Common types shared between hosts and the session.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

/// Parameters for one publish attempt.
///
/// Parameters are fixed for the lifetime of an attempt: they may only
/// be (re)applied while the pipeline is idle or preview-only, never
/// while publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamParameters {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Target frames per second.
    pub fps: u32,

    /// Target video bitrate in bits per second.
    pub bitrate_bps: u64,

    /// Capture rotation in degrees.
    pub rotation_deg: u32,

    /// Whether audio capture is enabled.
    pub audio_enabled: bool,

    /// Destination address for the publish.
    pub destination: String,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 10,
            bitrate_bps: 1_024_000,
            rotation_deg: 90,
            audio_enabled: true,
            destination: String::new(),
        }
    }
}

/// A UI-owned render surface.
///
/// The session only ever holds [`SurfaceHandle`]s; dropping the
/// surface invalidates every handle without any coordination.
#[derive(Debug)]
pub struct Surface {
    id: String,
    token: Arc<()>,
}

impl Surface {
    /// Creates a surface with a diagnostic id.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            token: Arc::new(()),
        }
    }

    /// Returns the surface id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a capture target referring to this surface.
    pub fn target(&self) -> CaptureTarget {
        CaptureTarget::Surface(SurfaceHandle {
            id: self.id.clone(),
            token: Arc::downgrade(&self.token),
        })
    }
}

/// Non-owning reference to a [`Surface`].
#[derive(Debug, Clone)]
pub struct SurfaceHandle {
    id: String,
    token: Weak<()>,
}

impl SurfaceHandle {
    /// Returns the surface id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns true while the surface is still alive.
    pub fn is_live(&self) -> bool {
        self.token.strong_count() > 0
    }
}

/// The capture target bound to the pipeline.
///
/// Exactly one target is bound at a time; rebinding replaces.
#[derive(Debug, Clone)]
pub enum CaptureTarget {
    /// A live UI surface.
    Surface(SurfaceHandle),

    /// Placeholder used while no UI surface exists.
    Headless,
}

impl CaptureTarget {
    /// Returns true for the headless placeholder.
    pub fn is_headless(&self) -> bool {
        matches!(self, Self::Headless)
    }

    /// Returns a short description for logs.
    pub fn label(&self) -> String {
        match self {
            Self::Surface(handle) => format!("surface:{}", handle.id()),
            Self::Headless => "headless".to_string(),
        }
    }
}
