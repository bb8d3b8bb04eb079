//! RTMP publish engine.
//!
//! This crate provides the real network engine behind the session: it
//! dials an RTMP server, performs the handshake and publish dance,
//! then pumps media packets from an external feed while reporting
//! connection progress and bitrate samples back to the session.

mod endpoint;
mod engine;
mod error;
mod meter;

pub use endpoint::{parse_destination, Endpoint};
pub use engine::{MediaPacket, RtmpEngine, RtmpEngineFactory};
pub use error::RtmpError;
pub use meter::BitrateMeter;

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for the media packet feed.
pub const FEED_CHANNEL_CAPACITY: usize = 30;

/// Result type for RTMP operations.
pub type RtmpResult<T> = Result<T, RtmpError>;

/// Default RTMP port used when the destination names none.
pub const DEFAULT_RTMP_PORT: u16 = 1935;

/// How long a TCP dial may take before the attempt fails.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long handshake plus connect plus publish negotiation may take.
pub const ESTABLISH_TIMEOUT: Duration = Duration::from_secs(15);

/// Width of one bitrate measurement window.
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Creates the bounded channel that feeds media packets to the engine.
pub fn media_feed() -> (Sender<MediaPacket>, Receiver<MediaPacket>) {
    crossbeam_channel::bounded(FEED_CHANNEL_CAPACITY)
}
