//! Destination URI parsing.

use url::Url;

use crate::{RtmpError, RtmpResult, DEFAULT_RTMP_PORT};

/// A parsed RTMP destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// RTMP application name.
    pub app: String,

    /// Stream key, possibly empty.
    pub key: String,
}

/// Parses `rtmp://host[:port]/app[/key]` into an endpoint.
///
/// With more than two path segments, everything but the last segment
/// forms the application name. A single segment is the application,
/// leaving the key empty.
pub fn parse_destination(destination: &str) -> RtmpResult<Endpoint> {
    let parsed = Url::parse(destination).map_err(|e| RtmpError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "rtmp" | "rtmps" => {}
        other => {
            return Err(RtmpError::InvalidUrl(format!(
                "Unsupported scheme: {}",
                other
            )))
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| RtmpError::InvalidUrl("Missing host".to_string()))?
        .to_string();
    let port = parsed.port().unwrap_or(DEFAULT_RTMP_PORT);

    let segments: Vec<&str> = parsed
        .path()
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(RtmpError::InvalidUrl(
            "Missing application name in URL path".to_string(),
        ));
    }

    let (app, key) = if segments.len() == 1 {
        (segments[0].to_string(), String::new())
    } else {
        (
            segments[..segments.len() - 1].join("/"),
            segments[segments.len() - 1].to_string(),
        )
    };

    Ok(Endpoint {
        host,
        port,
        app,
        key,
    })
}
