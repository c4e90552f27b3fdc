use thiserror::Error;

/// Firmware-level error kinds. All of these are handled inside the
/// control loops; none are fatal after startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FirmwareError {
    /// WiFi association failed or the link dropped.
    #[error("network unavailable after {attempts} attempts")]
    NetworkUnavailable { attempts: u32 },

    /// The cloud client exists but is not ready to serve reads.
    #[error("realtime database client not ready")]
    ServiceUnready,

    /// The stream subscription timed out and must be re-established.
    #[error("stream subscription timed out")]
    StreamStale,

    /// The client never completed a request within the read deadline.
    /// The connection is dropped without a response.
    #[error("request incomplete after {timeout_ms} ms")]
    RequestIncomplete { timeout_ms: u64 },

    /// No route matched the request; answered with the 404 body.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },
}
