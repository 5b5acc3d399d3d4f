use std::io;

/// Fault taxonomy for a probe.
///
/// [`InvalidOptions`](ProbeError::InvalidOptions) is the only variant
/// [`probe()`](crate::probe())/[`ping()`](crate::ping()) return directly;
/// every other variant is attempt-scoped and lands in
/// [`AttemptResult::error`](crate::AttemptResult::error).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The supplied options violate the invocation contract. Raised before
    /// any connection is opened.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The connect ceiling elapsed before the connection was established.
    #[error("connect timed out")]
    ConnectTimeout,

    /// The response deadline elapsed before a matching or complete response.
    #[error("no matching response before the deadline")]
    ResponseTimeout,

    /// The established connection sat idle past the configured ceiling.
    #[error("socket idle timeout")]
    SocketTimeout,

    /// The accumulated response grew past the configured byte cap.
    #[error("response exceeded the configured byte cap")]
    MaxResponseBytesExceeded,

    /// The connection failed after it was established.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
}
