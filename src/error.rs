//! Error types surfaced across the public API.
//!
//! Mirrors the numeric `-EINVAL`/`-EALREADY`/... taxonomy from the design doc
//! as proper `thiserror` enums instead of raw status codes.

use thiserror::Error;

/// Rejections returned synchronously from [`crate::Rtl::submit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The request has already been submitted once; requests are at-most-once.
    #[error("request already submitted")]
    AlreadySubmitted,
    /// The request declared `HAS_RESPONSE` but its packet is not sequenced.
    #[error("invalid request: {0}")]
    Invalid(&'static str),
    /// The layer has been (or is being) shut down.
    #[error("request layer is shutting down")]
    ShuttingDown,
}

/// The error forwarded to [`crate::RequestOps::complete`] when a request does
/// not complete with a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The request was canceled before it could complete.
    #[error("request canceled")]
    Canceled,
    /// No response arrived before the request's deadline elapsed.
    #[error("request timed out")]
    TimedOut,
    /// The layer was shut down before the request completed.
    #[error("request layer shut down")]
    ShuttingDown,
    /// A response for this request's rqid arrived before the packet layer
    /// acknowledged transmission — a protocol violation on the peer's part.
    #[error("received response before transmission was acknowledged")]
    RemoteIo,
    /// The underlying packet transmission failed; passed through unchanged.
    #[error("packet transmission failed: {0}")]
    Packet(#[from] PacketError),
}

/// Error from the packet transmission layer, forwarded to the request layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The packet layer refused the packet because it is shutting down.
    #[error("packet layer is shutting down")]
    Shutdown,
    /// The packet was canceled before the packet layer could send it.
    #[error("packet canceled")]
    Canceled,
    /// Any other packet-layer-specific status, forwarded unchanged.
    #[error("packet layer error (code {0})")]
    Other(i32),
}

/// Error from [`crate::Rtl::flush`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// The flush request did not complete before the given timeout and was
    /// canceled as a result.
    #[error("flush timed out")]
    TimedOut,
    /// The layer was shut down before or during the flush.
    #[error("request layer is shutting down")]
    ShuttingDown,
    /// The flush wait was interrupted before a result was available.
    #[error("flush was interrupted")]
    Interrupted,
}
