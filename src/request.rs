//! The request: the unit of work managed end-to-end by this layer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::CompletionError;
use crate::flags::{RequestFlags, RequestState};
use crate::ptl::PacketId;
use crate::rqid::Rqid;

/// A parsed inbound command header: just enough to match a response back to
/// the pending request that's waiting for it. Everything beyond the rqid is
/// opaque to this layer.
#[derive(Debug, Clone)]
pub struct CommandFrame {
    pub rqid: Rqid,
    /// The full header bytes, including the rqid, for client interpretation.
    pub header: Bytes,
}

/// A response delivered to a request's `complete` callback.
#[derive(Debug, Clone)]
pub struct Response {
    pub command: CommandFrame,
    pub payload: Bytes,
}

/// The result passed to [`RequestOps::complete`], exactly once per request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Completed successfully with a response.
    Response(Response),
    /// Completed successfully without a response (fire-and-forget).
    Success,
    /// Completed with an error; no response was or will be delivered.
    Error(CompletionError),
}

/// Client-supplied operations for a request.
pub trait RequestOps: Send + Sync {
    /// Called exactly once, regardless of how the request terminates.
    fn complete(&self, outcome: Outcome);

    /// Called when the last reference to the request is dropped. The
    /// default does nothing; override to e.g. signal a waiter.
    fn release(&self) {}
}

/// Public handle to a submitted (or not-yet-submitted) request.
///
/// Cloning a `Request` clones the handle, not the request — all clones
/// refer to the same underlying state and the same eventual `complete` call.
#[derive(Clone)]
pub struct Request {
    pub(crate) inner: Arc<RequestInner>,
}

pub(crate) struct RequestInner {
    pub(crate) payload: Bytes,
    pub(crate) flags: RequestFlags,
    state: AtomicU32,
    /// Whether this request has been bound to an `Rtl` via `submit` before.
    /// Requests are at-most-once: binding twice is rejected.
    bound: AtomicBool,
    /// Set when the packet layer acknowledges transmission; read by the
    /// timeout reaper. `None` means "no deadline armed".
    pub(crate) transmitted_at: Mutex<Option<Instant>>,
    /// The packet layer's id for this request's current in-flight packet,
    /// if any. Cancellation uses this to ask the packet layer to recall it.
    pub(crate) current_packet: Mutex<Option<PacketId>>,
    pub(crate) ops: Arc<dyn RequestOps>,
}

impl RequestInner {
    pub(crate) fn state(&self) -> RequestState {
        RequestState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    /// OR `bits` into the state word, returning the state *before* the set.
    pub(crate) fn set_bits(&self, bits: RequestState) -> RequestState {
        RequestState::from_bits_truncate(self.state.fetch_or(bits.bits(), Ordering::AcqRel))
    }

    /// AND-out `bits` from the state word, returning the state *before* the clear.
    pub(crate) fn clear_bits(&self, bits: RequestState) -> RequestState {
        RequestState::from_bits_truncate(self.state.fetch_and(!bits.bits(), Ordering::AcqRel))
    }

    /// Set `bit` and report whether it was already set (test-and-set).
    pub(crate) fn test_and_set(&self, bit: RequestState) -> bool {
        self.set_bits(bit).contains(bit)
    }

    /// CAS the state word from empty (never submitted) to `LOCKED`.
    /// Used by non-pending cancellation to claim a request that never made
    /// it into any list.
    pub(crate) fn lock_if_untouched(&self) -> bool {
        self.state
            .compare_exchange(
                0,
                RequestState::LOCKED.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Bind this request to an RTL for the first time. Returns `false` if it
    /// was already bound (the at-most-once-submission guard).
    pub(crate) fn bind(&self) -> bool {
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub(crate) fn rqid(&self) -> Rqid {
        Rqid::from_le_bytes(&self.payload)
    }

    /// Invoke `complete` with an error outcome. Callers are responsible for
    /// the exactly-once `COMPLETED` test-and-set before calling this.
    pub(crate) fn complete_error(&self, err: CompletionError) {
        self.ops.complete(Outcome::Error(err));
    }

    pub(crate) fn complete_success(&self) {
        self.ops.complete(Outcome::Success);
    }

    pub(crate) fn complete_response(&self, response: Response) {
        self.ops.complete(Outcome::Response(response));
    }

    pub(crate) fn set_current_packet(&self, id: PacketId) {
        *self.current_packet.lock() = Some(id);
    }

    pub(crate) fn take_current_packet(&self) -> Option<PacketId> {
        self.current_packet.lock().take()
    }
}

impl Drop for RequestInner {
    fn drop(&mut self) {
        self.ops.release();
    }
}

impl Request {
    /// Construct a new request from its opaque payload (whose first two
    /// bytes, little-endian, are the rqid) and its fixed type flags.
    ///
    /// `flags` must not include [`RequestFlags::FLUSH`]; that flag is
    /// reserved for the internal barrier request built by [`crate::Rtl::flush`].
    pub fn new(payload: Bytes, flags: RequestFlags, ops: Arc<dyn RequestOps>) -> Self {
        debug_assert!(
            !flags.contains(RequestFlags::FLUSH),
            "RequestFlags::FLUSH is reserved for internal flush requests"
        );
        debug_assert!(
            payload.len() >= 2,
            "request payload must contain at least a 2-byte rqid header"
        );
        Request {
            inner: Arc::new(RequestInner {
                payload,
                flags,
                state: AtomicU32::new(0),
                bound: AtomicBool::new(false),
                transmitted_at: Mutex::new(None),
                current_packet: Mutex::new(None),
                ops,
            }),
        }
    }

    pub fn rqid(&self) -> Rqid {
        self.inner.rqid()
    }

    pub fn flags(&self) -> RequestFlags {
        self.inner.flags
    }

    pub(crate) fn new_flush(payload: Bytes, ops: Arc<dyn RequestOps>) -> Self {
        Request {
            inner: Arc::new(RequestInner {
                payload,
                flags: RequestFlags::FLUSH,
                state: AtomicU32::new(0),
                bound: AtomicBool::new(false),
                transmitted_at: Mutex::new(None),
                current_packet: Mutex::new(None),
                ops,
            }),
        }
    }
}
