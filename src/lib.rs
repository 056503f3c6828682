//! Request transmission layer for a serial host-controller protocol.
//!
//! This crate turns a stream of best-effort-reliable packets, handed up
//! from a lower packet transmission layer, into typed, at-most-once,
//! bounded-concurrency request/response RPC, and demultiplexes asynchronous
//! events from the same byte stream onto a client-supplied callback.
//!
//! Framing, checksums, sequence numbers, retransmission, and physical I/O
//! all belong to the packet layer below this crate — see [`PacketLayer`].

mod cancel;
mod config;
mod dispatcher;
mod error;
mod flags;
mod pending;
mod ptl;
mod queue;
mod reaper;
mod request;
mod rqid;
mod rtl;
mod transmitter;

pub mod mock;

pub use config::RtlConfig;
pub use error::{CompletionError, FlushError, PacketError, SubmitError};
pub use flags::RequestFlags;
pub use ptl::{OutboundPacket, PacketId, PacketLayer};
pub use request::{CommandFrame, Outcome, Request, RequestOps, Response};
pub use rqid::Rqid;
pub use rtl::{EventHandler, Rtl};
