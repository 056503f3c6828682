//! The downward interface to the Packet Transmission Layer (PTL).
//!
//! The PTL owns framing, checksums, sequence numbers, and retransmission of
//! individual packets; this crate consumes it through this trait boundary
//! and never touches those concerns directly (see Non-goals in the design
//! doc).

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::PacketError;

/// Opaque identifier for an in-flight packet, used to ask the packet layer
/// to cancel it. Allocated by this crate, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(u64);

#[derive(Debug, Default)]
pub(crate) struct PacketIdAllocator(AtomicU64);

impl PacketIdAllocator {
    pub(crate) fn next(&self) -> PacketId {
        PacketId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A packet handed down to the packet layer for transmission.
pub struct OutboundPacket {
    pub id: PacketId,
    pub payload: Bytes,
    /// Whether this packet participates in sequenced, ACKed delivery.
    pub sequenced: bool,
    /// Whether this is the special packet-layer flush packet (see the
    /// design doc's discussion of the request-layer `FLUSH` request type).
    pub flush: bool,
    /// Fires exactly once with the outcome of this packet's transmission.
    pub complete: oneshot::Sender<Result<(), PacketError>>,
}

/// The packet transmission layer, as seen from above.
///
/// Implementations must invoke the `complete` sender passed to `submit`
/// exactly once per accepted packet (matching the request layer's own
/// exactly-once `complete` guarantee one layer up).
pub trait PacketLayer: Send + Sync + 'static {
    /// Hand a packet to the packet layer for transmission. Returning `Err`
    /// means the packet was rejected outright and `complete` will *not*
    /// fire; returning `Ok` means the packet was accepted and `complete`
    /// will fire exactly once, synchronously or otherwise.
    fn submit(&self, packet: OutboundPacket) -> Result<(), PacketError>;

    /// Request cancellation of a previously submitted, not-yet-completed
    /// packet. May synchronously invoke that packet's `complete` sender.
    fn cancel(&self, id: PacketId);

    /// Start the transmit side.
    fn tx_start(&self) -> Result<(), PacketError>;

    /// Start the receive side (inbound frame delivery begins after this).
    fn rx_start(&self) -> Result<(), PacketError>;

    /// Shut the packet layer down. Any packets still in flight must have
    /// their `complete` sender invoked (with `Err(PacketError::Shutdown)`)
    /// as part of this call or shortly after.
    fn shutdown(&self);

    /// Release any resources held by the packet layer. Only called after
    /// `shutdown`.
    fn destroy(&self) {}
}
