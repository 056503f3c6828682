//! Request type flags (fixed at construction) and state flags (mutable,
//! set-only within their stage). See the state machine in the design doc.

use bitflags::bitflags;

bitflags! {
    /// Flags fixed when a request is constructed. Never change afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RequestFlags: u8 {
        /// A reply is expected for this request.
        const HAS_RESPONSE = 0b0000_0001;
        /// Internal: this is the synthetic flush barrier request.
        const FLUSH        = 0b0000_0010;
        /// The underlying packet participates in sequenced, ACKed delivery.
        /// Required whenever `HAS_RESPONSE` is set.
        const SEQUENCED    = 0b0000_0100;
    }
}

bitflags! {
    /// Mutable state bits. Transitions permitted between them are exactly
    /// those in the state machine diagram; see `request::RequestInner`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RequestState: u32 {
        const QUEUED       = 0b0000_0001;
        const TRANSMITTING = 0b0000_0010;
        const TRANSMITTED  = 0b0000_0100;
        const PENDING      = 0b0000_1000;
        const RSPRCVD      = 0b0001_0000;
        const LOCKED       = 0b0010_0000;
        const CANCELED     = 0b0100_0000;
        const COMPLETED    = 0b1000_0000;
    }
}
