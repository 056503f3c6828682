//! The 16-bit request identifier carried in every command header.

use std::fmt;

/// Request identifier. Allocated by the client outside this crate; the RTL
/// treats it as an opaque matching key except for the reserved event range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rqid(pub u16);

impl Rqid {
    /// Sub-range reserved for unsolicited events rather than command
    /// responses. The filtered original source references
    /// `ssh_rqid_is_event` without retaining its defining constant; this
    /// bound is this crate's own choice (see DESIGN.md).
    pub const EVENT_MAX: u16 = 0x001F;

    /// Read a little-endian rqid from the first two bytes of `data`.
    ///
    /// # Panics
    /// Panics if `data` is shorter than two bytes; callers are expected to
    /// have already validated frame length before extracting the rqid.
    pub fn from_le_bytes(data: &[u8]) -> Self {
        Rqid(u16::from_le_bytes([data[0], data[1]]))
    }

    /// Whether this id falls in the reserved event sub-range.
    pub fn is_event(self) -> bool {
        self.0 <= Self::EVENT_MAX
    }
}

impl fmt::Display for Rqid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u16> for Rqid {
    fn from(value: u16) -> Self {
        Rqid(value)
    }
}
