//! An in-memory stand-in for the packet layer, used by this crate's own
//! tests and available to downstream integration tests.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::PacketError;
use crate::ptl::{OutboundPacket, PacketId, PacketLayer};

/// A snapshot of a packet handed to [`MockPacketLayer::submit`], recorded
/// for test assertions (the real `OutboundPacket` is not `Clone` since it
/// carries the one-shot completion sender).
#[derive(Debug, Clone)]
pub struct SubmittedPacket {
    pub id: PacketId,
    pub payload: Bytes,
    pub sequenced: bool,
    pub flush: bool,
}

#[derive(Default)]
struct MockState {
    reject_submit: Option<PacketError>,
    started: bool,
    shutdown: bool,
    log: Vec<SubmittedPacket>,
    pending: HashMap<PacketId, oneshot::Sender<Result<(), PacketError>>>,
}

/// Test double for [`PacketLayer`]. Submitted packets sit in an internal
/// table until the test calls [`MockPacketLayer::complete`] or
/// [`MockPacketLayer::fail`] to resolve them, and inbound frames are
/// injected with [`MockPacketLayer::deliver`].
pub struct MockPacketLayer {
    state: Mutex<MockState>,
    frames: mpsc::UnboundedSender<Bytes>,
}

impl MockPacketLayer {
    /// Build a mock paired with the frame channel an [`crate::Rtl`] should
    /// be initialized with.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MockPacketLayer {
                state: Mutex::new(MockState::default()),
                frames: tx,
            },
            rx,
        )
    }

    /// Make the next (and every subsequent, until cleared) `submit` call
    /// fail synchronously with `err`.
    pub fn reject_submissions(&self, err: Option<PacketError>) {
        self.state.lock().reject_submit = err;
    }

    /// All packets submitted so far, oldest first.
    pub fn submitted(&self) -> Vec<SubmittedPacket> {
        self.state.lock().log.clone()
    }

    /// Resolve a still-pending packet as successfully transmitted.
    pub fn complete(&self, id: PacketId) {
        if let Some(tx) = self.state.lock().pending.remove(&id) {
            let _ = tx.send(Ok(()));
        }
    }

    /// Resolve a still-pending packet as failed.
    pub fn fail(&self, id: PacketId, err: PacketError) {
        if let Some(tx) = self.state.lock().pending.remove(&id) {
            let _ = tx.send(Err(err));
        }
    }

    /// Push an inbound frame (event or command response) into the layer.
    pub fn deliver(&self, frame: Bytes) {
        let _ = self.frames.send(frame);
    }

    pub fn was_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

impl PacketLayer for MockPacketLayer {
    fn submit(&self, packet: OutboundPacket) -> Result<(), PacketError> {
        let mut state = self.state.lock();
        if let Some(err) = state.reject_submit.clone() {
            return Err(err);
        }
        state.log.push(SubmittedPacket {
            id: packet.id,
            payload: packet.payload.clone(),
            sequenced: packet.sequenced,
            flush: packet.flush,
        });
        state.pending.insert(packet.id, packet.complete);
        Ok(())
    }

    fn cancel(&self, id: PacketId) {
        if let Some(tx) = self.state.lock().pending.remove(&id) {
            let _ = tx.send(Err(PacketError::Canceled));
        }
    }

    fn tx_start(&self) -> Result<(), PacketError> {
        self.state.lock().started = true;
        Ok(())
    }

    fn rx_start(&self) -> Result<(), PacketError> {
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        for (_, tx) in state.pending.drain() {
            let _ = tx.send(Err(PacketError::Shutdown));
        }
    }
}
