//! Completion dispatcher: turns inbound frames from the packet layer into
//! either event callbacks or completions of pending requests.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::CompletionError;
use crate::flags::RequestState;
use crate::request::{CommandFrame, Response};
use crate::rqid::Rqid;
use crate::rtl::Rtl;

const FRAME_TYPE_CMD: u8 = 0x80;

pub(crate) async fn run_frame_loop(rtl: Rtl, mut frames: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(frame) = frames.recv().await {
        dispatch(&rtl, frame);
    }
}

fn dispatch(rtl: &Rtl, frame: Bytes) {
    let Some(&discriminator) = frame.first() else {
        tracing::warn!("dropped empty inbound frame");
        return;
    };

    if discriminator != FRAME_TYPE_CMD {
        tracing::warn!(discriminator, "dropped frame with unknown type");
        return;
    }

    let header = frame.slice(1..);
    if header.len() < 2 {
        tracing::warn!("dropped command frame with truncated header");
        return;
    }

    let rqid = Rqid::from_le_bytes(&header);
    let command = CommandFrame { rqid, header: header.clone() };
    let payload = header.slice(2..);

    if rqid.is_event() {
        rtl.shared.ops.handle_event(rtl, command, payload);
        return;
    }

    let Some(req) = rtl.shared.pending.remove_by_rqid(rqid) else {
        tracing::warn!(%rqid, "dropped response with no matching pending request");
        return;
    };

    #[cfg(feature = "fault-injection")]
    {
        use std::sync::atomic::Ordering;
        if rtl
            .shared
            .drop_next_response
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // Put it back in pending; the reaper will eventually time it out,
            // exactly as if the peer's response had been lost in transit.
            rtl.shared.pending.push(req);
            rtl.shared.schedule_tx();
            return;
        }
    }

    let acked = req.state().contains(RequestState::TRANSMITTED);

    req.set_bits(RequestState::LOCKED);
    if req.test_and_set(RequestState::COMPLETED) {
        return;
    }

    if acked {
        req.set_bits(RequestState::RSPRCVD);
        req.complete_response(Response { command, payload });
    } else {
        // The peer's response beat the packet layer's own transmission
        // acknowledgement — a protocol violation on its part.
        tracing::warn!(%rqid, "response arrived before transmission was acknowledged");
        req.complete_error(CompletionError::RemoteIo);
    }
    rtl.shared.schedule_tx();
}
