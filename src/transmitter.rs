//! The single serialized worker that drains the submission queue into the
//! packet layer, subject to the pending window.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{CompletionError, PacketError};
use crate::flags::{RequestFlags, RequestState};
use crate::ptl::OutboundPacket;
use crate::queue::Dequeued;
use crate::reaper;
use crate::request::RequestInner;
use crate::rtl::RtlShared;

enum Processed {
    /// Moved one request from queue to pending (or dropped a
    /// concurrently-canceled one) — keep going.
    Progress,
    /// Nothing eligible to dequeue right now.
    Idle,
    /// The packet layer is shutting down; stop entirely, no reschedule.
    ShuttingDown,
}

/// Run the transmitter. Bounded-loop pattern per request/transmission
/// cycle, translating the original's `schedule_work`/`cancel_work_sync`
/// workqueue item into a tokio task parked on a `Notify`.
pub(crate) async fn run(shared: Arc<RtlShared>) {
    loop {
        let mut exhausted_budget = true;

        for _ in 0..shared.config.tx_loop_budget {
            match try_process_one(&shared).await {
                Processed::Progress => continue,
                Processed::Idle => {
                    exhausted_budget = false;
                    break;
                }
                Processed::ShuttingDown => return,
            }
        }

        if exhausted_budget {
            // Out of tries; yield back to the runtime, then pick up where
            // we left off rather than risk monopolizing a worker thread.
            tokio::task::yield_now().await;
        } else {
            shared.tx_notify.notified().await;
        }
    }
}

async fn try_process_one(shared: &Arc<RtlShared>) -> Processed {
    let req = match shared
        .queue
        .take_eligible(shared.pending.counter(), shared.config.max_pending)
    {
        Dequeued::Empty => return Processed::Idle,
        Dequeued::Busy => return Processed::Idle,
        Dequeued::Ready(req) => req,
    };

    if !shared.pending.push(req.clone()) {
        // Claimed by a concurrent cancellation between dequeue and here.
        return Processed::Progress;
    }

    let (tx, rx) = oneshot::channel();
    let packet_id = shared.packet_ids.next();
    let packet = OutboundPacket {
        id: packet_id,
        payload: req.payload.clone(),
        sequenced: req.flags.contains(RequestFlags::SEQUENCED),
        flush: req.flags.contains(RequestFlags::FLUSH),
        complete: tx,
    };

    match shared.ptl.submit(packet) {
        Ok(()) => {
            req.set_current_packet(packet_id);
            tokio::spawn(await_packet_completion(shared.clone(), req, rx));
            Processed::Progress
        }
        Err(PacketError::Shutdown) => {
            req.set_bits(RequestState::LOCKED);
            shared.pending.remove(&req);
            if !req.test_and_set(RequestState::COMPLETED) {
                req.complete_error(CompletionError::ShuttingDown);
            }
            Processed::ShuttingDown
        }
        Err(_) => {
            // Already locked by a concurrent cancel; that path owns completion.
            Processed::Progress
        }
    }
}

/// The packet callback from the packet layer (design doc §4.4), invoked
/// exactly once per submitted packet via the oneshot channel.
async fn await_packet_completion(
    shared: Arc<RtlShared>,
    req: Arc<RequestInner>,
    rx: oneshot::Receiver<Result<(), PacketError>>,
) {
    let result = match rx.await {
        Ok(r) => r,
        Err(_) => Err(PacketError::Shutdown),
    };

    req.take_current_packet();

    match result {
        Err(status) => {
            req.set_bits(RequestState::LOCKED);
            if req.test_and_set(RequestState::COMPLETED) {
                return;
            }
            shared.queue.remove(&req);
            shared.pending.remove(&req);
            req.complete_error(CompletionError::Packet(status));
            shared.schedule_tx();
        }
        Ok(()) => {
            req.set_bits(RequestState::TRANSMITTED);
            req.clear_bits(RequestState::TRANSMITTING);

            if req.flags.contains(RequestFlags::HAS_RESPONSE) {
                reaper::arm(&shared, &req);
                return;
            }

            req.set_bits(RequestState::LOCKED);
            if req.test_and_set(RequestState::COMPLETED) {
                return;
            }
            shared.pending.remove(&req);
            req.complete_success();
            shared.schedule_tx();
        }
    }
}
