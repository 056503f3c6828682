//! Cancellation: forces a request to a terminal state regardless of which
//! stage it's currently in, racing against the transmitter, the packet
//! callback, and the timeout reaper.

use std::sync::Arc;

use crate::error::CompletionError;
use crate::flags::RequestState;
use crate::request::RequestInner;
use crate::rtl::RtlShared;

/// Cancel `req`. `pending_hint` picks the branch most likely to be correct
/// for the request's current stage — it's advisory, not load-bearing for
/// correctness. Returns whether the request is now (or is already headed
/// to) a terminal state.
pub(crate) fn cancel(shared: &Arc<RtlShared>, req: &Arc<RequestInner>, pending_hint: bool) -> bool {
    if req.test_and_set(RequestState::CANCELED) {
        // Another cancellation is already in progress or finished.
        return true;
    }

    let result = if pending_hint {
        cancel_pending(shared, req)
    } else {
        cancel_non_pending(shared, req)
    };

    shared.schedule_tx();
    result
}

fn cancel_non_pending(shared: &Arc<RtlShared>, req: &Arc<RequestInner>) -> bool {
    if req.lock_if_untouched() {
        if !req.is_bound() {
            req.set_bits(RequestState::COMPLETED);
            req.complete_error(CompletionError::Canceled);
            return true;
        }
        // Bound but the state word was still empty: submit() raced us
        // between binding and queuing. Fall through to the queue-unlink
        // attempt below, which is harmless if it never makes it there.
    }

    if shared.queue.remove(req) {
        req.set_bits(RequestState::LOCKED);
        if !req.test_and_set(RequestState::COMPLETED) {
            req.complete_error(CompletionError::Canceled);
        }
        return true;
    }

    // Already past the queue (transmitting or further); the caller should
    // have used the pending branch. Not terminal from here.
    false
}

fn cancel_pending(shared: &Arc<RtlShared>, req: &Arc<RequestInner>) -> bool {
    if req.test_and_set(RequestState::LOCKED) {
        // Already being finalized by another path.
        return true;
    }

    if !req.is_bound() {
        req.set_bits(RequestState::COMPLETED);
        req.complete_error(CompletionError::Canceled);
        return true;
    }

    shared.queue.remove(req);
    shared.pending.remove(req);

    if let Some(packet_id) = req.take_current_packet() {
        shared.ptl.cancel(packet_id);
    }

    if !req.test_and_set(RequestState::COMPLETED) {
        req.complete_error(CompletionError::Canceled);
    }
    true
}
