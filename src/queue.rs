//! FIFO of requests awaiting their first transmission attempt.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::flags::{RequestFlags, RequestState};
use crate::request::RequestInner;

/// Outcome of trying to enqueue a freshly submitted request.
pub(crate) enum Enqueue {
    /// Appended to the queue with `QUEUED` set.
    Ok,
    /// Rejected: the layer is shutting (or has shut) down.
    ShuttingDown,
    /// Rejected: a concurrent cancellation already locked the request.
    Locked,
}

/// Outcome of trying to dequeue the next request ready for transmission.
pub(crate) enum Dequeued {
    /// Nothing in the queue at all.
    Empty,
    /// The head-of-line request exists but isn't eligible yet (pending
    /// window full, or it's a flush waiting for the window to drain).
    /// Further entries are not considered — preserving submission order
    /// means a blocked head blocks everything behind it.
    Busy,
    /// Dequeued and transitioned `QUEUED -> TRANSMITTING`.
    Ready(Arc<RequestInner>),
}

#[derive(Default)]
pub(crate) struct SubmissionQueue {
    items: Mutex<VecDeque<Arc<RequestInner>>>,
}

impl SubmissionQueue {
    /// Check `shutdown` and the request's `LOCKED` bit, and append only if
    /// neither rejects it — all under the queue lock, so a concurrent
    /// `shutdown` (which sets the flag and then drains under this same
    /// lock) can never observe an empty queue while this append is still
    /// in flight, and a `submit` can never land a request after the drain
    /// has already happened. Mirrors the original driver's single
    /// queue-lock critical section covering both the shutdown/locked
    /// checks and the list append.
    pub(crate) fn try_enqueue(&self, req: Arc<RequestInner>, shutdown: &AtomicBool) -> Enqueue {
        let mut items = self.items.lock();
        if shutdown.load(Ordering::Acquire) {
            return Enqueue::ShuttingDown;
        }
        if req.state().contains(RequestState::LOCKED) {
            return Enqueue::Locked;
        }
        req.set_bits(RequestState::QUEUED);
        items.push_back(req);
        Enqueue::Ok
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Remove `req` from the queue if it is still `QUEUED` there (used by
    /// cancellation and shutdown, which may race with the transmitter).
    /// Returns `true` if it removed and cleared `QUEUED`.
    pub(crate) fn remove(&self, req: &Arc<RequestInner>) -> bool {
        let mut items = self.items.lock();
        let was_queued = req.clear_bits(RequestState::QUEUED).contains(RequestState::QUEUED);
        if was_queued {
            if let Some(pos) = items.iter().position(|r| Arc::ptr_eq(r, req)) {
                items.remove(pos);
            }
        }
        was_queued
    }

    /// Drain the whole queue, locking every entry and clearing `QUEUED` as
    /// it goes (used by shutdown).
    pub(crate) fn drain_locked(&self) -> Vec<Arc<RequestInner>> {
        let mut items = self.items.lock();
        let drained: Vec<_> = items.drain(..).collect();
        for r in &drained {
            r.set_bits(RequestState::LOCKED);
            r.clear_bits(RequestState::QUEUED);
        }
        drained
    }

    /// Try to dequeue the next request eligible for transmission, given the
    /// current pending count and window size.
    pub(crate) fn take_eligible(&self, pending_count: &AtomicUsize, max_pending: usize) -> Dequeued {
        let mut items = self.items.lock();

        let mut idx = 0;
        while idx < items.len() {
            let candidate = &items[idx];
            if candidate.state().contains(RequestState::LOCKED) {
                // Claimed by a concurrent cancellation; skip it entirely.
                idx += 1;
                continue;
            }

            let eligible = if candidate.flags.contains(RequestFlags::FLUSH) {
                pending_count.load(Ordering::Acquire) == 0
            } else {
                pending_count.load(Ordering::Acquire) < max_pending
            };

            if !eligible {
                return Dequeued::Busy;
            }

            let req = items.remove(idx).expect("index in bounds");
            req.set_bits(RequestState::TRANSMITTING);
            req.clear_bits(RequestState::QUEUED);
            return Dequeued::Ready(req);
        }

        Dequeued::Empty
    }
}
