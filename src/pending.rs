//! Requests that have been handed to the packet layer and are awaiting
//! either a transmission callback or a response. Bounded by `MAX_PENDING`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::flags::RequestState;
use crate::request::RequestInner;
use crate::rqid::Rqid;

#[derive(Default)]
pub(crate) struct PendingSet {
    by_rqid: DashMap<Rqid, Arc<RequestInner>>,
    count: AtomicUsize,
}

impl PendingSet {
    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn counter(&self) -> &AtomicUsize {
        &self.count
    }

    /// Add `req` to the pending set, setting `PENDING`. Fails (without
    /// changing state) if the request has already been `LOCKED` by a
    /// concurrent cancellation.
    pub(crate) fn push(&self, req: Arc<RequestInner>) -> bool {
        if req.state().contains(RequestState::LOCKED) {
            return false;
        }
        req.set_bits(RequestState::PENDING);
        self.by_rqid.insert(req.rqid(), req);
        self.count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Remove `req` from the pending set if it's still there. Returns
    /// `true` if it removed it.
    ///
    /// The `DashMap` removal, not the `PENDING` bit, is the single source
    /// of truth for the counter decrement: `remove` and `remove_by_rqid`
    /// race on the same request (a response arriving just as a timeout or
    /// cancel fires), and only one of them can win `by_rqid.remove`. Using
    /// the bit as a second, independent guard would let both sides decrement.
    pub(crate) fn remove(&self, req: &Arc<RequestInner>) -> bool {
        req.clear_bits(RequestState::PENDING);
        let removed = self.by_rqid.remove(&req.rqid()).is_some();
        if removed {
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Remove and return the request matching `rqid`, if any (the
    /// completion dispatcher's rqid match in the design doc).
    pub(crate) fn remove_by_rqid(&self, rqid: Rqid) -> Option<Arc<RequestInner>> {
        let (_, req) = self.by_rqid.remove(&rqid)?;
        req.clear_bits(RequestState::PENDING);
        self.count.fetch_sub(1, Ordering::AcqRel);
        Some(req)
    }

    /// Snapshot of everything currently pending, for the timeout reaper to
    /// scan. Cloning `Arc`s out avoids holding any shard lock across the
    /// reaper's own state transitions.
    pub(crate) fn snapshot(&self) -> Vec<Arc<RequestInner>> {
        self.by_rqid.iter().map(|e| e.value().clone()).collect()
    }

    /// Drain everything still pending, locking each entry as it goes (used
    /// by shutdown, which expects this set to normally already be empty by
    /// the time the packet layer has been shut down).
    pub(crate) fn drain_locked(&self) -> Vec<Arc<RequestInner>> {
        let drained: Vec<_> = self.by_rqid.iter().map(|e| e.value().clone()).collect();
        self.by_rqid.clear();
        self.count.store(0, Ordering::Release);
        for r in &drained {
            r.set_bits(RequestState::LOCKED);
            r.clear_bits(RequestState::PENDING);
        }
        drained
    }
}
