//! Coalesced timeout reaper: a single timer for every pending request with
//! an outstanding response, instead of one per request.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CompletionError;
use crate::flags::RequestState;
use crate::request::RequestInner;
use crate::rtl::RtlShared;

fn now_ms(shared: &RtlShared) -> u64 {
    shared.anchor.elapsed().as_millis() as u64
}

/// Arm (or re-arm) the reaper's deadline for `req`, which has just been
/// transmitted and is now waiting on a response.
pub(crate) fn arm(shared: &Arc<RtlShared>, req: &Arc<RequestInner>) {
    *req.transmitted_at.lock() = Some(std::time::Instant::now());
    let deadline = now_ms(shared) + shared.config.request_timeout.as_millis() as u64;
    try_shrink(shared, deadline);
}

/// Shrink `reaper_expires_ms` to `candidate` if it's meaningfully sooner
/// than the current deadline, waking the reaper if it did. "Meaningfully"
/// is gated by `timeout_resolution` so that a burst of re-arms around the
/// same time doesn't repeatedly bounce the reaper's timer.
fn try_shrink(shared: &Arc<RtlShared>, candidate: u64) {
    let resolution = shared.config.timeout_resolution.as_millis() as u64;
    let mut cur = shared.reaper_expires_ms.load(Ordering::Acquire);
    loop {
        if cur != u64::MAX && candidate + resolution >= cur {
            return;
        }
        match shared.reaper_expires_ms.compare_exchange_weak(
            cur,
            candidate,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                shared.reaper_notify.notify_one();
                return;
            }
            Err(actual) => cur = actual,
        }
    }
}

pub(crate) async fn run(shared: Arc<RtlShared>) {
    loop {
        let expires = shared.reaper_expires_ms.load(Ordering::Acquire);

        if expires == u64::MAX {
            shared.reaper_notify.notified().await;
            continue;
        }

        let now = now_ms(&shared);
        if expires > now {
            let deadline = shared.anchor + Duration::from_millis(expires);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline.into()) => {}
                _ = shared.reaper_notify.notified() => continue,
            }
        }

        sweep(&shared);
    }
}

fn sweep(shared: &Arc<RtlShared>) {
    let timeout_ms = shared.config.request_timeout.as_millis() as u64;
    let now = now_ms(shared);
    let mut next_deadline = u64::MAX;

    for req in shared.pending.snapshot() {
        let transmitted_at = *req.transmitted_at.lock();
        let Some(t) = transmitted_at else { continue };
        let elapsed = t.elapsed().as_millis() as u64;

        if elapsed >= timeout_ms {
            expire(shared, &req);
        } else {
            let remaining = timeout_ms - elapsed;
            next_deadline = next_deadline.min(now + remaining);
        }
    }

    shared
        .reaper_expires_ms
        .store(u64::MAX, Ordering::Release);
    if next_deadline != u64::MAX {
        try_shrink(shared, next_deadline);
    }
}

fn expire(shared: &Arc<RtlShared>, req: &Arc<RequestInner>) {
    req.set_bits(RequestState::LOCKED);
    if req.test_and_set(RequestState::COMPLETED) {
        return;
    }
    shared.pending.remove(req);
    req.complete_error(CompletionError::TimedOut);
    shared.schedule_tx();
}
