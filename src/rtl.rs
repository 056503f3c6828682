//! Lifecycle and shared state for the request transmission layer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cancel;
use crate::config::RtlConfig;
use crate::dispatcher;
use crate::error::{CompletionError, FlushError, SubmitError};
use crate::flags::RequestFlags;
use crate::pending::PendingSet;
use crate::ptl::{PacketIdAllocator, PacketLayer};
use crate::queue::{Enqueue, SubmissionQueue};
use crate::reaper;
use crate::request::{CommandFrame, Outcome, Request, RequestOps};
use crate::transmitter;

/// Receiver-thread callback for unsolicited events (see the design doc's
/// event dispatch section). Must not synchronously `submit` a
/// response-expecting request back into the same layer — that would
/// serialize the receive path behind a round trip on itself.
pub trait EventHandler: Send + Sync + 'static {
    fn handle_event(&self, rtl: &Rtl, event: CommandFrame, payload: Bytes);
}

struct Tasks {
    transmitter: JoinHandle<()>,
    reaper: JoinHandle<()>,
    frames: JoinHandle<()>,
}

pub(crate) struct RtlShared {
    pub(crate) ptl: Arc<dyn PacketLayer>,
    pub(crate) ops: Arc<dyn EventHandler>,
    pub(crate) config: RtlConfig,
    pub(crate) queue: SubmissionQueue,
    pub(crate) pending: PendingSet,
    pub(crate) shutdown: AtomicBool,
    pub(crate) tx_notify: Notify,
    pub(crate) reaper_notify: Notify,
    /// Milliseconds since `anchor`; `u64::MAX` means "no deadline armed".
    pub(crate) reaper_expires_ms: AtomicU64,
    pub(crate) anchor: Instant,
    pub(crate) packet_ids: PacketIdAllocator,
    pub(crate) cancel_token: CancellationToken,
    #[cfg(feature = "fault-injection")]
    pub(crate) drop_next_response: AtomicBool,
    tasks: SyncMutex<Option<Tasks>>,
}

impl RtlShared {
    pub(crate) fn schedule_tx(&self) {
        self.tx_notify.notify_one();
    }
}

/// Handle to a running request transmission layer.
///
/// Cheap to clone: all clones share the same underlying state and
/// background tasks.
#[derive(Clone)]
pub struct Rtl {
    pub(crate) shared: Arc<RtlShared>,
}

impl Rtl {
    /// Initialize the layer over `ptl`, reading inbound payload frames from
    /// `frames` (the channel the packet layer pushes `data_received` spans
    /// into) and delivering events to `ops`.
    ///
    /// Spawns the transmitter, timeout reaper, and frame-dispatch tasks;
    /// none of them do anything until [`Rtl::start`] brings the packet
    /// layer's transmit/receive sides up (or, for the transmitter, until a
    /// request is submitted).
    pub fn init(
        ptl: Arc<dyn PacketLayer>,
        frames: mpsc::UnboundedReceiver<Bytes>,
        ops: Arc<dyn EventHandler>,
        config: RtlConfig,
    ) -> Rtl {
        let shared = Arc::new(RtlShared {
            ptl,
            ops,
            config,
            queue: SubmissionQueue::default(),
            pending: PendingSet::default(),
            shutdown: AtomicBool::new(false),
            tx_notify: Notify::new(),
            reaper_notify: Notify::new(),
            reaper_expires_ms: AtomicU64::new(u64::MAX),
            anchor: Instant::now(),
            packet_ids: PacketIdAllocator::default(),
            cancel_token: CancellationToken::new(),
            #[cfg(feature = "fault-injection")]
            drop_next_response: AtomicBool::new(false),
            tasks: SyncMutex::new(None),
        });

        let rtl = Rtl { shared: shared.clone() };

        let tx_task = tokio::spawn(transmitter::run(shared.clone()));
        let reaper_task = tokio::spawn(reaper::run(shared.clone()));
        let frames_task = tokio::spawn(dispatcher::run_frame_loop(rtl.clone(), frames));

        *shared.tasks.lock() = Some(Tasks {
            transmitter: tx_task,
            reaper: reaper_task,
            frames: frames_task,
        });

        rtl
    }

    /// Start the packet layer's transmit and receive sides. If the queue
    /// has leftover work from before (layer was stopped and restarted
    /// without a full shutdown), wakes the transmitter.
    pub fn start(&self) -> Result<(), crate::error::PacketError> {
        self.shared.ptl.tx_start()?;
        self.shared.ptl.rx_start()?;
        if !self.shared.queue.is_empty() {
            self.shared.schedule_tx();
        }
        Ok(())
    }

    /// Submit a request for transmission.
    pub fn submit(&self, req: &Request) -> Result<(), SubmitError> {
        let inner = &req.inner;

        if inner.flags.contains(RequestFlags::HAS_RESPONSE)
            && !inner.flags.contains(RequestFlags::SEQUENCED)
        {
            return Err(SubmitError::Invalid(
                "HAS_RESPONSE requires a sequenced packet",
            ));
        }

        if !inner.bind() {
            return Err(SubmitError::AlreadySubmitted);
        }

        match self.shared.queue.try_enqueue(inner.clone(), &self.shared.shutdown) {
            Enqueue::Ok => {}
            Enqueue::ShuttingDown => return Err(SubmitError::ShuttingDown),
            Enqueue::Locked => return Err(SubmitError::Invalid("request already locked")),
        }

        self.shared.schedule_tx();
        Ok(())
    }

    /// Cancel `req`. `pending_hint` selects between the two cancellation
    /// code paths described in the design doc; it's advisory only —
    /// correctness does not depend on it, picking the wrong one just costs
    /// an extra lock acquisition. Returns whether the cancellation (this
    /// call, or a race with another in-flight completion path) was
    /// terminal — i.e. the request is now in a terminal state or headed
    /// there via a path that's already running.
    pub fn cancel(&self, req: &Request, pending_hint: bool) -> bool {
        cancel::cancel(&self.shared, &req.inner, pending_hint)
    }

    /// Submit a barrier request and wait for it (and everything submitted
    /// before it) to complete, up to `timeout`.
    pub async fn flush(&self, timeout: Duration) -> Result<(), FlushError> {
        struct FlushOps {
            tx: SyncMutex<Option<oneshot::Sender<Outcome>>>,
        }
        impl RequestOps for FlushOps {
            fn complete(&self, outcome: Outcome) {
                if let Some(tx) = self.tx.lock().take() {
                    let _ = tx.send(outcome);
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        let ops = Arc::new(FlushOps { tx: SyncMutex::new(Some(tx)) });
        // Flush's own packet is unsequenced (it's not expecting a reply;
        // the packet layer's own flush semantics provide the barrier).
        let payload = Bytes::from_static(&[0, 0]);
        let flush_req = Request::new_flush(payload, ops);

        if let Err(e) = self.submit(&flush_req) {
            return Err(match e {
                SubmitError::ShuttingDown => FlushError::ShuttingDown,
                _ => FlushError::ShuttingDown,
            });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Outcome::Success)) | Ok(Ok(Outcome::Response(_))) => Ok(()),
            Ok(Ok(Outcome::Error(CompletionError::ShuttingDown))) => Err(FlushError::ShuttingDown),
            Ok(Ok(Outcome::Error(_))) => Err(FlushError::Interrupted),
            Ok(Err(_)) => Err(FlushError::Interrupted),
            Err(_) => {
                // Timed out: cancel and wait for the (now guaranteed) completion.
                self.cancel(&flush_req, true);
                Err(FlushError::TimedOut)
            }
        }
    }

    /// Drain every set and complete all remaining requests with a shutdown
    /// error. Idempotent-ish in effect (a second call finds empty sets) but
    /// not safe to call concurrently with itself.
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);

        let claimed = self.shared.queue.drain_locked();

        let tasks = self.shared.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.transmitter.abort();
            self.shared.ptl.shutdown();
            tasks.reaper.abort();
            tasks.frames.abort();
        }

        let mut stragglers = self.shared.pending.drain_locked();
        let mut all = claimed;
        all.append(&mut stragglers);

        for r in all {
            if !r.test_and_set(crate::flags::RequestState::COMPLETED) {
                r.ops.complete(Outcome::Error(CompletionError::ShuttingDown));
            }
        }
    }

    /// Release resources owned by the packet layer. Must only be called
    /// after `shutdown`.
    pub fn destroy(&self) {
        self.shared.ptl.destroy();
    }

    /// Test hook: drop the next command response the dispatcher would
    /// otherwise match to a pending request, exactly as if the peer's
    /// reply had been lost in transit. The request is left pending and
    /// will eventually time out.
    #[cfg(feature = "fault-injection")]
    pub fn set_drop_next_response(&self, drop: bool) {
        self.shared.drop_next_response.store(drop, Ordering::Release);
    }
}
