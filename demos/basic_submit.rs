//! End-to-end walk through the public API against the in-memory mock
//! packet layer: submit a request, observe its completion, flush, and
//! shut down cleanly.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use samrtl::mock::MockPacketLayer;
use samrtl::{CommandFrame, EventHandler, Outcome, Request, RequestFlags, RequestOps, Rtl, RtlConfig};
use tokio::sync::oneshot;

struct NoopEvents;
impl EventHandler for NoopEvents {
    fn handle_event(&self, _rtl: &Rtl, event: CommandFrame, _payload: Bytes) {
        tracing::info!(rqid = %event.rqid, "unsolicited event");
    }
}

struct OneshotOps(std::sync::Mutex<Option<oneshot::Sender<Outcome>>>);
impl RequestOps for OneshotOps {
    fn complete(&self, outcome: Outcome) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(outcome);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let (ptl, frames) = MockPacketLayer::new();
    let ptl = Arc::new(ptl);
    let rtl = Rtl::init(ptl.clone(), frames, Arc::new(NoopEvents), RtlConfig::default());
    rtl.start().expect("packet layer starts");

    let (tx, rx) = oneshot::channel();
    let ops = Arc::new(OneshotOps(std::sync::Mutex::new(Some(tx))));
    let payload = Bytes::from_static(&[0x42, 0x00]);
    let request = Request::new(payload, RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED, ops);

    rtl.submit(&request).expect("submit accepted");

    // Wait for the transmitter to hand the packet to the mock, then
    // acknowledge transmission and deliver a response.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let submitted = ptl.submitted().into_iter().next().expect("packet submitted");
    ptl.complete(submitted.id);
    ptl.deliver(Bytes::from_static(&[0x80, 0x42, 0x00, 0xDE, 0xAD]));

    match rx.await.expect("completion delivered") {
        Outcome::Response(response) => {
            println!("got response: {:?}", response.payload);
        }
        other => println!("unexpected outcome: {other:?}"),
    }

    rtl.flush(Duration::from_secs(1)).await.expect("flush succeeds");
    rtl.shutdown().await;
    rtl.destroy();
}
