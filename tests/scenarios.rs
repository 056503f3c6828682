//! Integration tests for the eight scenarios called out in the design
//! doc's testable-properties section, driven against the in-memory mock
//! packet layer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use samrtl::mock::MockPacketLayer;
use samrtl::{
    CommandFrame, CompletionError, EventHandler, Outcome, Request, RequestFlags, RequestOps, Rtl,
    RtlConfig, SubmitError,
};
use tokio::sync::oneshot;

struct RecordingEvents {
    events: Mutex<Vec<CommandFrame>>,
}
impl RecordingEvents {
    fn new() -> Arc<Self> {
        Arc::new(Self { events: Mutex::new(Vec::new()) })
    }
}
impl EventHandler for RecordingEvents {
    fn handle_event(&self, _rtl: &Rtl, event: CommandFrame, _payload: Bytes) {
        self.events.lock().unwrap().push(event);
    }
}

struct OneshotOps(Mutex<Option<oneshot::Sender<Outcome>>>);
impl OneshotOps {
    fn pair() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Self(Mutex::new(Some(tx)))), rx)
    }
}
impl RequestOps for OneshotOps {
    fn complete(&self, outcome: Outcome) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(outcome);
        }
    }
}

fn rtl_with_mock(config: RtlConfig) -> (Rtl, Arc<MockPacketLayer>, Arc<RecordingEvents>) {
    let (ptl, frames) = MockPacketLayer::new();
    let ptl = Arc::new(ptl);
    let events = RecordingEvents::new();
    let rtl = Rtl::init(ptl.clone(), frames, events.clone(), config);
    rtl.start().unwrap();
    (rtl, ptl, events)
}

fn payload_for(rqid: u16) -> Bytes {
    Bytes::copy_from_slice(&rqid.to_le_bytes())
}

async fn wait_for<F: Fn() -> bool>(pred: F) {
    for _ in 0..200 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn s1_happy_path() {
    let (rtl, ptl, _events) = rtl_with_mock(RtlConfig::default());
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(
        payload_for(0x0042),
        RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
        ops,
    );
    rtl.submit(&req).unwrap();

    wait_for(|| !ptl.submitted().is_empty()).await;
    let packet = ptl.submitted().into_iter().next().unwrap();
    ptl.complete(packet.id);

    let mut frame = vec![0x80u8, 0x42, 0x00];
    frame.extend_from_slice(&[0xDE, 0xAD]);
    ptl.deliver(Bytes::from(frame));

    match rx.await.unwrap() {
        Outcome::Response(resp) => assert_eq!(&resp.payload[..], &[0xDE, 0xAD]),
        other => panic!("expected Response, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_fire_and_forget() {
    let (rtl, ptl, _events) = rtl_with_mock(RtlConfig::default());
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(payload_for(0x0100), RequestFlags::SEQUENCED, ops);
    rtl.submit(&req).unwrap();

    wait_for(|| !ptl.submitted().is_empty()).await;
    let packet = ptl.submitted().into_iter().next().unwrap();
    ptl.complete(packet.id);

    match rx.await.unwrap() {
        Outcome::Success => {}
        other => panic!("expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_timeout() {
    let config = RtlConfig {
        request_timeout: Duration::from_millis(100),
        timeout_resolution: Duration::from_millis(10),
        ..RtlConfig::default()
    };
    let (rtl, ptl, _events) = rtl_with_mock(config);
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(
        payload_for(0x0200),
        RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
        ops,
    );
    rtl.submit(&req).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let packet = ptl.submitted().into_iter().next().unwrap();
    ptl.complete(packet.id);

    tokio::time::sleep(Duration::from_millis(200)).await;

    match rx.await.unwrap() {
        Outcome::Error(CompletionError::TimedOut) => {}
        other => panic!("expected TimedOut, got {other:?}"),
    }
}

#[tokio::test]
async fn s4_cancel_while_queued() {
    let config = RtlConfig { max_pending: 0, ..RtlConfig::default() };
    let (rtl, ptl, _events) = rtl_with_mock(config);
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(
        payload_for(0x0300),
        RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
        ops,
    );
    rtl.submit(&req).unwrap();

    // max_pending == 0 keeps the transmitter from ever admitting it.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ptl.submitted().is_empty());

    assert!(rtl.cancel(&req, false));

    match rx.await.unwrap() {
        Outcome::Error(CompletionError::Canceled) => {}
        other => panic!("expected Canceled, got {other:?}"),
    }
    assert!(ptl.submitted().is_empty());
}

#[tokio::test]
async fn s5_window_cap() {
    let (rtl, ptl, _events) = rtl_with_mock(RtlConfig::default());
    let mut receivers = Vec::new();
    let mut requests = Vec::new();
    for rqid in [0x0010u16, 0x0011, 0x0012, 0x0013] {
        let (ops, rx) = OneshotOps::pair();
        let req = Request::new(
            payload_for(rqid),
            RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
            ops,
        );
        rtl.submit(&req).unwrap();
        requests.push(req);
        receivers.push(rx);
    }

    wait_for(|| ptl.submitted().len() >= 3).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ptl.submitted().len(), 3, "window must not exceed MAX_PENDING");

    // Free a slot; the fourth request should now be admitted.
    let first = ptl.submitted().into_iter().next().unwrap();
    ptl.complete(first.id);
    let mut frame = vec![0x80u8];
    frame.extend_from_slice(&0x0010u16.to_le_bytes());
    ptl.deliver(Bytes::from(frame));

    wait_for(|| ptl.submitted().len() >= 4).await;
}

#[tokio::test]
async fn s6_event_demux() {
    let (_rtl, ptl, events) = rtl_with_mock(RtlConfig::default());
    let mut frame = vec![0x80u8, 0x05, 0x00];
    frame.extend_from_slice(&[0x01]);
    ptl.deliver(Bytes::from(frame));

    wait_for(|| !events.events.lock().unwrap().is_empty()).await;
    let seen = events.events.lock().unwrap();
    assert_eq!(seen[0].rqid.0, 0x0005);
}

#[tokio::test]
async fn s7_shutdown_drains() {
    let (rtl, ptl, _events) = rtl_with_mock(RtlConfig::default());
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(
        payload_for(0x0400),
        RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
        ops,
    );
    rtl.submit(&req).unwrap();
    wait_for(|| !ptl.submitted().is_empty()).await;

    rtl.shutdown().await;

    match rx.await.unwrap() {
        Outcome::Error(CompletionError::ShuttingDown) => {}
        other => panic!("expected ShuttingDown, got {other:?}"),
    }

    let (ops2, _rx2) = OneshotOps::pair();
    let req2 = Request::new(payload_for(0x0401), RequestFlags::empty(), ops2);
    assert_eq!(rtl.submit(&req2), Err(SubmitError::ShuttingDown));
}

#[tokio::test]
async fn s8_response_before_ack() {
    let (rtl, ptl, _events) = rtl_with_mock(RtlConfig::default());
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(
        payload_for(0x0500),
        RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
        ops,
    );
    rtl.submit(&req).unwrap();
    wait_for(|| !ptl.submitted().is_empty()).await;

    let mut frame = vec![0x80u8, 0x00, 0x05];
    frame.extend_from_slice(&[0x01, 0x02]);
    ptl.deliver(Bytes::from(frame));

    match rx.await.unwrap() {
        Outcome::Error(CompletionError::RemoteIo) => {}
        other => panic!("expected RemoteIo, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let config = RtlConfig { max_pending: 0, ..RtlConfig::default() };
    let (rtl, _ptl, _events) = rtl_with_mock(config);
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(payload_for(0x0600), RequestFlags::empty(), ops);
    rtl.submit(&req).unwrap();

    assert!(rtl.cancel(&req, false));
    assert!(rtl.cancel(&req, false));
    assert!(rtl.cancel(&req, true));

    rx.await.unwrap();
}

#[tokio::test]
async fn submit_requires_sequenced_for_response() {
    let (rtl, _ptl, _events) = rtl_with_mock(RtlConfig::default());
    let (ops, _rx) = OneshotOps::pair();
    let req = Request::new(payload_for(0x0700), RequestFlags::HAS_RESPONSE, ops);
    assert!(matches!(rtl.submit(&req), Err(SubmitError::Invalid(_))));
}

#[tokio::test]
async fn flush_waits_for_drain() {
    let (rtl, ptl, _events) = rtl_with_mock(RtlConfig::default());
    let (ops, rx) = OneshotOps::pair();
    let req = Request::new(
        payload_for(0x0800),
        RequestFlags::HAS_RESPONSE | RequestFlags::SEQUENCED,
        ops,
    );
    rtl.submit(&req).unwrap();
    wait_for(|| !ptl.submitted().is_empty()).await;
    let packet = ptl.submitted().into_iter().next().unwrap();
    ptl.complete(packet.id);
    let mut frame = vec![0x80u8, 0x00, 0x08];
    frame.extend_from_slice(&[0xAA]);
    ptl.deliver(Bytes::from(frame));
    rx.await.unwrap();

    let flush_rtl = rtl.clone();
    let flush_task = tokio::spawn(async move { flush_rtl.flush(Duration::from_secs(1)).await });

    wait_for(|| ptl.submitted().len() >= 2).await;
    let flush_packet = ptl.submitted().into_iter().nth(1).unwrap();
    ptl.complete(flush_packet.id);

    flush_task.await.unwrap().unwrap();
}
