//! Unit tests for `ConnectionHub`.
//!
//! These tests exercise the session rendezvous directly, without performing
//! any HTTP upgrades. They verify open/attach pairing in both orders, live
//! delivery, buffering after a listener goes away, and shutdown.

use std::time::Duration;

use shellgate_api::ws::{ConnectionHub, HubError, HubEvent};
use shellgate_api::ws::hub::SessionSink;
use shellgate_core::config::RendezvousConfig;
use shellgate_core::execution::{OutputLine, OutputSink};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn hub(attach_timeout_ms: u64) -> ConnectionHub {
    ConnectionHub::new(RendezvousConfig {
        attach_timeout: Duration::from_millis(attach_timeout_ms),
        poll_interval: Duration::from_millis(5),
    })
}

fn line(text: &str) -> OutputLine {
    OutputLine::now(text, false)
}

// ---------------------------------------------------------------------------
// Test: open registers a session, dropping the handle removes it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_and_drop_track_session_count() {
    let hub = hub(100);
    assert_eq!(hub.session_count(), 0);

    let handle = hub.open(Uuid::new_v4()).unwrap();
    assert_eq!(hub.session_count(), 1);

    drop(handle);
    assert_eq!(hub.session_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: an id can only be opened once at a time
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_twice_is_rejected() {
    let hub = hub(100);
    let id = Uuid::new_v4();

    let handle = hub.open(id).unwrap();
    assert_eq!(hub.open(id).err(), Some(HubError::SessionInUse));

    // A finished session's id is not handed out again.
    drop(handle);
    assert_eq!(hub.open(id).err(), Some(HubError::SessionSpent));
    assert_eq!(hub.session_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: attach to a registered session receives pushed events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attached_listener_receives_events_in_order() {
    let hub = hub(100);
    let id = Uuid::new_v4();

    let handle = hub.open(id).unwrap();
    let mut attachment = hub.attach(id).await.unwrap();
    assert_eq!(attachment.session_id(), id);
    assert!(handle.is_attached());

    handle.push(HubEvent::Script("echo hi".into())).unwrap();
    handle.push(HubEvent::Output(line("hi"))).unwrap();
    drop(handle);

    assert_eq!(
        attachment.recv().await,
        Some(HubEvent::Script("echo hi".into()))
    );
    match attachment.recv().await {
        Some(HubEvent::Output(received)) => assert_eq!(received.text, "hi"),
        other => panic!("expected output event, got {other:?}"),
    }
    // Completed session ends the stream.
    assert_eq!(attachment.recv().await, None);
}

// ---------------------------------------------------------------------------
// Test: the listener may arrive before the invocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attach_waits_for_late_open() {
    let hub = std::sync::Arc::new(hub(1000));
    let id = Uuid::new_v4();

    let listener = {
        let hub = std::sync::Arc::clone(&hub);
        tokio::spawn(async move { hub.attach(id).await.map(|_| ()) })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let handle = hub.open(id).unwrap();

    let attached = tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .unwrap()
        .unwrap();
    assert!(attached.is_ok());
    drop(handle);
}

// ---------------------------------------------------------------------------
// Test: attach to an unknown id gives up after the window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attach_unknown_session_times_out() {
    let hub = hub(50);

    let result = hub.attach(Uuid::new_v4()).await;
    assert_eq!(result.err(), Some(HubError::NotFound));
}

// ---------------------------------------------------------------------------
// Test: a second listener is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_listener_is_rejected() {
    let hub = hub(100);
    let id = Uuid::new_v4();

    let _handle = hub.open(id).unwrap();
    let _first = hub.attach(id).await.unwrap();

    assert_eq!(hub.attach(id).await.err(), Some(HubError::AlreadyAttached));
}

// ---------------------------------------------------------------------------
// Test: wait_for_attach reports whether a listener arrived
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wait_for_attach_times_out_without_listener() {
    let hub = hub(50);
    let handle = hub.open(Uuid::new_v4()).unwrap();

    assert!(!handle.wait_for_attach(&CancellationToken::new()).await);
}

#[tokio::test]
async fn wait_for_attach_returns_once_listener_attaches() {
    let hub = std::sync::Arc::new(hub(2000));
    let id = Uuid::new_v4();
    let handle = hub.open(id).unwrap();

    let listener = {
        let hub = std::sync::Arc::clone(&hub);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            hub.attach(id).await
        })
    };

    let attached = tokio::time::timeout(
        Duration::from_secs(1),
        handle.wait_for_attach(&CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(attached);

    // The attachment is still held by the finished task.
    let attachment = listener.await.unwrap().unwrap();
    assert_eq!(attachment.session_id(), id);
    assert!(handle.is_attached());
}

#[tokio::test]
async fn wait_for_attach_stops_when_listener_already_left() {
    let hub = hub(10_000);
    let id = Uuid::new_v4();
    let handle = hub.open(id).unwrap();

    drop(hub.attach(id).await.unwrap());

    let attached = tokio::time::timeout(
        Duration::from_secs(1),
        handle.wait_for_attach(&CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(!attached);
}

// ---------------------------------------------------------------------------
// Test: a listener arriving after the window is turned away
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_listener_is_rejected_and_output_stays_buffered() {
    let hub = hub(30);
    let id = Uuid::new_v4();
    let handle = hub.open(id).unwrap();

    assert!(!handle.wait_for_attach(&CancellationToken::new()).await);

    let mut sink = SessionSink::new(&handle);
    sink.push(line("first"));
    assert_eq!(hub.attach(id).await.err(), Some(HubError::NotFound));
    sink.push(line("second"));
    sink.push(line("third"));

    let buffered: Vec<String> = sink.into_buffered().into_iter().map(|l| l.text).collect();
    assert_eq!(buffered, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn cancelled_wait_closes_session_to_listeners() {
    let hub = hub(10_000);
    let id = Uuid::new_v4();
    let handle = hub.open(id).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(!handle.wait_for_attach(&cancel).await);
    assert_eq!(hub.attach(id).await.err(), Some(HubError::NotFound));
}

#[tokio::test]
async fn wait_for_attach_stops_on_cancel() {
    let hub = hub(10_000);
    let handle = hub.open(Uuid::new_v4()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let attached = tokio::time::timeout(Duration::from_secs(1), handle.wait_for_attach(&cancel))
        .await
        .unwrap();
    assert!(!attached);
}

// ---------------------------------------------------------------------------
// Test: SessionSink buffers once nobody is listening
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_sink_buffers_after_listener_leaves() {
    let hub = hub(100);
    let id = Uuid::new_v4();
    let handle = hub.open(id).unwrap();
    let mut attachment = hub.attach(id).await.unwrap();

    let mut sink = SessionSink::new(&handle);
    sink.push(line("live"));
    drop(attachment.recv().await);
    drop(attachment);
    sink.push(line("after"));
    sink.push(line("disconnect"));

    let buffered: Vec<String> = sink.into_buffered().into_iter().map(|l| l.text).collect();
    assert_eq!(buffered, vec!["after", "disconnect"]);
    assert!(!handle.is_attached());
}

#[tokio::test]
async fn session_sink_buffers_everything_without_listener() {
    let hub = hub(100);
    let handle = hub.open(Uuid::new_v4()).unwrap();

    let mut sink = SessionSink::new(&handle);
    sink.push(line("one"));
    sink.push(line("two"));

    assert_eq!(sink.into_buffered().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() ends every listener stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_detaches_listeners() {
    let hub = hub(100);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let handle_a = hub.open(a).unwrap();
    let handle_b = hub.open(b).unwrap();
    let mut listener_a = hub.attach(a).await.unwrap();
    let mut listener_b = hub.attach(b).await.unwrap();

    hub.shutdown_all();

    assert_eq!(listener_a.recv().await, None);
    assert_eq!(listener_b.recv().await, None);
    assert!(!handle_a.is_attached());
    assert!(handle_b.push(HubEvent::Output(line("late"))).is_err());
    // Sessions stay registered until their invocations complete.
    assert_eq!(hub.session_count(), 2);
}
