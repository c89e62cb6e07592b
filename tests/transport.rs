//! Transport retry machine, driven through the in-memory connector.

use std::time::Duration;

use runner_bridge::transport::memory::MemoryConnector;
use runner_bridge::transport::{
    ConnectionState, Frame, RetryPolicy, Transport, TransportError, TransportEvent,
};

const ENDPOINT: &str = "ws://runner.test:5678";

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(500))
}

#[tokio::test(start_paused = true)]
async fn test_retry_bound_is_exact() {
    let (connector, _accepted) = MemoryConnector::new();
    connector.refuse_all(true);
    let transport = Transport::new(ENDPOINT, policy(4), connector.clone()).unwrap();

    let started = tokio::time::Instant::now();
    let err = transport.connect().await.unwrap_err();

    assert!(matches!(err, TransportError::ReconnectFailed { attempts: 4, .. }));
    assert_eq!(connector.attempts(), 4);
    // Three waits between four attempts.
    assert_eq!(started.elapsed(), Duration::from_millis(1500));
    assert_eq!(transport.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_first_connect_only_returns_error() {
    let (connector, _accepted) = MemoryConnector::new();
    connector.refuse_all(true);
    let transport = Transport::new(ENDPOINT, policy(2), connector.clone()).unwrap();
    let mut events = transport.subscribe();

    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, TransportError::ReconnectFailed { attempts: 2, .. }));
    assert!(events.try_recv().is_err());

    // The next successful connect starts from a clean event stream.
    connector.refuse_all(false);
    transport.connect().await.unwrap();
    assert!(transport.is_open());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_after_failures() {
    let (connector, mut accepted) = MemoryConnector::new();
    connector.fail_next(2);
    let transport = Transport::new(ENDPOINT, policy(3), connector.clone()).unwrap();

    transport.connect().await.unwrap();
    assert_eq!(connector.attempts(), 3);
    assert!(transport.is_open());
    assert!(accepted.recv().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_frames_flow_both_ways() {
    let (connector, mut accepted) = MemoryConnector::new();
    let transport = Transport::new(ENDPOINT, policy(1), connector).unwrap();
    let mut events = transport.subscribe();
    transport.connect().await.unwrap();
    let mut remote = accepted.recv().await.unwrap();

    assert!(transport.send_text("/rnbo/inst"));
    assert!(transport.send(vec![1, 2, 3, 4]));
    assert_eq!(remote.recv().await, Some(Frame::Text("/rnbo/inst".into())));
    assert_eq!(remote.recv().await, Some(Frame::Binary(vec![1, 2, 3, 4])));

    remote.send_text("{}");
    remote.send_binary(vec![9]);
    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Message(Frame::Text("{}".into())))
    );
    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Message(Frame::Binary(vec![9])))
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_triggers_reconnect_with_fresh_counter() {
    let (connector, mut accepted) = MemoryConnector::new();
    let transport = Transport::new(ENDPOINT, policy(3), connector.clone()).unwrap();
    let mut events = transport.subscribe();
    transport.connect().await.unwrap();
    let remote = accepted.recv().await.unwrap();

    // Two failures fit inside a fresh cycle of three.
    connector.fail_next(2);
    drop(remote);

    assert_eq!(events.recv().await, Some(TransportEvent::Reconnecting));
    assert_eq!(events.recv().await, Some(TransportEvent::Reconnect));
    assert_eq!(connector.attempts(), 4);
    assert!(transport.is_open());

    let mut remote = accepted.recv().await.unwrap();
    assert!(transport.send_text("/rnbo"));
    assert_eq!(remote.recv().await, Some(Frame::Text("/rnbo".into())));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnect_reports_failure() {
    let (connector, mut accepted) = MemoryConnector::new();
    let transport = Transport::new(ENDPOINT, policy(2), connector.clone()).unwrap();
    let mut events = transport.subscribe();
    transport.connect().await.unwrap();
    let remote = accepted.recv().await.unwrap();

    connector.refuse_all(true);
    drop(remote);

    assert_eq!(events.recv().await, Some(TransportEvent::Reconnecting));
    assert!(matches!(
        events.recv().await,
        Some(TransportEvent::ReconnectFailed(_))
    ));
    assert_eq!(connector.attempts(), 3);
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert!(!transport.send(vec![0]));

    // A later connect starts over.
    connector.refuse_all(false);
    transport.connect().await.unwrap();
    assert!(transport.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_close_is_terminal() {
    let (connector, mut accepted) = MemoryConnector::new();
    let transport = Transport::new(ENDPOINT, policy(3), connector.clone()).unwrap();
    let mut events = transport.subscribe();
    transport.connect().await.unwrap();
    let mut remote = accepted.recv().await.unwrap();

    transport.close();
    assert_eq!(events.recv().await, Some(TransportEvent::Close));
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert!(!transport.send_text("/rnbo"));

    // The link is released and nothing reconnects.
    assert_eq!(remote.recv().await, None);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts(), 1);
    assert!(events.try_recv().is_err());
    assert_eq!(transport.connect().await, Err(TransportError::Closed));
}
