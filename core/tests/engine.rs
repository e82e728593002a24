//! Session engine tests over a scripted in-memory transport

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, Method, StatusCode};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};

use webpush_core::prelude::*;

/// One scripted request stream: the events to replay and whether the
/// stream stays open afterwards (a live long-poll) or ends.
struct ScriptedStream {
    events: Vec<Result<StreamEvent, WebPushError>>,
    hold_open: bool,
}

#[derive(Default)]
struct MockTransport {
    scripts: Mutex<VecDeque<ScriptedStream>>,
    opened: Mutex<Vec<(Method, String, Vec<(HeaderName, String)>)>>,
    sent: Mutex<Vec<(Method, String)>>,
    held: Mutex<Vec<mpsc::Sender<Result<StreamEvent, WebPushError>>>>,
}

impl MockTransport {
    fn new(scripts: Vec<ScriptedStream>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    async fn sent_requests(&self) -> Vec<(Method, String)> {
        self.sent.lock().await.clone()
    }

    async fn opened_count(&self) -> usize {
        self.opened.lock().await.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_stream(
        &self,
        method: Method,
        path: &str,
        headers: Vec<(HeaderName, String)>,
    ) -> Result<RequestStream, WebPushError> {
        self.opened
            .lock()
            .await
            .push((method, path.to_string(), headers));

        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| WebPushError::Transport("no scripted stream left".into()))?;

        let (tx, rx) = mpsc::channel(64);
        for event in script.events {
            tx.send(event).await.expect("scripted event fits channel");
        }
        if script.hold_open {
            self.held.lock().await.push(tx);
        }

        let (cancel, _cancel_rx) = StreamCancel::new();
        Ok(RequestStream { events: rx, cancel })
    }

    async fn send(&self, method: Method, path: &str) -> Result<(), WebPushError> {
        self.sent.lock().await.push((method, path.to_string()));
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn disconnect(&self) -> Result<(), WebPushError> {
        Ok(())
    }
}

fn subscribe_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("location", "/subscription/s1".parse().unwrap());
    headers.append(
        "link",
        "</push/p1>; rel=\"urn:ietf:params:push\"".parse().unwrap(),
    );
    headers.append(
        "link",
        "</receipts/r1>; rel=\"urn:ietf:params:push:receipt\""
            .parse()
            .unwrap(),
    );
    headers.insert("cache-control", "private, max-age=120".parse().unwrap());
    headers.insert("date", "Tue, 01 Jul 2025 10:00:00 GMT".parse().unwrap());
    headers
}

fn metadata(status: StatusCode, headers: HeaderMap) -> Result<StreamEvent, WebPushError> {
    Ok(StreamEvent::Metadata { status, headers })
}

fn announcement(resource: &str) -> Result<StreamEvent, WebPushError> {
    Ok(StreamEvent::Announcement {
        resource: resource.to_string(),
    })
}

fn data(chunk: &str, end_of_stream: bool) -> Result<StreamEvent, WebPushError> {
    Ok(StreamEvent::Data {
        chunk: Bytes::copy_from_slice(chunk.as_bytes()),
        end_of_stream,
    })
}

fn subscription(resource: &str) -> Subscription {
    Subscription::new(SubscriptionParams {
        subscription_resource: Some(resource.to_string()),
        push_resource: Some("/push/p1".to_string()),
        receipt_subscribe_resource: Some("/receipts/r1".to_string()),
        ..Default::default()
    })
    .unwrap()
}

type SubscribeResults = mpsc::UnboundedReceiver<Result<Subscription, WebPushError>>;

fn subscribe_callback() -> (SubscriptionCallback, SubscribeResults) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: SubscriptionCallback = Arc::new(move |result| {
        let tx = tx.clone();
        Box::pin(async move {
            tx.send(result)
                .map_err(|_| WebPushError::Callback("result receiver dropped".into()))?;
            Ok(())
        })
    });
    (callback, rx)
}

type MonitorResults = mpsc::UnboundedReceiver<Result<Option<PushMessage>, WebPushError>>;

fn monitor_callback() -> (MessageCallback, MonitorResults) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: MessageCallback = Arc::new(move |result| {
        let tx = tx.clone();
        Box::pin(async move {
            tx.send(result)
                .map_err(|_| WebPushError::Callback("result receiver dropped".into()))?;
            Ok(())
        })
    });
    (callback, rx)
}

async fn next<T>(results: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("timed out waiting for callback")
}

async fn wait_until_unmonitored<T: Transport + 'static>(engine: &SessionEngine<T>) {
    timeout(Duration::from_secs(5), async {
        while engine.monitored_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor registration was not removed");
}

#[tokio::test]
async fn test_subscribe_builds_subscription_from_response_headers() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![metadata(StatusCode::CREATED, subscribe_headers())],
        hold_open: false,
    }]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());

    let (callback, mut results) = subscribe_callback();
    engine.subscribe(callback);

    let subscription = next(&mut results).await.unwrap().unwrap();
    assert_eq!(subscription.subscription_resource(), "/subscription/s1");
    assert_eq!(subscription.push_resource(), "/push/p1");
    assert_eq!(subscription.receipt_subscribe_resource(), "/receipts/r1");
    assert_eq!(subscription.expires_at(), Some(120));
    assert!(subscription.created_at().is_some());

    let opened = transport.opened.lock().await;
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, Method::POST);
    assert_eq!(opened[0].1, "/subscribe");
}

#[tokio::test]
async fn test_subscribe_missing_link_is_validation_error() {
    let mut headers = HeaderMap::new();
    headers.insert("location", "/subscription/s1".parse().unwrap());
    headers.append(
        "link",
        "</push/p1>; rel=\"urn:ietf:params:push\"".parse().unwrap(),
    );
    // Receipt subscribe link missing.
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![metadata(StatusCode::CREATED, headers)],
        hold_open: false,
    }]);
    let engine = SessionEngine::new(transport, SessionConfig::default());

    let (callback, mut results) = subscribe_callback();
    engine.subscribe(callback);

    let err = next(&mut results).await.unwrap().unwrap_err();
    assert!(matches!(err, WebPushError::Validation(_)));
}

#[tokio::test]
async fn test_subscribe_error_status_is_protocol_violation() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![metadata(StatusCode::BAD_REQUEST, HeaderMap::new())],
        hold_open: false,
    }]);
    let engine = SessionEngine::new(transport, SessionConfig::default());

    let (callback, mut results) = subscribe_callback();
    engine.subscribe(callback);

    let err = next(&mut results).await.unwrap().unwrap_err();
    assert!(matches!(err, WebPushError::Protocol(_)));
}

#[tokio::test]
async fn test_monitor_delivers_message_and_acknowledges_first() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![
            announcement("/msg/1"),
            metadata(StatusCode::OK, HeaderMap::new()),
            data("A", false),
            data("B", true),
        ],
        hold_open: true,
    }]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    // The callback observes the acknowledge request before it runs.
    let ack_seen_before_callback = Arc::new(AtomicBool::new(false));
    let (tx, mut results) = mpsc::unbounded_channel();
    let callback_transport = Arc::clone(&transport);
    let ack_flag = Arc::clone(&ack_seen_before_callback);
    let callback: MessageCallback = Arc::new(move |result| {
        let tx = tx.clone();
        let transport = Arc::clone(&callback_transport);
        let ack_flag = Arc::clone(&ack_flag);
        Box::pin(async move {
            let acked = transport
                .sent_requests()
                .await
                .contains(&(Method::DELETE, "/msg/1".to_string()));
            ack_flag.store(acked, Ordering::SeqCst);
            tx.send(result)
                .map_err(|_| WebPushError::Callback("result receiver dropped".into()))?;
            Ok(())
        })
    });

    assert!(engine.monitor(sub.clone(), MonitorMode::Blocking, callback).await);

    let message = next(&mut results).await.unwrap().unwrap().unwrap();
    assert_eq!(message.resource(), "/msg/1");
    assert_eq!(message.data(), "AB");
    assert!(ack_seen_before_callback.load(Ordering::SeqCst));

    let opened = transport.opened.lock().await;
    assert_eq!(opened[0].0, Method::GET);
    assert_eq!(opened[0].1, "/subscription/s1");
    assert!(opened[0].2.is_empty(), "blocking monitor sends no prefer header");
}

#[tokio::test]
async fn test_non_blocking_monitor_no_content() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![metadata(StatusCode::NO_CONTENT, HeaderMap::new())],
        hold_open: false,
    }]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (callback, mut results) = monitor_callback();
    assert!(
        engine
            .monitor(sub.clone(), MonitorMode::NonBlocking, callback)
            .await
    );

    // Absent result exactly once, then the stream is done.
    let outcome = next(&mut results).await.unwrap().unwrap();
    assert!(outcome.is_none());
    assert!(next(&mut results).await.is_none());

    // No acknowledge request was issued.
    assert!(transport.sent_requests().await.is_empty());
    wait_until_unmonitored(&engine).await;

    let opened = transport.opened.lock().await;
    assert_eq!(
        opened[0].2,
        vec![(HeaderName::from_static("prefer"), "wait=0".to_string())]
    );
}

#[tokio::test]
async fn test_remonitor_from_no_content_callback_registers_again() {
    // "Poll now, then long-poll": the no-content callback immediately
    // starts a blocking monitor on the same subscription. The dying poll
    // must have released its registration before the callback runs.
    let transport = MockTransport::new(vec![
        ScriptedStream {
            events: vec![metadata(StatusCode::NO_CONTENT, HeaderMap::new())],
            hold_open: false,
        },
        ScriptedStream {
            events: vec![
                announcement("/msg/1"),
                metadata(StatusCode::OK, HeaderMap::new()),
                data("later", true),
            ],
            hold_open: true,
        },
    ]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (blocking_callback, mut blocking_results) = monitor_callback();
    let (registered_tx, mut registered_results) = mpsc::unbounded_channel();
    let poll_engine = engine.clone();
    let poll_sub = sub.clone();
    let poll_callback: MessageCallback = Arc::new(move |result| {
        let engine = poll_engine.clone();
        let sub = poll_sub.clone();
        let blocking = Arc::clone(&blocking_callback);
        let registered_tx = registered_tx.clone();
        Box::pin(async move {
            if result?.is_some() {
                return Ok(());
            }
            let registered = engine.monitor(sub, MonitorMode::Blocking, blocking).await;
            registered_tx
                .send(registered)
                .map_err(|_| WebPushError::Callback("result receiver dropped".into()))?;
            Ok(())
        })
    });

    assert!(
        engine
            .monitor(sub.clone(), MonitorMode::NonBlocking, poll_callback)
            .await
    );

    assert!(
        next(&mut registered_results).await.unwrap(),
        "monitor call from the no-content callback must register"
    );
    let message = next(&mut blocking_results).await.unwrap().unwrap().unwrap();
    assert_eq!(message.data(), "later");
    assert_eq!(engine.monitored_count().await, 1);
    assert_eq!(transport.opened_count().await, 2);
}

#[tokio::test]
async fn test_duplicate_monitor_is_noop_and_first_callback_wins() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![
            announcement("/msg/1"),
            metadata(StatusCode::OK, HeaderMap::new()),
            data("hello", true),
        ],
        hold_open: true,
    }]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (first, mut first_results) = monitor_callback();
    let (second, mut second_results) = monitor_callback();

    assert!(engine.monitor(sub.clone(), MonitorMode::Blocking, first).await);
    assert!(!engine.monitor(sub.clone(), MonitorMode::Blocking, second).await);

    let message = next(&mut first_results).await.unwrap().unwrap().unwrap();
    assert_eq!(message.data(), "hello");

    // The duplicate registration never opened a stream and never receives
    // a delivery.
    assert_eq!(transport.opened_count().await, 1);
    assert!(second_results.try_recv().is_err());
    assert_eq!(engine.monitored_count().await, 1);
}

#[tokio::test]
async fn test_cancel_monitoring_is_idempotent() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![],
        hold_open: true,
    }]);
    let engine = SessionEngine::new(transport, SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (callback, _results) = monitor_callback();
    assert!(engine.monitor(sub.clone(), MonitorMode::Blocking, callback).await);

    assert!(engine.cancel_monitoring(&sub).await);
    assert!(!engine.cancel_monitoring(&sub).await);
    assert_eq!(engine.monitored_count().await, 0);
}

#[tokio::test]
async fn test_cancel_monitoring_without_monitor_is_noop() {
    let transport = MockTransport::new(vec![]);
    let engine = SessionEngine::new(transport, SessionConfig::default());
    let sub = subscription("/subscription/s1");

    assert!(!engine.cancel_monitoring(&sub).await);
}

#[tokio::test]
async fn test_delete_subscription_cancels_monitor_then_deletes() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![],
        hold_open: true,
    }]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (callback, _results) = monitor_callback();
    assert!(engine.monitor(sub.clone(), MonitorMode::Blocking, callback).await);

    engine.delete_subscription(&sub).await.unwrap();

    assert_eq!(engine.monitored_count().await, 0);
    assert_eq!(
        transport.sent_requests().await,
        vec![(Method::DELETE, "/subscription/s1".to_string())]
    );
}

#[tokio::test]
async fn test_delete_subscription_without_monitor_still_deletes() {
    let transport = MockTransport::new(vec![]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    engine.delete_subscription(&sub).await.unwrap();

    assert_eq!(
        transport.sent_requests().await,
        vec![(Method::DELETE, "/subscription/s1".to_string())]
    );
}

#[tokio::test]
async fn test_data_before_announcement_surfaces_protocol_violation() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![data("stray", false)],
        hold_open: true,
    }]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (callback, mut results) = monitor_callback();
    assert!(engine.monitor(sub.clone(), MonitorMode::Blocking, callback).await);

    let err = next(&mut results).await.unwrap().unwrap_err();
    assert!(matches!(err, WebPushError::Protocol(_)));

    // The failed stream is closed and its registration removed.
    wait_until_unmonitored(&engine).await;
    assert!(transport.sent_requests().await.is_empty());
}

#[tokio::test]
async fn test_monitor_resumes_after_stream_ends() {
    // First stream delivers one message and ends; a second monitor call
    // for the same subscription must be able to register again.
    let transport = MockTransport::new(vec![
        ScriptedStream {
            events: vec![
                announcement("/msg/1"),
                metadata(StatusCode::OK, HeaderMap::new()),
                data("one", true),
            ],
            hold_open: false,
        },
        ScriptedStream {
            events: vec![
                announcement("/msg/2"),
                metadata(StatusCode::OK, HeaderMap::new()),
                data("two", true),
            ],
            hold_open: true,
        },
    ]);
    let engine = SessionEngine::new(Arc::clone(&transport), SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (callback, mut results) = monitor_callback();
    assert!(
        engine
            .monitor(sub.clone(), MonitorMode::Blocking, callback)
            .await
    );
    let first = next(&mut results).await.unwrap().unwrap().unwrap();
    assert_eq!(first.data(), "one");
    wait_until_unmonitored(&engine).await;

    let (callback, mut results) = monitor_callback();
    assert!(
        engine
            .monitor(sub.clone(), MonitorMode::Blocking, callback)
            .await
    );
    let second = next(&mut results).await.unwrap().unwrap().unwrap();
    assert_eq!(second.data(), "two");
}

#[tokio::test]
async fn test_transport_error_on_stream_reaches_callback() {
    let transport = MockTransport::new(vec![ScriptedStream {
        events: vec![Err(WebPushError::Transport("stream reset".into()))],
        hold_open: true,
    }]);
    let engine = SessionEngine::new(transport, SessionConfig::default());
    let sub = subscription("/subscription/s1");

    let (callback, mut results) = monitor_callback();
    assert!(engine.monitor(sub.clone(), MonitorMode::Blocking, callback).await);

    let err = next(&mut results).await.unwrap().unwrap_err();
    assert!(matches!(err, WebPushError::Transport(_)));
    wait_until_unmonitored(&engine).await;
}

#[tokio::test]
async fn test_disconnect_cancels_all_monitors() {
    let transport = MockTransport::new(vec![
        ScriptedStream {
            events: vec![],
            hold_open: true,
        },
        ScriptedStream {
            events: vec![],
            hold_open: true,
        },
    ]);
    let engine = SessionEngine::new(transport, SessionConfig::default());

    let (first, _r1) = monitor_callback();
    let (second, _r2) = monitor_callback();
    assert!(
        engine
            .monitor(subscription("/subscription/s1"), MonitorMode::Blocking, first)
            .await
    );
    assert!(
        engine
            .monitor(subscription("/subscription/s2"), MonitorMode::Blocking, second)
            .await
    );
    assert_eq!(engine.monitored_count().await, 2);

    engine.disconnect().await.unwrap();
    assert_eq!(engine.monitored_count().await, 0);
}
