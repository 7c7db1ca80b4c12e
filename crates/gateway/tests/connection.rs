//! Connection lifecycle against an in-memory request producer

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;
use tokio::time::Instant;
use userstream_core::{LimitNotification, NotificationKind};
use userstream_gateway::{
    BackoffMode, ConnectionConfig, ConnectionEvent, ConnectionState, HandlerRegistry,
    ParserOptions, StreamFailure, StreamParser, UserStreamConnection,
};
use userstream_ports::{
    Credential, FixedClock, Identity, IdentityId, RequestProducer, StreamBody, StreamRequest,
    TransportError, TransportResult,
};

const STATUS_LINE: &str = r#"{"id_str":"1","text":"hi","created_at":"Wed Aug 27 13:08:45 +0000 2008","user":{"id_str":"9","screen_name":"alice"}}"#;

enum Step {
    Fail(TransportError),
    /// Send the lines, then close the stream
    Close(Vec<&'static str>),
    /// Send the lines and keep the stream open
    Hold(Vec<&'static str>),
}

#[derive(Default)]
struct ScriptedProducer {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<StreamRequest>>,
    remotes: Mutex<Vec<DuplexStream>>,
}

impl ScriptedProducer {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(ScriptedProducer {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    fn opened(&self) -> usize {
        self.requests.lock().len()
    }

    fn last_track(&self) -> Vec<String> {
        self.requests
            .lock()
            .last()
            .map(|request| request.track.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RequestProducer for ScriptedProducer {
    async fn open_stream(
        &self,
        _identity: &Identity,
        request: &StreamRequest,
    ) -> TransportResult<StreamBody> {
        self.requests.lock().push(request.clone());
        let step = self.steps.lock().pop_front().unwrap_or(Step::Hold(vec![]));

        let (lines, hold) = match step {
            Step::Fail(e) => return Err(e),
            Step::Close(lines) => (lines, false),
            Step::Hold(lines) => (lines, true),
        };

        let (mut remote, local) = tokio::io::duplex(64 * 1024);
        for line in lines {
            remote.write_all(line.as_bytes()).await.unwrap();
            remote.write_all(b"\n").await.unwrap();
        }
        if hold {
            self.remotes.lock().push(remote);
        }
        Ok(StreamBody::new(BufReader::new(local)))
    }
}

fn init_logging() {
    let _ = env_logger::try_init();
}

fn identity() -> Identity {
    Identity::new(IdentityId(1), "alice", Credential::new("token"))
}

fn connection(
    producer: Arc<ScriptedProducer>,
    registry: Arc<HandlerRegistry>,
) -> UserStreamConnection {
    let config = ConnectionConfig::default().with_event_capacity(1024);
    UserStreamConnection::new(identity(), producer, registry, config)
}

async fn next_event(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("no connection event")
        .expect("event channel closed")
}

/// Skip state changes, return the next backoff or failure
async fn next_outcome(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    loop {
        match next_event(rx).await {
            ConnectionEvent::StateChanged { .. } => continue,
            other => return other,
        }
    }
}

/// Collect backoff waits until the connection gives up
async fn run_to_failure(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
) -> (Vec<Duration>, StreamFailure) {
    let mut waits = Vec::new();
    loop {
        match next_outcome(rx).await {
            ConnectionEvent::BackoffScheduled { wait, .. } => waits.push(wait),
            ConnectionEvent::Failed(failure) => return (waits, failure),
            ConnectionEvent::StateChanged { .. } => unreachable!(),
        }
    }
}

async fn wait_for_state(rx: &mut broadcast::Receiver<ConnectionEvent>, wanted: ConnectionState) {
    loop {
        if let ConnectionEvent::StateChanged { state, .. } = next_event(rx).await {
            if state == wanted {
                return;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_keeps_one_session() {
    init_logging();
    let producer = ScriptedProducer::new(vec![]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();

    conn.connect().await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    conn.connect().await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    assert_eq!(producer.opened(), 2);
    assert_eq!(conn.active_sessions(), 1);
    assert!(conn.is_connected());

    conn.disconnect().await;
    assert_eq!(conn.active_sessions(), 0);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_reach_registry() {
    init_logging();
    let registry = Arc::new(HandlerRegistry::new());
    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    registry
        .register(NotificationKind::Any, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let producer = ScriptedProducer::new(vec![Step::Hold(vec![STATUS_LINE, "", "not json"])]);
    let conn = connection(producer.clone(), registry);
    conn.set_tracked_keywords(vec!["rust".to_string(), "tokio".to_string()]);
    conn.connect().await;

    for _ in 0..100 {
        if conn.stats().parse_errors == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(conn.stats().notifications, 1);
    assert_eq!(conn.stats().parse_errors, 1);
    assert_eq!(producer.requests.lock()[0].track_param().as_deref(), Some("rust,tokio"));

    conn.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_network_backoff_then_recovery() {
    init_logging();
    let producer = ScriptedProducer::new(vec![
        Step::Fail(TransportError::network("connection refused")),
        Step::Fail(TransportError::network("connection refused")),
        Step::Fail(TransportError::network("connection refused")),
    ]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    for expected in [250, 500, 750] {
        match next_outcome(&mut events).await {
            ConnectionEvent::BackoffScheduled { mode, wait, .. } => {
                assert_eq!(mode, BackoffMode::Network);
                assert_eq!(wait, Duration::from_millis(expected));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(producer.opened(), 4);
    assert_eq!(conn.stats().reconnects, 3);
    conn.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_request_is_terminal() {
    init_logging();
    let producer = ScriptedProducer::new(vec![Step::Fail(TransportError::http(413, "Too Long"))]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    conn.set_tracked_keywords(vec!["rust".to_string()]);
    let mut events = conn.subscribe();
    conn.connect().await;

    match next_outcome(&mut events).await {
        ConnectionEvent::Failed(StreamFailure::RequestRejected {
            identity,
            status,
            keywords,
        }) => {
            assert_eq!(identity, "@alice (1)");
            assert_eq!(status, 413);
            assert_eq!(keywords, vec!["rust"]);
        }
        other => panic!("unexpected event {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(producer.opened(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_hard_errors_give_up_after_three() {
    init_logging();
    let producer = ScriptedProducer::new(vec![
        Step::Fail(TransportError::http(401, "Unauthorized")),
        Step::Fail(TransportError::http(401, "Unauthorized")),
        Step::Fail(TransportError::http(420, "Enhance Your Calm")),
    ]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    let mut waits = Vec::new();
    let failure = loop {
        match next_outcome(&mut events).await {
            ConnectionEvent::BackoffScheduled { mode, wait, .. } => {
                assert_eq!(mode, BackoffMode::Protocol);
                waits.push(wait);
            }
            ConnectionEvent::Failed(failure) => break failure,
            ConnectionEvent::StateChanged { .. } => unreachable!(),
        }
    };

    assert_eq!(waits, vec![Duration::from_secs(5), Duration::from_secs(10)]);
    assert!(matches!(
        failure,
        StreamFailure::HardErrorLimit { status: 420, attempts: 3, .. }
    ));
    assert_eq!(producer.opened(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_notification_resets_hard_error_count() {
    init_logging();
    // Without the reset the graceful close would be the third hard error
    let producer = ScriptedProducer::new(vec![
        Step::Fail(TransportError::http(401, "Unauthorized")),
        Step::Fail(TransportError::http(401, "Unauthorized")),
        Step::Close(vec![STATUS_LINE]),
        Step::Fail(TransportError::http(401, "Unauthorized")),
        Step::Hold(vec![]),
    ]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    let mut outcomes = Vec::new();
    while outcomes.len() < 4 {
        match next_outcome(&mut events).await {
            ConnectionEvent::BackoffScheduled { mode, wait, .. } => outcomes.push((mode, wait)),
            ConnectionEvent::Failed(failure) => panic!("gave up: {}", failure),
            ConnectionEvent::StateChanged { .. } => unreachable!(),
        }
    }

    // Close reconnects immediately; the backoff sequence restarted
    assert_eq!(outcomes[2], (BackoffMode::None, Duration::ZERO));
    assert_eq!(outcomes[3], (BackoffMode::Protocol, Duration::from_secs(5)));

    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(producer.opened(), 5);
    assert_eq!(conn.hard_error_count(), 2);
    conn.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    init_logging();
    let producer =
        ScriptedProducer::new(vec![Step::Fail(TransportError::http(503, "Unavailable"))]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    assert!(matches!(
        next_outcome(&mut events).await,
        ConnectionEvent::BackoffScheduled { mode: BackoffMode::Protocol, .. }
    ));
    conn.disconnect().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(producer.opened(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_is_network_failure() {
    init_logging();
    let producer = ScriptedProducer::new(vec![Step::Hold(vec![])]);
    let config = ConnectionConfig::default()
        .with_read_timeout(Duration::from_secs(1))
        .with_event_capacity(1024);
    let conn = UserStreamConnection::new(
        identity(),
        producer.clone(),
        Arc::new(HandlerRegistry::new()),
        config,
    );
    let mut events = conn.subscribe();
    conn.connect().await;

    match next_outcome(&mut events).await {
        ConnectionEvent::BackoffScheduled { mode, wait, .. } => {
            assert_eq!(mode, BackoffMode::Network);
            assert_eq!(wait, Duration::from_millis(250));
        }
        other => panic!("unexpected event {:?}", other),
    }
    conn.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_protocol_backoff_gives_up_at_cap() {
    init_logging();
    let steps = (0..7)
        .map(|_| Step::Fail(TransportError::http(503, "Unavailable")))
        .collect();
    let producer = ScriptedProducer::new(steps);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    let (waits, failure) = run_to_failure(&mut events).await;

    let expected: Vec<Duration> = [5, 10, 20, 40, 80, 160]
        .into_iter()
        .map(Duration::from_secs)
        .collect();
    assert_eq!(waits, expected);
    assert_eq!(
        failure,
        StreamFailure::ProtocolBackoffExhausted {
            identity: "@alice (1)".to_string(),
            status: 503,
            wait: Duration::from_millis(320_000),
        }
    );
    assert_eq!(producer.opened(), 7);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_network_backoff_gives_up_at_cap() {
    init_logging();
    let steps = (0..64)
        .map(|_| Step::Fail(TransportError::network("connection reset")))
        .collect();
    let producer = ScriptedProducer::new(steps);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    let (waits, failure) = run_to_failure(&mut events).await;

    assert_eq!(waits.len(), 63);
    assert_eq!(waits.first(), Some(&Duration::from_millis(250)));
    assert_eq!(waits.last(), Some(&Duration::from_millis(15_750)));
    match failure {
        StreamFailure::NetworkBackoffExhausted { wait, reason, .. } => {
            assert_eq!(wait, Duration::from_millis(16_000));
            assert!(reason.contains("connection reset"));
        }
        other => panic!("unexpected failure {:?}", other),
    }
    assert_eq!(producer.opened(), 64);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_close_gives_up() {
    init_logging();
    let producer = ScriptedProducer::new(vec![
        Step::Close(vec![]),
        Step::Close(vec![]),
        Step::Close(vec![]),
    ]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    let (waits, failure) = run_to_failure(&mut events).await;

    assert_eq!(waits, vec![Duration::ZERO, Duration::ZERO]);
    assert!(matches!(failure, StreamFailure::ClosedTooOften { attempts: 3, .. }));
    assert_eq!(failure.status(), None);
    assert_eq!(producer.opened(), 3);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_unacceptable_and_range_statuses_are_terminal() {
    init_logging();
    for status in [406, 416] {
        let producer =
            ScriptedProducer::new(vec![Step::Fail(TransportError::http(status, "Rejected"))]);
        let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
        conn.set_tracked_keywords(vec!["rust".to_string()]);
        let mut events = conn.subscribe();
        conn.connect().await;

        let (waits, failure) = run_to_failure(&mut events).await;

        assert!(waits.is_empty());
        assert_eq!(failure.status(), Some(status));
        assert!(matches!(
            failure,
            StreamFailure::RequestRejected { ref keywords, .. } if keywords == &vec!["rust"]
        ));
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(producer.opened(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_keyword_change_waits_out_backoff() {
    init_logging();
    let producer =
        ScriptedProducer::new(vec![Step::Fail(TransportError::http(503, "Unavailable"))]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;

    match next_outcome(&mut events).await {
        ConnectionEvent::BackoffScheduled { mode, wait, .. } => {
            assert_eq!(mode, BackoffMode::Protocol);
            assert_eq!(wait, Duration::from_secs(5));
        }
        other => panic!("unexpected event {:?}", other),
    }
    let scheduled = Instant::now();

    conn.set_tracked_keywords(vec!["rust".to_string()]);
    conn.request_reconnect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(producer.opened(), 1);

    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert!(scheduled.elapsed() >= Duration::from_secs(5));
    assert_eq!(producer.opened(), 2);
    assert_eq!(producer.last_track(), vec!["rust"]);
    conn.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_keyword_changes_share_one_restart() {
    init_logging();
    let producer = ScriptedProducer::new(vec![]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    let mut keywords = Vec::new();
    for i in 0..50 {
        keywords.push(format!("k{}", i));
        conn.set_tracked_keywords(keywords.clone());
        conn.request_reconnect();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(producer.opened(), 2);
    assert_eq!(producer.last_track().len(), 50);
    assert_eq!(conn.active_sessions(), 1);
    assert_eq!(conn.stats().reconnects, 0);

    // The window is over; the next change restarts again
    conn.set_tracked_keywords(vec!["last".to_string()]);
    conn.request_reconnect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(producer.opened(), 3);
    assert_eq!(producer.last_track(), vec!["last"]);
    conn.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_drops_queued_restart() {
    init_logging();
    let producer = ScriptedProducer::new(vec![]);
    let conn = connection(producer.clone(), Arc::new(HandlerRegistry::new()));
    let mut events = conn.subscribe();
    conn.connect().await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    conn.set_tracked_keywords(vec!["rust".to_string()]);
    conn.request_reconnect();
    conn.disconnect().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(producer.opened(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_parser_stamps_notifications() {
    init_logging();
    let received = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let registry = Arc::new(HandlerRegistry::new());
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let s = stamps.clone();
    registry
        .on::<LimitNotification>(move |limit| s.lock().push(limit.timestamp))
        .unwrap();

    let producer = ScriptedProducer::new(vec![Step::Hold(vec![r#"{"limit":{"track":5}}"#])]);
    let parser = StreamParser::with_clock(
        ParserOptions::default(),
        Arc::new(FixedClock::new(received)),
    );
    let conn = UserStreamConnection::with_parser(
        identity(),
        producer,
        registry,
        ConnectionConfig::default(),
        parser,
    );
    conn.connect().await;

    for _ in 0..100 {
        if conn.stats().notifications == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*stamps.lock(), vec![received]);
    conn.disconnect().await;
}
