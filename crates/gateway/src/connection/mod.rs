//! User stream connection
//!
//! One connection per identity. A session is one opened stream request plus
//! the ingestion loop reading it; when a session ends without being asked
//! to, the failure is classified and either a reconnect is scheduled or the
//! connection gives up and publishes [`ConnectionEvent::Failed`].
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──headers──► Connected
//!      ▲                          ▲                       │
//!      │ terminal failure         │ backoff timer         │ failure
//!      └──────────────────────────┴───────────────────────┘
//! ```

pub mod backoff;
pub mod config;

pub use backoff::{Backoff, BackoffDecision, BackoffMode, BackoffPolicy};
pub use config::{ConnectionConfig, DEFAULT_READ_TIMEOUT, DEFAULT_RECONNECT_COALESCE};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use userstream_core::Notification;
use userstream_ports::{Identity, IdentityId, RequestProducer, StreamRequest, TransportError};

use crate::error::{ParseError, StreamFailure};
use crate::ingest::{self, LineCallback, StreamEnd};
use crate::parser::{StreamHandler, StreamParser};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Published on the connection's broadcast channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        identity: IdentityId,
        state: ConnectionState,
    },
    BackoffScheduled {
        identity: IdentityId,
        mode: BackoffMode,
        wait: Duration,
    },
    Failed(StreamFailure),
}

/// Counters since the connection was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub notifications: u64,
    pub parse_errors: u64,
    /// Reconnects scheduled after a failure
    pub reconnects: u64,
}

#[derive(Default)]
struct StatCounters {
    notifications: AtomicU64,
    parse_errors: AtomicU64,
    reconnects: AtomicU64,
}

/// How a session ended, when it was not cancelled
enum SessionEnd {
    Transport(TransportError),
    Closed,
    ReadFailed(String),
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    state: ConnectionState,
    /// The owner wants this connection up
    desired: bool,
    keywords: Vec<String>,
    backoff: Backoff,
    hard_error_count: u32,
    session: Option<Session>,
    pending_reconnect: Option<CancellationToken>,
    /// A keyword restart is waiting out the coalescing window
    restart_queued: bool,
    /// Bumped on every teardown; stale sessions and timers compare against it
    generation: u64,
}

struct Inner {
    identity: Identity,
    producer: Arc<dyn RequestProducer>,
    handler: Arc<dyn StreamHandler>,
    parser: StreamParser,
    config: ConnectionConfig,
    shared: Mutex<Shared>,
    /// Serialises connect/disconnect
    gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ConnectionEvent>,
    stats: StatCounters,
    active_loops: AtomicUsize,
}

/// Long-lived user stream connection for one identity
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct UserStreamConnection {
    inner: Arc<Inner>,
}

impl fmt::Debug for UserStreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStreamConnection")
            .field("identity", &self.inner.identity.id)
            .field("state", &self.state())
            .finish()
    }
}

impl UserStreamConnection {
    pub fn new(
        identity: Identity,
        producer: Arc<dyn RequestProducer>,
        handler: Arc<dyn StreamHandler>,
        config: ConnectionConfig,
    ) -> Self {
        let parser = StreamParser::new(config.parser);
        Self::with_parser(identity, producer, handler, config, parser)
    }

    /// Build with an explicit parser, e.g. one stamping from a fixed clock
    ///
    /// `config.parser` is ignored; the parser carries its own options.
    pub fn with_parser(
        identity: Identity,
        producer: Arc<dyn RequestProducer>,
        handler: Arc<dyn StreamHandler>,
        config: ConnectionConfig,
        parser: StreamParser,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let backoff = Backoff::new(config.backoff);

        UserStreamConnection {
            inner: Arc::new(Inner {
                identity,
                producer,
                handler,
                parser,
                config,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    desired: false,
                    keywords: Vec::new(),
                    backoff,
                    hard_error_count: 0,
                    session: None,
                    pending_reconnect: None,
                    restart_queued: false,
                    generation: 0,
                }),
                gate: tokio::sync::Mutex::new(()),
                events,
                stats: StatCounters::default(),
                active_loops: AtomicUsize::new(0),
            }),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn hard_error_count(&self) -> u32 {
        self.inner.shared.lock().hard_error_count
    }

    pub fn backoff_mode(&self) -> BackoffMode {
        self.inner.shared.lock().backoff.mode()
    }

    /// Keywords sent as `track` on the next stream request
    pub fn keywords(&self) -> Vec<String> {
        self.inner.shared.lock().keywords.clone()
    }

    /// Takes effect on the next (re)connect
    pub fn set_tracked_keywords(&self, keywords: Vec<String>) {
        self.inner.shared.lock().keywords = keywords;
    }

    /// Number of ingestion loops currently reading
    pub fn active_sessions(&self) -> usize {
        self.inner.active_loops.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ConnectionStats {
        let stats = &self.inner.stats;
        ConnectionStats {
            notifications: stats.notifications.load(Ordering::Relaxed),
            parse_errors: stats.parse_errors.load(Ordering::Relaxed),
            reconnects: stats.reconnects.load(Ordering::Relaxed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Open the stream, replacing any running session
    ///
    /// Returns once the new session is started; the state is `Connecting`
    /// until the response headers arrive. Clears the failure counters.
    pub async fn connect(&self) {
        let _gate = self.inner.gate.lock().await;
        {
            let mut shared = self.inner.shared.lock();
            shared.desired = true;
            shared.hard_error_count = 0;
            shared.backoff.reset();
        }
        info!("{}: connecting", self.inner.identity);
        let generation = self.inner.teardown().await;
        Inner::start_session(&self.inner, generation);
    }

    /// Close the stream and cancel any pending reconnect
    pub async fn disconnect(&self) {
        let _gate = self.inner.gate.lock().await;
        self.inner.shared.lock().desired = false;
        self.inner.teardown().await;

        let mut shared = self.inner.shared.lock();
        self.inner.transition(&mut shared, ConnectionState::Disconnected);
        info!("{}: disconnected", self.inner.identity);
    }

    /// Restart the session so changed keywords take effect
    ///
    /// Requests within `config.reconnect_coalesce` of each other share one
    /// restart. While a backoff timer is pending nothing is restarted: the
    /// timer's session reads the keywords current at that point. Ignored
    /// while the connection is not wanted up. Must be called from within a
    /// tokio runtime.
    pub fn request_reconnect(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("{}: reconnect requested outside a runtime", self.inner.identity);
            return;
        };
        let generation = {
            let mut shared = self.inner.shared.lock();
            if !shared.desired || shared.restart_queued || shared.pending_reconnect.is_some() {
                return;
            }
            shared.restart_queued = true;
            shared.generation
        };
        let inner = Arc::clone(&self.inner);
        let delay = inner.config.reconnect_coalesce;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            Inner::restart_for_keywords(&inner, generation).await;
        });
    }
}

impl Inner {
    /// Stop the running session and any pending timer; returns the new generation
    async fn teardown(&self) -> u64 {
        let (session, pending, generation) = {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.restart_queued = false;
            (
                shared.session.take(),
                shared.pending_reconnect.take(),
                shared.generation,
            )
        };

        if let Some(timer) = pending {
            timer.cancel();
        }
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                error!("{}: session task failed: {}", self.identity, e);
            }
        }
        generation
    }

    fn start_session(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Inner::run_session(
            Arc::clone(self),
            generation,
            cancel.clone(),
        ));
        shared.session = Some(Session { cancel, task });
        self.transition(&mut shared, ConnectionState::Connecting);
    }

    /// Reconnect after a backoff wait, unless the connection moved on since `generation`
    async fn restart(self: &Arc<Self>, generation: u64) {
        let _gate = self.gate.lock().await;
        {
            let shared = self.shared.lock();
            if !shared.desired || shared.generation != generation {
                return;
            }
        }
        let generation = self.teardown().await;
        Inner::start_session(self, generation);
    }

    /// Restart queued by [`UserStreamConnection::request_reconnect`]
    async fn restart_for_keywords(self: &Arc<Self>, generation: u64) {
        let _gate = self.gate.lock().await;
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.restart_queued = false;
            // A failure since the request scheduled its own reconnect
            if !shared.desired || shared.pending_reconnect.is_some() {
                return;
            }
        }
        debug!("{}: restarting for changed keywords", self.identity);
        let generation = self.teardown().await;
        Inner::start_session(self, generation);
    }

    async fn run_session(inner: Arc<Self>, generation: u64, cancel: CancellationToken) {
        let request = {
            let shared = inner.shared.lock();
            StreamRequest::for_identity(&inner.identity, &shared.keywords)
        };
        debug!(
            "{}: opening stream, track={:?}",
            inner.identity,
            request.track_param()
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            opened = inner.producer.open_stream(&inner.identity, &request) => opened,
        };
        let body = match opened {
            Ok(body) => body,
            Err(e) => {
                inner.handle_failure(generation, SessionEnd::Transport(e), &request);
                return;
            }
        };

        {
            let mut shared = inner.shared.lock();
            if shared.generation != generation {
                return;
            }
            inner.transition(&mut shared, ConnectionState::Connected);
        }
        info!("{}: stream connected", inner.identity);

        let on_line = Inner::line_callback(&inner);
        inner.active_loops.fetch_add(1, Ordering::SeqCst);
        let result = ingest::run(
            body,
            on_line,
            inner.config.read_timeout,
            inner.config.delivery,
            &cancel,
        )
        .await;
        inner.active_loops.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(StreamEnd::Cancelled) => debug!("{}: session cancelled", inner.identity),
            Ok(StreamEnd::Closed) => inner.handle_failure(generation, SessionEnd::Closed, &request),
            Err(e) => {
                inner.handle_failure(generation, SessionEnd::ReadFailed(e.to_string()), &request)
            }
        }
    }

    fn line_callback(inner: &Arc<Self>) -> LineCallback {
        let live = LiveHandler {
            inner: Arc::clone(inner),
        };
        Arc::new(move |line: String| live.inner.parser.parse_line(&line, &live))
    }

    /// A notification arrived; the connection is healthy
    fn mark_alive(&self) {
        let mut shared = self.shared.lock();
        shared.hard_error_count = 0;
        shared.backoff.reset();
    }

    fn handle_failure(self: &Arc<Self>, generation: u64, end: SessionEnd, request: &StreamRequest) {
        let mut shared = self.shared.lock();
        if shared.generation != generation || !shared.desired {
            return;
        }

        let identity = self.identity.to_string();
        let limit = shared.backoff.policy().hard_error_limit;

        let outcome: Result<Duration, StreamFailure> = match end {
            SessionEnd::Closed => {
                shared.hard_error_count += 1;
                warn!(
                    "{}: stream closed by server ({}/{})",
                    identity, shared.hard_error_count, limit
                );
                if shared.hard_error_count >= limit {
                    Err(StreamFailure::ClosedTooOften {
                        identity,
                        attempts: shared.hard_error_count,
                    })
                } else {
                    Ok(Duration::ZERO)
                }
            }
            SessionEnd::Transport(TransportError::Http { status, reason }) => {
                warn!("{}: HTTP {} {}", identity, status, reason);
                match status {
                    406 | 413 | 416 => Err(StreamFailure::RequestRejected {
                        identity,
                        status,
                        keywords: request.track.clone(),
                    }),
                    _ => {
                        let hard = matches!(status, 401 | 403 | 404 | 420);
                        if hard {
                            shared.hard_error_count += 1;
                        }
                        if hard && shared.hard_error_count >= limit {
                            Err(StreamFailure::HardErrorLimit {
                                identity,
                                status,
                                attempts: shared.hard_error_count,
                            })
                        } else {
                            match shared.backoff.protocol_failure() {
                                BackoffDecision::Retry(wait) => Ok(wait),
                                BackoffDecision::GiveUp { wait } => {
                                    Err(StreamFailure::ProtocolBackoffExhausted {
                                        identity,
                                        status,
                                        wait,
                                    })
                                }
                            }
                        }
                    }
                }
            }
            SessionEnd::Transport(TransportError::Network(reason))
            | SessionEnd::ReadFailed(reason) => {
                warn!("{}: network failure: {}", identity, reason);
                match shared.backoff.network_failure() {
                    BackoffDecision::Retry(wait) => Ok(wait),
                    BackoffDecision::GiveUp { wait } => {
                        Err(StreamFailure::NetworkBackoffExhausted {
                            identity,
                            reason,
                            wait,
                        })
                    }
                }
            }
        };

        match outcome {
            Ok(wait) => {
                let mode = shared.backoff.mode();
                self.transition(&mut shared, ConnectionState::Connecting);
                let timer = CancellationToken::new();
                shared.pending_reconnect = Some(timer.clone());
                drop(shared);

                self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                debug!("{}: reconnecting in {:?} ({} backoff)", self.identity, wait, mode);
                let _ = self.events.send(ConnectionEvent::BackoffScheduled {
                    identity: self.identity.id,
                    mode,
                    wait,
                });

                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = timer.cancelled() => {}
                        _ = tokio::time::sleep(wait) => {
                            Inner::restart(&inner, generation).await;
                        }
                    }
                });
            }
            Err(failure) => {
                shared.desired = false;
                self.transition(&mut shared, ConnectionState::Disconnected);
                drop(shared);

                error!("{}", failure);
                let _ = self.events.send(ConnectionEvent::Failed(failure));
            }
        }
    }

    fn transition(&self, shared: &mut Shared, state: ConnectionState) {
        if shared.state == state {
            return;
        }
        debug!("{}: {} -> {}", self.identity, shared.state, state);
        shared.state = state;
        let _ = self.events.send(ConnectionEvent::StateChanged {
            identity: self.identity.id,
            state,
        });
    }
}

/// Parser sink of a live session: counts, resets backoff, forwards
struct LiveHandler {
    inner: Arc<Inner>,
}

impl StreamHandler for LiveHandler {
    fn on_notification(&self, notification: Notification) {
        self.inner.mark_alive();
        self.inner.stats.notifications.fetch_add(1, Ordering::Relaxed);
        self.inner.handler.on_notification(notification);
    }

    fn on_exception(&self, error: ParseError) {
        self.inner.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.handler.on_exception(error);
    }
}
