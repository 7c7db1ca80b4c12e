//! Runtime configuration of a stream connection

use std::time::Duration;

use super::backoff::BackoffPolicy;
use crate::ingest::LineDelivery;
use crate::parser::ParserOptions;

/// Default limit for a single line read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(90);

/// Keyword changes this close together share one restart
pub const DEFAULT_RECONNECT_COALESCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// A read that produces no line within this is a network failure
    pub read_timeout: Duration,
    pub delivery: LineDelivery,
    pub backoff: BackoffPolicy,
    pub parser: ParserOptions,
    /// Buffer of the connection event channel
    pub event_capacity: usize,
    /// Window in which reconnect requests are merged
    pub reconnect_coalesce: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            read_timeout: DEFAULT_READ_TIMEOUT,
            delivery: LineDelivery::default(),
            backoff: BackoffPolicy::default(),
            parser: ParserOptions::default(),
            event_capacity: 64,
            reconnect_coalesce: DEFAULT_RECONNECT_COALESCE,
        }
    }
}

impl ConnectionConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_delivery(mut self, delivery: LineDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_parser(mut self, parser: ParserOptions) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_reconnect_coalesce(mut self, window: Duration) -> Self {
        self.reconnect_coalesce = window;
        self
    }
}
