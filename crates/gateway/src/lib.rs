//! User Stream Gateway
//!
//! Streaming core of the user stream client. Provides:
//! - Stream parser (one JSON line → one typed [`Notification`](userstream_core::Notification))
//! - Handler dispatch registry with kind-hierarchy fallback
//! - Ingestion loop with read timeout and cancellation
//! - Connection state machine with network/protocol backoff
//! - HTTP request producer adapter
//!
//! ## Architecture
//!
//! ```text
//!  RequestProducer (HTTP)
//!         │ StreamBody (AsyncBufRead)
//!    ┌────▼─────┐
//!    │  ingest  │  one line at a time, read timeout
//!    └────┬─────┘
//!         │ Ordered: bounded queue → single worker
//!    ┌────▼─────┐
//!    │  parser  │  ordered field probing
//!    └────┬─────┘
//!         │ Notification / ParseError
//!    ┌────▼─────┐
//!    │ registry │  most specific callback wins
//!    └──────────┘
//! ```
//!
//! The [`UserStreamConnection`] owns the loop and decides whether and when
//! to reconnect after it ends.

pub mod adapters;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod parser;

// Re-export commonly used types
pub use adapters::HttpRequestProducer;
pub use connection::{
    BackoffMode, BackoffPolicy, ConnectionConfig, ConnectionEvent, ConnectionState,
    ConnectionStats, UserStreamConnection,
};
pub use dispatch::HandlerRegistry;
pub use error::{DispatchError, IngestError, ParseError, ParseErrorKind, StreamFailure};
pub use ingest::{LineDelivery, StreamEnd};
pub use parser::{DmDeleteUserIdSource, ParserOptions, StreamHandler, StreamParser};
