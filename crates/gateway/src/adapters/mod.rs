//! Request producer adapters
//!
//! Concrete transports for the [`userstream_ports::RequestProducer`] port.

pub mod http;

pub use http::{DEFAULT_ENDPOINT, HttpRequestProducer};
