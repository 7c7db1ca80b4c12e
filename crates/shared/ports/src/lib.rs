//! User Stream Ports
//!
//! Port definitions (traits) for the user stream client.
//! These define the boundaries between the streaming core and the
//! collaborators it does not own: the HTTP request producer that opens a
//! stream for an identity, and the clock used to stamp notifications that
//! carry no protocol timestamp.

mod clock;
mod error;
mod identity;
mod producer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{TransportError, TransportResult};
pub use identity::{Credential, Identity, IdentityId};
pub use producer::{
    MAX_TRACKING_KEYWORD_BYTES, MAX_TRACKING_KEYWORD_COUNT, RequestProducer, StreamBody,
    StreamRequest,
};
