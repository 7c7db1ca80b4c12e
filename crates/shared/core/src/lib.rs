//! User Stream Core Domain
//!
//! Pure domain types for the user stream client.
//! This crate contains no async, no I/O, and is 100% unit testable.
//!
//! ## Notification family
//!
//! Every line received from a user stream is classified into one
//! [`Notification`]. The family is closed; callbacks are routed by
//! [`NotificationKind`], which carries a static parent chain so that a
//! callback registered for [`NotificationKind::Event`] also receives
//! [`NotificationKind::UserEvent`] notifications and so on.

pub mod entities;
pub mod notifications;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{DirectMessage, Status, User, UserList};
pub use notifications::{
    DeleteNotification, DeleteTarget, DirectMessageNotification, DisconnectCode,
    DisconnectNotification, EnumerationNotification, EventView, LimitNotification,
    ListEventNotification, Notification, NotificationKind, NotificationVariant,
    ScrubGeoNotification, StallWarningNotification, StatusEventNotification, StatusNotification,
    TooManyFollowsWarningNotification, UnknownNotification, UserEventNotification,
    WarningView, WithheldNotification, WithheldTarget,
};
pub use values::{
    CREATED_AT_FORMAT, ListId, MessageId, StatusId, Timestamp, UserId, parse_created_at,
    parse_epoch_millis,
};
