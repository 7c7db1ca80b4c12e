//! Typed notifications received from a user stream

mod disconnect;
mod kind;
mod notification;
mod variants;

pub use disconnect::DisconnectCode;
pub use kind::NotificationKind;
pub use notification::{EventView, Notification, NotificationVariant, WarningView};
pub use variants::{
    DeleteNotification, DeleteTarget, DirectMessageNotification, DisconnectNotification,
    EnumerationNotification, LimitNotification, ListEventNotification, ScrubGeoNotification,
    StallWarningNotification, StatusEventNotification, StatusNotification,
    TooManyFollowsWarningNotification, UnknownNotification, UserEventNotification,
    WithheldNotification, WithheldTarget,
};
