use serde::{Deserialize, Serialize};

use super::NotificationKind;
use super::variants::{
    DeleteNotification, DirectMessageNotification, DisconnectNotification,
    EnumerationNotification, LimitNotification, ListEventNotification, ScrubGeoNotification,
    StallWarningNotification, StatusEventNotification, StatusNotification,
    TooManyFollowsWarningNotification, UnknownNotification, UserEventNotification,
    WithheldNotification,
};
use crate::entities::User;
use crate::values::Timestamp;

/// One parsed unit of streamed activity
///
/// Notifications are immutable values; they are handed to callbacks by
/// reference and every variant carries a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    Status(StatusNotification),
    DirectMessage(DirectMessageNotification),
    Delete(DeleteNotification),
    ScrubGeo(ScrubGeoNotification),
    Limit(LimitNotification),
    Withheld(WithheldNotification),
    Disconnect(DisconnectNotification),
    StallWarning(StallWarningNotification),
    TooManyFollowsWarning(TooManyFollowsWarningNotification),
    UserEvent(UserEventNotification),
    StatusEvent(StatusEventNotification),
    ListEvent(ListEventNotification),
    Enumeration(EnumerationNotification),
    Unknown(UnknownNotification),
}

/// Common view over the warning kinds
#[derive(Debug, Clone, Copy)]
pub struct WarningView<'a> {
    pub code: &'a str,
    pub message: &'a str,
}

/// Common view over the event kinds
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    pub source: &'a User,
    pub target: &'a User,
    pub event_name: &'a str,
}

impl Notification {
    /// Concrete kind of this notification
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Status(_) => NotificationKind::Status,
            Notification::DirectMessage(_) => NotificationKind::DirectMessage,
            Notification::Delete(_) => NotificationKind::Delete,
            Notification::ScrubGeo(_) => NotificationKind::ScrubGeo,
            Notification::Limit(_) => NotificationKind::Limit,
            Notification::Withheld(_) => NotificationKind::Withheld,
            Notification::Disconnect(_) => NotificationKind::Disconnect,
            Notification::StallWarning(_) => NotificationKind::StallWarning,
            Notification::TooManyFollowsWarning(_) => NotificationKind::TooManyFollowsWarning,
            Notification::UserEvent(_) => NotificationKind::UserEvent,
            Notification::StatusEvent(_) => NotificationKind::StatusEvent,
            Notification::ListEvent(_) => NotificationKind::ListEvent,
            Notification::Enumeration(_) => NotificationKind::Enumeration,
            Notification::Unknown(_) => NotificationKind::Unknown,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Notification::Status(n) => n.timestamp,
            Notification::DirectMessage(n) => n.timestamp,
            Notification::Delete(n) => n.timestamp,
            Notification::ScrubGeo(n) => n.timestamp,
            Notification::Limit(n) => n.timestamp,
            Notification::Withheld(n) => n.timestamp,
            Notification::Disconnect(n) => n.timestamp,
            Notification::StallWarning(n) => n.timestamp,
            Notification::TooManyFollowsWarning(n) => n.timestamp,
            Notification::UserEvent(n) => n.timestamp,
            Notification::StatusEvent(n) => n.timestamp,
            Notification::ListEvent(n) => n.timestamp,
            Notification::Enumeration(n) => n.timestamp,
            Notification::Unknown(n) => n.timestamp,
        }
    }

    /// Code and message of a warning notification
    pub fn as_warning(&self) -> Option<WarningView<'_>> {
        match self {
            Notification::StallWarning(w) => Some(WarningView {
                code: &w.code,
                message: &w.message,
            }),
            Notification::TooManyFollowsWarning(w) => Some(WarningView {
                code: &w.code,
                message: &w.message,
            }),
            _ => None,
        }
    }

    /// Source, target and name of an event notification
    pub fn as_event(&self) -> Option<EventView<'_>> {
        let (source, target, event_name) = match self {
            Notification::UserEvent(e) => (&e.source, &e.target, &e.event_name),
            Notification::StatusEvent(e) => (&e.source, &e.target, &e.event_name),
            Notification::ListEvent(e) => (&e.source, &e.target, &e.event_name),
            _ => return None,
        };
        Some(EventView {
            source,
            target,
            event_name,
        })
    }

    /// Borrow the payload as a specific variant
    pub fn downcast_ref<V: NotificationVariant>(&self) -> Option<&V> {
        V::from_notification(self)
    }
}

/// A concrete notification payload type
///
/// Lets callbacks be registered with a typed signature
/// (`registry.on::<DeleteNotification>(..)`).
pub trait NotificationVariant: Send + Sync + 'static {
    const KIND: NotificationKind;

    fn from_notification(notification: &Notification) -> Option<&Self>;
}

macro_rules! notification_variant {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        $(
            impl NotificationVariant for $payload {
                const KIND: NotificationKind = NotificationKind::$variant;

                fn from_notification(notification: &Notification) -> Option<&Self> {
                    match notification {
                        Notification::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for Notification {
                fn from(payload: $payload) -> Self {
                    Notification::$variant(payload)
                }
            }
        )*
    };
}

notification_variant! {
    Status => StatusNotification,
    DirectMessage => DirectMessageNotification,
    Delete => DeleteNotification,
    ScrubGeo => ScrubGeoNotification,
    Limit => LimitNotification,
    Withheld => WithheldNotification,
    Disconnect => DisconnectNotification,
    StallWarning => StallWarningNotification,
    TooManyFollowsWarning => TooManyFollowsWarningNotification,
    UserEvent => UserEventNotification,
    StatusEvent => StatusEventNotification,
    ListEvent => ListEventNotification,
    Enumeration => EnumerationNotification,
    Unknown => UnknownNotification,
}
