use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a notification, including the abstract kinds used for routing
///
/// The parent chain replaces runtime type inspection: dispatch starts at the
/// concrete kind and walks up through [`NotificationKind::parent`] until a
/// callback is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Root of the hierarchy - receives everything not handled more specifically
    Any,
    Status,
    DirectMessage,
    Delete,
    ScrubGeo,
    Limit,
    Withheld,
    Disconnect,
    /// Abstract: stall and follow-limit warnings
    Warning,
    StallWarning,
    TooManyFollowsWarning,
    /// Abstract: user, status and list events
    Event,
    UserEvent,
    StatusEvent,
    ListEvent,
    Enumeration,
    Unknown,
}

impl NotificationKind {
    /// Every kind, root first
    pub const ALL: [NotificationKind; 17] = [
        NotificationKind::Any,
        NotificationKind::Status,
        NotificationKind::DirectMessage,
        NotificationKind::Delete,
        NotificationKind::ScrubGeo,
        NotificationKind::Limit,
        NotificationKind::Withheld,
        NotificationKind::Disconnect,
        NotificationKind::Warning,
        NotificationKind::StallWarning,
        NotificationKind::TooManyFollowsWarning,
        NotificationKind::Event,
        NotificationKind::UserEvent,
        NotificationKind::StatusEvent,
        NotificationKind::ListEvent,
        NotificationKind::Enumeration,
        NotificationKind::Unknown,
    ];

    /// Declared supertype, `None` for the root
    pub fn parent(self) -> Option<NotificationKind> {
        match self {
            NotificationKind::Any => None,
            NotificationKind::StallWarning | NotificationKind::TooManyFollowsWarning => {
                Some(NotificationKind::Warning)
            }
            NotificationKind::UserEvent
            | NotificationKind::StatusEvent
            | NotificationKind::ListEvent => Some(NotificationKind::Event),
            _ => Some(NotificationKind::Any),
        }
    }

    /// Abstract kinds are never produced by the parser, only registered for
    pub fn is_abstract(self) -> bool {
        matches!(
            self,
            NotificationKind::Any | NotificationKind::Warning | NotificationKind::Event
        )
    }

    /// This kind followed by its ancestors, most specific first
    pub fn lineage(self) -> impl Iterator<Item = NotificationKind> {
        std::iter::successors(Some(self), |k| k.parent())
    }

    /// True if `self` is `ancestor` or derives from it
    pub fn is_a(self, ancestor: NotificationKind) -> bool {
        self.lineage().any(|k| k == ancestor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Any => "any",
            NotificationKind::Status => "status",
            NotificationKind::DirectMessage => "direct_message",
            NotificationKind::Delete => "delete",
            NotificationKind::ScrubGeo => "scrub_geo",
            NotificationKind::Limit => "limit",
            NotificationKind::Withheld => "withheld",
            NotificationKind::Disconnect => "disconnect",
            NotificationKind::Warning => "warning",
            NotificationKind::StallWarning => "stall_warning",
            NotificationKind::TooManyFollowsWarning => "too_many_follows_warning",
            NotificationKind::Event => "event",
            NotificationKind::UserEvent => "user_event",
            NotificationKind::StatusEvent => "status_event",
            NotificationKind::ListEvent => "list_event",
            NotificationKind::Enumeration => "enumeration",
            NotificationKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_lineage_ends_at_root() {
        for kind in NotificationKind::ALL {
            assert_eq!(kind.lineage().last(), Some(NotificationKind::Any));
        }
    }

    #[test]
    fn test_lineage_order() {
        let chain: Vec<_> = NotificationKind::StatusEvent.lineage().collect();
        assert_eq!(
            chain,
            vec![
                NotificationKind::StatusEvent,
                NotificationKind::Event,
                NotificationKind::Any
            ]
        );

        let chain: Vec<_> = NotificationKind::Delete.lineage().collect();
        assert_eq!(chain, vec![NotificationKind::Delete, NotificationKind::Any]);
    }

    #[test]
    fn test_is_a() {
        assert!(NotificationKind::StallWarning.is_a(NotificationKind::Warning));
        assert!(NotificationKind::StallWarning.is_a(NotificationKind::Any));
        assert!(!NotificationKind::StallWarning.is_a(NotificationKind::Event));
        assert!(!NotificationKind::Warning.is_a(NotificationKind::StallWarning));
    }

    #[test]
    fn test_abstract_kinds() {
        let abstract_kinds: Vec<_> = NotificationKind::ALL
            .into_iter()
            .filter(|k| k.is_abstract())
            .collect();
        assert_eq!(
            abstract_kinds,
            vec![
                NotificationKind::Any,
                NotificationKind::Warning,
                NotificationKind::Event
            ]
        );
    }
}
