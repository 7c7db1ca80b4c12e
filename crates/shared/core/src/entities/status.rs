use serde::{Deserialize, Serialize};

use super::User;
use crate::values::{StatusId, Timestamp, UserId};

/// A status (post)
///
/// Storage of statuses belongs to the embedding application; the stream
/// core only hands them over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub user: User,
    pub text: String,
    pub created_at: Timestamp,
    pub in_reply_to_status_id: Option<StatusId>,
    pub in_reply_to_user_id: Option<UserId>,
    pub retweeted_status: Option<Box<Status>>,
    pub quoted_status: Option<Box<Status>>,
}

impl Status {
    pub fn new(id: StatusId, user: User, text: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id,
            user,
            text: text.into(),
            created_at,
            in_reply_to_status_id: None,
            in_reply_to_user_id: None,
            retweeted_status: None,
            quoted_status: None,
        }
    }

    /// True if this status is a retweet of another one
    pub fn is_retweet(&self) -> bool {
        self.retweeted_status.is_some()
    }

    /// The status whose content is displayed: the original for retweets
    pub fn original(&self) -> &Status {
        self.retweeted_status.as_deref().unwrap_or(self)
    }
}
