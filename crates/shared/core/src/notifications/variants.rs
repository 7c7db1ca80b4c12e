use serde::{Deserialize, Serialize};

use super::DisconnectCode;
use crate::entities::{DirectMessage, Status, User, UserList};
use crate::values::{MessageId, StatusId, Timestamp, UserId};

/// A status arrived on the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub status: Status,
    pub timestamp: Timestamp,
}

/// A direct message arrived on the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageNotification {
    pub message: DirectMessage,
    pub timestamp: Timestamp,
}

/// What a `delete` message refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteTarget {
    Status,
    DirectMessage,
}

/// A status or direct message was deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteNotification {
    pub target: DeleteTarget,
    /// Status id or message id, depending on `target`
    pub id: i64,
    pub user_id: UserId,
    pub timestamp: Timestamp,
}

/// Location data must be removed from a user's statuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubGeoNotification {
    pub user_id: UserId,
    pub up_to_status_id: StatusId,
    pub timestamp: Timestamp,
}

/// The stream matched more statuses than it was allowed to deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitNotification {
    pub undelivered_count: i64,
    pub timestamp: Timestamp,
}

/// Scope of a withholding notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WithheldTarget {
    Status,
    User,
}

/// Content withheld in some countries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithheldNotification {
    pub target: WithheldTarget,
    /// Status id for [`WithheldTarget::Status`], user id for [`WithheldTarget::User`]
    pub id: i64,
    pub user_id: UserId,
    pub country_codes: Vec<String>,
    pub timestamp: Timestamp,
}

/// The server is about to close the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectNotification {
    pub code: DisconnectCode,
    pub stream_name: String,
    pub reason: String,
    pub timestamp: Timestamp,
}

/// The client is falling behind (`FALLING_BEHIND`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallWarningNotification {
    pub code: String,
    pub message: String,
    /// Fill ratio of the server-side queue, in percent
    pub percent_full: i64,
    pub timestamp: Timestamp,
}

/// The account follows more users than the stream delivers (`FOLLOWS_OVER_LIMIT`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooManyFollowsWarningNotification {
    pub code: String,
    pub message: String,
    pub user_id: UserId,
    pub timestamp: Timestamp,
}

/// Relationship or profile event between two users
/// (block, unblock, follow, unfollow, user_update, mute, unmute)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEventNotification {
    pub source: User,
    pub target: User,
    pub event_name: String,
    pub timestamp: Timestamp,
}

/// Event targeting a status (favorite, unfavorite, quoted_tweet, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEventNotification {
    pub source: User,
    pub target: User,
    pub target_status: Status,
    pub event_name: String,
    pub timestamp: Timestamp,
}

/// Event targeting a list (`list_*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEventNotification {
    pub source: User,
    pub target: User,
    pub target_list: UserList,
    pub event_name: String,
    pub timestamp: Timestamp,
}

/// Snapshot of the friends list sent at the start of a stream
///
/// The protocol carries no timestamp; the receipt time is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationNotification {
    pub ids: Vec<UserId>,
    pub timestamp: Timestamp,
}

/// Anything the parser could not classify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownNotification {
    pub event_name: Option<String>,
    pub raw_json: String,
    pub timestamp: Timestamp,
}

impl DeleteNotification {
    /// Deleted status id, if a status was deleted
    pub fn status_id(&self) -> Option<StatusId> {
        (self.target == DeleteTarget::Status).then_some(self.id)
    }

    /// Deleted message id, if a direct message was deleted
    pub fn message_id(&self) -> Option<MessageId> {
        (self.target == DeleteTarget::DirectMessage).then_some(self.id)
    }
}
