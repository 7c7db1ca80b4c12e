use serde::{Deserialize, Serialize};

use super::User;
use crate::values::{MessageId, Timestamp};

/// A private message between two users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: MessageId,
    pub text: String,
    pub sender: User,
    pub recipient: User,
    pub created_at: Timestamp,
}
