use serde::{Deserialize, Serialize};

use super::User;
use crate::values::ListId;

/// A curated user list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    pub id: ListId,
    pub name: String,
    /// `@owner/slug`
    pub full_name: String,
    pub slug: String,
    pub owner: User,
    pub member_count: Option<i64>,
}
