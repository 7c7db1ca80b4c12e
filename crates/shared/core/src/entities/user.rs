use serde::{Deserialize, Serialize};

use crate::values::UserId;

/// User account as carried by stream payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub screen_name: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl User {
    pub fn new(id: UserId, screen_name: impl Into<String>) -> Self {
        let screen_name = screen_name.into();
        Self {
            id,
            name: screen_name.clone(),
            screen_name,
            protected: false,
            profile_image_url: None,
        }
    }
}
