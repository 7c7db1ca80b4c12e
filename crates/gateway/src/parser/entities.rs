//! Builders for the entities embedded in stream payloads

use serde_json::Value;
use userstream_core::{DirectMessage, Status, User, UserList};

use crate::error::ParseErrorKind;

use super::fields::{
    FieldResult, Object, as_object, created_at, id, optional_id, optional_integer,
    optional_string, string,
};

/// Nesting limit for retweeted/quoted statuses
const MAX_STATUS_DEPTH: usize = 4;

pub(crate) fn user(value: &Value) -> FieldResult<User> {
    let obj = as_object(value, "user")?;
    let screen_name = string(obj, "screen_name")?.to_string();
    let name = optional_string(obj, "name")?
        .map(str::to_string)
        .unwrap_or_else(|| screen_name.clone());

    Ok(User {
        id: id(obj, "id")?,
        screen_name,
        name,
        protected: obj.get("protected").and_then(Value::as_bool).unwrap_or(false),
        profile_image_url: optional_string(obj, "profile_image_url_https")?
            .or(optional_string(obj, "profile_image_url")?)
            .map(str::to_string),
    })
}

/// Required user object stored under `field`
pub(crate) fn user_field(obj: &Object, field: &str) -> FieldResult<User> {
    let value = obj
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ParseErrorKind::missing(field))?;
    user(value)
}

pub(crate) fn status(value: &Value) -> FieldResult<Status> {
    status_object(as_object(value, "status")?, 0)
}

/// Status whose fields sit directly in `obj` (top-level stream lines)
pub(crate) fn status_fields(obj: &Object) -> FieldResult<Status> {
    status_object(obj, 0)
}

fn status_object(obj: &Object, depth: usize) -> FieldResult<Status> {
    // Extended payloads carry the untruncated text in `full_text`
    let text = match optional_string(obj, "full_text")? {
        Some(text) => text,
        None => string(obj, "text")?,
    };

    let nested = |field: &str| -> FieldResult<Option<Box<Status>>> {
        match obj.get(field).filter(|v| !v.is_null()) {
            Some(inner) if depth < MAX_STATUS_DEPTH => {
                let inner = as_object(inner, field)?;
                Ok(Some(Box::new(status_object(inner, depth + 1)?)))
            }
            _ => Ok(None),
        }
    };

    Ok(Status {
        id: id(obj, "id")?,
        user: user_field(obj, "user")?,
        text: text.to_string(),
        created_at: created_at(obj)?,
        in_reply_to_status_id: optional_id(obj, "in_reply_to_status_id")?,
        in_reply_to_user_id: optional_id(obj, "in_reply_to_user_id")?,
        retweeted_status: nested("retweeted_status")?,
        quoted_status: nested("quoted_status")?,
    })
}

pub(crate) fn list(value: &Value) -> FieldResult<UserList> {
    let obj = as_object(value, "target_object")?;
    let name = string(obj, "name")?.to_string();

    Ok(UserList {
        id: id(obj, "id")?,
        full_name: optional_string(obj, "full_name")?
            .map(str::to_string)
            .unwrap_or_else(|| name.clone()),
        slug: optional_string(obj, "slug")?
            .map(str::to_string)
            .unwrap_or_else(|| name.to_lowercase()),
        name,
        owner: user_field(obj, "user")?,
        member_count: optional_integer(obj, "member_count")?,
    })
}

pub(crate) fn direct_message(value: &Value) -> FieldResult<DirectMessage> {
    let obj = as_object(value, "direct_message")?;

    Ok(DirectMessage {
        id: id(obj, "id")?,
        text: string(obj, "text")?.to_string(),
        sender: user_field(obj, "sender")?,
        recipient: user_field(obj, "recipient")?,
        created_at: created_at(obj)?,
    })
}
