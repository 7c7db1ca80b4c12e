//! Stream parser
//!
//! Classifies one raw line into a typed notification by probing for field
//! presence in a fixed order. The protocol has no type tag, so the order
//! matters: `text` wins over everything, then the control messages, then
//! `event`, and finally the catch-all.

mod entities;
mod fields;

use serde_json::Value;
use std::sync::Arc;
use userstream_core::{
    DeleteNotification, DeleteTarget, DirectMessageNotification, DisconnectCode,
    DisconnectNotification, EnumerationNotification, LimitNotification, ListEventNotification,
    Notification, ScrubGeoNotification, StallWarningNotification, StatusEventNotification,
    StatusNotification, TooManyFollowsWarningNotification, UnknownNotification,
    UserEventNotification, WithheldNotification, WithheldTarget,
};
use userstream_ports::{Clock, SystemClock};

use crate::error::{ParseError, ParseErrorKind};
use fields::{FieldResult, Object};

/// Receives the output of the parser
///
/// Implementations must be cheap to call from many tasks at once.
pub trait StreamHandler: Send + Sync {
    fn on_notification(&self, notification: Notification);

    fn on_exception(&self, error: ParseError);
}

/// Where the user id of a deleted direct message is read from
///
/// Deployed clients have read it from `delete.status.user_id_str` even when
/// the message matched `delete.direct_message`; whether that reflects the
/// real payload shape has not been confirmed against captures, so both
/// readings are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmDeleteUserIdSource {
    /// `delete.direct_message.user_id_str`
    #[default]
    DirectMessage,
    /// `delete.status.user_id_str`
    Status,
}

/// Parser behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    pub dm_delete_user_id: DmDeleteUserIdSource,
}

impl ParserOptions {
    pub fn with_dm_delete_user_id(mut self, source: DmDeleteUserIdSource) -> Self {
        self.dm_delete_user_id = source;
        self
    }
}

/// Line → notification classifier
pub struct StreamParser {
    options: ParserOptions,
    clock: Arc<dyn Clock>,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

impl StreamParser {
    pub fn new(options: ParserOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock::new()))
    }

    /// Use `clock` to stamp notifications that carry no protocol timestamp
    pub fn with_clock(options: ParserOptions, clock: Arc<dyn Clock>) -> Self {
        StreamParser { options, clock }
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    /// Parse `line` and hand the result to `handler`
    ///
    /// Never fails outward: every failure reaches `handler.on_exception`
    /// with the raw line attached.
    pub fn parse_line(&self, line: &str, handler: &dyn StreamHandler) {
        match self.parse(line) {
            Ok(notifications) => {
                for notification in notifications {
                    handler.on_notification(notification);
                }
            }
            Err(error) => handler.on_exception(error),
        }
    }

    /// Parse `line` into zero or more notifications
    pub fn parse(&self, line: &str) -> Result<Vec<Notification>, ParseError> {
        if line.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(line)
            .map_err(|e| ParseError::new(ParseErrorKind::InvalidJson(e.to_string()), line))?;

        let notification = match value.as_object() {
            Some(obj) => self.classify(obj, line),
            None => Ok(self.unknown(None, line)),
        };

        notification
            .map(|n| vec![n])
            .map_err(|kind| ParseError::new(kind, line))
    }

    fn classify(&self, obj: &Object, raw: &str) -> FieldResult<Notification> {
        // Statuses dominate the volume
        if obj.contains_key("text") {
            return self.status(obj);
        }

        if let Some(value) = obj.get("direct_message") {
            let message = entities::direct_message(value)?;
            return Ok(DirectMessageNotification {
                timestamp: message.created_at,
                message,
            }
            .into());
        }
        if obj.contains_key("delete") {
            return self.delete(obj);
        }
        if obj.contains_key("scrub_geo") {
            return self.scrub_geo(obj);
        }
        if obj.contains_key("limit") {
            return self.limit(obj);
        }
        if obj.contains_key("status_withheld") {
            return self.withheld(obj, WithheldTarget::Status);
        }
        if obj.contains_key("user_withheld") {
            return self.withheld(obj, WithheldTarget::User);
        }
        if obj.contains_key("disconnect") {
            return self.disconnect(obj);
        }
        if obj.contains_key("warning") {
            return self.warning(obj, raw);
        }
        if obj.contains_key("friends") {
            return self.friends(obj, "friends");
        }
        if obj.contains_key("friends_str") {
            return self.friends(obj, "friends_str");
        }
        if let Some(Value::String(event)) = obj.get("event") {
            return self.event(obj, event, raw);
        }

        // One catch-all per object, named after its first key
        let first_key = obj.keys().next().cloned();
        Ok(self.unknown(first_key, raw))
    }

    fn status(&self, obj: &Object) -> FieldResult<Notification> {
        let status = entities::status_fields(obj)?;
        let timestamp = if obj.contains_key("timestamp_ms") {
            fields::timestamp_ms(obj, self.clock.as_ref())?
        } else {
            status.created_at
        };
        Ok(StatusNotification { status, timestamp }.into())
    }

    fn delete(&self, obj: &Object) -> FieldResult<Notification> {
        let delete = fields::object(obj, "delete")?;
        let timestamp = fields::timestamp_ms(delete, self.clock.as_ref())?;

        let (target, id, user_id) = if delete.contains_key("status") {
            let status = fields::object(delete, "status")?;
            (
                DeleteTarget::Status,
                fields::id(status, "id")?,
                fields::id(status, "user_id")?,
            )
        } else if delete.contains_key("direct_message") {
            let message = fields::object(delete, "direct_message")?;
            let user_id = match self.options.dm_delete_user_id {
                DmDeleteUserIdSource::DirectMessage => fields::id(message, "user_id")?,
                DmDeleteUserIdSource::Status => {
                    fields::id(fields::object(delete, "status")?, "user_id")?
                }
            };
            (DeleteTarget::DirectMessage, fields::id(message, "id")?, user_id)
        } else {
            return Err(ParseErrorKind::missing("delete.status"));
        };

        Ok(DeleteNotification {
            target,
            id,
            user_id,
            timestamp,
        }
        .into())
    }

    fn scrub_geo(&self, obj: &Object) -> FieldResult<Notification> {
        let scrub = fields::object(obj, "scrub_geo")?;
        Ok(ScrubGeoNotification {
            user_id: fields::id(scrub, "user_id")?,
            up_to_status_id: fields::id(scrub, "up_to_status_id")?,
            timestamp: fields::timestamp_ms(scrub, self.clock.as_ref())?,
        }
        .into())
    }

    fn limit(&self, obj: &Object) -> FieldResult<Notification> {
        let limit = fields::object(obj, "limit")?;
        Ok(LimitNotification {
            undelivered_count: fields::integer(limit, "track")?,
            timestamp: fields::timestamp_ms(limit, self.clock.as_ref())?,
        }
        .into())
    }

    fn withheld(&self, obj: &Object, target: WithheldTarget) -> FieldResult<Notification> {
        let (field, withheld) = match target {
            WithheldTarget::Status => ("status_withheld", fields::object(obj, "status_withheld")?),
            WithheldTarget::User => ("user_withheld", fields::object(obj, "user_withheld")?),
        };
        let id = fields::id(withheld, "id")?;
        let user_id = match target {
            WithheldTarget::Status => fields::id(withheld, "user_id")?,
            // For users the withheld id is the user itself
            WithheldTarget::User => fields::optional_id(withheld, "user_id")?.unwrap_or(id),
        };
        if !withheld.contains_key("withheld_in_countries") {
            return Err(ParseErrorKind::missing(&format!("{}.withheld_in_countries", field)));
        }

        Ok(WithheldNotification {
            target,
            id,
            user_id,
            country_codes: fields::string_array(withheld, "withheld_in_countries")?,
            timestamp: fields::timestamp_ms(withheld, self.clock.as_ref())?,
        }
        .into())
    }

    fn disconnect(&self, obj: &Object) -> FieldResult<Notification> {
        let disconnect = fields::object(obj, "disconnect")?;
        let raw_code = fields::integer(disconnect, "code")?;
        let code = DisconnectCode::from_code(raw_code).ok_or_else(|| {
            ParseErrorKind::invalid("disconnect.code", format!("unknown code {}", raw_code))
        })?;

        Ok(DisconnectNotification {
            code,
            stream_name: fields::optional_string(disconnect, "stream_name")?
                .unwrap_or_default()
                .to_string(),
            reason: fields::optional_string(disconnect, "reason")?
                .unwrap_or_default()
                .to_string(),
            timestamp: fields::timestamp_ms(disconnect, self.clock.as_ref())?,
        }
        .into())
    }

    fn warning(&self, obj: &Object, raw: &str) -> FieldResult<Notification> {
        let warning = fields::object(obj, "warning")?;
        let code = fields::string(warning, "code")?;
        let message = fields::optional_string(warning, "message")?
            .unwrap_or_default()
            .to_string();
        let timestamp = fields::timestamp_ms(warning, self.clock.as_ref())?;

        let notification = match code {
            "FALLING_BEHIND" => StallWarningNotification {
                code: code.to_string(),
                message,
                percent_full: fields::integer(warning, "percent_full")?,
                timestamp,
            }
            .into(),
            "FOLLOWS_OVER_LIMIT" => TooManyFollowsWarningNotification {
                code: code.to_string(),
                message,
                user_id: fields::id(warning, "user_id")?,
                timestamp,
            }
            .into(),
            other => self.unknown(Some(other.to_string()), raw),
        };
        Ok(notification)
    }

    fn friends(&self, obj: &Object, field: &str) -> FieldResult<Notification> {
        Ok(EnumerationNotification {
            ids: fields::id_array(obj, field)?,
            timestamp: self.clock.now(),
        }
        .into())
    }

    fn event(&self, obj: &Object, event: &str, raw: &str) -> FieldResult<Notification> {
        let name = event.to_ascii_lowercase();
        let event_name = name.clone();

        let notification = match name.as_str() {
            "favorite" | "unfavorite" | "quoted_tweet" | "favorited_retweet"
            | "retweeted_retweet" => StatusEventNotification {
                source: entities::user_field(obj, "source")?,
                target: entities::user_field(obj, "target")?,
                target_status: entities::status(target_object(obj)?)?,
                timestamp: fields::created_at_or_now(obj, self.clock.as_ref())?,
                event_name,
            }
            .into(),
            "block" | "unblock" | "follow" | "unfollow" | "user_update" | "mute" | "unmute" => {
                UserEventNotification {
                    source: entities::user_field(obj, "source")?,
                    target: entities::user_field(obj, "target")?,
                    timestamp: fields::created_at_or_now(obj, self.clock.as_ref())?,
                    event_name,
                }
                .into()
            }
            list if list.starts_with("list_") => ListEventNotification {
                source: entities::user_field(obj, "source")?,
                target: entities::user_field(obj, "target")?,
                target_list: entities::list(target_object(obj)?)?,
                timestamp: fields::created_at_or_now(obj, self.clock.as_ref())?,
                event_name,
            }
            .into(),
            _ => self.unknown(Some(event.to_string()), raw),
        };
        Ok(notification)
    }

    fn unknown(&self, event_name: Option<String>, raw: &str) -> Notification {
        UnknownNotification {
            event_name,
            raw_json: raw.to_string(),
            timestamp: self.clock.now(),
        }
        .into()
    }
}

fn target_object(obj: &Object) -> FieldResult<&Value> {
    obj.get("target_object")
        .filter(|v| !v.is_null())
        .ok_or_else(|| ParseErrorKind::missing("target_object"))
}
