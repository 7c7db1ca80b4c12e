use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of an authenticated account (its user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub i64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for IdentityId {
    fn from(id: i64) -> Self {
        IdentityId(id)
    }
}

/// Opaque credential handed to the request producer
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(secret: impl AsRef<str>) -> Self {
        Credential(Arc::from(secret.as_ref()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// An authenticated account that may own one stream connection
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: IdentityId,
    pub screen_name: String,
    pub credential: Credential,
    /// Whether a stream connection should be kept for this identity
    pub streaming_enabled: bool,
    /// Request `replies=all`
    pub receive_all_replies: bool,
    /// Request `include_followings_activity=true`
    pub include_followings_activity: bool,
}

impl Identity {
    pub fn new(id: IdentityId, screen_name: impl Into<String>, credential: Credential) -> Self {
        Identity {
            id,
            screen_name: screen_name.into(),
            credential,
            streaming_enabled: true,
            receive_all_replies: false,
            include_followings_activity: false,
        }
    }

    pub fn with_streaming_enabled(mut self, enabled: bool) -> Self {
        self.streaming_enabled = enabled;
        self
    }

    pub fn with_all_replies(mut self, enabled: bool) -> Self {
        self.receive_all_replies = enabled;
        self
    }

    pub fn with_followings_activity(mut self, enabled: bool) -> Self {
        self.include_followings_activity = enabled;
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} ({})", self.screen_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_is_redacted() {
        let identity = Identity::new(IdentityId(12), "alice", Credential::new("s3cret"));
        let debug = format!("{:?}", identity);
        assert!(!debug.contains("s3cret"));
        assert_eq!(identity.credential.expose(), "s3cret");
        assert_eq!(identity.to_string(), "@alice (12)");
    }

    #[test]
    fn test_builders() {
        let identity = Identity::new(IdentityId(1), "bob", Credential::new("t"))
            .with_streaming_enabled(false)
            .with_all_replies(true)
            .with_followings_activity(true);
        assert!(!identity.streaming_enabled);
        assert!(identity.receive_all_replies);
        assert!(identity.include_followings_activity);
    }
}
