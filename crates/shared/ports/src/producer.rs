use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use crate::error::TransportResult;
use crate::identity::Identity;

/// Maximum number of `track` keywords one connection may carry
pub const MAX_TRACKING_KEYWORD_COUNT: usize = 100;

/// Maximum length of one `track` keyword, in bytes
pub const MAX_TRACKING_KEYWORD_BYTES: usize = 60;

/// Query parameters of a user stream request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRequest {
    /// Deduplicated, non-empty keywords in first-seen order
    pub track: Vec<String>,
    /// `replies=all`
    pub replies_all: bool,
    /// `include_followings_activity=true`
    pub include_followings_activity: bool,
}

impl StreamRequest {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let track = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .filter(|k| seen.insert(k.clone()))
            .collect();

        StreamRequest {
            track,
            replies_all: false,
            include_followings_activity: false,
        }
    }

    /// Request for an identity, taking the reply/activity flags from its settings
    pub fn for_identity<I, S>(identity: &Identity, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut request = Self::new(keywords);
        request.replies_all = identity.receive_all_replies;
        request.include_followings_activity = identity.include_followings_activity;
        request
    }

    /// Comma-joined `track` value, `None` when there are no keywords
    pub fn track_param(&self) -> Option<String> {
        if self.track.is_empty() {
            None
        } else {
            Some(self.track.join(","))
        }
    }

    /// Query pairs to append to the stream URL; absent parameters are omitted
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(3);
        if let Some(track) = self.track_param() {
            pairs.push(("track", track));
        }
        if self.replies_all {
            pairs.push(("replies", "all".to_string()));
        }
        if self.include_followings_activity {
            pairs.push(("include_followings_activity", "true".to_string()));
        }
        pairs
    }
}

/// An open stream response body
///
/// Headers have already been received; only body bytes are read from here.
/// Dropping the body releases the underlying request (the release hook runs
/// exactly once, on every exit path of whoever owns the body).
pub struct StreamBody {
    reader: Pin<Box<dyn AsyncBufRead + Send>>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl StreamBody {
    pub fn new(reader: impl AsyncBufRead + Send + 'static) -> Self {
        StreamBody {
            reader: Box::pin(reader),
            on_release: None,
        }
    }

    /// Run `hook` when the body is dropped (e.g. to abort the HTTP request)
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("has_release_hook", &self.on_release.is_some())
            .finish()
    }
}

impl AsyncRead for StreamBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().reader.as_mut().poll_read(cx, buf)
    }
}

impl AsyncBufRead for StreamBody {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        self.get_mut().reader.as_mut().poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        self.get_mut().reader.as_mut().consume(amt)
    }
}

impl Drop for StreamBody {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// Port for opening a user stream
///
/// Request construction and signing live behind this trait. Implementations
/// return an error carrying the HTTP status when the server answered with a
/// non-success response, and a network error otherwise.
#[async_trait]
pub trait RequestProducer: Send + Sync {
    async fn open_stream(
        &self,
        identity: &Identity,
        request: &StreamRequest,
    ) -> TransportResult<StreamBody>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Credential, IdentityId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_track_dedup_and_blank_filtering() {
        let request = StreamRequest::new(["rust", "", "  ", "tokio", "rust", " serde "]);
        assert_eq!(request.track, vec!["rust", "tokio", "serde"]);
        assert_eq!(request.track_param().as_deref(), Some("rust,tokio,serde"));
    }

    #[test]
    fn test_query_pairs() {
        let identity = Identity::new(IdentityId(1), "alice", Credential::new("t"))
            .with_all_replies(true)
            .with_followings_activity(true);
        let request = StreamRequest::for_identity(&identity, ["a", "b"]);

        assert_eq!(
            request.query_pairs(),
            vec![
                ("track", "a,b".to_string()),
                ("replies", "all".to_string()),
                ("include_followings_activity", "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_absent_parameters_are_omitted() {
        let request = StreamRequest::new(Vec::<String>::new());
        assert!(request.track_param().is_none());
        assert!(request.query_pairs().is_empty());
    }

    #[tokio::test]
    async fn test_body_reads_and_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);

        let mut body = StreamBody::new(&b"first\nsecond\n"[..])
            .with_release_hook(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let mut line = String::new();
        body.read_line(&mut line).await.unwrap();
        assert_eq!(line, "first\n");
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(body);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
