use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HeraldError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh UUIDv7 identifier (time-sortable).
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Primary key of a [`Post`].
    PostId
);
string_id!(
    /// Tenant on whose behalf posts are published.
    ClientId
);
string_id!(
    /// A client's authorised link to one platform account (page / business profile).
    ConnectionId
);

/// Platform family a connection belongs to. Each family has its own publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Direct feed/photo/video calls, albums via unpublished uploads.
    Facebook,
    /// Asynchronous media containers: create, wait for readiness, publish.
    Instagram,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Facebook => "facebook",
            PlatformKind::Instagram => "instagram",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(PlatformKind::Facebook),
            "instagram" => Ok(PlatformKind::Instagram),
            other => Err(HeraldError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Kind tag carried by every media reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    #[default]
    None,
}

/// A publicly reachable media URL plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    #[serde(default)]
    pub kind: MediaKind,
}

impl MediaRef {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Image,
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Video,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Lifecycle state of a post.
///
/// ```text
/// pending ──► scheduled ──► processing ──► published | partial | failed
///    └──────────────────────────────────────► (immediate publish)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Pending,
    Scheduled,
    Processing,
    Published,
    Partial,
    Failed,
}

impl PostStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostStatus::Published | PostStatus::Partial | PostStatus::Failed
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        match self {
            PostStatus::Pending => next == PostStatus::Scheduled || next.is_terminal(),
            PostStatus::Scheduled => next == PostStatus::Processing,
            PostStatus::Processing => next.is_terminal(),
            PostStatus::Published | PostStatus::Partial | PostStatus::Failed => false,
        }
    }

    /// Overall status for a finished post given its per-target results.
    ///
    /// `published` iff every result succeeded and there is at least one,
    /// `failed` iff none succeeded (including zero targets), `partial` otherwise.
    pub fn aggregate<'a, I>(results: I) -> PostStatus
    where
        I: IntoIterator<Item = &'a TargetResult>,
    {
        let (mut ok, mut err) = (0usize, 0usize);
        for r in results {
            if r.success {
                ok += 1;
            } else {
                err += 1;
            }
        }
        match (ok, err) {
            (0, _) => PostStatus::Failed,
            (_, 0) => PostStatus::Published,
            _ => PostStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Processing => "processing",
            PostStatus::Published => "published",
            PostStatus::Partial => "partial",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "scheduled" => Ok(PostStatus::Scheduled),
            "processing" => Ok(PostStatus::Processing),
            "published" => Ok(PostStatus::Published),
            "partial" => Ok(PostStatus::Partial),
            "failed" => Ok(PostStatus::Failed),
            other => Err(HeraldError::InvalidStatus(other.to_string())),
        }
    }
}

/// Outcome of one publish attempt against one target connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub success: bool,
    /// Raw platform response on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Stable short error code (e.g. `READINESS_TIMEOUT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable error, platform messages are kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl TargetResult {
    pub fn succeeded(response: serde_json::Value) -> Self {
        Self {
            success: true,
            response: Some(response),
            error_code: None,
            error: None,
            published_at: Utc::now(),
        }
    }

    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error_code: Some(code.to_string()),
            error: Some(message.into()),
            published_at: Utc::now(),
        }
    }
}

/// Per-target results keyed by connection id.
pub type ResultsMap = BTreeMap<ConnectionId, TargetResult>;

/// A post authored for one client, targeting one or more connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: String,
    pub client_id: ClientId,
    pub content: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    pub targets: Vec<ConnectionId>,
    pub status: PostStatus,
    /// `None` means publish immediately.
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: ResultsMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Build a freshly authored post.
    ///
    /// A `scheduled_at` later than `now` yields `scheduled`, anything else
    /// `pending` (the immediate-publish path).
    pub fn new(
        user_id: impl Into<String>,
        client_id: ClientId,
        content: impl Into<String>,
        media: Vec<MediaRef>,
        targets: Vec<ConnectionId>,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = match scheduled_at {
            Some(at) if at > now => PostStatus::Scheduled,
            _ => PostStatus::Pending,
        };
        Self {
            id: PostId::generate(),
            user_id: user_id.into(),
            client_id,
            content: content.into(),
            media,
            targets,
            status,
            scheduled_at,
            results: ResultsMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A future `scheduled_at` must not coexist with a status past `scheduled`.
    pub fn respects_schedule(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_at {
            Some(at) if at > now => {
                matches!(self.status, PostStatus::Pending | PostStatus::Scheduled)
            }
            _ => true,
        }
    }

    pub fn summary(&self) -> DuePost {
        DuePost {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            client_id: self.client_id.clone(),
            content: self.content.clone(),
            media: self.media.clone(),
            targets: self.targets.clone(),
            scheduled_at: self.scheduled_at,
        }
    }
}

/// The slice of a [`Post`] the scheduler needs to publish it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuePost {
    pub id: PostId,
    pub user_id: String,
    pub client_id: ClientId,
    pub content: String,
    pub media: Vec<MediaRef>,
    pub targets: Vec<ConnectionId>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A tenant. Suspended clients never publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub active: bool,
}

/// A client's link to one platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConnection {
    pub id: ConnectionId,
    pub client_id: ClientId,
    pub platform: PlatformKind,
    /// Page id (facebook) or the page backing the business account (instagram).
    pub page_id: Option<String>,
    /// Business account id (instagram).
    pub business_id: Option<String>,
    pub display_name: Option<String>,
    pub active: bool,
}

/// Usable (already decrypted) credentials for one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub page_id: Option<String>,
    pub business_id: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("page_id", &self.page_id)
            .field("business_id", &self.business_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ok() -> TargetResult {
        TargetResult::succeeded(serde_json::json!({"id": "1"}))
    }

    fn err() -> TargetResult {
        TargetResult::failed("PLATFORM_REJECTED", "nope")
    }

    #[test]
    fn aggregate_all_success_is_published() {
        assert_eq!(PostStatus::aggregate(&[ok(), ok()]), PostStatus::Published);
    }

    #[test]
    fn aggregate_mixed_is_partial() {
        assert_eq!(PostStatus::aggregate(&[ok(), err()]), PostStatus::Partial);
    }

    #[test]
    fn aggregate_all_failed_or_empty_is_failed() {
        assert_eq!(PostStatus::aggregate(&[err(), err()]), PostStatus::Failed);
        let none: Vec<TargetResult> = Vec::new();
        assert_eq!(PostStatus::aggregate(&none), PostStatus::Failed);
    }

    #[test]
    fn terminal_states_never_leave() {
        for s in [PostStatus::Published, PostStatus::Partial, PostStatus::Failed] {
            for next in [
                PostStatus::Pending,
                PostStatus::Scheduled,
                PostStatus::Processing,
                PostStatus::Failed,
            ] {
                assert!(!s.can_transition_to(next), "{s} -> {next}");
            }
        }
    }

    #[test]
    fn scheduler_transitions_are_allowed() {
        assert!(PostStatus::Scheduled.can_transition_to(PostStatus::Processing));
        assert!(PostStatus::Processing.can_transition_to(PostStatus::Partial));
        assert!(!PostStatus::Scheduled.can_transition_to(PostStatus::Published));
        assert!(PostStatus::Pending.can_transition_to(PostStatus::Published));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            PostStatus::Pending,
            PostStatus::Scheduled,
            PostStatus::Processing,
            PostStatus::Published,
            PostStatus::Partial,
            PostStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<PostStatus>().unwrap(), s);
        }
        assert!("done".parse::<PostStatus>().is_err());
    }

    #[test]
    fn new_post_picks_status_from_schedule() {
        let now = Utc::now();
        let future = Post::new(
            "u1",
            "c1".into(),
            "hi",
            vec![],
            vec!["conn".into()],
            Some(now + Duration::hours(1)),
            now,
        );
        assert_eq!(future.status, PostStatus::Scheduled);
        assert!(future.respects_schedule(now));

        let immediate = Post::new("u1", "c1".into(), "hi", vec![], vec![], None, now);
        assert_eq!(immediate.status, PostStatus::Pending);
    }

    #[test]
    fn future_post_marked_processing_violates_schedule() {
        let now = Utc::now();
        let mut post = Post::new(
            "u1",
            "c1".into(),
            "hi",
            vec![],
            vec![],
            Some(now + Duration::minutes(5)),
            now,
        );
        post.status = PostStatus::Processing;
        assert!(!post.respects_schedule(now));
    }

    #[test]
    fn results_map_serialises_with_plain_keys() {
        let mut results = ResultsMap::new();
        results.insert(ConnectionId::from("conn-a"), err());
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["conn-a"]["success"], false);
        assert_eq!(json["conn-a"]["error_code"], "PLATFORM_REJECTED");
        assert!(json["conn-a"].get("response").is_none());
    }

    #[test]
    fn credential_debug_hides_token() {
        let cred = Credential {
            access_token: "secret-token".to_string(),
            page_id: Some("p1".to_string()),
            business_id: None,
        };
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("p1"));
    }
}
