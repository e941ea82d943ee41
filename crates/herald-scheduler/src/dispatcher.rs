use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use herald_core::{ConnectionId, DuePost, PostStatus, ResultsMap, TargetResult};
use herald_publish::{PublishError, PublishRequest, PublisherRegistry};

use crate::directory::{ConnectionDirectory, CredentialStore};
use crate::error::SchedulerError;

/// Aggregate outcome of one post.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub status: PostStatus,
    pub results: ResultsMap,
}

/// Fans a post out to every target connection and aggregates the results.
///
/// Never fails as a whole: every per-target problem (missing connection,
/// credential error, platform rejection, deadline) becomes a failed
/// [`TargetResult`] keyed by that target.
pub struct PublishDispatcher {
    registry: Arc<PublisherRegistry>,
    connections: Arc<dyn ConnectionDirectory>,
    credentials: Arc<dyn CredentialStore>,
    target_timeout: Option<Duration>,
}

impl PublishDispatcher {
    pub fn new(
        registry: Arc<PublisherRegistry>,
        connections: Arc<dyn ConnectionDirectory>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            registry,
            connections,
            credentials,
            target_timeout: None,
        }
    }

    /// Bound every target publish by `timeout`. A zero duration disables the bound.
    pub fn with_target_timeout(mut self, timeout: Duration) -> Self {
        self.target_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub async fn dispatch(&self, post: &DuePost) -> Dispatch {
        // A repeated target id would publish twice and collide in the results map.
        let mut seen = HashSet::new();
        let targets: Vec<&ConnectionId> = post
            .targets
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .collect();
        if targets.len() < post.targets.len() {
            warn!(post_id = %post.id, "duplicate targets ignored");
        }

        let attempts = targets.iter().map(|target| async move {
            let result = match self.publish_target(post, target).await {
                Ok(response) => {
                    info!(post_id = %post.id, %target, "target published");
                    TargetResult::succeeded(response)
                }
                Err(e) => {
                    warn!(post_id = %post.id, %target, code = e.code(), error = %e, "target failed");
                    e.into_target_result()
                }
            };
            ((*target).clone(), result)
        });
        let results: ResultsMap = join_all(attempts).await.into_iter().collect();

        let status = PostStatus::aggregate(results.values());
        Dispatch { status, results }
    }

    async fn publish_target(
        &self,
        post: &DuePost,
        target: &ConnectionId,
    ) -> herald_publish::Result<serde_json::Value> {
        let connection = self
            .connections
            .find(target)
            .await
            .map_err(|e| PublishError::Lookup(e.to_string()))?
            .ok_or_else(|| PublishError::ConnectionNotFound {
                id: target.to_string(),
            })?;

        if connection.client_id != post.client_id {
            warn!(
                post_id = %post.id,
                %target,
                owner = %connection.client_id,
                "target belongs to another client"
            );
            return Err(PublishError::ConnectionNotFound {
                id: target.to_string(),
            });
        }
        if !connection.active {
            return Err(PublishError::ConnectionInactive {
                id: target.to_string(),
            });
        }

        let publisher = self
            .registry
            .get(connection.platform)
            .ok_or_else(|| PublishError::UnsupportedPlatform(connection.platform.to_string()))?;

        let credential = self.credentials.resolve(target).await.map_err(|e| match e {
            SchedulerError::CredentialUnavailable { reason, .. } => PublishError::Credential(reason),
            other => PublishError::Credential(other.to_string()),
        })?;

        let request = PublishRequest {
            connection: &connection,
            credential: &credential,
            text: &post.content,
            media: &post.media,
        };
        match self.target_timeout {
            Some(limit) => tokio::time::timeout(limit, publisher.publish(&request))
                .await
                .map_err(|_| PublishError::DeadlineExceeded {
                    secs: limit.as_secs(),
                })?,
            None => publisher.publish(&request).await,
        }
    }
}
