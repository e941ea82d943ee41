//! Container-based platform family: every media item becomes a container the
//! platform processes asynchronously, and only a ready container can be published.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::{json, Value};
use tracing::{debug, info};

use herald_core::{MediaRef, PlatformKind};

use crate::error::{PublishError, Result};
use crate::publisher::{PlatformPublisher, PublishRequest};
use crate::readiness::ReadinessPoller;
use crate::transport::{response_id, GraphTransport};

/// Platform limit on carousel children.
pub const CAROUSEL_MAX_ITEMS: usize = 10;

pub struct StagedMediaPublisher {
    transport: Arc<dyn GraphTransport>,
    poller: ReadinessPoller,
}

impl StagedMediaPublisher {
    pub fn new(transport: Arc<dyn GraphTransport>, poller: ReadinessPoller) -> Self {
        Self { transport, poller }
    }

    async fn create_container(&self, account: &str, token: &str, params: Value) -> Result<String> {
        let resp = self
            .transport
            .post(&format!("{account}/media"), token, &params)
            .await?;
        let id = response_id(&resp)?;
        debug!(%account, container_id = %id, "container created");
        Ok(id)
    }

    async fn publish_container(&self, account: &str, token: &str, creation_id: &str) -> Result<Value> {
        self.transport
            .post(
                &format!("{account}/media_publish"),
                token,
                &json!({ "creation_id": creation_id }),
            )
            .await
    }

    async fn publish_single(
        &self,
        account: &str,
        token: &str,
        caption: &str,
        media: &MediaRef,
    ) -> Result<Value> {
        let params = if media.is_video() {
            json!({ "video_url": media.url, "media_type": "REELS", "caption": caption })
        } else {
            json!({ "image_url": media.url, "caption": caption })
        };
        let id = self.create_container(account, token, params).await?;
        self.poller.wait_until_ready(&id, token).await?;
        self.publish_container(account, token, &id).await
    }

    /// Create and wait for one carousel child. Children carry no caption.
    async fn ready_child(&self, account: &str, token: &str, media: &MediaRef) -> Result<String> {
        let params = if media.is_video() {
            json!({ "video_url": media.url, "media_type": "VIDEO", "is_carousel_item": true })
        } else {
            json!({ "image_url": media.url, "is_carousel_item": true })
        };
        let id = self.create_container(account, token, params).await?;
        self.poller.wait_until_ready(&id, token).await?;
        Ok(id)
    }

    /// Children are created and awaited concurrently; the parent is only
    /// created once every child is ready, and only published once it is
    /// ready itself. The first child failure drops the remaining waits.
    async fn publish_carousel(
        &self,
        account: &str,
        token: &str,
        caption: &str,
        media: &[MediaRef],
    ) -> Result<Value> {
        let children = try_join_all(media.iter().map(|m| self.ready_child(account, token, m))).await?;
        info!(%account, children = children.len(), "carousel children ready");

        let parent = self
            .create_container(
                account,
                token,
                json!({
                    "media_type": "CAROUSEL",
                    "children": children.join(","),
                    "caption": caption,
                }),
            )
            .await?;
        self.poller.wait_until_ready(&parent, token).await?;
        self.publish_container(account, token, &parent).await
    }
}

#[async_trait]
impl PlatformPublisher for StagedMediaPublisher {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    async fn publish(&self, req: &PublishRequest<'_>) -> Result<Value> {
        let account = req.business_id().ok_or(PublishError::MissingIdentifier {
            platform: "instagram",
            field: "business_id",
        })?;
        let token = req.token();

        let resp = match req.media {
            [] => {
                return Err(PublishError::MediaRequired {
                    platform: "instagram",
                })
            }
            [single] => self.publish_single(account, token, req.text, single).await?,
            many if many.len() > CAROUSEL_MAX_ITEMS => {
                return Err(PublishError::CarouselTooLarge {
                    count: many.len(),
                    max: CAROUSEL_MAX_ITEMS,
                })
            }
            many => self.publish_carousel(account, token, req.text, many).await?,
        };
        info!(connection = %req.connection.id, %account, media = req.media.len(), "media published");
        Ok(resp)
    }
}
