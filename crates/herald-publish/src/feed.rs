//! Direct-publish platform family: one call for text, photo or video posts,
//! unpublished uploads plus one feed call for albums.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::{json, Value};
use tracing::{debug, info};

use herald_core::{MediaRef, PlatformKind};

use crate::error::{PublishError, Result};
use crate::publisher::{PlatformPublisher, PublishRequest};
use crate::transport::{response_id, GraphTransport};

pub struct FeedPublisher {
    transport: Arc<dyn GraphTransport>,
}

impl FeedPublisher {
    pub fn new(transport: Arc<dyn GraphTransport>) -> Self {
        Self { transport }
    }

    async fn publish_text(&self, page_id: &str, token: &str, text: &str) -> Result<Value> {
        self.transport
            .post(&format!("{page_id}/feed"), token, &json!({ "message": text }))
            .await
    }

    /// Single media item. Videos take the text as `description`, photos as `caption`.
    async fn publish_single(
        &self,
        page_id: &str,
        token: &str,
        text: &str,
        media: &MediaRef,
    ) -> Result<Value> {
        if media.is_video() {
            self.transport
                .post(
                    &format!("{page_id}/videos"),
                    token,
                    &json!({ "file_url": media.url, "description": text }),
                )
                .await
        } else {
            self.transport
                .post(
                    &format!("{page_id}/photos"),
                    token,
                    &json!({ "url": media.url, "caption": text }),
                )
                .await
        }
    }

    /// Upload without publishing; the returned id is attached to the album post.
    async fn upload_unpublished(&self, page_id: &str, token: &str, media: &MediaRef) -> Result<String> {
        let (path, params) = if media.is_video() {
            (
                format!("{page_id}/videos"),
                json!({ "file_url": media.url, "published": false }),
            )
        } else {
            (
                format!("{page_id}/photos"),
                json!({ "url": media.url, "published": false }),
            )
        };
        let resp = self.transport.post(&path, token, &params).await?;
        let id = response_id(&resp)?;
        debug!(%page_id, media_id = %id, "album item uploaded");
        Ok(id)
    }

    /// Upload every item concurrently, then one feed post referencing them all.
    /// Any failed upload aborts before the feed call.
    async fn publish_album(
        &self,
        page_id: &str,
        token: &str,
        text: &str,
        media: &[MediaRef],
    ) -> Result<Value> {
        let ids = try_join_all(
            media
                .iter()
                .map(|m| self.upload_unpublished(page_id, token, m)),
        )
        .await?;

        let attached: Vec<Value> = ids.iter().map(|id| json!({ "media_fbid": id })).collect();
        self.transport
            .post(
                &format!("{page_id}/feed"),
                token,
                &json!({ "message": text, "attached_media": attached }),
            )
            .await
    }
}

#[async_trait]
impl PlatformPublisher for FeedPublisher {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    async fn publish(&self, req: &PublishRequest<'_>) -> Result<Value> {
        let page_id = req.page_id().ok_or(PublishError::MissingIdentifier {
            platform: "facebook",
            field: "page_id",
        })?;
        let token = req.token();

        let resp = match req.media {
            [] => self.publish_text(page_id, token, req.text).await?,
            [single] => self.publish_single(page_id, token, req.text, single).await?,
            many => self.publish_album(page_id, token, req.text, many).await?,
        };
        info!(connection = %req.connection.id, %page_id, media = req.media.len(), "feed post published");
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGraph;
    use herald_core::{Credential, PlatformConnection};

    fn connection() -> PlatformConnection {
        PlatformConnection {
            id: "conn-fb".into(),
            client_id: "client-1".into(),
            platform: PlatformKind::Facebook,
            page_id: Some("page-1".to_string()),
            business_id: None,
            display_name: None,
            active: true,
        }
    }

    fn credential() -> Credential {
        Credential {
            access_token: "tok".to_string(),
            page_id: Some("page-1".to_string()),
            business_id: None,
        }
    }

    async fn run(graph: &Arc<FakeGraph>, text: &str, media: &[MediaRef]) -> Result<Value> {
        let conn = connection();
        let cred = credential();
        FeedPublisher::new(graph.clone())
            .publish(&PublishRequest {
                connection: &conn,
                credential: &cred,
                text,
                media,
            })
            .await
    }

    #[tokio::test]
    async fn text_only_is_one_feed_call() {
        let graph = Arc::new(FakeGraph::new());
        run(&graph, "hello", &[]).await.unwrap();

        let posts = graph.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "page-1/feed");
        assert_eq!(posts[0].1["message"], "hello");
    }

    #[tokio::test]
    async fn single_video_uses_description_not_caption() {
        let graph = Arc::new(FakeGraph::new());
        run(&graph, "watch", &[MediaRef::video("https://cdn/v.mp4")])
            .await
            .unwrap();

        let posts = graph.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "page-1/videos");
        assert_eq!(posts[0].1["description"], "watch");
        assert_eq!(posts[0].1["file_url"], "https://cdn/v.mp4");
        assert!(posts[0].1.get("caption").is_none());
    }

    #[tokio::test]
    async fn single_image_uses_caption() {
        let graph = Arc::new(FakeGraph::new());
        run(&graph, "look", &[MediaRef::image("https://cdn/a.jpg")])
            .await
            .unwrap();

        let posts = graph.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "page-1/photos");
        assert_eq!(posts[0].1["caption"], "look");
        assert!(posts[0].1.get("description").is_none());
    }

    #[tokio::test]
    async fn album_uploads_unpublished_then_one_feed_call() {
        let graph = Arc::new(FakeGraph::new());
        let media = [
            MediaRef::image("https://cdn/1.jpg"),
            MediaRef::image("https://cdn/2.jpg"),
            MediaRef::image("https://cdn/3.jpg"),
        ];
        run(&graph, "album", &media).await.unwrap();

        let posts = graph.posts();
        assert_eq!(posts.len(), 4);
        let uploads = &posts[..3];
        for (path, params) in uploads {
            assert_eq!(path, "page-1/photos");
            assert_eq!(params["published"], false);
            assert!(params.get("caption").is_none());
        }

        let (path, params) = &posts[3];
        assert_eq!(path, "page-1/feed");
        assert_eq!(params["message"], "album");
        let attached: Vec<&str> = params["attached_media"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["media_fbid"].as_str().unwrap())
            .collect();
        assert_eq!(attached, vec!["id-1", "id-2", "id-3"]);
    }

    #[tokio::test]
    async fn failed_album_upload_skips_feed_call() {
        let graph = Arc::new(FakeGraph::new());
        graph.reject("bad.jpg");
        let media = [
            MediaRef::image("https://cdn/ok.jpg"),
            MediaRef::image("https://cdn/bad.jpg"),
        ];
        let err = run(&graph, "album", &media).await.unwrap_err();

        assert_eq!(err.code(), "PLATFORM_REJECTED");
        assert!(graph.posts().iter().all(|(path, _)| path != "page-1/feed"));
    }

    #[tokio::test]
    async fn missing_page_id_fails_without_calls() {
        let graph = Arc::new(FakeGraph::new());
        let mut conn = connection();
        conn.page_id = None;
        let cred = Credential {
            access_token: "tok".to_string(),
            page_id: None,
            business_id: None,
        };
        let err = FeedPublisher::new(graph.clone())
            .publish(&PublishRequest {
                connection: &conn,
                credential: &cred,
                text: "hi",
                media: &[],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_IDENTIFIER");
        assert!(graph.calls().is_empty());
    }
}
