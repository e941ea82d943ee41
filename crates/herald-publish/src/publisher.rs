use async_trait::async_trait;
use serde_json::Value;

use herald_core::{Credential, MediaRef, PlatformConnection, PlatformKind};

use crate::error::Result;

/// One target's worth of input for a publish attempt.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub connection: &'a PlatformConnection,
    pub credential: &'a Credential,
    pub text: &'a str,
    pub media: &'a [MediaRef],
}

impl<'a> PublishRequest<'a> {
    /// Page id from the resolved credential, falling back to the connection record.
    pub fn page_id(&self) -> Option<&'a str> {
        self.credential
            .page_id
            .as_deref()
            .or(self.connection.page_id.as_deref())
    }

    /// Business account id, same precedence as [`page_id`](Self::page_id).
    pub fn business_id(&self) -> Option<&'a str> {
        self.credential
            .business_id
            .as_deref()
            .or(self.connection.business_id.as_deref())
    }

    pub fn token(&self) -> &'a str {
        &self.credential.access_token
    }
}

/// Common interface implemented by every platform adapter.
///
/// Adding a platform means one new implementation registered in the
/// [`PublisherRegistry`](crate::registry::PublisherRegistry); the dispatcher
/// never branches on platform quirks itself.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// The platform family this adapter serves; used as the registry key.
    fn platform(&self) -> PlatformKind;

    /// Publish `req.text` with `req.media` and return the platform's raw response.
    ///
    /// All-or-nothing per target: on error nothing partial has been made public.
    async fn publish(&self, req: &PublishRequest<'_>) -> Result<Value>;
}
