use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use herald_core::config::HeraldConfig;
use herald_core::PlatformKind;

use crate::error::Result;
use crate::feed::FeedPublisher;
use crate::poll::PollPolicy;
use crate::publisher::PlatformPublisher;
use crate::readiness::ReadinessPoller;
use crate::staged::StagedMediaPublisher;
use crate::transport::GraphClient;

/// Platform adapters keyed by the family they serve.
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: HashMap<PlatformKind, Arc<dyn PlatformPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under [`PlatformPublisher::platform`], replacing any
    /// adapter already registered for that family.
    pub fn register(&mut self, publisher: Arc<dyn PlatformPublisher>) {
        let platform = publisher.platform();
        info!(%platform, "registering publisher");
        self.publishers.insert(platform, publisher);
    }

    pub fn with(mut self, publisher: Arc<dyn PlatformPublisher>) -> Self {
        self.register(publisher);
        self
    }

    pub fn get(&self, platform: PlatformKind) -> Option<Arc<dyn PlatformPublisher>> {
        self.publishers.get(&platform).cloned()
    }

    /// Registered families, sorted for deterministic output.
    pub fn platforms(&self) -> Vec<PlatformKind> {
        let mut platforms: Vec<PlatformKind> = self.publishers.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    /// Build the production adapters over HTTP from config.
    ///
    /// `cancel` aborts readiness waits on shutdown.
    pub fn from_config(config: &HeraldConfig, cancel: CancellationToken) -> Result<Self> {
        let timeout = std::time::Duration::from_secs(config.graph.request_timeout_secs);
        let facebook = Arc::new(GraphClient::new(&config.graph.facebook_base_url, timeout)?);
        let instagram = Arc::new(GraphClient::new(&config.graph.instagram_base_url, timeout)?);

        let poller = ReadinessPoller::new(
            instagram.clone(),
            PollPolicy::new(config.readiness.interval(), config.readiness.max_attempts),
        )
        .with_cancellation(cancel);

        Ok(Self::new()
            .with(Arc::new(FeedPublisher::new(facebook)))
            .with(Arc::new(StagedMediaPublisher::new(instagram, poller))))
    }
}
