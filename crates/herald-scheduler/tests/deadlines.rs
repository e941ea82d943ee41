//! The default target deadline against a slow carousel, on a paused clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};

use herald_core::config::HeraldConfig;
use herald_core::{Client, ConnectionId, DuePost, MediaRef, PlatformConnection, PlatformKind, PostStatus};
use herald_publish::{GraphTransport, PollPolicy, PublisherRegistry, ReadinessPoller, StagedMediaPublisher};
use herald_scheduler::{PublishDispatcher, SqliteDirectory};

const STATUS_LATENCY: Duration = Duration::from_millis(150);

/// Children turn ready on the last allowed check; the parent never does.
/// Every status read takes [`STATUS_LATENCY`].
struct SlowCarousel {
    ready_on: u32,
    created: Mutex<Vec<String>>,
    polls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl GraphTransport for SlowCarousel {
    async fn post(&self, path: &str, _token: &str, params: &Value) -> herald_publish::Result<Value> {
        let mut created = self.created.lock().unwrap();
        let id = format!("container-{}", created.len() + 1);
        if path.ends_with("/media") {
            let role = if params["media_type"] == "CAROUSEL" { "parent" } else { "child" };
            created.push(format!("{role}:{id}"));
        }
        Ok(json!({ "id": id }))
    }

    async fn get(&self, path: &str, _token: &str, _fields: &str) -> herald_publish::Result<Value> {
        tokio::time::sleep(STATUS_LATENCY).await;
        let is_parent = self
            .created
            .lock()
            .unwrap()
            .contains(&format!("parent:{path}"));
        let mut polls = self.polls.lock().unwrap();
        let seen = polls.entry(path.to_string()).or_insert(0);
        *seen += 1;
        let status = if !is_parent && *seen >= self.ready_on {
            "FINISHED"
        } else {
            "IN_PROGRESS"
        };
        Ok(json!({ "id": path, "status_code": status }))
    }
}

async fn publish_slow_carousel(config: &HeraldConfig) -> herald_core::TargetResult {
    let graph = Arc::new(SlowCarousel {
        ready_on: config.readiness.max_attempts,
        created: Mutex::default(),
        polls: Mutex::default(),
    });
    let poller = ReadinessPoller::new(
        graph.clone(),
        PollPolicy::new(config.readiness.interval(), config.readiness.max_attempts),
    );
    let registry = PublisherRegistry::new().with(Arc::new(StagedMediaPublisher::new(graph, poller)));

    let directory = Arc::new(SqliteDirectory::new(Connection::open_in_memory().unwrap()).unwrap());
    directory
        .upsert_client(&Client {
            id: "client-1".into(),
            name: "Acme".to_string(),
            active: true,
        })
        .unwrap();
    directory
        .upsert_connection(
            &PlatformConnection {
                id: "conn-ig".into(),
                client_id: "client-1".into(),
                platform: PlatformKind::Instagram,
                page_id: Some("page-1".to_string()),
                business_id: Some("biz-1".to_string()),
                display_name: None,
                active: true,
            },
            "ig-token",
        )
        .unwrap();

    let dispatcher = PublishDispatcher::new(Arc::new(registry), directory.clone(), directory)
        .with_target_timeout(config.scheduler.target_timeout());
    let post = DuePost {
        id: "post-1".into(),
        user_id: "user-1".to_string(),
        client_id: "client-1".into(),
        content: "slow upload".to_string(),
        media: vec![
            MediaRef::image("https://cdn.example.com/1.jpg"),
            MediaRef::image("https://cdn.example.com/2.jpg"),
        ],
        targets: vec!["conn-ig".into()],
        scheduled_at: Some(Utc::now()),
    };

    let dispatch = dispatcher.dispatch(&post).await;
    assert_eq!(dispatch.status, PostStatus::Failed);
    dispatch.results[&ConnectionId::from("conn-ig")].clone()
}

#[tokio::test(start_paused = true)]
async fn default_deadline_lets_the_parent_wait_run_out() {
    let config = HeraldConfig::default();
    let result = publish_slow_carousel(&config).await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("READINESS_TIMEOUT"));
}

#[tokio::test(start_paused = true)]
async fn deadline_of_one_readiness_budget_cuts_the_carousel_short() {
    let mut config = HeraldConfig::default();
    config.scheduler.target_timeout_secs = 600;
    assert!(!config.deadline_covers_readiness());

    let result = publish_slow_carousel(&config).await;
    assert_eq!(result.error_code.as_deref(), Some("DEADLINE_EXCEEDED"));
}
