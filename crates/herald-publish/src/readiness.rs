use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::poll::{poll_until, PollError, PollPolicy, PollStep};
use crate::transport::GraphTransport;

/// Processing state of an asynchronous media container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    Published,
    Error,
    Expired,
    /// Anything the platform adds later; treated as still in progress.
    Other(String),
}

impl ContainerStatus {
    pub fn parse(code: &str) -> Self {
        match code {
            "IN_PROGRESS" => ContainerStatus::InProgress,
            "FINISHED" => ContainerStatus::Finished,
            "PUBLISHED" => ContainerStatus::Published,
            "ERROR" => ContainerStatus::Error,
            "EXPIRED" => ContainerStatus::Expired,
            other => ContainerStatus::Other(other.to_string()),
        }
    }
}

/// Waits for media containers to finish processing.
///
/// Shared by single-media containers, carousel children and carousel parents.
pub struct ReadinessPoller {
    transport: Arc<dyn GraphTransport>,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl ReadinessPoller {
    pub fn new(transport: Arc<dyn GraphTransport>, policy: PollPolicy) -> Self {
        Self {
            transport,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort pending waits when `cancel` fires (process shutdown).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Return once `container_id` is ready to publish.
    ///
    /// `ERROR`/`EXPIRED` fail immediately; running out of attempts yields
    /// [`PublishError::ReadinessTimeout`].
    pub async fn wait_until_ready(&self, container_id: &str, token: &str) -> Result<()> {
        let outcome = poll_until(&self.policy, &self.cancel, |attempt| async move {
            let resp = self
                .transport
                .get(container_id, token, "status_code,status")
                .await?;
            let status = ContainerStatus::parse(status_code(&resp));
            debug!(%container_id, attempt, ?status, "container status");
            Ok::<_, PublishError>(match status {
                ContainerStatus::Finished | ContainerStatus::Published => PollStep::Done(()),
                ContainerStatus::Error | ContainerStatus::Expired => {
                    PollStep::Failed(failure_detail(&resp))
                }
                ContainerStatus::InProgress | ContainerStatus::Other(_) => PollStep::Pending,
            })
        })
        .await;

        match outcome {
            Ok(()) => {
                info!(%container_id, "container ready");
                Ok(())
            }
            Err(PollError::Failed(status)) => {
                warn!(%container_id, %status, "container processing failed");
                Err(PublishError::ContainerFailed {
                    container_id: container_id.to_string(),
                    status,
                })
            }
            Err(PollError::Exhausted { attempts }) => {
                warn!(%container_id, attempts, "container readiness timed out");
                Err(PublishError::ReadinessTimeout {
                    container_id: container_id.to_string(),
                    attempts,
                })
            }
            Err(PollError::Cancelled) => Err(PublishError::Cancelled),
            Err(PollError::Check(e)) => Err(e),
        }
    }
}

fn status_code(resp: &Value) -> &str {
    resp.get("status_code")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// `status_code` plus the platform's free-text `status` when it has one.
fn failure_detail(resp: &Value) -> String {
    let code = status_code(resp);
    match resp.get("status").and_then(Value::as_str) {
        Some(detail) if !detail.is_empty() && detail != code => format!("{code}: {detail}"),
        _ => code.to_string(),
    }
}
