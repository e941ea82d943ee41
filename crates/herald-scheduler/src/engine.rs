use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use herald_core::config::SchedulerConfig;
use herald_core::{DuePost, PostId, PostStatus, ResultsMap, TargetResult};

use crate::directory::ClientGate;
use crate::dispatcher::PublishDispatcher;
use crate::error::Result;
use crate::store::{ClaimOutcome, PostStore};

/// What a single [`Scheduler::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick of this scheduler was still running.
    Overlapped,
    NothingDue,
    /// The batch claim lost a race with another claimer; nothing was published.
    LostClaim { due: usize },
    Processed(TickReport),
}

/// Per-tick counters for a claimed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    pub published: usize,
    pub partial: usize,
    pub failed: usize,
    /// Short-circuited to `failed` because the client was suspended.
    pub suspended: usize,
    /// Published (or attempted) but the final state could not be stored.
    pub persist_errors: usize,
    /// Worker task panicked.
    pub crashed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Finalized(PostStatus::Published) => self.published += 1,
            PostOutcome::Finalized(PostStatus::Partial) => self.partial += 1,
            PostOutcome::Finalized(_) => self.failed += 1,
            PostOutcome::Suspended => self.suspended += 1,
            PostOutcome::PersistFailed => self.persist_errors += 1,
        }
    }
}

enum PostOutcome {
    Finalized(PostStatus),
    Suspended,
    PersistFailed,
}

/// Clears the running flag when the tick ends, including on early return.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handles one claimed post from gate check to finalize.
#[derive(Clone)]
struct PostWorker {
    store: Arc<dyn PostStore>,
    gate: Arc<dyn ClientGate>,
    dispatcher: Arc<PublishDispatcher>,
}

impl PostWorker {
    async fn process(&self, post: DuePost) -> PostOutcome {
        let (status, results, suspended) = match self.gate.is_active(&post.client_id).await {
            Ok(true) => {
                let dispatch = self.dispatcher.dispatch(&post).await;
                (dispatch.status, dispatch.results, false)
            }
            Ok(false) => {
                warn!(post_id = %post.id, client_id = %post.client_id, "client suspended; post not published");
                let results = fail_all(&post, "CLIENT_SUSPENDED", "client is suspended");
                (PostStatus::Failed, results, true)
            }
            Err(e) => {
                // Unverifiable clients are treated as suspended.
                error!(post_id = %post.id, client_id = %post.client_id, error = %e, "client gate lookup failed");
                let results = fail_all(
                    &post,
                    "CLIENT_UNVERIFIED",
                    format!("client status could not be verified: {e}"),
                );
                (PostStatus::Failed, results, true)
            }
        };

        match self.store.finalize(&post.id, status, &results).await {
            Ok(()) => {
                info!(post_id = %post.id, %status, targets = results.len(), "post finalized");
                if suspended {
                    PostOutcome::Suspended
                } else {
                    PostOutcome::Finalized(status)
                }
            }
            Err(e) => {
                // Side effects may already be public; leave the post in
                // `processing` for manual reconciliation.
                error!(
                    post_id = %post.id,
                    %status,
                    error = %e,
                    "failed to persist post outcome; post left in processing"
                );
                PostOutcome::PersistFailed
            }
        }
    }
}

fn fail_all(post: &DuePost, code: &str, message: impl Into<String>) -> ResultsMap {
    let message = message.into();
    post.targets
        .iter()
        .map(|target| (target.clone(), TargetResult::failed(code, message.clone())))
        .collect()
}

/// Timer-driven publisher of due posts.
///
/// Each tick finds due posts, claims them in one atomic batch, re-checks the
/// owning client and dispatches every post on its own task, bounded by
/// `max_concurrent_posts`. Overlapping ticks of the same instance are skipped.
pub struct Scheduler {
    worker: PostWorker,
    max_concurrent_posts: usize,
    tick_interval: Duration,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn PostStore>,
        gate: Arc<dyn ClientGate>,
        dispatcher: Arc<PublishDispatcher>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            worker: PostWorker {
                store,
                gate,
                dispatcher,
            },
            max_concurrent_posts: config.max_concurrent_posts.max(1),
            tick_interval: config.tick_interval(),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Share `cancel` with the publishers so shutdown aborts readiness waits.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one scheduling pass.
    ///
    /// Only store failures before the claim surface as `Err`; per-post
    /// problems are logged and counted in the [`TickReport`].
    pub async fn tick(&self) -> Result<TickOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("previous tick still running; skipping");
            return Ok(TickOutcome::Overlapped);
        };

        let due = self.worker.store.find_due(Utc::now()).await?;
        if due.is_empty() {
            debug!("no posts due");
            return Ok(TickOutcome::NothingDue);
        }

        let ids: Vec<PostId> = due.iter().map(|p| p.id.clone()).collect();
        if self.worker.store.claim_batch(&ids).await? == ClaimOutcome::AlreadyClaimed {
            return Ok(TickOutcome::LostClaim { due: due.len() });
        }
        info!(count = due.len(), "claimed due posts");

        let mut report = TickReport {
            claimed: due.len(),
            ..TickReport::default()
        };
        let permits = Arc::new(Semaphore::new(self.max_concurrent_posts));
        let mut tasks = JoinSet::new();
        for post in due {
            let worker = self.worker.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                worker.process(post).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "post task crashed; post left in processing");
                    report.crashed += 1;
                }
            }
        }

        info!(
            claimed = report.claimed,
            published = report.published,
            partial = report.partial,
            failed = report.failed,
            suspended = report.suspended,
            persist_errors = report.persist_errors,
            crashed = report.crashed,
            "tick complete"
        );
        Ok(TickOutcome::Processed(report))
    }

    /// Log posts stranded in `processing` by a previous run. They are never
    /// re-queued: their side effects may already be public.
    pub async fn report_in_flight(&self) -> usize {
        match self.worker.store.find_in_flight().await {
            Ok(ids) if !ids.is_empty() => {
                for id in &ids {
                    warn!(post_id = %id, "post still processing from a previous run; needs reconciliation");
                }
                ids.len()
            }
            Ok(_) => 0,
            Err(e) => {
                error!("in-flight scan failed: {e}");
                0
            }
        }
    }

    /// Tick every `tick_interval` until `shutdown` broadcasts `true`.
    ///
    /// Each tick runs on its own task so a slow tick never delays the timer;
    /// the running flag turns the late one into a no-op. On shutdown the
    /// publishers are cancelled and every tick still in flight is awaited, so
    /// claimed posts get their final state written before this returns.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            max_concurrent_posts = self.max_concurrent_posts,
            "scheduler started"
        );
        self.report_in_flight().await;

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = JoinSet::new();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let this = Arc::clone(&self);
                    ticks.spawn(async move {
                        if let Err(e) = this.tick().await {
                            error!("scheduler tick error: {e}");
                        }
                    });
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    log_tick_exit(joined);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(in_flight = ticks.len(), "scheduler shutting down");
                        self.cancel.cancel();
                        break;
                    }
                }
            }
        }

        while let Some(joined) = ticks.join_next().await {
            log_tick_exit(joined);
        }
        info!("scheduler stopped");
    }
}

fn log_tick_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "scheduler tick crashed");
    }
}
