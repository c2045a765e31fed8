use async_trait::async_trait;
use futures::Stream;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_schema::ProgressUpdate;

use super::schedule::Backoff;
use crate::config::MonitorConfig;
use crate::error::{IsRetryable, QueryError, TaskError};
use crate::utils::logging::with_pretty_json_debug;

/// Fetches one progress snapshot of a task.
#[async_trait]
pub trait StatusQuery: Send + Sync {
    async fn query(&self, task_id: &str) -> Result<ProgressUpdate, QueryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries_per_tick: usize,
    /// Wait between in-place retries when the server supplies no retry interval.
    pub default_retry_after: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl MonitorOptions {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            max_retries_per_tick: cfg.max_retries_per_tick,
            default_retry_after: Duration::from_millis(cfg.default_retry_after_ms),
        }
    }

    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_retries_per_tick(mut self, max_retries_per_tick: usize) -> Self {
        self.max_retries_per_tick = max_retries_per_tick;
        self
    }

    pub fn with_default_retry_after(mut self, default_retry_after: Duration) -> Self {
        self.default_retry_after = default_retry_after;
        self
    }

    fn backoff(&self) -> Backoff {
        // A zero interval would never grow; poll at least once per millisecond.
        let floor = Duration::from_millis(1);
        Backoff::new(self.initial_delay.max(floor), self.max_delay.max(floor))
    }
}

/// Starts progress monitors over a shared [`StatusQuery`].
#[derive(Clone)]
pub struct TaskProgressMonitor {
    query: Arc<dyn StatusQuery>,
}

impl TaskProgressMonitor {
    pub fn new(query: Arc<dyn StatusQuery>) -> Self {
        Self { query }
    }

    /// Spawns the polling loop for `task_id`.
    ///
    /// The first query fires immediately. The returned subscription yields snapshots in
    /// tick order and ends after the first terminal item: a `completed`/`failed` snapshot
    /// or an `Err`. Must be called within a tokio runtime.
    pub fn start(&self, task_id: impl Into<String>, options: MonitorOptions) -> ProgressSubscription {
        let task_id = task_id.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);

        let backoff = options.backoff();
        info!(
            task_id = %task_id,
            initial_delay_ms = millis(backoff.current()),
            max_delay_ms = millis(backoff.max()),
            max_retries_per_tick = options.max_retries_per_tick,
            "Task progress monitor started"
        );

        let run = MonitorRun {
            query: self.query.clone(),
            state: TaskProgressState {
                task_id: task_id.clone(),
                backoff,
                tick: 0,
                attempt: 0,
            },
            options,
            tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(run.run());

        ProgressSubscription {
            task_id,
            rx: ReceiverStream::new(rx),
            cancel,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Per-monitor private state.
struct TaskProgressState {
    task_id: String,
    backoff: Backoff,
    tick: u64,
    /// Attempt number within the current tick, starting at 1.
    attempt: usize,
}

type ProgressItem = Result<ProgressUpdate, TaskError>;

struct MonitorRun {
    query: Arc<dyn StatusQuery>,
    state: TaskProgressState,
    options: MonitorOptions,
    tx: mpsc::Sender<ProgressItem>,
    cancel: CancellationToken,
}

impl MonitorRun {
    async fn run(mut self) {
        loop {
            if self.state.tick > 0 {
                let delay = self.state.backoff.next_delay();
                debug!(task_id = %self.state.task_id, delay_ms = millis(delay), "Waiting for next tick");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            self.state.tick += 1;

            let cancel = self.cancel.clone();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };
            // A result that resolved alongside a stop is discarded.
            if self.cancel.is_cancelled() {
                break;
            }

            let terminal = match &outcome {
                Ok(update) => update.is_terminal(),
                Err(_) => true,
            };
            if !self.deliver(outcome).await || terminal {
                break;
            }
        }

        info!(
            task_id = %self.state.task_id,
            ticks = self.state.tick,
            cancelled = self.cancel.is_cancelled(),
            "Task progress monitor finished"
        );
    }

    /// One tick: query, retrying service-unavailable answers in place.
    async fn tick(&mut self) -> ProgressItem {
        let task_id = self.state.task_id.clone();
        let mut retries = 0usize;
        loop {
            self.state.attempt = retries + 1;
            let err = match self.query.query(&task_id).await {
                Ok(mut update) => {
                    update.percentage = update.percentage.min(100);
                    with_pretty_json_debug(&update, |pretty| {
                        debug!(task_id = %task_id, tick = self.state.tick, snapshot = %pretty, "Progress snapshot");
                    });
                    return Ok(update);
                }
                Err(err) => err,
            };

            if err.is_not_found() {
                warn!(task_id = %task_id, error = %err, "Task not found; treating as expired");
                return Err(TaskError::task_expired(task_id, err));
            }

            if !err.is_retryable() {
                warn!(task_id = %task_id, error = %err, "Status query failed");
                return Err(TaskError::Unclassified(err));
            }

            if retries >= self.options.max_retries_per_tick {
                warn!(
                    task_id = %task_id,
                    attempts = self.state.attempt,
                    error = %err,
                    "Status query retry budget exhausted"
                );
                return Err(TaskError::TransientServiceUnavailable {
                    attempts: self.state.attempt,
                    last: err,
                });
            }

            retries += 1;
            let wait = err.retry_after.unwrap_or(self.options.default_retry_after);
            warn!(
                task_id = %task_id,
                attempt = self.state.attempt,
                retry_in_ms = millis(wait),
                error = %err,
                "Task service unavailable; retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Returns false when nothing can be delivered anymore (stopped or subscriber gone).
    async fn deliver(&self, item: ProgressItem) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }
}

/// Cloneable handle that stops a monitor from anywhere.
#[derive(Debug, Clone)]
pub struct MonitorStopper {
    cancel: CancellationToken,
}

impl MonitorStopper {
    /// Idempotent; a no-op once the monitor has finished.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Ordered stream of progress snapshots for one task.
///
/// Once stopped it yields nothing further, including items already buffered. Dropping
/// the subscription stops the monitor.
#[derive(Debug)]
pub struct ProgressSubscription {
    task_id: String,
    rx: ReceiverStream<ProgressItem>,
    cancel: CancellationToken,
}

impl ProgressSubscription {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stopper(&self) -> MonitorStopper {
        MonitorStopper {
            cancel: self.cancel.clone(),
        }
    }
}

impl Stream for ProgressSubscription {
    type Item = ProgressItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        Pin::new(&mut this.rx).poll_next(cx)
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
