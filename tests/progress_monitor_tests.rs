use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use vigil::error::{QueryError, TaskError};
use vigil::progress::{MonitorOptions, StatusQuery, TaskProgressMonitor};
use vigil::{ProgressUpdate, TaskStatus};

type Answer = Result<ProgressUpdate, QueryError>;

/// Answers queries from a fixed script and records when each query happened.
struct ScriptedQuery {
    answers: Mutex<VecDeque<Answer>>,
    calls: Mutex<Vec<Instant>>,
    latency: Duration,
}

impl ScriptedQuery {
    fn new(answers: impl IntoIterator<Item = Answer>) -> Arc<Self> {
        Self::with_latency(answers, Duration::ZERO)
    }

    fn with_latency(answers: impl IntoIterator<Item = Answer>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            latency,
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive queries.
    fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl StatusQuery for ScriptedQuery {
    async fn query(&self, _task_id: &str) -> Answer {
        self.calls.lock().unwrap().push(Instant::now());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.answers.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(QueryError::opaque("script exhausted")))
    }
}

fn processing(pct: u8) -> Answer {
    Ok(ProgressUpdate::new("task-1", TaskStatus::Processing, pct))
}

fn completed() -> Answer {
    Ok(ProgressUpdate::new("task-1", TaskStatus::Completed, 100))
}

fn unavailable() -> Answer {
    Err(QueryError::new(StatusCode::SERVICE_UNAVAILABLE, "busy"))
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn options(initial: u64, max: u64) -> MonitorOptions {
    MonitorOptions::default()
        .with_delays(ms(initial), ms(max))
        .with_default_retry_after(ms(2000))
}

fn assert_gaps(actual: &[Duration], expected_micros: &[u64]) {
    assert_eq!(actual.len(), expected_micros.len(), "gaps: {actual:?}");
    for (gap, expected) in actual.iter().zip(expected_micros) {
        let expected = Duration::from_micros(*expected);
        let diff = if *gap > expected { *gap - expected } else { expected - *gap };
        assert!(diff <= ms(1), "gap {gap:?} differs from {expected:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn delivers_snapshots_in_order_and_stops_after_completion() {
    let query = ScriptedQuery::new([processing(30), processing(70), completed()]);
    let monitor = TaskProgressMonitor::new(query.clone());

    let updates: Vec<_> = monitor
        .start("task-1", options(100, 1000))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|item| item.expect("no error").percentage)
        .collect();

    assert_eq!(updates, vec![30, 70, 100]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(query.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn first_query_is_immediate_and_intervals_grow_to_the_ceiling() {
    let started = Instant::now();
    let mut script: Vec<Answer> = (0..8).map(|i| processing(i * 10)).collect();
    script.push(completed());
    let query = ScriptedQuery::new(script);

    let items = TaskProgressMonitor::new(query.clone())
        .start("task-1", options(100, 1000))
        .collect::<Vec<_>>()
        .await;

    assert_eq!(items.len(), 9);
    assert_eq!(query.calls.lock().unwrap()[0], started);
    assert_gaps(
        &query.gaps(),
        &[100_000, 150_000, 225_000, 337_500, 506_250, 759_375, 1_000_000, 1_000_000],
    );
}

#[tokio::test(start_paused = true)]
async fn not_found_is_task_expired_without_retry() {
    let query = ScriptedQuery::new([
        processing(10),
        Err(QueryError::new(StatusCode::NOT_FOUND, "no such task").with_code("TASK_NOT_FOUND")),
    ]);

    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));

    assert_eq!(progress.next().await.unwrap().unwrap().percentage, 10);
    let err = progress.next().await.unwrap().expect_err("expired");
    match &err {
        TaskError::TaskExpired {
            task_id,
            summary,
            description,
            ..
        } => {
            assert_eq!(task_id, "task-1");
            assert_eq!(summary, "Task expired");
            assert!(description.contains("Start a new generation"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert!(progress.next().await.is_none());
    assert_eq!(query.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn service_unavailable_is_retried_until_budget_is_spent() {
    let query = ScriptedQuery::new([unavailable(), unavailable(), unavailable(), completed()]);
    let options = options(100, 1000).with_max_retries_per_tick(2);

    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options);

    let err = progress.next().await.unwrap().expect_err("budget exhausted");
    assert!(
        matches!(err, TaskError::TransientServiceUnavailable { attempts: 3, .. }),
        "unexpected error: {err:?}"
    );
    assert!(progress.next().await.is_none());
    assert_eq!(query.call_count(), 3);
    assert_gaps(&query.gaps(), &[2_000_000, 2_000_000]);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_then_schedule_resumes() {
    let query = ScriptedQuery::new([
        processing(10),
        Err(QueryError::new(StatusCode::SERVICE_UNAVAILABLE, "busy").with_retry_after(ms(500))),
        processing(55),
        completed(),
    ]);

    let updates: Vec<u8> = TaskProgressMonitor::new(query.clone())
        .start("task-1", options(100, 1000))
        .map(|item| item.expect("no error").percentage)
        .collect()
        .await;

    assert_eq!(updates, vec![10, 55, 100]);
    // tick 1, tick 2 (503), in-place retry after the hint, tick 3
    assert_gaps(&query.gaps(), &[100_000, 500_000, 150_000]);
}

#[tokio::test(start_paused = true)]
async fn other_errors_are_delivered_unclassified() {
    let query = ScriptedQuery::new([Err(QueryError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "boom",
    ))]);

    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));

    let err = progress.next().await.unwrap().expect_err("error delivered");
    assert!(matches!(err, TaskError::Unclassified(ref e) if e.status == Some(StatusCode::INTERNAL_SERVER_ERROR)));
    assert!(progress.next().await.is_none());
    assert_eq!(query.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_status_is_terminal() {
    let query = ScriptedQuery::new([
        processing(40),
        Ok(ProgressUpdate::new("task-1", TaskStatus::Failed, 40)),
        processing(50),
    ]);

    let items = TaskProgressMonitor::new(query.clone())
        .start("task-1", options(100, 1000))
        .collect::<Vec<_>>()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[1].as_ref().unwrap().status, TaskStatus::Failed);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(query.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_stream_and_polling() {
    let query = ScriptedQuery::new((0..10).map(|i| processing(i * 5)));
    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));

    assert_eq!(progress.next().await.unwrap().unwrap().percentage, 0);
    progress.stop();
    progress.stop();
    assert!(progress.is_stopped());
    assert!(progress.next().await.is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(query.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stopper_handle_stops_from_another_task() {
    let query = ScriptedQuery::new((0..10).map(|i| processing(i * 5)));
    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));
    let stopper = progress.stopper();

    tokio::spawn(async move {
        tokio::time::sleep(ms(120)).await;
        stopper.stop();
    });

    let mut seen = Vec::new();
    while let Some(item) = progress.next().await {
        seen.push(item.unwrap().percentage);
    }

    assert_eq!(seen, vec![0, 5]);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(query.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn result_arriving_after_stop_is_discarded() {
    let query = ScriptedQuery::with_latency([completed()], Duration::from_secs(1));
    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));

    tokio::time::sleep(ms(500)).await;
    assert_eq!(query.call_count(), 1);
    progress.stop();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(progress.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_after_completion_is_a_noop() {
    let query = ScriptedQuery::new([completed()]);
    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));

    assert!(progress.next().await.unwrap().unwrap().is_terminal());
    assert!(progress.next().await.is_none());
    progress.stop();
    assert!(progress.next().await.is_none());
    assert_eq!(progress.task_id(), "task-1");
}

#[tokio::test(start_paused = true)]
async fn dropping_the_subscription_stops_polling() {
    let query = ScriptedQuery::new((0..10).map(|i| processing(i * 5)));
    let mut progress = TaskProgressMonitor::new(query.clone()).start("task-1", options(100, 1000));

    progress.next().await.unwrap().unwrap();
    drop(progress);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(query.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn monitors_for_different_tasks_are_independent() {
    let fast = ScriptedQuery::new([processing(50), completed()]);
    let slow = ScriptedQuery::new([processing(1), processing(2), processing(3)]);

    let mut a = TaskProgressMonitor::new(fast.clone()).start("task-a", options(100, 1000));
    let mut b = TaskProgressMonitor::new(slow.clone()).start("task-b", options(300, 1000));

    assert_eq!(a.next().await.unwrap().unwrap().percentage, 50);
    assert_eq!(b.next().await.unwrap().unwrap().percentage, 1);
    b.stop();

    assert!(a.next().await.unwrap().unwrap().is_terminal());
    assert!(a.next().await.is_none());
    assert_eq!(slow.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn default_options_end_to_end() {
    let query = ScriptedQuery::new([processing(10), unavailable(), processing(55), completed()]);

    let items = TaskProgressMonitor::new(query.clone())
        .start("task-1", MonitorOptions::default())
        .collect::<Vec<_>>()
        .await;

    let percentages: Vec<u8> = items
        .into_iter()
        .map(|item| item.expect("no error").percentage)
        .collect();
    assert_eq!(percentages, vec![10, 55, 100]);

    // 1s to tick 2, the 2s default retry wait, then 1.5s to tick 3.
    assert_gaps(&query.gaps(), &[1_000_000, 2_000_000, 1_500_000]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(query.call_count(), 4);
}
