//! Worker pool draining the job queue.
//!
//! A fixed number of workers claim items one at a time, run them through
//! a [`JobRunner`], and write the outcome back to the queue. Retryable
//! failures are reset with an exponential-backoff gate; once attempts are
//! exhausted (or the error is not retryable) the runner is told to mark
//! the owning record failed so the job never shows `processing` forever.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};

use super::{JobKind, JobQueue, QueueItem, RetryPolicy};

/// Executes claimed jobs. Implementations must be idempotent per job:
/// a worker crash between doing the work and acknowledging the item means
/// the same job can run again later.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job to completion
    async fn run(&self, kind: &JobKind) -> Result<()>;

    /// Mark the owning record as failed once the queue gives up on the
    /// item, so callers polling the record see a terminal status
    async fn abandon(&self, kind: &JobKind, error: &PipelineError) -> Result<()>;
}

/// A fixed-size pool of queue workers
pub struct WorkerPool {
    queue: JobQueue,
    runner: Arc<dyn JobRunner>,
    workers: usize,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl WorkerPool {
    pub fn new(
        queue: JobQueue,
        runner: Arc<dyn JobRunner>,
        workers: usize,
        poll_interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            runner,
            workers: workers.max(1),
            poll_interval,
            retry,
        }
    }

    /// Run the pool. With `once` the workers drain every claimable item
    /// and return; otherwise they poll until the task is cancelled.
    pub async fn run(&self, once: bool) -> Result<()> {
        let mut handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                runner: Arc::clone(&self.runner),
                poll_interval: self.poll_interval,
                retry: self.retry.clone(),
            };
            handles.push(tokio::spawn(async move { worker.run(once).await }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }

        Ok(())
    }
}

struct Worker {
    id: usize,
    queue: JobQueue,
    runner: Arc<dyn JobRunner>,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl Worker {
    async fn run(&self, once: bool) {
        loop {
            match self.queue.claim_next().await {
                Ok(Some(item)) => {
                    self.process(item).await;
                }
                Ok(None) => {
                    if once {
                        return;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    error!(worker = self.id, error = %e, "failed to claim from queue");
                    if once {
                        return;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn process(&self, item: QueueItem) {
        let attempt = item.attempt();
        info!(
            worker = self.id,
            job = %item.kind.describe(),
            item_id = %item.id,
            attempt,
            "processing job"
        );

        match self.runner.run(&item.kind).await {
            Ok(()) => {
                info!(worker = self.id, job = %item.kind.describe(), "job completed");
                if let Err(e) = self.queue.mark_done(&item.id).await {
                    // The item stays `processing`; requeue-stale will pick
                    // it up and the runner's idempotency absorbs the rerun
                    error!(item_id = %item.id, error = %e, "failed to acknowledge completed job");
                }
            }
            Err(e) => {
                if let Err(qerr) = self.queue.mark_failed(&item.id, &e.to_string()).await {
                    error!(item_id = %item.id, error = %qerr, "failed to record job failure");
                }

                if e.retryable() && self.retry.should_retry(attempt) {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        worker = self.id,
                        job = %item.kind.describe(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "job failed, will retry"
                    );
                    if let Err(qerr) = self.queue.reset_for_retry(&item.id, delay).await {
                        error!(item_id = %item.id, error = %qerr, "failed to schedule retry");
                    }
                } else {
                    error!(
                        worker = self.id,
                        job = %item.kind.describe(),
                        attempt,
                        error = %e,
                        "job failed permanently"
                    );
                    if let Err(aerr) = self.runner.abandon(&item.kind, &e).await {
                        error!(
                            job = %item.kind.describe(),
                            error = %aerr,
                            "failed to mark owning record as failed"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct RecordingRunner {
        runs: Mutex<Vec<String>>,
        abandoned: Mutex<Vec<String>>,
        outcome: fn(u32) -> Result<()>,
    }

    impl RecordingRunner {
        fn new(outcome: fn(u32) -> Result<()>) -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                abandoned: Mutex::new(Vec::new()),
                outcome,
            }
        }

        fn run_count(&self) -> usize {
            self.runs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, kind: &JobKind) -> Result<()> {
            let mut runs = self.runs.lock().unwrap();
            runs.push(kind.describe());
            let attempt = runs.len() as u32;
            (self.outcome)(attempt)
        }

        async fn abandon(&self, kind: &JobKind, _error: &PipelineError) -> Result<()> {
            self.abandoned.lock().unwrap().push(kind.describe());
            Ok(())
        }
    }

    fn test_kind() -> JobKind {
        JobKind::VideoExport {
            job_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    fn zero_delay_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    async fn drain(queue: &JobQueue, runner: Arc<RecordingRunner>, policy: RetryPolicy) {
        let pool = WorkerPool::new(
            queue.clone(),
            runner,
            2,
            Duration::from_millis(10),
            policy,
        );
        pool.run(true).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_successful_job_is_marked_done() {
        let temp = TempDir::new().unwrap();
        let queue = JobQueue::new(temp.path().join("jobs.jsonl"));
        let result = queue.enqueue(&test_kind()).await.unwrap();

        let runner = Arc::new(RecordingRunner::new(|_| Ok(())));
        drain(&queue, Arc::clone(&runner), zero_delay_policy()).await;

        assert_eq!(runner.run_count(), 1);
        let item = queue.get(result.id()).await.unwrap().unwrap();
        assert_eq!(item.state, super::super::JobState::Done);
        assert!(runner.abandoned.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retryable_failure_runs_three_attempts_then_abandons() {
        let temp = TempDir::new().unwrap();
        let queue = JobQueue::new(temp.path().join("jobs.jsonl"));
        let result = queue.enqueue(&test_kind()).await.unwrap();

        let runner = Arc::new(RecordingRunner::new(|_| {
            Err(PipelineError::Provider {
                provider: "test".to_string(),
                message: "transient".to_string(),
            })
        }));
        drain(&queue, Arc::clone(&runner), zero_delay_policy()).await;

        assert_eq!(runner.run_count(), 3, "max_attempts bounds executions");
        let item = queue.get(result.id()).await.unwrap().unwrap();
        assert_eq!(item.state, super::super::JobState::Failed);
        assert_eq!(runner.abandoned.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_not_found_is_never_retried() {
        let temp = TempDir::new().unwrap();
        let queue = JobQueue::new(temp.path().join("jobs.jsonl"));
        queue.enqueue(&test_kind()).await.unwrap();

        let runner = Arc::new(RecordingRunner::new(|_| {
            Err(PipelineError::NotFound {
                what: "project missing".to_string(),
            })
        }));
        drain(&queue, Arc::clone(&runner), zero_delay_policy()).await;

        assert_eq!(runner.run_count(), 1);
        assert_eq!(runner.abandoned.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_attempt_can_succeed() {
        let temp = TempDir::new().unwrap();
        let queue = JobQueue::new(temp.path().join("jobs.jsonl"));
        let result = queue.enqueue(&test_kind()).await.unwrap();

        let runner = Arc::new(RecordingRunner::new(|attempt| {
            if attempt < 2 {
                Err(PipelineError::Provider {
                    provider: "test".to_string(),
                    message: "transient".to_string(),
                })
            } else {
                Ok(())
            }
        }));
        drain(&queue, Arc::clone(&runner), zero_delay_policy()).await;

        assert_eq!(runner.run_count(), 2);
        let item = queue.get(result.id()).await.unwrap().unwrap();
        assert_eq!(item.state, super::super::JobState::Done);
        assert!(runner.abandoned.lock().unwrap().is_empty());
    }
}
