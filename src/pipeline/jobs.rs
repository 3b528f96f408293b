//! In-process job queue
//!
//! Jobs are submitted with a delay, an attempt budget and an exponential
//! backoff base. The worker runs each job on its own task once its delay has
//! elapsed, bounded by a semaphore, and retries failures with backoff.
//! Completed jobs are counted; the most recent failures are retained.

use crate::config::JobsConfig;
use crate::IndexerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A unit of work handled by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// One full cycle of the composed stage graph
    RunPipeline,

    /// Re-resolve a single target that came back not found
    ResolveTarget {
        transaction_id: String,
        name: String,
        undername: String,
    },

    /// Crawl one manifest path found through a sitemap
    CrawlManifestPath {
        transaction_id: String,
        manifest_path: String,
        depth: u32,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunPipeline => "run-pipeline",
            Self::ResolveTarget { .. } => "resolve-target",
            Self::CrawlManifestPath { .. } => "crawl-manifest-path",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunPipeline => write!(f, "{}", self.kind()),
            Self::ResolveTarget { transaction_id, .. } => {
                write!(f, "{} {}", self.kind(), transaction_id)
            }
            Self::CrawlManifestPath {
                transaction_id,
                manifest_path,
                depth,
            } => write!(
                f,
                "{} {}/{} (depth {})",
                self.kind(),
                transaction_id,
                manifest_path,
                depth
            ),
        }
    }
}

/// Submission options for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Wait before the first attempt
    pub delay: Duration,
    /// Total attempts, including the first
    pub attempts: u32,
    /// Backoff before retry `n` is `backoff_base * 2^(n-1)`
    pub backoff_base: Duration,
}

impl JobOptions {
    /// Runs once, right away
    pub fn once() -> Self {
        Self {
            delay: Duration::ZERO,
            attempts: 1,
            backoff_base: Duration::ZERO,
        }
    }

    /// Retries with the configured attempts and backoff
    pub fn retrying(config: &JobsConfig) -> Self {
        Self {
            delay: Duration::ZERO,
            attempts: config.attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay before the given retry (1 for the first retry)
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(exponent))
    }
}

/// A job waiting in the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job: Job,
    pub options: JobOptions,
}

/// Sending half of the job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
}

/// Receiving half of the job queue
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
}

/// Creates a connected queue and receiver
pub fn job_queue() -> (JobQueue, JobReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (JobQueue { sender }, JobReceiver { receiver })
}

impl JobQueue {
    /// Submits a job
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The job was queued
    /// * `Err(IndexerError::Job)` - The receiver is gone
    pub fn submit(&self, job: Job, options: JobOptions) -> Result<(), IndexerError> {
        debug!("Queueing {} (delay {:?})", job, options.delay);
        self.sender
            .send(QueuedJob { job, options })
            .map_err(|e| IndexerError::Job(format!("queue closed, dropped {}", e.0.job)))
    }
}

impl JobReceiver {
    /// Waits for the next job; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<QueuedJob> {
        self.receiver.recv().await
    }

    /// Takes every job queued so far without waiting
    pub fn drain(&mut self) -> Vec<QueuedJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.receiver.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

/// Executes jobs
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), IndexerError>;
}

/// A job that used up its attempts
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: Job,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Counts completed jobs and keeps the most recent failures
#[derive(Debug)]
pub struct JobLedger {
    completed: u64,
    failed_total: u64,
    failed: VecDeque<FailedJob>,
    keep_failed: usize,
}

impl JobLedger {
    pub fn new(keep_failed: usize) -> Self {
        Self {
            completed: 0,
            failed_total: 0,
            failed: VecDeque::new(),
            keep_failed,
        }
    }

    pub fn record_completed(&mut self) {
        self.completed += 1;
    }

    pub fn record_failed(&mut self, failure: FailedJob) {
        self.failed_total += 1;
        if self.keep_failed == 0 {
            return;
        }
        if self.failed.len() >= self.keep_failed {
            self.failed.pop_front();
        }
        self.failed.push_back(failure);
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total
    }

    /// Retained failures, oldest first
    pub fn recent_failures(&self) -> impl Iterator<Item = &FailedJob> {
        self.failed.iter()
    }
}

/// Runs queued jobs against a handler
pub struct JobWorker<H: JobHandler> {
    handler: Arc<H>,
    permits: Arc<Semaphore>,
    ledger: Arc<Mutex<JobLedger>>,
}

impl<H: JobHandler> Clone for JobWorker<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            permits: Arc::clone(&self.permits),
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<H: JobHandler> JobWorker<H> {
    pub fn new(handler: Arc<H>, config: &JobsConfig) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            ledger: Arc::new(Mutex::new(JobLedger::new(config.keep_failed))),
        }
    }

    pub fn ledger(&self) -> Arc<Mutex<JobLedger>> {
        Arc::clone(&self.ledger)
    }

    /// Receives jobs until the queue closes, spawning one task per job
    pub async fn run(&self, mut receiver: JobReceiver) {
        while let Some(queued) = receiver.recv().await {
            self.spawn(queued);
        }
    }

    /// Spawns a task that waits out the job's delay and then executes it
    pub fn spawn(&self, queued: QueuedJob) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            if !queued.options.delay.is_zero() {
                tokio::time::sleep(queued.options.delay).await;
            }
            worker.execute(queued).await;
        })
    }

    /// Executes a job now, retrying with backoff until it succeeds or runs
    /// out of attempts, and records the outcome
    pub async fn execute(&self, queued: QueuedJob) {
        let attempts = queued.options.attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = {
                let _permit = match self.permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("Worker closed, dropping {}", queued.job);
                        return;
                    }
                };
                self.handler.handle(&queued.job).await
            };

            match result {
                Ok(()) => {
                    debug!("Completed {}", queued.job);
                    if let Ok(mut ledger) = self.ledger.lock() {
                        ledger.record_completed();
                    }
                    return;
                }
                Err(e) if attempt < attempts => {
                    let backoff = queued.options.backoff_delay(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        queued.job, attempt, attempts, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Failed {} after {} attempt(s): {}",
                        queued.job, attempt, e
                    );
                    if let Ok(mut ledger) = self.ledger.lock() {
                        ledger.record_failed(FailedJob {
                            job: queued.job.clone(),
                            attempts: attempt,
                            error: e.to_string(),
                            failed_at: Utc::now(),
                        });
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        calls: AtomicU32,
        failures_before_success: u32,
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn handle(&self, _job: &Job) -> Result<(), IndexerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                Err(IndexerError::Job(format!("call {} failed", call)))
            } else {
                Ok(())
            }
        }
    }

    fn jobs_config(keep_failed: usize) -> JobsConfig {
        JobsConfig {
            attempts: 3,
            backoff_base_ms: 1,
            keep_failed,
            worker_concurrency: 2,
        }
    }

    fn worker(failures: u32, keep_failed: usize) -> (JobWorker<FlakyHandler>, Arc<FlakyHandler>) {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            failures_before_success: failures,
        });
        (
            JobWorker::new(Arc::clone(&handler), &jobs_config(keep_failed)),
            handler,
        )
    }

    #[test]
    fn test_backoff_doubles() {
        let options = JobOptions {
            delay: Duration::ZERO,
            attempts: 4,
            backoff_base: Duration::from_millis(5000),
        };
        assert_eq!(options.backoff_delay(1), Duration::from_millis(5000));
        assert_eq!(options.backoff_delay(2), Duration::from_millis(10000));
        assert_eq!(options.backoff_delay(3), Duration::from_millis(20000));
    }

    #[test]
    fn test_queue_drain() {
        let (queue, mut receiver) = job_queue();
        queue.submit(Job::RunPipeline, JobOptions::once()).unwrap();
        queue
            .submit(
                Job::CrawlManifestPath {
                    transaction_id: "tx".to_string(),
                    manifest_path: "a.html".to_string(),
                    depth: 1,
                },
                JobOptions::once().with_delay(Duration::from_secs(5)),
            )
            .unwrap();

        let drained = receiver.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].job, Job::RunPipeline);
        assert_eq!(drained[1].options.delay, Duration::from_secs(5));
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn test_submit_after_receiver_dropped() {
        let (queue, receiver) = job_queue();
        drop(receiver);
        assert!(queue.submit(Job::RunPipeline, JobOptions::once()).is_err());
    }

    #[test]
    fn test_ledger_keeps_recent_failures() {
        let mut ledger = JobLedger::new(2);
        for i in 0..3 {
            ledger.record_failed(FailedJob {
                job: Job::RunPipeline,
                attempts: 1,
                error: format!("error {}", i),
                failed_at: Utc::now(),
            });
        }
        let errors: Vec<&str> = ledger.recent_failures().map(|f| f.error.as_str()).collect();
        assert_eq!(errors, vec!["error 1", "error 2"]);
        assert_eq!(ledger.failed_total(), 3);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let (worker, handler) = worker(2, 8);
        worker
            .execute(QueuedJob {
                job: Job::RunPipeline,
                options: JobOptions::retrying(&jobs_config(8)),
            })
            .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        let ledger = worker.ledger();
        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.completed(), 1);
        assert_eq!(ledger.failed_total(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_are_recorded() {
        let (worker, handler) = worker(10, 8);
        worker
            .execute(QueuedJob {
                job: Job::RunPipeline,
                options: JobOptions::retrying(&jobs_config(8)),
            })
            .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        let ledger = worker.ledger();
        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.completed(), 0);
        let failure = ledger.recent_failures().next().unwrap();
        assert_eq!(failure.attempts, 3);
    }

    #[tokio::test]
    async fn test_single_attempt_is_not_retried() {
        let (worker, handler) = worker(1, 8);
        worker
            .execute(QueuedJob {
                job: Job::RunPipeline,
                options: JobOptions::once(),
            })
            .await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawned_job_runs_after_delay() {
        let (worker, handler) = worker(0, 8);
        let handle = worker.spawn(QueuedJob {
            job: Job::RunPipeline,
            options: JobOptions::once().with_delay(Duration::from_millis(10)),
        });
        handle.await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
