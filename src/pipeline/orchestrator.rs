//! Pipeline orchestrator
//!
//! Owns the resolver, the crawler and the record source, runs the composed
//! stage graph as a job, and handles the standalone resolve-retry and
//! crawl-path jobs.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::crawler::ManifestCrawler;
use crate::discovery::{EmptyRecordSource, RecordSource, SnapshotRecordSource};
use crate::gateway::GatewayClient;
use crate::pipeline::flow::{
    compose_pipeline, run_flow, FlowNode, FlowReport, Stage, StageOutcome, StageRunner,
};
use crate::pipeline::jobs::{job_queue, Job, JobHandler, JobOptions, JobQueue, JobReceiver, JobWorker};
use crate::resolver::TargetResolver;
use crate::storage::{
    lock_storage, open_shared_storage, ArchiveOutcome, SharedStorage, Storage, UnresolvedTarget,
};
use crate::IndexerError;

const ARCHIVE_REASON: &str = "expired";

/// Totals for one run of the resolve stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionSummary {
    pub batches: u32,
    pub resolved: u32,
    pub queued_retry: u32,
    /// Not found and out of retries
    pub failed: u32,
    /// Tag lookups that errored
    pub errors: u32,
}

/// Drives discovery, cleanup, resolution and crawling
pub struct PipelineOrchestrator {
    config: Config,
    storage: SharedStorage,
    source: Arc<dyn RecordSource>,
    resolver: TargetResolver,
    crawler: ManifestCrawler,
    jobs: JobQueue,
    continuous: AtomicBool,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over already-constructed collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Full indexer configuration
    /// * `storage` - Shared database handle
    /// * `gateway` - Gateway client for tag lookups and content fetches
    /// * `source` - Name and process record source
    /// * `jobs` - Queue that receives follow-up jobs
    pub fn new(
        config: Config,
        storage: SharedStorage,
        gateway: GatewayClient,
        source: Arc<dyn RecordSource>,
        jobs: JobQueue,
    ) -> Self {
        let resolver = TargetResolver::new(
            Arc::clone(&storage),
            gateway.clone(),
            config.resolution.clone(),
            config.crawl.enabled,
        );
        let crawler = ManifestCrawler::new(
            Arc::clone(&storage),
            gateway,
            config.crawl.clone(),
            jobs.clone(),
            JobOptions::retrying(&config.jobs),
        );

        Self {
            config,
            storage,
            source,
            resolver,
            crawler,
            jobs,
            continuous: AtomicBool::new(false),
        }
    }

    /// Opens the database, builds the gateway client and picks the record
    /// source from configuration
    ///
    /// # Returns
    ///
    /// The orchestrator and the receiving end of its job queue
    pub fn from_config(config: Config) -> Result<(Arc<Self>, JobReceiver), IndexerError> {
        let storage = open_shared_storage(Path::new(&config.output.database_path))?;
        let gateway = GatewayClient::new(&config.user_agent, &config.gateway)?;

        let source: Arc<dyn RecordSource> = match &config.discovery.snapshot_path {
            Some(path) => Arc::new(SnapshotRecordSource::new(path)),
            None => {
                warn!("No discovery snapshot configured, no new records will be ingested");
                Arc::new(EmptyRecordSource)
            }
        };

        let (jobs, receiver) = job_queue();
        let orchestrator = Self::new(config, storage, gateway, source, jobs);
        Ok((Arc::new(orchestrator), receiver))
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    pub fn crawler(&self) -> &ManifestCrawler {
        &self.crawler
    }

    /// The stage graph for one cycle
    pub fn flow(&self) -> FlowNode {
        compose_pipeline(self.config.resolution.enabled, self.config.crawl.enabled)
    }

    /// Runs cycles until Ctrl-C
    ///
    /// Each cycle schedules the next one once process discovery is done.
    pub async fn run(self: Arc<Self>, receiver: JobReceiver) -> Result<(), IndexerError> {
        self.continuous.store(true, Ordering::SeqCst);
        let worker = JobWorker::new(Arc::clone(&self), &self.config.jobs);
        self.jobs.submit(Job::RunPipeline, JobOptions::once())?;

        tokio::select! {
            _ = worker.run(receiver) => {
                warn!("Job queue closed");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received");
            }
        }

        if let Ok(ledger) = worker.ledger().lock() {
            info!(
                "Jobs: {} completed, {} failed",
                ledger.completed(),
                ledger.failed_total()
            );
            for failure in ledger.recent_failures() {
                warn!(
                    "Recent failure: {} after {} attempt(s): {}",
                    failure.job, failure.attempts, failure.error
                );
            }
        }

        Ok(())
    }

    /// Runs a single cycle, then the follow-up jobs that are due right away
    ///
    /// Delayed jobs (resolve retries) are dropped; their targets stay pending
    /// in the database and are picked up by the next run.
    pub async fn run_once(self: Arc<Self>, mut receiver: JobReceiver) -> FlowReport {
        let worker = JobWorker::new(Arc::clone(&self), &self.config.jobs);
        let report = self.run_cycle().await;

        loop {
            let due: Vec<_> = receiver
                .drain()
                .into_iter()
                .filter(|queued| {
                    let now = queued.options.delay.is_zero();
                    if !now {
                        debug!("Leaving delayed {} for the next run", queued.job);
                    }
                    now
                })
                .collect();

            if due.is_empty() {
                break;
            }

            info!("Running {} follow-up jobs", due.len());
            join_all(due.into_iter().map(|queued| worker.execute(queued))).await;
        }

        report
    }

    async fn run_cycle(&self) -> FlowReport {
        let start = Instant::now();
        let report = run_flow(self, &self.flow()).await;

        let summary: Vec<String> = report
            .outcomes
            .iter()
            .map(|(stage, outcome)| format!("{}={:?}", stage, outcome))
            .collect();
        info!(
            "Cycle finished in {:.2}s: {}",
            start.elapsed().as_secs_f64(),
            summary.join(", ")
        );

        report
    }

    fn schedule_next_cycle(&self) -> Result<(), IndexerError> {
        let delay = self.config.discovery.cycle_delay();
        self.jobs
            .submit(Job::RunPipeline, JobOptions::once().with_delay(delay))?;
        info!("Next discovery cycle in {:?}", delay);
        Ok(())
    }

    fn is_blocked(&self, process_id: &str) -> bool {
        self.config
            .discovery
            .blocked_process_ids
            .iter()
            .any(|blocked| blocked == process_id)
    }

    async fn discover_name_records(&self) -> Result<(), IndexerError> {
        let records = match self.source.fetch_name_records().await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to fetch name records: {}", e);
                return Ok(());
            }
        };

        let fetched = records.len();
        let records: Vec<_> = records
            .into_iter()
            .filter(|record| !self.is_blocked(&record.process_id))
            .collect();

        let written = {
            let mut storage = lock_storage(&self.storage)?;
            storage.upsert_name_records(&records)?
        };

        info!(
            "Discovered {} name records ({} blocked)",
            written,
            fetched - records.len()
        );
        Ok(())
    }

    async fn discover_process_records(&self) -> Result<(), IndexerError> {
        let names = {
            let storage = lock_storage(&self.storage)?;
            storage.list_name_records()?
        };

        let mut written = 0;
        let mut skipped = 0;
        for name in names.iter().filter(|name| !self.is_blocked(&name.process_id)) {
            let records = match self.source.fetch_process_records(name).await {
                Ok(records) => records,
                Err(e) => {
                    error!("Failed to fetch process records for {}: {}", name.name, e);
                    continue;
                }
            };

            let (blocked, records): (Vec<_>, Vec<_>) = records
                .into_iter()
                .partition(|record| self.is_blocked(&record.process_id));
            skipped += blocked.len();

            written += {
                let mut storage = lock_storage(&self.storage)?;
                storage.upsert_process_records(&records)?
            };
        }

        info!(
            "Discovered {} process records across {} names ({} blocked)",
            written,
            names.len(),
            skipped
        );

        if self.continuous.load(Ordering::SeqCst) {
            self.schedule_next_cycle()?;
        }
        Ok(())
    }

    fn cleanup_expired_records(&self) -> Result<ArchiveOutcome, IndexerError> {
        let now_ms = Utc::now().timestamp_millis();
        let batch_size = self.config.discovery.cleanup_batch_size.max(1);
        let mut total = ArchiveOutcome::default();

        loop {
            let outcome = {
                let mut storage = lock_storage(&self.storage)?;
                storage.archive_expired_records(now_ms, batch_size, ARCHIVE_REASON)?
            };

            total.archived += outcome.archived;
            total.dependents_archived += outcome.dependents_archived;

            if outcome.archived < batch_size as usize {
                break;
            }
        }

        info!(
            "Archived {} expired name records and {} process records",
            total.archived, total.dependents_archived
        );
        Ok(total)
    }

    /// Resolves every candidate once, batch by batch
    ///
    /// Batches page forward by transaction id, so each id is attempted at most
    /// once per run. Candidates that come back not found but still have
    /// retries left are queued as delayed resolve jobs.
    pub async fn resolve_targets(&self) -> Result<ResolutionSummary, IndexerError> {
        let config = self.resolver.config();
        let chunk_size = config.concurrency.max(1) as usize;
        let mut cursor: Option<String> = None;
        let mut summary = ResolutionSummary::default();

        info!("Starting target resolution");

        loop {
            let batch = self.resolver.find_unresolved_targets_after(
                config.max_retries,
                config.batch_size,
                cursor.as_deref(),
            )?;

            if batch.is_empty() {
                break;
            }

            summary.batches += 1;
            cursor = batch.last().map(|t| t.transaction_id.clone());
            let mut batch_summary = ResolutionSummary::default();

            for chunk in batch.chunks(chunk_size) {
                let results = join_all(
                    chunk
                        .iter()
                        .map(|target| self.resolver.process_target(target, config.max_retries)),
                )
                .await;

                for (target, result) in chunk.iter().zip(results) {
                    match result {
                        Ok(outcome) if outcome.resolved => batch_summary.resolved += 1,
                        Ok(outcome) if outcome.should_retry => {
                            self.queue_resolve_retry(target)?;
                            batch_summary.queued_retry += 1;
                        }
                        Ok(_) => batch_summary.failed += 1,
                        Err(e) => {
                            warn!("Resolution of {} errored: {}", target.transaction_id, e);
                            batch_summary.errors += 1;
                        }
                    }
                }
            }

            info!(
                "Resolve batch {}: resolved={}, queued_retry={}, failed={}, errors={}",
                summary.batches,
                batch_summary.resolved,
                batch_summary.queued_retry,
                batch_summary.failed,
                batch_summary.errors
            );

            summary.resolved += batch_summary.resolved;
            summary.queued_retry += batch_summary.queued_retry;
            summary.failed += batch_summary.failed;
            summary.errors += batch_summary.errors;
        }

        let stats = self.resolver.get_stats()?;
        info!(
            "Resolution complete: total={}, resolved={}, pending={}, not_found={}, by_category={:?}",
            stats.total, stats.resolved, stats.pending, stats.not_found, stats.by_category
        );

        Ok(summary)
    }

    fn queue_resolve_retry(&self, target: &UnresolvedTarget) -> Result<(), IndexerError> {
        let options = JobOptions::retrying(&self.config.jobs)
            .with_delay(self.resolver.config().retry_delay());
        self.jobs.submit(
            Job::ResolveTarget {
                transaction_id: target.transaction_id.clone(),
                name: target.name.clone(),
                undername: target.undername.clone(),
            },
            options,
        )
    }
}

#[async_trait]
impl StageRunner for PipelineOrchestrator {
    async fn run_stage(&self, stage: Stage) -> Result<(), IndexerError> {
        match stage {
            Stage::DiscoverNameRecords => self.discover_name_records().await,
            Stage::DiscoverProcessRecords => self.discover_process_records().await,
            Stage::CleanupExpiredRecords => self.cleanup_expired_records().map(|_| ()),
            Stage::ResolveTargets => self.resolve_targets().await.map(|_| ()),
            Stage::CrawlTargets => self.crawler.process_crawl_targets().await.map(|_| ()),
        }
    }
}

#[async_trait]
impl JobHandler for PipelineOrchestrator {
    async fn handle(&self, job: &Job) -> Result<(), IndexerError> {
        match job {
            Job::RunPipeline => {
                let report = self.run_cycle().await;

                // A cycle that never reached process discovery has not
                // scheduled its successor
                if self.continuous.load(Ordering::SeqCst)
                    && report.outcome(Stage::DiscoverProcessRecords)
                        != Some(&StageOutcome::Completed)
                {
                    self.schedule_next_cycle()?;
                }

                if report.is_success() {
                    Ok(())
                } else {
                    Err(IndexerError::Job("pipeline cycle did not complete".to_string()))
                }
            }
            Job::ResolveTarget {
                transaction_id,
                name,
                undername,
            } => {
                let target = UnresolvedTarget {
                    transaction_id: transaction_id.clone(),
                    name: name.clone(),
                    undername: undername.clone(),
                };
                let outcome = self
                    .resolver
                    .process_target(&target, self.resolver.config().max_retries)
                    .await?;

                if outcome.should_retry {
                    self.queue_resolve_retry(&target)?;
                }
                Ok(())
            }
            Job::CrawlManifestPath {
                transaction_id,
                manifest_path,
                depth,
            } => {
                self.crawler
                    .process_crawl_manifest_path(transaction_id, manifest_path, *depth)
                    .await
            }
        }
    }
}
