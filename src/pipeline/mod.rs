//! Pipeline module: jobs, stage flows and their orchestration
//!
//! - `jobs`: in-process queue with delay, attempts, backoff and failure retention
//! - `flow`: dependency-ordered stage graph and its executor
//! - `orchestrator`: wires discovery, cleanup, resolution and crawling together

mod flow;
mod jobs;
mod orchestrator;

pub use flow::{
    compose_pipeline, run_flow, FlowNode, FlowReport, Stage, StageOutcome, StageRunner,
};
pub use jobs::{
    job_queue, FailedJob, Job, JobHandler, JobLedger, JobOptions, JobQueue, JobReceiver,
    JobWorker, QueuedJob,
};
pub use orchestrator::{PipelineOrchestrator, ResolutionSummary};
