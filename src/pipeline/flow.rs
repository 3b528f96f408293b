//! Dependency-ordered pipeline stages
//!
//! A flow is a tree: every child of a node runs to completion (concurrently with
//! its siblings) before the node itself runs. A node whose children did not all
//! complete is blocked and never runs.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::IndexerError;

/// One unit of pipeline work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DiscoverNameRecords,
    DiscoverProcessRecords,
    CleanupExpiredRecords,
    ResolveTargets,
    CrawlTargets,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DiscoverNameRecords => "discover-name-records",
            Self::DiscoverProcessRecords => "discover-process-records",
            Self::CleanupExpiredRecords => "cleanup-expired-records",
            Self::ResolveTargets => "resolve-targets",
            Self::CrawlTargets => "crawl-targets",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A stage and the stages that must finish before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowNode {
    pub stage: Stage,
    pub children: Vec<FlowNode>,
}

impl FlowNode {
    pub fn leaf(stage: Stage) -> Self {
        Self {
            stage,
            children: Vec::new(),
        }
    }

    pub fn with_child(stage: Stage, child: FlowNode) -> Self {
        Self {
            stage,
            children: vec![child],
        }
    }

    /// Stages in execution order, deepest first
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.children.iter().flat_map(FlowNode::stages).collect();
        stages.push(self.stage);
        stages
    }
}

/// Builds the pipeline for one discovery cycle
///
/// Name discovery runs first, then process discovery, then cleanup. Resolution
/// and crawling are appended only when enabled.
pub fn compose_pipeline(resolution_enabled: bool, crawl_enabled: bool) -> FlowNode {
    let names = FlowNode::leaf(Stage::DiscoverNameRecords);
    let processes = FlowNode::with_child(Stage::DiscoverProcessRecords, names);
    let mut root = FlowNode::with_child(Stage::CleanupExpiredRecords, processes);

    if resolution_enabled {
        root = FlowNode::with_child(Stage::ResolveTargets, root);
    }
    if crawl_enabled {
        root = FlowNode::with_child(Stage::CrawlTargets, root);
    }

    root
}

/// Executes individual stages
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run_stage(&self, stage: Stage) -> Result<(), IndexerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed(String),
    /// A prerequisite stage did not complete
    Blocked,
}

/// Outcome of every stage in a flow, in the order they finished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowReport {
    pub outcomes: Vec<(Stage, StageOutcome)>,
}

impl FlowReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == StageOutcome::Completed)
    }
}

/// Runs a flow tree to completion
pub async fn run_flow<R: StageRunner + ?Sized>(runner: &R, root: &FlowNode) -> FlowReport {
    let mut report = FlowReport::default();
    run_node(runner, root, &mut report).await;
    report
}

fn run_node<'a, R: StageRunner + ?Sized>(
    runner: &'a R,
    node: &'a FlowNode,
    report: &'a mut FlowReport,
) -> BoxFuture<'a, StageOutcome> {
    Box::pin(async move {
        let children = join_all(node.children.iter().map(|child| async move {
            let mut child_report = FlowReport::default();
            let outcome = run_node(runner, child, &mut child_report).await;
            (outcome, child_report)
        }))
        .await;

        let mut ready = true;
        for (outcome, child_report) in children {
            report.outcomes.extend(child_report.outcomes);
            ready &= outcome == StageOutcome::Completed;
        }

        let outcome = if ready {
            let start = Instant::now();
            debug!("Starting stage {}", node.stage);
            match runner.run_stage(node.stage).await {
                Ok(()) => {
                    info!(
                        "Stage {} completed in {:.2}s",
                        node.stage,
                        start.elapsed().as_secs_f64()
                    );
                    StageOutcome::Completed
                }
                Err(e) => {
                    error!("Stage {} failed: {}", node.stage, e);
                    StageOutcome::Failed(e.to_string())
                }
            }
        } else {
            warn!("Stage {} blocked by a failed prerequisite", node.stage);
            StageOutcome::Blocked
        };

        report.outcomes.push((node.stage, outcome.clone()));
        outcome
    })
}
