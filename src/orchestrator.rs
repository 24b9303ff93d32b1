//! Sequential stage driver with hard-abort semantics.
//!
//! The orchestrator runs its stages strictly in order on the calling task.
//! Enablement is evaluated once at run start — a disabled stage is excluded
//! from the execution plan and contributes no progress weight. A stage that
//! returns [`StageControl::Abort`] or an error stops the chain immediately;
//! items keep whatever state they reached, nothing is rolled back, and no
//! later stage observes the context. Cooperative cancellation is checked at
//! every stage boundary through the progress sink.

use crate::context::{ProcessingContext, RunStats};
use crate::config::HoistConfig;
use crate::error::HoistError;
use crate::stage::{Stage, StageControl};
use crate::stages::acquire_client::AcquireClientStage;
use crate::stages::compress::CompressStage;
use crate::stages::download::{DownloadStage, HttpFetcher};
use crate::stages::finalize::FinalizeStage;
use crate::stages::parse::ParseStage;
use crate::stages::relabel::RelabelStage;
use crate::stages::rename::RenameStage;
use crate::stages::upload::UploadStage;
use crate::stages::write_back::WriteBackStage;
use crate::tracker::ProgressTracker;
use std::sync::Arc;

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStats,
    /// Name of the stage that stopped the chain early, if any.
    pub aborted_at: Option<String>,
}

/// Runs an ordered list of [`Stage`]s over one [`ProcessingContext`].
pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage; returns `self` so chains read as a literal list.
    pub fn add_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// The standard chain: hoist local images onto the configured provider.
    pub fn hoist_chain(_config: &HoistConfig) -> Self {
        Self::new()
            .add_stage(Box::new(ParseStage::new()))
            .add_stage(Box::new(CompressStage))
            .add_stage(Box::new(RenameStage))
            .add_stage(Box::new(AcquireClientStage))
            .add_stage(Box::new(UploadStage))
            .add_stage(Box::new(RelabelStage))
            .add_stage(Box::new(WriteBackStage))
            .add_stage(Box::new(FinalizeStage))
    }

    /// The migration chain: pull remote images down, then re-host them on
    /// the configured provider.
    pub fn rehost_chain(config: &HoistConfig) -> Self {
        let fetcher = config
            .fetcher
            .clone()
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(config.request_timeout_secs)));
        Self::new()
            .add_stage(Box::new(ParseStage::network_only()))
            .add_stage(Box::new(AcquireClientStage))
            .add_stage(Box::new(DownloadStage::new(fetcher)))
            .add_stage(Box::new(RenameStage))
            .add_stage(Box::new(UploadStage))
            .add_stage(Box::new(RelabelStage))
            .add_stage(Box::new(WriteBackStage))
            .add_stage(Box::new(FinalizeStage))
    }

    /// Run the chain to completion (or abort) over `ctx`.
    pub async fn run(&self, ctx: &mut ProcessingContext) -> Result<RunSummary, HoistError> {
        if ctx.document_count() == 0 {
            return Err(HoistError::NoDocuments);
        }

        // Execution plan: enablement is decided here, once.
        let plan: Vec<&dyn Stage> = self
            .stages
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| s.is_enabled(ctx))
            .collect();
        let names: Vec<&str> = plan.iter().map(|s| s.name()).collect();

        let tracker = Arc::new(ProgressTracker::new(ctx.sink.clone(), &names));
        ctx.tracker = tracker.clone();
        ctx.stage_count = plan.len();

        let mut aborted_at = None;
        for (index, stage) in plan.iter().enumerate() {
            if ctx.sink.as_ref().is_some_and(|s| s.is_cancelled()) {
                tracing::info!("run cancelled before '{}'", stage.name());
                return Err(HoistError::Cancelled);
            }

            ctx.stage_index = index;
            tracker.start_stage(index);
            tracing::debug!("stage {}/{}: {}", index + 1, plan.len(), stage.name());

            match stage.execute(ctx).await? {
                StageControl::Continue => {}
                StageControl::Abort => {
                    tracing::info!("chain stopped by '{}'", stage.name());
                    aborted_at = Some(stage.name().to_string());
                    break;
                }
            }
        }

        if aborted_at.is_none() {
            tracker.finish();
        }
        Ok(RunSummary {
            stats: ctx.stats,
            aborted_at,
        })
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
