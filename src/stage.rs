//! The pipeline-stage contract.
//!
//! Each step of the pipeline — parse, compress, rename, acquire-client,
//! upload, relabel, write-back, finalize — implements [`Stage`]. The
//! orchestrator runs the stages strictly sequentially; a stage that returns
//! [`StageControl::Abort`] (or an error) stops the chain, and no later stage
//! observes the context.

use crate::context::ProcessingContext;
use crate::error::HoistError;
use async_trait::async_trait;

/// What the orchestrator should do after a stage finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageControl {
    /// Run the next stage.
    Continue,
    /// Stop the chain without an error. Items keep whatever state they
    /// reached; nothing is rolled back.
    Abort,
}

/// One pipeline step with an enablement check and an execute contract.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Display name, used for progress lines and weight heuristics.
    fn name(&self) -> &str;

    /// Whether this stage participates in the run. Evaluated once at run
    /// start; a disabled stage is skipped entirely and consumes no progress
    /// weight.
    fn is_enabled(&self, ctx: &ProcessingContext) -> bool {
        let _ = ctx;
        true
    }

    /// Execute the stage. `Err` is a fatal, user-visible abort
    /// (configuration errors); `Ok(Abort)` is a silent stop (nothing left to
    /// process).
    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError>;
}
