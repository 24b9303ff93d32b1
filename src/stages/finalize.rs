//! Finalize stage: release everything the run still owns.
//!
//! Every content buffer opened during the run is dropped here, exactly once,
//! and the per-document sequences are cleared. After this stage the context
//! holds only the rewritten documents and the run counters.

use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;

pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> &str {
        "Clean up"
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let mut released = 0usize;
        ctx.retain_images(|img| {
            if img.content.take().is_some() {
                released += 1;
            }
            true
        });
        ctx.clear_images();
        tracing::debug!("released {released} content buffers");
        Ok(StageControl::Continue)
    }
}
