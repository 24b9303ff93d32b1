//! Progress-sink trait for pipeline status reporting.
//!
//! Inject an `Arc<dyn ProgressSink>` via
//! [`crate::context::ProcessingContext::with_progress_sink`] to receive
//! real-time status as the pipeline moves through its stages.
//!
//! # Why a sink instead of channels?
//!
//! The sink is the least-invasive integration point: callers can forward the
//! two text lines and the fraction to a terminal progress bar, an IDE status
//! bar, or a log — without the library knowing how the host communicates.
//! The trait is `Send + Sync` because fan-out stages report item completions
//! from concurrent tasks.
//!
//! Every reporting path in the crate tolerates the sink being absent: a run
//! without a sink (headless, tests) performs exactly the same work and never
//! panics on a progress call.

use std::sync::Arc;

/// Receives progress updates from a pipeline run.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `is_cancelled` is polled by the orchestrator at
/// stage boundaries; returning `true` stops the run cooperatively before the
/// next stage starts.
pub trait ProgressSink: Send + Sync {
    /// The stage-level line, e.g. `"Upload images (5/8)"`.
    fn set_primary(&self, text: &str) {
        let _ = text;
    }

    /// The item-level line, e.g. `"shot.png (3/12)"`.
    fn set_secondary(&self, text: &str) {
        let _ = text;
    }

    /// Overall completion in `0.0..=1.0`.
    fn set_fraction(&self, fraction: f64) {
        let _ = fraction;
    }

    /// Cooperative cancellation flag, checked at stage boundaries only.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A no-op sink for callers that don't need progress events.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}

/// Convenience alias matching the type stored in the processing context.
pub type SharedProgressSink = Arc<dyn ProgressSink>;
