//! Weighted, two-level progress aggregation across pipeline stages.
//!
//! A flat `completed_stages / stage_count` fraction is badly misleading here:
//! uploading ten images dominates a run's wall-clock time while renaming them
//! is instantaneous, yet both are "one stage". The tracker therefore gives
//! every stage a weight — upload-class stages 10, download/compress-class 3,
//! everything else 1, unless the caller supplies explicit weights — and
//! computes
//!
//! ```text
//! fraction = (completed_weight + current_weight × item_fraction) / total_weight
//! ```
//!
//! The reported fraction is clamped and monotonically non-decreasing for the
//! lifetime of a run, and [`ProgressTracker::finish`] pins it to exactly 1.0.

use crate::progress::SharedProgressSink;
use std::sync::Mutex;

/// Default weight for a stage, derived from its display name.
fn default_weight(stage_name: &str) -> u32 {
    let lower = stage_name.to_lowercase();
    if lower.contains("upload") {
        10
    } else if lower.contains("download") || lower.contains("compress") {
        3
    } else {
        1
    }
}

struct StepInfo {
    name: String,
    weight: u32,
}

struct TrackerState {
    current: Option<usize>,
    completed_weight: u32,
    /// High-water mark so the reported fraction never moves backwards.
    reported: f64,
}

/// Weighted stage/item progress, reporting through an optional sink.
///
/// All methods are no-ops (never panic, never fail) when the sink is absent.
pub struct ProgressTracker {
    sink: Option<SharedProgressSink>,
    steps: Vec<StepInfo>,
    total_weight: u32,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Build a tracker from stage names, using the default weight heuristic.
    pub fn new(sink: Option<SharedProgressSink>, stage_names: &[&str]) -> Self {
        let weights: Vec<u32> = stage_names.iter().map(|n| default_weight(n)).collect();
        Self::with_weights(sink, stage_names, &weights)
    }

    /// Build a tracker with caller-supplied weights. Missing weights fall
    /// back to the name heuristic; zero weights are lifted to one so the
    /// total can never be zero.
    pub fn with_weights(
        sink: Option<SharedProgressSink>,
        stage_names: &[&str],
        weights: &[u32],
    ) -> Self {
        let steps: Vec<StepInfo> = stage_names
            .iter()
            .enumerate()
            .map(|(i, name)| StepInfo {
                name: name.to_string(),
                weight: weights.get(i).copied().unwrap_or_else(|| default_weight(name)).max(1),
            })
            .collect();
        let total_weight = steps.iter().map(|s| s.weight).sum::<u32>().max(1);
        Self {
            sink,
            steps,
            total_weight,
            state: Mutex::new(TrackerState {
                current: None,
                completed_weight: 0,
                reported: 0.0,
            }),
        }
    }

    /// Number of tracked stages.
    pub fn stage_count(&self) -> usize {
        self.steps.len()
    }

    /// Enter stage `index`: completes the weight of the previous stage and
    /// publishes the `"{name} ({i}/{n})"` primary line.
    pub fn start_stage(&self, index: usize) {
        if index >= self.steps.len() {
            tracing::warn!("progress: stage index {} out of range", index);
            return;
        }
        let fraction = {
            let mut state = self.state.lock().unwrap();
            if let Some(prev) = state.current {
                if prev != index {
                    state.completed_weight += self.steps[prev].weight;
                }
            }
            state.current = Some(index);
            let entered = state.completed_weight as f64 / self.total_weight as f64;
            self.raise(&mut state, entered)
        };
        if let Some(sink) = &self.sink {
            let step = &self.steps[index];
            sink.set_primary(&format!("{} ({}/{})", step.name, index + 1, self.steps.len()));
            sink.set_secondary("");
            sink.set_fraction(fraction);
        }
    }

    /// Report item `current` of `total` within stage `index`, with the item's
    /// display name on the secondary line.
    pub fn item_progress(&self, index: usize, item_name: &str, current: usize, total: usize) {
        if index >= self.steps.len() {
            return;
        }
        let step_fraction = if total > 0 {
            current as f64 / total as f64
        } else {
            0.0
        };
        let fraction = {
            let mut state = self.state.lock().unwrap();
            let overall = (state.completed_weight as f64
                + self.steps[index].weight as f64 * step_fraction)
                / self.total_weight as f64;
            self.raise(&mut state, overall)
        };
        if let Some(sink) = &self.sink {
            let detail = if item_name.is_empty() {
                if total > 1 {
                    format!("({current}/{total})")
                } else {
                    String::new()
                }
            } else if total > 1 {
                format!("{item_name} ({current}/{total})")
            } else {
                item_name.to_string()
            };
            sink.set_secondary(&detail);
            sink.set_fraction(fraction);
        }
    }

    /// Complete the run: fraction becomes exactly 1.0.
    pub fn finish(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.completed_weight = self.total_weight;
            state.current = None;
            state.reported = 1.0;
        }
        if let Some(sink) = &self.sink {
            if let Some(last) = self.steps.last() {
                let n = self.steps.len();
                sink.set_primary(&format!("{} ({n}/{n})", last.name));
            }
            sink.set_secondary("");
            sink.set_fraction(1.0);
        }
    }

    /// Clamp and enforce monotonicity; returns the value to publish.
    fn raise(&self, state: &mut TrackerState, fraction: f64) -> f64 {
        let clamped = fraction.clamp(0.0, 1.0);
        if clamped > state.reported {
            state.reported = clamped;
        }
        state.reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CapturingSink {
        fractions: Mutex<Vec<f64>>,
        primary: Mutex<Vec<String>>,
    }

    impl ProgressSink for CapturingSink {
        fn set_primary(&self, text: &str) {
            self.primary.lock().unwrap().push(text.to_string());
        }

        fn set_fraction(&self, fraction: f64) {
            self.fractions.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn default_weights_follow_stage_class() {
        assert_eq!(default_weight("Upload images"), 10);
        assert_eq!(default_weight("Download images"), 3);
        assert_eq!(default_weight("Compress images"), 3);
        assert_eq!(default_weight("Parse documents"), 1);
    }

    #[test]
    fn fraction_is_monotonic_and_finishes_at_one() {
        let sink = Arc::new(CapturingSink::default());
        let tracker = ProgressTracker::new(
            Some(sink.clone()),
            &["Parse documents", "Upload images", "Write back"],
        );

        tracker.start_stage(0);
        tracker.item_progress(0, "doc.md", 1, 1);
        tracker.start_stage(1);
        tracker.item_progress(1, "a.png", 1, 2);
        tracker.item_progress(1, "b.png", 2, 2);
        tracker.start_stage(2);
        tracker.finish();

        let fractions = sink.fractions.lock().unwrap();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {fractions:?}");
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }

    #[test]
    fn upload_stage_dominates_the_fraction() {
        let sink = Arc::new(CapturingSink::default());
        // weights: 1 + 10 + 1 = 12
        let tracker = ProgressTracker::new(
            Some(sink.clone()),
            &["Parse documents", "Upload images", "Write back"],
        );
        tracker.start_stage(0);
        tracker.start_stage(1);
        // Entering the upload stage completes only 1/12 of the total.
        assert!(*sink.fractions.lock().unwrap().last().unwrap() < 0.1);
        tracker.item_progress(1, "a.png", 1, 1);
        // Finishing all upload items pushes past 11/12.
        assert!(*sink.fractions.lock().unwrap().last().unwrap() > 0.9);
    }

    #[test]
    fn primary_line_carries_stage_counter() {
        let sink = Arc::new(CapturingSink::default());
        let tracker = ProgressTracker::new(Some(sink.clone()), &["Parse documents", "Write back"]);
        tracker.start_stage(0);
        tracker.start_stage(1);
        let lines = sink.primary.lock().unwrap();
        assert_eq!(lines[0], "Parse documents (1/2)");
        assert_eq!(lines[1], "Write back (2/2)");
    }

    #[test]
    fn absent_sink_is_a_no_op() {
        let tracker = ProgressTracker::new(None, &["Upload images"]);
        tracker.start_stage(0);
        tracker.item_progress(0, "a.png", 1, 3);
        tracker.finish();
    }

    #[test]
    fn explicit_weights_override_heuristic() {
        let tracker =
            ProgressTracker::with_weights(None, &["Parse documents", "Upload images"], &[5, 5]);
        assert_eq!(tracker.stage_count(), 2);
        assert_eq!(tracker.total_weight, 10);
    }

    #[test]
    fn out_of_range_stage_index_is_ignored() {
        let tracker = ProgressTracker::new(None, &["Parse documents"]);
        tracker.start_stage(7);
        tracker.item_progress(7, "x", 1, 1);
    }
}
