//! Mutable state for one pipeline run.
//!
//! A [`ProcessingContext`] owns the attached documents, the per-document
//! image-reference sequences (insertion order is significant: progress math
//! and the write-back pass both rely on it), the resolved storage client,
//! the per-run client registry, and the progress plumbing. Stages receive
//! `&mut ProcessingContext` and mutate it in place; the orchestrator owns
//! the stage cursor.

use crate::client::{ClientRegistry, StorageClient};
use crate::config::HoistConfig;
use crate::document::Document;
use crate::image_ref::ImageReference;
use crate::progress::SharedProgressSink;
use crate::tracker::ProgressTracker;
use std::sync::Arc;

/// One attached document and its parsed image references, in document order.
pub struct DocumentSlot {
    pub document: Box<dyn Document>,
    pub images: Vec<ImageReference>,
}

/// An image reference drained out of its sequence for a fan-out pass,
/// tagged with enough position to merge it back in original order.
pub struct DrainedImage {
    pub doc_index: usize,
    pub seq_index: usize,
    pub image: ImageReference,
}

/// Counters accumulated by the fan-out stages and returned in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub uploaded: usize,
    pub upload_failed: usize,
    pub downloaded: usize,
    pub download_failed: usize,
}

/// Mutable state for one pipeline run.
pub struct ProcessingContext {
    pub config: HoistConfig,
    slots: Vec<DocumentSlot>,
    /// Resolved by the acquire-client stage.
    pub client: Option<Arc<dyn StorageClient>>,
    /// Per-run client table (explicit object, not a process-wide static).
    pub registry: Arc<ClientRegistry>,
    pub sink: Option<SharedProgressSink>,
    /// Replaced by the orchestrator once the execution plan is known.
    pub tracker: Arc<ProgressTracker>,
    /// Index of the currently executing stage within the execution plan.
    pub stage_index: usize,
    pub stage_count: usize,
    pub stats: RunStats,
}

impl ProcessingContext {
    pub fn new(config: HoistConfig) -> Self {
        let registry = Arc::new(ClientRegistry::new(config.clone()));
        Self {
            config,
            slots: Vec::new(),
            client: None,
            registry,
            sink: None,
            tracker: Arc::new(ProgressTracker::new(None, &[])),
            stage_index: 0,
            stage_count: 0,
            stats: RunStats::default(),
        }
    }

    /// Install a progress sink; the orchestrator wires it into the tracker.
    pub fn with_progress_sink(mut self, sink: SharedProgressSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a document. Order of attachment is the processing order.
    pub fn attach_document(&mut self, document: Box<dyn Document>) {
        self.slots.push(DocumentSlot {
            document,
            images: Vec::new(),
        });
    }

    pub fn slots(&self) -> &[DocumentSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [DocumentSlot] {
        &mut self.slots
    }

    pub fn document_count(&self) -> usize {
        self.slots.len()
    }

    /// Total surviving image references across all documents.
    pub fn image_count(&self) -> usize {
        self.slots.iter().map(|s| s.images.len()).sum()
    }

    /// Run a per-item pass over every surviving reference, in sequence
    /// order, applying each keep/drop decision immediately via `retain_mut`.
    /// A dropped item is invisible to every later stage.
    pub fn retain_images<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut ImageReference) -> bool,
    {
        for slot in &mut self.slots {
            slot.images.retain_mut(|img| keep(img));
        }
    }

    /// Drain every image reference out of its sequence for a fan-out pass.
    ///
    /// Ownership moves into the returned list, so fan-out tasks never share
    /// a live sequence; [`ProcessingContext::restore_images`] merges the
    /// survivors back after the join barrier.
    pub fn take_all_images(&mut self) -> Vec<DrainedImage> {
        let mut drained = Vec::new();
        for (doc_index, slot) in self.slots.iter_mut().enumerate() {
            for (seq_index, image) in std::mem::take(&mut slot.images).into_iter().enumerate() {
                drained.push(DrainedImage {
                    doc_index,
                    seq_index,
                    image,
                });
            }
        }
        drained
    }

    /// Merge drained images back, restoring original per-document order.
    pub fn restore_images(&mut self, mut drained: Vec<DrainedImage>) {
        drained.sort_by_key(|d| (d.doc_index, d.seq_index));
        for item in drained {
            if let Some(slot) = self.slots.get_mut(item.doc_index) {
                slot.images.push(item.image);
            }
        }
    }

    /// Clear all sequences. Used by the finalize stage.
    pub fn clear_images(&mut self) {
        for slot in &mut self.slots {
            slot.images.clear();
        }
    }
}
