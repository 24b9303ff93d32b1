//! Bounded fan-out for independent per-item network work.
//!
//! Stages whose per-item work is network-bound and independent (download,
//! upload) hand their items to [`run_fanout`]. The runner drains every
//! reference out of the context — ownership moves into the tasks, so no two
//! tasks ever touch the same sequence — runs one task per eligible item on a
//! bounded pool, and merges the survivors back in original per-document
//! order once every task has finished.
//!
//! ## Failure isolation
//!
//! A failing task never cancels its siblings and never hangs the join: the
//! task's verdict decides whether its item is kept (upload failures keep the
//! downgraded item) or dropped (download failures), the shared processed
//! counter still advances, and the pool keeps draining. Only the final
//! `processed/succeeded/failed` summary is reported.

use crate::context::{DrainedImage, ProcessingContext};
use crate::image_ref::ImageReference;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Aggregated result of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-item outcome: keep the (possibly mutated) reference, or remove it
/// from its sequence so later stages never see it.
pub enum TaskVerdict {
    Keep(ImageReference),
    Drop,
}

/// Worker-pool size for `n` items under a stage-specific `upper_bound`:
/// `min(max(n, 2), upper_bound)`. Never unbounded, never larger than the
/// work available (beyond the floor of two that keeps a single slow item
/// from serialising a two-item run).
pub fn pool_size(n: usize, upper_bound: usize) -> usize {
    n.max(2).min(upper_bound.max(1))
}

/// Run `task` over every eligible image on a bounded pool.
///
/// `eligible` screens items without consuming them; ineligible items pass
/// through untouched. `task` receives the owned [`ImageReference`] and
/// returns its verdict plus a success flag for the summary. The call blocks
/// until every submitted task has finished.
pub async fn run_fanout<E, F, Fut>(
    ctx: &mut ProcessingContext,
    upper_bound: usize,
    eligible: E,
    task: F,
) -> FanoutStats
where
    E: Fn(&ImageReference) -> bool,
    F: Fn(ImageReference) -> Fut,
    Fut: Future<Output = (TaskVerdict, bool)>,
{
    let drained = ctx.take_all_images();
    let (todo, passthrough): (Vec<DrainedImage>, Vec<DrainedImage>) =
        drained.into_iter().partition(|d| eligible(&d.image));

    let total = todo.len();
    if total == 0 {
        ctx.restore_images(passthrough);
        return FanoutStats::default();
    }

    let pool = pool_size(total, upper_bound);
    tracing::debug!("fan-out: {} items on a pool of {}", total, pool);

    let tracker = ctx.tracker.clone();
    let stage_index = ctx.stage_index;
    let processed = AtomicUsize::new(0);

    let task = &task;
    let results: Vec<(usize, usize, TaskVerdict, bool)> = stream::iter(todo.into_iter().map(|d| {
        let tracker = &tracker;
        let processed = &processed;
        async move {
            let name = d.image.display_name.clone();
            let (verdict, success) = task(d.image).await;
            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            tracker.item_progress(stage_index, &name, done, total);
            (d.doc_index, d.seq_index, verdict, success)
        }
    }))
    .buffer_unordered(pool)
    .collect()
    .await;

    let mut stats = FanoutStats {
        processed: total,
        ..FanoutStats::default()
    };
    let mut survivors = passthrough;
    for (doc_index, seq_index, verdict, success) in results {
        if success {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
        if let TaskVerdict::Keep(image) = verdict {
            survivors.push(DrainedImage {
                doc_index,
                seq_index,
                image,
            });
        }
    }
    ctx.restore_images(survivors);

    tracing::info!(
        "fan-out complete: {} processed, {} succeeded, {} failed",
        stats.processed,
        stats.succeeded,
        stats.failed
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoistConfig;
    use crate::document::InMemoryDocument;
    use crate::image_ref::{ImageLocation, MarkKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    fn image(name: &str) -> ImageReference {
        ImageReference {
            path: name.to_string(),
            title: String::new(),
            display_name: name.to_string(),
            extension: "png".into(),
            location: ImageLocation::Local,
            mark_kind: MarkKind::Original,
            content: Some(vec![1]),
            original_mark_text: format!("![]({name})"),
            original_line_text: format!("![]({name})"),
            uploaded_url: None,
            final_mark_text: None,
            line_number: 0,
            doc_index: 0,
        }
    }

    fn context_with_images(n: usize) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(HoistConfig::default());
        ctx.attach_document(Box::new(InMemoryDocument::new("d.md", "")));
        ctx.slots_mut()[0].images = (0..n).map(|i| image(&format!("img{i}.png"))).collect();
        ctx
    }

    #[test]
    fn pool_size_honours_floor_and_ceiling() {
        assert_eq!(pool_size(1, 10), 2);
        assert_eq!(pool_size(2, 10), 2);
        assert_eq!(pool_size(5, 10), 5);
        assert_eq!(pool_size(50, 10), 10);
        assert_eq!(pool_size(50, 15), 15);
        // Degenerate upper bound is lifted to one, never zero.
        assert_eq!(pool_size(3, 0), 1);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_bound() {
        let mut ctx = context_with_images(24);
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let (a, m) = (active.clone(), max_active.clone());
        let stats = run_fanout(
            &mut ctx,
            4,
            |_| true,
            move |img| {
                let (a, m) = (a.clone(), m.clone());
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    (TaskVerdict::Keep(img), true)
                }
            },
        )
        .await;

        assert_eq!(stats.processed, 24);
        assert_eq!(stats.succeeded, 24);
        assert!(max_active.load(Ordering::SeqCst) <= 4);
        assert_eq!(ctx.image_count(), 24);
    }

    #[tokio::test]
    async fn failing_tasks_count_and_do_not_hang_the_barrier() {
        let mut ctx = context_with_images(6);
        let stats = run_fanout(
            &mut ctx,
            10,
            |_| true,
            |img| async move {
                // Every other item "fails" and is dropped.
                if img.display_name.ends_with("0.png")
                    || img.display_name.ends_with("2.png")
                    || img.display_name.ends_with("4.png")
                {
                    (TaskVerdict::Drop, false)
                } else {
                    (TaskVerdict::Keep(img), true)
                }
            },
        )
        .await;

        assert_eq!(stats.processed, 6);
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(ctx.image_count(), 3);
    }

    #[tokio::test]
    async fn ineligible_items_pass_through_untouched() {
        let mut ctx = context_with_images(3);
        ctx.slots_mut()[0].images[1].location = ImageLocation::Network;

        let stats = run_fanout(
            &mut ctx,
            10,
            |img| img.location == ImageLocation::Local,
            |mut img| async move {
                img.path = "touched".into();
                (TaskVerdict::Keep(img), true)
            },
        )
        .await;

        assert_eq!(stats.processed, 2);
        let images = &ctx.slots()[0].images;
        assert_eq!(images.len(), 3);
        // Order preserved; the network item kept its path.
        assert_eq!(images[1].path, "img1.png");
        assert_eq!(images[0].path, "touched");
        assert_eq!(images[2].path, "touched");
    }

    #[tokio::test]
    async fn empty_eligible_set_is_a_no_op() {
        let mut ctx = context_with_images(2);
        let stats = run_fanout(&mut ctx, 10, |_| false, |img| async move {
            (TaskVerdict::Keep(img), true)
        })
        .await;
        assert_eq!(stats, FanoutStats::default());
        assert_eq!(ctx.image_count(), 2);
    }
}
