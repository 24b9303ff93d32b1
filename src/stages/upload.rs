//! Upload stage: push local image bytes to the resolved storage client.
//!
//! Two passes. The eligibility screen drops unusable items (blank name,
//! missing or empty content) from their sequences — there is nothing to
//! upload and nothing to write back for them. The fan-out pass then uploads
//! every remaining local item on a pool bounded at
//! `min(max(n, 2), upload_concurrency)`, retrying transient failures with
//! exponential backoff.
//!
//! Failure never removes an item here: a reference whose upload failed
//! stays in its sequence, local, with an inline `![upload error](path)`
//! marker, so the document keeps a visible trace instead of a silently
//! dropped image.

use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::fanout::{run_fanout, TaskVerdict};
use crate::image_ref::ImageLocation;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;
use tokio::time::{sleep, Duration};

pub struct UploadStage;

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &str {
        "Upload images"
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let Some(client) = ctx.client.clone() else {
            // The acquire-client stage runs first in every built-in chain.
            return Err(HoistError::Internal(
                "upload stage ran without a storage client".into(),
            ));
        };

        // Eligibility screen: local items without a usable name or content
        // can never be uploaded; drop them now so later stages don't see
        // them.
        ctx.retain_images(|img| {
            if img.location == ImageLocation::Network || img.is_uploadable() {
                true
            } else {
                tracing::debug!("dropping unusable image '{}'", img.display_name);
                false
            }
        });

        let max_retries = ctx.config.max_retries;
        let backoff_ms = ctx.config.retry_backoff_ms;
        let upper_bound = ctx.config.upload_concurrency;

        let stats = run_fanout(
            ctx,
            upper_bound,
            |img| img.is_uploadable(),
            |mut img| {
                let client = client.clone();
                async move {
                    let data = img.content.take().expect("screened for content");
                    let name = img.display_name.clone();

                    let mut uploaded = None;
                    let mut last_err = None;
                    for attempt in 0..=max_retries {
                        if attempt > 0 {
                            let backoff = backoff_ms * 2u64.pow(attempt - 1);
                            tracing::warn!(
                                "{}: retry {}/{} after {}ms",
                                name,
                                attempt,
                                max_retries,
                                backoff
                            );
                            sleep(Duration::from_millis(backoff)).await;
                        }
                        match client.upload(&data, &name).await {
                            Ok(url) if !url.trim().is_empty() => {
                                uploaded = Some(url);
                                break;
                            }
                            Ok(_) => {
                                last_err = Some("provider returned an empty URL".to_string());
                            }
                            Err(e) => {
                                tracing::warn!("{}: attempt {} failed — {}", name, attempt + 1, e);
                                last_err = Some(e.to_string());
                            }
                        }
                    }
                    // The buffer stays with the item either way; the
                    // finalize stage is the single release point.
                    img.content = Some(data);

                    match uploaded {
                        Some(url) => {
                            tracing::info!("uploaded {} -> {}", name, url);
                            img.mark_uploaded(url);
                            (TaskVerdict::Keep(img), true)
                        }
                        None => {
                            tracing::warn!(
                                "upload failed for {}, keeping local: {}",
                                name,
                                last_err.unwrap_or_else(|| "unknown error".into())
                            );
                            img.mark_upload_failed();
                            (TaskVerdict::Keep(img), false)
                        }
                    }
                }
            },
        )
        .await;

        ctx.stats.uploaded += stats.succeeded;
        ctx.stats.upload_failed += stats.failed;
        Ok(StageControl::Continue)
    }
}
