//! Compress stage: feed local image bytes through an injected compressor.
//!
//! Pixel-level work is not this crate's business — the [`ImageCompressor`]
//! is an opaque collaborator the caller supplies (a `mozjpeg` wrapper, an
//! external `pngquant`, anything). The stage is enabled only when a
//! compressor is configured, and a per-item compression failure keeps the
//! original bytes rather than losing the image.

use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::image_ref::ImageLocation;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;

/// Opaque byte-level image compression.
pub trait ImageCompressor: Send + Sync {
    /// Return the compressed replacement for `bytes`, or an error message.
    fn compress(&self, bytes: &[u8], extension: &str) -> Result<Vec<u8>, String>;
}

pub struct CompressStage;

#[async_trait]
impl Stage for CompressStage {
    fn name(&self) -> &str {
        "Compress images"
    }

    fn is_enabled(&self, ctx: &ProcessingContext) -> bool {
        ctx.config.compressor.is_some()
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let Some(compressor) = ctx.config.compressor.clone() else {
            return Ok(StageControl::Continue);
        };
        let tracker = ctx.tracker.clone();
        let stage_index = ctx.stage_index;
        let total = ctx.image_count();
        let mut current = 0usize;

        ctx.retain_images(|img| {
            current += 1;
            tracker.item_progress(stage_index, &img.display_name, current, total);

            if img.location != ImageLocation::Local {
                return true;
            }
            let Some(bytes) = img.content.as_ref() else {
                return true;
            };
            match compressor.compress(bytes, &img.extension) {
                Ok(compressed) => {
                    tracing::debug!(
                        "compressed {}: {} -> {} bytes",
                        img.display_name,
                        bytes.len(),
                        compressed.len()
                    );
                    img.content = Some(compressed);
                }
                Err(e) => {
                    tracing::warn!("compression failed for {}, keeping original: {}", img.display_name, e);
                }
            }
            true
        });

        Ok(StageControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoistConfig;
    use crate::document::InMemoryDocument;
    use crate::image_ref::{ImageReference, MarkKind};
    use std::sync::Arc;

    struct HalvingCompressor;

    impl ImageCompressor for HalvingCompressor {
        fn compress(&self, bytes: &[u8], _extension: &str) -> Result<Vec<u8>, String> {
            Ok(bytes[..bytes.len() / 2].to_vec())
        }
    }

    struct FailingCompressor;

    impl ImageCompressor for FailingCompressor {
        fn compress(&self, _bytes: &[u8], _extension: &str) -> Result<Vec<u8>, String> {
            Err("codec exploded".into())
        }
    }

    fn image(name: &str, content: Option<Vec<u8>>) -> ImageReference {
        ImageReference {
            path: name.to_string(),
            title: String::new(),
            display_name: name.to_string(),
            extension: "png".into(),
            location: ImageLocation::Local,
            mark_kind: MarkKind::Original,
            content,
            original_mark_text: format!("![]({name})"),
            original_line_text: format!("![]({name})"),
            uploaded_url: None,
            final_mark_text: None,
            line_number: 0,
            doc_index: 0,
        }
    }

    fn context(compressor: Option<Arc<dyn ImageCompressor>>) -> ProcessingContext {
        let mut builder = HoistConfig::builder();
        if let Some(c) = compressor {
            builder = builder.compressor(c);
        }
        let mut ctx = ProcessingContext::new(builder.build().unwrap());
        ctx.attach_document(Box::new(InMemoryDocument::new("d.md", "")));
        ctx
    }

    #[test]
    fn disabled_without_a_compressor() {
        let ctx = context(None);
        assert!(!CompressStage.is_enabled(&ctx));
        let ctx = context(Some(Arc::new(HalvingCompressor)));
        assert!(CompressStage.is_enabled(&ctx));
    }

    #[tokio::test]
    async fn compressed_bytes_replace_the_content() {
        let mut ctx = context(Some(Arc::new(HalvingCompressor)));
        ctx.slots_mut()[0].images = vec![image("a.png", Some(vec![0u8; 8]))];

        CompressStage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.slots()[0].images[0].content.as_ref().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failure_keeps_the_original_bytes() {
        let mut ctx = context(Some(Arc::new(FailingCompressor)));
        ctx.slots_mut()[0].images = vec![image("a.png", Some(vec![0u8; 8]))];

        CompressStage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.slots()[0].images[0].content.as_ref().unwrap().len(), 8);
        assert_eq!(ctx.image_count(), 1);
    }
}
