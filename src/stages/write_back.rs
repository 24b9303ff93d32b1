//! Write-back stage: splice final marks into the documents.
//!
//! Per document, in sequence order, each reference with a final mark has its
//! original mark replaced inside its own line. The line span is recomputed
//! from the document's current text for every splice, so a replacement that
//! changes the line's length cannot corrupt the offsets of later ones.

use crate::context::ProcessingContext;
use crate::document::line_span;
use crate::error::HoistError;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;

pub struct WriteBackStage;

#[async_trait]
impl Stage for WriteBackStage {
    fn name(&self) -> &str {
        "Write back documents"
    }

    fn is_enabled(&self, ctx: &ProcessingContext) -> bool {
        !ctx.config.dry_run
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let tracker = ctx.tracker.clone();
        let stage_index = ctx.stage_index;
        let total = ctx.image_count();
        let mut current = 0usize;

        for slot in ctx.slots_mut() {
            let document = &mut slot.document;
            for img in &slot.images {
                current += 1;
                tracker.item_progress(stage_index, &img.display_name, current, total);

                let Some(final_mark) = img.final_mark_text.as_deref() else {
                    continue;
                };
                if final_mark.trim().is_empty() {
                    continue;
                }
                let Some((start, end)) = line_span(document.text(), img.line_number) else {
                    tracing::warn!(
                        "line {} vanished from '{}', skipping write-back for {}",
                        img.line_number,
                        document.name(),
                        img.display_name
                    );
                    continue;
                };
                let line = &document.text()[start..end];
                if !line.contains(&img.original_mark_text) {
                    tracing::warn!(
                        "mark not found on line {} of '{}', skipping",
                        img.line_number,
                        document.name()
                    );
                    continue;
                }
                let rewritten = line.replace(&img.original_mark_text, final_mark);
                document.replace_range(start, end, &rewritten);
            }
        }
        Ok(StageControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoistConfig;
    use crate::document::InMemoryDocument;
    use crate::image_ref::{ImageLocation, ImageReference, MarkKind};

    fn image(mark: &str, line_text: &str, line_number: usize, final_mark: Option<&str>) -> ImageReference {
        ImageReference {
            path: String::new(),
            title: String::new(),
            display_name: "a.png".into(),
            extension: "png".into(),
            location: ImageLocation::Network,
            mark_kind: MarkKind::Original,
            content: None,
            original_mark_text: mark.to_string(),
            original_line_text: line_text.to_string(),
            uploaded_url: None,
            final_mark_text: final_mark.map(|s| s.to_string()),
            line_number,
            doc_index: 0,
        }
    }

    #[tokio::test]
    async fn final_marks_are_spliced_into_their_lines() {
        let text = "intro\nhere ![a](a.png) inline\n![b](b.png)\n";
        let mut ctx = ProcessingContext::new(HoistConfig::default());
        ctx.attach_document(Box::new(InMemoryDocument::new("d.md", text)));
        ctx.slots_mut()[0].images = vec![
            image("![a](a.png)", "here ![a](a.png) inline", 1, Some("![a](https://cdn/a.png)")),
            image("![b](b.png)", "![b](b.png)", 2, Some("![b](https://cdn/b.png)")),
        ];

        WriteBackStage.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.slots()[0].document.text(),
            "intro\nhere ![a](https://cdn/a.png) inline\n![b](https://cdn/b.png)\n"
        );
    }

    #[tokio::test]
    async fn items_without_final_marks_leave_their_lines_alone() {
        let text = "![keep](https://old/keep.png)";
        let mut ctx = ProcessingContext::new(HoistConfig::default());
        ctx.attach_document(Box::new(InMemoryDocument::new("d.md", text)));
        ctx.slots_mut()[0].images =
            vec![image("![keep](https://old/keep.png)", text, 0, None)];

        WriteBackStage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.slots()[0].document.text(), text);
    }

    #[test]
    fn dry_run_disables_the_stage() {
        let config = HoistConfig::builder().dry_run(true).build().unwrap();
        let ctx = ProcessingContext::new(config);
        assert!(!WriteBackStage.is_enabled(&ctx));
    }
}
