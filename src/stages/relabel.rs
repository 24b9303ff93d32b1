//! Relabel stage: render the final mark text for freshly uploaded images.
//!
//! Only references that this run actually uploaded (`uploaded_url` set) get
//! a rendered mark. Items that failed upload already carry their inline
//! error marker, and marks that were remote before the run started are left
//! exactly as written.

use crate::config::MarkStyle;
use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;

/// Render `style` with the given title and URL.
pub fn render_mark(style: &MarkStyle, title: &str, url: &str) -> String {
    match style {
        MarkStyle::Original => format!("![{title}]({url})"),
        MarkStyle::HtmlCommon => {
            format!("<a title='{title}' href='{url}' >![{title}]({url})</a>")
        }
        MarkStyle::HtmlZoom => {
            format!("<a data-fancybox title='{title}' href='{url}' >![{title}]({url})</a>")
        }
        MarkStyle::Custom(template) => template
            .replace("{title}", title)
            .replace("{url}", url),
    }
}

pub struct RelabelStage;

#[async_trait]
impl Stage for RelabelStage {
    fn name(&self) -> &str {
        "Render image marks"
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let style = ctx.config.mark_style.clone();
        let tracker = ctx.tracker.clone();
        let stage_index = ctx.stage_index;
        let total = ctx.image_count();
        let mut current = 0usize;

        ctx.retain_images(|img| {
            current += 1;
            tracker.item_progress(stage_index, &img.display_name, current, total);
            if let Some(url) = img.uploaded_url.clone() {
                img.final_mark_text = Some(render_mark(&style, &img.title, &url));
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
    use crate::image_ref::{ImageLocation, ImageReference, MarkKind};

    #[test]
    fn templates_render_title_and_url() {
        assert_eq!(
            render_mark(&MarkStyle::Original, "t", "https://x/a.png"),
            "![t](https://x/a.png)"
        );
        assert_eq!(
            render_mark(&MarkStyle::HtmlCommon, "t", "https://x/a.png"),
            "<a title='t' href='https://x/a.png' >![t](https://x/a.png)</a>"
        );
        assert_eq!(
            render_mark(&MarkStyle::HtmlZoom, "t", "https://x/a.png"),
            "<a data-fancybox title='t' href='https://x/a.png' >![t](https://x/a.png)</a>"
        );
        assert_eq!(
            render_mark(
                &MarkStyle::Custom("<img alt=\"{title}\" src=\"{url}\">".into()),
                "t",
                "https://x/a.png"
            ),
            "<img alt=\"t\" src=\"https://x/a.png\">"
        );
    }

    fn image(name: &str) -> ImageReference {
        ImageReference {
            path: name.to_string(),
            title: "t".into(),
            display_name: name.to_string(),
            extension: "png".into(),
            location: ImageLocation::Local,
            mark_kind: MarkKind::Original,
            content: None,
            original_mark_text: format!("![t]({name})"),
            original_line_text: format!("![t]({name})"),
            uploaded_url: None,
            final_mark_text: None,
            line_number: 0,
            doc_index: 0,
        }
    }

    #[tokio::test]
    async fn only_freshly_uploaded_items_get_marks() {
        let mut uploaded = image("up.png");
        uploaded.mark_uploaded("https://cdn/up.png".into());

        let mut failed = image("fail.png");
        failed.mark_upload_failed();

        let mut pre_existing = image("old.png");
        pre_existing.location = ImageLocation::Network;
        pre_existing.path = "https://old/old.png".into();

        let mut ctx = ProcessingContext::new(HoistConfig::default());
        ctx.attach_document(Box::new(InMemoryDocument::new("d.md", "")));
        ctx.slots_mut()[0].images = vec![uploaded, failed, pre_existing];

        RelabelStage.execute(&mut ctx).await.unwrap();

        let images = &ctx.slots()[0].images;
        assert_eq!(images[0].final_mark_text.as_deref(), Some("![t](https://cdn/up.png)"));
        assert!(images[1].final_mark_text.as_deref().unwrap().contains("upload error"));
        assert!(images[2].final_mark_text.is_none());
    }
}
