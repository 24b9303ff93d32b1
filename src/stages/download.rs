//! Download stage (rehost chain): pull remote images down so the upload
//! stage can push them to the configured provider.
//!
//! Fan-out over every network reference, bounded at
//! `min(max(n, 2), download_concurrency)` workers. A failed or empty fetch
//! drops the item — there is nothing to re-host — while successes become
//! ordinary local items: bytes in `content`, extension sniffed from the
//! Content-Type header or, failing that, the magic bytes.

use crate::context::ProcessingContext;
use crate::error::{HoistError, ItemError};
use crate::fanout::{run_fanout, TaskVerdict};
use crate::image_ref::ImageLocation;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Bytes plus whatever the server claimed about them.
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// The seam between the download stage and HTTP, so tests (and hosts with
/// their own networking) can substitute the transport.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ItemError>;
}

/// The bundled reqwest-backed fetcher.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("mdhoist")
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ItemError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ItemError::Network {
                name: url.to_string(),
                detail: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ItemError::Protocol {
                name: url.to_string(),
                status: status.as_u16(),
                detail: "download failed".into(),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ItemError::Network {
                name: url.to_string(),
                detail: e.to_string(),
            })?
            .to_vec();
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Extension for a `Content-Type` header value, if it names an image type.
fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    // The header may carry parameters: "image/jpeg; charset=utf-8".
    let mime = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "image/svg+xml" => Some("svg"),
        "image/tiff" => Some("tiff"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        _ => None,
    }
}

/// Extension sniffed from the bytes themselves.
fn extension_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Jpeg => Some("jpg"),
        image::ImageFormat::Png => Some("png"),
        image::ImageFormat::Gif => Some("gif"),
        image::ImageFormat::WebP => Some("webp"),
        image::ImageFormat::Bmp => Some("bmp"),
        image::ImageFormat::Tiff => Some("tiff"),
        image::ImageFormat::Ico => Some("ico"),
        _ => None,
    }
}

/// Swap (or add) the extension on `name`.
fn with_extension(name: &str, extension: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{extension}"),
        _ => format!("{name}.{extension}"),
    }
}

pub struct DownloadStage {
    fetcher: Arc<dyn ImageFetcher>,
}

impl DownloadStage {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Stage for DownloadStage {
    fn name(&self) -> &str {
        "Download images"
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let fetcher = self.fetcher.clone();
        let upper_bound = ctx.config.download_concurrency;

        let stats = run_fanout(
            ctx,
            upper_bound,
            |img| img.location == ImageLocation::Network && !img.path.is_empty(),
            |mut img| {
                let fetcher = fetcher.clone();
                async move {
                    match fetcher.fetch(&img.path).await {
                        Ok(fetched) if !fetched.bytes.is_empty() => {
                            let extension = fetched
                                .content_type
                                .as_deref()
                                .and_then(extension_from_content_type)
                                .or_else(|| extension_from_bytes(&fetched.bytes))
                                .unwrap_or("png");
                            img.display_name = with_extension(&img.display_name, extension);
                            img.extension = extension.to_string();
                            img.content = Some(fetched.bytes);
                            img.location = ImageLocation::Local;
                            (TaskVerdict::Keep(img), true)
                        }
                        Ok(_) => {
                            tracing::warn!("empty download for {}, dropping", img.path);
                            (TaskVerdict::Drop, false)
                        }
                        Err(e) => {
                            tracing::warn!("download failed, dropping item: {e}");
                            (TaskVerdict::Drop, false)
                        }
                    }
                }
            },
        )
        .await;

        ctx.stats.downloaded += stats.succeeded;
        ctx.stats.download_failed += stats.failed;
        Ok(StageControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoistConfig;
    use crate::document::InMemoryDocument;
    use crate::image_ref::{ImageReference, MarkKind};

    struct StubFetcher {
        fail_on: &'static str,
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, ItemError> {
            if url.contains(self.fail_on) {
                return Err(ItemError::Network {
                    name: url.to_string(),
                    detail: "connection refused".into(),
                });
            }
            // A real PNG header so magic-byte sniffing has something to find.
            Ok(FetchedImage {
                bytes: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3],
                content_type: None,
            })
        }
    }

    fn network_image(url: &str) -> ImageReference {
        ImageReference {
            path: url.to_string(),
            title: String::new(),
            display_name: url.rsplit('/').next().unwrap().to_string(),
            extension: String::new(),
            location: ImageLocation::Network,
            mark_kind: MarkKind::Original,
            content: None,
            original_mark_text: format!("![]({url})"),
            original_line_text: format!("![]({url})"),
            uploaded_url: None,
            final_mark_text: None,
            line_number: 0,
            doc_index: 0,
        }
    }

    fn context(urls: &[&str]) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(HoistConfig::default());
        ctx.attach_document(Box::new(InMemoryDocument::new("d.md", "")));
        ctx.slots_mut()[0].images = urls.iter().map(|u| network_image(u)).collect();
        ctx
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(extension_from_content_type("image/jpeg; charset=utf-8"), Some("jpg"));
        assert_eq!(extension_from_content_type("image/png"), Some("png"));
        assert_eq!(extension_from_content_type("text/html"), None);
    }

    #[test]
    fn extension_replacement() {
        assert_eq!(with_extension("a.jpeg", "jpg"), "a.jpg");
        assert_eq!(with_extension("noext", "png"), "noext.png");
        assert_eq!(with_extension(".hidden", "png"), ".hidden.png");
    }

    #[tokio::test]
    async fn successful_download_becomes_a_local_item() {
        let mut ctx = context(&["http://x/a"]);
        let stage = DownloadStage::new(Arc::new(StubFetcher { fail_on: "never-matches" }));
        stage.execute(&mut ctx).await.unwrap();

        let img = &ctx.slots()[0].images[0];
        assert_eq!(img.location, ImageLocation::Local);
        assert_eq!(img.extension, "png"); // sniffed from magic bytes
        assert_eq!(img.display_name, "a.png");
        assert!(img.content.is_some());
        assert_eq!(ctx.stats.downloaded, 1);
    }

    #[tokio::test]
    async fn failed_download_is_dropped_from_its_sequence() {
        let mut ctx = context(&["http://x/good", "http://x/bad"]);
        let stage = DownloadStage::new(Arc::new(StubFetcher { fail_on: "bad" }));
        stage.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.image_count(), 1);
        assert_eq!(ctx.slots()[0].images[0].display_name, "good.png");
        assert_eq!(ctx.stats.download_failed, 1);
    }
}
