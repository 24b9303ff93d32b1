//! Parse stage: scan attached documents for image marks.
//!
//! Works line by line, the way the documents are written: a mark is the
//! `![title](path)` sequence, optionally wrapped in an `<a …>…</a>` pair for
//! the click-to-zoom HTML variants. At most one mark is recognised per line;
//! multi-mark lines keep their first mark, which is also the only layout the
//! write-back splice has to reason about.

use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::image_ref::{ImageLocation, ImageReference, MarkKind};
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const MARK_PREFIX: &str = "![";
const MARK_MIDDLE: &str = "](";
const MARK_SUFFIX: &str = ")";
const HTML_A_START: &str = "<a";
const HTML_A_END: &str = "a>";

/// A structurally matched mark, before path resolution.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedMark {
    pub title: String,
    pub path: String,
    pub mark_text: String,
    pub mark_kind: MarkKind,
}

/// Match one line against the mark grammar.
pub fn match_image_mark(line: &str) -> Option<ParsedMark> {
    let trimmed = line.trim();
    let prefix = trimmed.find(MARK_PREFIX)?;
    let middle = trimmed[prefix..].find(MARK_MIDDLE)? + prefix;
    let suffix = trimmed[middle..].find(MARK_SUFFIX)? + middle;

    let (mark_text, mark_kind) =
        if trimmed.starts_with(HTML_A_START) && trimmed.ends_with(HTML_A_END) {
            let kind = if trimmed.contains("data-fancybox") {
                MarkKind::HtmlZoom
            } else if trimmed.contains("<a title='") {
                MarkKind::HtmlCommon
            } else {
                MarkKind::Custom
            };
            (trimmed.to_string(), kind)
        } else {
            (trimmed[prefix..=suffix].to_string(), MarkKind::Original)
        };

    let title = trimmed[prefix + MARK_PREFIX.len()..middle].trim().to_string();
    let path = trimmed[middle + MARK_MIDDLE.len()..suffix].trim().to_string();
    if path.is_empty() {
        return None;
    }

    Some(ParsedMark {
        title,
        path,
        mark_text,
        mark_kind,
    })
}

/// Filename from a path or URL, query string stripped.
fn file_name_of(path: &str) -> String {
    let no_query = path.split(['?', '#']).next().unwrap_or(path);
    no_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(no_query)
        .to_string()
}

/// Extension without the dot, lowercased.
fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Resolve a local mark path against the document's base directory.
fn resolve_local(base_dir: Option<&Path>, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        match base_dir {
            Some(dir) => dir.join(p),
            None => p,
        }
    }
}

/// Build a full [`ImageReference`] for a matched mark.
fn resolve_mark(
    mark: ParsedMark,
    base_dir: Option<&Path>,
    line_number: usize,
    line_text: &str,
    doc_index: usize,
) -> ImageReference {
    let is_network = mark.path.starts_with("http");
    let display_name = file_name_of(&mark.path);
    let extension = extension_of(&display_name);

    let (location, path, content) = if is_network {
        (ImageLocation::Network, mark.path, None)
    } else {
        let resolved = resolve_local(base_dir, &mark.path);
        let content = match std::fs::read(&resolved) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                // Leave the reference without content; the upload stage's
                // eligibility screen drops it.
                tracing::debug!("cannot read '{}': {}", resolved.display(), e);
                None
            }
        };
        (
            ImageLocation::Local,
            resolved.to_string_lossy().into_owned(),
            content,
        )
    };

    ImageReference {
        path,
        title: mark.title,
        display_name,
        extension,
        location,
        mark_kind: mark.mark_kind,
        content,
        original_mark_text: mark.mark_text,
        original_line_text: line_text.to_string(),
        uploaded_url: None,
        final_mark_text: None,
        line_number,
        doc_index,
    }
}

/// The parse stage. `network_only` is the rehost-chain variant that keeps
/// only remote references (the ones to pull down and re-host).
pub struct ParseStage {
    network_only: bool,
}

impl ParseStage {
    pub fn new() -> Self {
        Self {
            network_only: false,
        }
    }

    pub fn network_only() -> Self {
        Self { network_only: true }
    }
}

impl Default for ParseStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for ParseStage {
    fn name(&self) -> &str {
        "Parse documents"
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let tracker = ctx.tracker.clone();
        let stage_index = ctx.stage_index;
        let doc_count = ctx.document_count();

        for (doc_index, slot) in ctx.slots_mut().iter_mut().enumerate() {
            let name = slot.document.name().to_string();
            tracker.item_progress(stage_index, &name, doc_index + 1, doc_count);

            let base_dir = slot.document.base_dir().map(Path::to_path_buf);
            let mut images = Vec::new();
            for (line_number, line) in slot.document.text().split('\n').enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(mark) = match_image_mark(line) {
                    let image =
                        resolve_mark(mark, base_dir.as_deref(), line_number, line, doc_index);
                    if self.network_only && image.location != ImageLocation::Network {
                        continue;
                    }
                    images.push(image);
                }
            }
            tracing::debug!("{}: {} image marks", name, images.len());
            slot.images = images;
        }

        if ctx.image_count() == 0 {
            tracing::info!("no image marks found, stopping");
            return Ok(StageControl::Abort);
        }
        Ok(StageControl::Continue)
    }
}
