//! The image-reference entity: one parsed image mark inside a document.
//!
//! An [`ImageReference`] is created by the parse stage and then mutated in
//! place by every later stage that applies to it — compressed bytes replace
//! `content`, the rename stage rewrites `display_name`, a successful upload
//! flips `location` to [`ImageLocation::Network`] and points `path` at the
//! remote URL, the relabel stage renders `final_mark_text`, and the finalize
//! stage drops the content buffer and removes the reference from its
//! sequence.

use serde::Serialize;

/// Where the reference currently points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageLocation {
    /// A path on the local file system (or downloaded bytes awaiting upload).
    Local,
    /// An `http(s)://` URL.
    Network,
}

/// The markup flavour of the original image mark.
///
/// `![title](path)` is [`MarkKind::Original`]; the two `<a>`-wrapped HTML
/// variants come from documents written for blogs that want click-to-zoom
/// behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkKind {
    /// Plain `![title](path)`.
    Original,
    /// `<a title='…' href='…'>![…](…)</a>`.
    HtmlCommon,
    /// `<a data-fancybox title='…' href='…'>![…](…)</a>`.
    HtmlZoom,
    /// Any other `<a>`-wrapped form we recognised but do not template.
    Custom,
}

/// One image markup occurrence in a document.
#[derive(Debug, Clone)]
pub struct ImageReference {
    /// Current reference target: a local path or a remote URL.
    pub path: String,
    /// The `[title]` part of the mark. May be empty.
    pub title: String,
    /// Filename used on upload. Rewritten by the rename stage.
    pub display_name: String,
    /// File extension without the leading dot, e.g. `png`.
    pub extension: String,
    pub location: ImageLocation,
    pub mark_kind: MarkKind,
    /// Owned bytes, opened when the reference is resolved and dropped
    /// exactly once by the finalize stage.
    pub content: Option<Vec<u8>>,
    /// The exact mark substring to be replaced, e.g. `![a](b.png)`.
    pub original_mark_text: String,
    /// The full line the mark was found on.
    pub original_line_text: String,
    /// URL returned by a successful upload of this exact reference.
    /// Distinguishes freshly hoisted images from marks that were already
    /// remote when parsed.
    pub uploaded_url: Option<String>,
    /// The text to substitute for the original mark. `None` until the
    /// relabel stage (or an upload failure marker) fills it in.
    pub final_mark_text: Option<String>,
    /// Zero-based line number within the owning document.
    pub line_number: usize,
    /// Index of the owning document slot in the processing context.
    pub doc_index: usize,
}

impl ImageReference {
    /// True when the reference has bytes ready to push to a provider.
    pub fn is_uploadable(&self) -> bool {
        self.location == ImageLocation::Local
            && !self.display_name.trim().is_empty()
            && self.content.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Downgrade the reference after a failed upload: it stays in its
    /// sequence, local, with an inline error marker so the write-back stage
    /// leaves a visible trace instead of silently dropping the image.
    pub fn mark_upload_failed(&mut self) {
        self.location = ImageLocation::Local;
        self.final_mark_text = Some(format!("![upload error]({})", self.path));
    }

    /// Promote the reference after a successful upload.
    pub fn mark_uploaded(&mut self, url: String) {
        self.uploaded_url = Some(url.clone());
        self.path = url;
        self.location = ImageLocation::Network;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, content: Option<Vec<u8>>) -> ImageReference {
        ImageReference {
            path: format!("/tmp/{name}"),
            title: String::new(),
            display_name: name.to_string(),
            extension: "png".to_string(),
            location: ImageLocation::Local,
            mark_kind: MarkKind::Original,
            content,
            original_mark_text: format!("![]({name})"),
            original_line_text: format!("before ![]({name}) after"),
            uploaded_url: None,
            final_mark_text: None,
            line_number: 0,
            doc_index: 0,
        }
    }

    #[test]
    fn uploadable_requires_name_and_content() {
        assert!(reference("a.png", Some(vec![1, 2, 3])).is_uploadable());
        assert!(!reference("a.png", None).is_uploadable());
        assert!(!reference("a.png", Some(vec![])).is_uploadable());
        assert!(!reference("  ", Some(vec![1])).is_uploadable());
    }

    #[test]
    fn network_reference_is_not_uploadable() {
        let mut r = reference("a.png", Some(vec![1]));
        r.location = ImageLocation::Network;
        assert!(!r.is_uploadable());
    }

    #[test]
    fn failed_upload_keeps_path_and_marks_error() {
        let mut r = reference("a.png", Some(vec![1]));
        r.mark_upload_failed();
        assert_eq!(r.location, ImageLocation::Local);
        assert_eq!(r.path, "/tmp/a.png");
        assert!(r.final_mark_text.as_deref().unwrap().contains("upload error"));
    }

    #[test]
    fn successful_upload_flips_location() {
        let mut r = reference("a.png", Some(vec![1]));
        r.mark_uploaded("https://cdn/a.png".into());
        assert_eq!(r.location, ImageLocation::Network);
        assert_eq!(r.path, "https://cdn/a.png");
        assert_eq!(r.uploaded_url.as_deref(), Some("https://cdn/a.png"));
    }
}
