//! Document access: the seam between the pipeline and whatever owns the text.
//!
//! The pipeline never talks to an editor or the file system directly; it goes
//! through the [`Document`] trait so a host application can hand in live
//! editor buffers while the CLI and the tests use the bundled
//! [`InMemoryDocument`]. Offsets are always recomputed from the current text
//! at call time — a replacement earlier in the document cannot invalidate a
//! later one.

use std::path::{Path, PathBuf};

/// A mutable text document the pipeline may read and rewrite.
pub trait Document: Send {
    /// Display name, usually the file name.
    fn name(&self) -> &str;

    /// The directory local image paths are resolved against, if any.
    fn base_dir(&self) -> Option<&Path>;

    /// Current full text.
    fn text(&self) -> &str;

    /// Replace `start..end` (byte offsets into the current text) with `text`.
    fn replace_range(&mut self, start: usize, end: usize, text: &str);
}

/// Byte span of line `line_number` (zero-based), excluding the newline.
///
/// Returns `None` when the document has fewer lines.
pub fn line_span(text: &str, line_number: usize) -> Option<(usize, usize)> {
    let mut start = 0usize;
    for (i, line) in text.split('\n').enumerate() {
        if i == line_number {
            return Some((start, start + line.len()));
        }
        start += line.len() + 1;
    }
    None
}

/// The bundled string-backed document used by the CLI and tests.
#[derive(Debug, Clone)]
pub struct InMemoryDocument {
    name: String,
    base_dir: Option<PathBuf>,
    text: String,
}

impl InMemoryDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_dir: None,
            text: text.into(),
        }
    }

    /// A document whose relative image paths resolve against `dir`.
    pub fn with_base_dir(name: impl Into<String>, text: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            base_dir: Some(dir),
            text: text.into(),
        }
    }
}

impl Document for InMemoryDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn replace_range(&mut self, start: usize, end: usize, text: &str) {
        self.text.replace_range(start..end, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_span_finds_each_line() {
        let text = "first\nsecond\n\nfourth";
        assert_eq!(line_span(text, 0), Some((0, 5)));
        assert_eq!(line_span(text, 1), Some((6, 12)));
        assert_eq!(line_span(text, 2), Some((13, 13)));
        assert_eq!(line_span(text, 3), Some((14, 20)));
        assert_eq!(line_span(text, 4), None);
    }

    #[test]
    fn replace_range_splices_text() {
        let mut doc = InMemoryDocument::new("t.md", "a ![x](old.png) b");
        let (s, e) = line_span(doc.text(), 0).unwrap();
        let rewritten = doc.text()[s..e].replace("![x](old.png)", "![x](https://cdn/x.png)");
        doc.replace_range(s, e, &rewritten);
        assert_eq!(doc.text(), "a ![x](https://cdn/x.png) b");
    }
}
