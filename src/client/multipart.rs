//! Hand-built `multipart/form-data` bodies.
//!
//! The multipart-speaking providers validate the body layout strictly, so it
//! is assembled by hand rather than through an HTTP-client abstraction:
//! every part is framed as `--{boundary}\r\n`, headers, a blank line, the
//! payload, `\r\n`, and the body ends with `--{boundary}--\r\n`.

use uuid::Uuid;

const PREFIX: &str = "--";
const LINE_END: &str = "\r\n";

/// Incremental multipart body builder.
pub struct MultipartBody {
    boundary: String,
    buf: Vec<u8>,
}

impl MultipartBody {
    /// A builder with a fresh random boundary (lowercase uuid, no dashes).
    pub fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().simple().to_string())
    }

    /// A builder with a caller-chosen boundary. Tests use this to get
    /// byte-stable output.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buf: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Append one text field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "{PREFIX}{}{LINE_END}Content-Disposition: form-data; name=\"{name}\"{LINE_END}{LINE_END}{value}{LINE_END}",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    /// Append the binary file part with its own disposition and content type.
    pub fn file(mut self, name: &str, filename: &str, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "{PREFIX}{}{LINE_END}Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"{LINE_END}Content-Type: application/octet-stream{LINE_END}{LINE_END}",
                self.boundary
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(LINE_END.as_bytes());
        self
    }

    /// Close the body: returns the `Content-Type` header value and the bytes.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.buf
            .extend_from_slice(format!("{PREFIX}{}{PREFIX}{LINE_END}", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.buf,
        )
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}
