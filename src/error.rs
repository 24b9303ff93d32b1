//! Error types for the mdhoist library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HoistError`] — **Fatal**: the pipeline cannot proceed at all
//!   (no documents attached, provider not configured, invalid config).
//!   Returned as `Err(HoistError)` from [`crate::orchestrator::Orchestrator::run`].
//!
//! * [`ItemError`] — **Non-fatal**: a single image reference failed
//!   (connection refused, bad signature, external tool timed out) but every
//!   other item is fine. Recorded on the item — an upload failure leaves the
//!   reference local with an inline error marker — so callers can inspect
//!   partial success rather than losing the whole run to one bad image.
//!
//! The separation mirrors the recovery policy: item errors are always
//! recovered locally and logged at low severity; only configuration errors
//! abort the chain and reach the user.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mdhoist library.
///
/// Per-item failures use [`ItemError`] and stay on the failing
/// [`crate::image_ref::ImageReference`] rather than propagating here.
#[derive(Debug, Error)]
pub enum HoistError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The selected provider has no usable settings.
    #[error("Storage provider '{provider}' is not configured.\n{hint}")]
    ClientNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The context was run without any attached document.
    #[error("No documents to process. Attach at least one document before running the pipeline.")]
    NoDocuments,

    /// A document file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write a rewritten document back to disk.
    #[error("Failed to write document '{path}': {source}")]
    WriteBack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled through the progress sink.
    #[error("Run cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image reference.
///
/// One item failing never cancels its siblings: the fan-out runner counts
/// the failure, downgrades or drops the item, and keeps the pool running.
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    /// The network operation itself failed (timeout, connection refused).
    #[error("network error for '{name}': {detail}")]
    Network { name: String, detail: String },

    /// The remote spoke, but not the way the protocol requires.
    #[error("protocol error for '{name}': HTTP {status}: {detail}")]
    Protocol {
        name: String,
        status: u16,
        detail: String,
    },

    /// The item's own data is unusable (empty content, blank name).
    #[error("unusable image '{name}': {detail}")]
    Resource { name: String, detail: String },

    /// The external upload tool failed or timed out.
    #[error("upload tool failed for '{name}': {detail}")]
    Process { name: String, detail: String },
}

impl ItemError {
    /// Name of the image the error belongs to.
    pub fn item_name(&self) -> &str {
        match self {
            ItemError::Network { name, .. }
            | ItemError::Protocol { name, .. }
            | ItemError::Resource { name, .. }
            | ItemError::Process { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_not_configured_display() {
        let e = HoistError::ClientNotConfigured {
            provider: "aliyun".into(),
            hint: "Set bucket, endpoint, access key and secret key.".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("aliyun"));
        assert!(msg.contains("Set bucket"));
    }

    #[test]
    fn protocol_error_display() {
        let e = ItemError::Protocol {
            name: "shot.png".into(),
            status: 403,
            detail: "SignatureDoesNotMatch".into(),
        };
        assert!(e.to_string().contains("403"));
        assert!(e.to_string().contains("shot.png"));
    }

    #[test]
    fn item_name_is_stable_across_variants() {
        let errors = [
            ItemError::Network {
                name: "a.png".into(),
                detail: "timeout".into(),
            },
            ItemError::Resource {
                name: "a.png".into(),
                detail: "empty".into(),
            },
            ItemError::Process {
                name: "a.png".into(),
                detail: "exit 1".into(),
            },
        ];
        for e in errors {
            assert_eq!(e.item_name(), "a.png");
        }
    }
}
