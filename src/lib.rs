//! # mdhoist
//!
//! Hoist local images out of Markdown documents onto a remote image host.
//!
//! ## Why this crate?
//!
//! Markdown written locally accumulates local image paths — screenshots next
//! to the file, clipboard pastes in an `assets/` directory. The moment the
//! document is shared, every one of those references breaks. This crate
//! scans documents for image marks, pushes the bytes to a configured remote
//! provider, and rewrites the marks in place, so the document that leaves
//! your machine renders everywhere.
//!
//! ## Pipeline Overview
//!
//! ```text
//! documents
//!  │
//!  ├─ 1. Parse      scan lines for ![title](path) and <a>-wrapped variants
//!  ├─ 2. Compress   optional, through an injected compressor
//!  ├─ 3. Rename     date-prefixed / randomised upload names
//!  ├─ 4. Client     resolve the provider from the registry (config gate)
//!  ├─ 5. Upload     bounded fan-out, per-item failure isolation
//!  ├─ 6. Relabel    render the configured markup flavour
//!  ├─ 7. WriteBack  splice final marks into the documents
//!  └─ 8. Finalize   release buffers, clear sequences
//! ```
//!
//! A second chain, [`Orchestrator::rehost_chain`], first downloads remote
//! images and then re-hosts them on the configured provider.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdhoist::{
//!     CloudKind, HoistConfig, InMemoryDocument, Orchestrator, ProcessingContext, SmmsSettings,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HoistConfig::builder()
//!         .cloud(CloudKind::Smms)
//!         .smms(SmmsSettings { token: "…".into(), ..Default::default() })
//!         .build()?;
//!
//!     let mut ctx = ProcessingContext::new(config.clone());
//!     let text = std::fs::read_to_string("post.md")?;
//!     ctx.attach_document(Box::new(InMemoryDocument::new("post.md", text)));
//!
//!     let summary = Orchestrator::hoist_chain(&config).run(&mut ctx).await?;
//!     eprintln!("{} uploaded, {} failed", summary.stats.uploaded, summary.stats.upload_failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Providers
//!
//! | Provider | Wire protocol |
//! |----------|---------------|
//! | `aliyun` | signed-header REST PUT |
//! | `tencent` | query-parameter-signed REST PUT |
//! | `qiniu` | token-policy multipart POST |
//! | `github` / `gitee` | JSON content API |
//! | `smms` / `custom` | multipart/form-data POST |
//! | `piclist` | external-process delegation (or HTTP API) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod fanout;
pub mod image_ref;
pub mod orchestrator;
pub mod progress;
pub mod stage;
pub mod stages;
pub mod tracker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ClientRegistry, CloudKind, StorageClient};
pub use config::{
    AliyunSettings, CustomSettings, HoistConfig, HoistConfigBuilder, MarkStyle, PicListSettings,
    ProviderConfig, QiniuSettings, RenamePolicy, RepoSettings, SmmsSettings, TencentSettings,
};
pub use context::{ProcessingContext, RunStats};
pub use document::{Document, InMemoryDocument};
pub use error::{HoistError, ItemError};
pub use image_ref::{ImageLocation, ImageReference, MarkKind};
pub use orchestrator::{Orchestrator, RunSummary};
pub use progress::{NoopProgressSink, ProgressSink, SharedProgressSink};
pub use stage::{Stage, StageControl};
pub use stages::compress::ImageCompressor;
pub use stages::download::{FetchedImage, HttpFetcher, ImageFetcher};
pub use tracker::ProgressTracker;
