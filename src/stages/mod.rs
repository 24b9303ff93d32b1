//! Concrete pipeline stages.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets chains mix them
//! freely — the hoist chain and the rehost chain share every stage except
//! the download step.
//!
//! ## Data Flow
//!
//! ```text
//! parse ──▶ compress ──▶ rename ──▶ acquire ──▶ [download] ──▶ upload ──▶ relabel ──▶ write-back ──▶ finalize
//! (scan)    (opaque)     (policy)   (client)    (fan-out)      (fan-out)  (template)  (splice)       (cleanup)
//! ```

pub mod acquire_client;
pub mod compress;
pub mod download;
pub mod finalize;
pub mod parse;
pub mod relabel;
pub mod rename;
pub mod upload;
pub mod write_back;
