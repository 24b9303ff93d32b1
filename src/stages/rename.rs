//! Rename stage: apply the configured naming policy to upload names.
//!
//! Whitespace is stripped unconditionally first — a space inside an uploaded
//! filename turns animated gifs into static images on several hosts.

use crate::config::RenamePolicy;
use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::image_ref::ImageLocation;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Prefix for randomised names, marking the file as pipeline-generated.
const RANDOM_PREFIX: &str = "MDH-";

/// Apply `policy` to `name`. Pure: the clock and the random token are
/// parameters so the policies are testable.
pub fn apply_policy(name: &str, policy: RenamePolicy, now: DateTime<Utc>, token: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    match policy {
        RenamePolicy::KeepName => cleaned,
        RenamePolicy::DatePrefixed => format!("{}{}", now.format("%Y-%m-%d-"), cleaned),
        RenamePolicy::Random => {
            let extension = cleaned
                .rsplit_once('.')
                .map(|(_, ext)| format!(".{ext}"))
                .unwrap_or_default();
            format!("{RANDOM_PREFIX}{token}{extension}")
        }
    }
}

/// Six hex characters of a fresh v4 uuid.
fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

pub struct RenameStage;

#[async_trait]
impl Stage for RenameStage {
    fn name(&self) -> &str {
        "Rename images"
    }

    fn is_enabled(&self, ctx: &ProcessingContext) -> bool {
        ctx.config.rename != RenamePolicy::KeepName
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let policy = ctx.config.rename;
        let tracker = ctx.tracker.clone();
        let stage_index = ctx.stage_index;
        let total = ctx.image_count();
        let now = Utc::now();
        let mut current = 0usize;

        ctx.retain_images(|img| {
            current += 1;
            tracker.item_progress(stage_index, &img.display_name, current, total);
            if img.location == ImageLocation::Local {
                let renamed = apply_policy(&img.display_name, policy, now, &random_token());
                tracing::debug!("rename {} -> {}", img.display_name, renamed);
                img.display_name = renamed;
            }
            true
        });
        Ok(StageControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn keep_name_only_strips_whitespace() {
        assert_eq!(
            apply_policy("my shot .png", RenamePolicy::KeepName, fixed_now(), "abc123"),
            "myshot.png"
        );
    }

    #[test]
    fn date_prefix_uses_iso_date() {
        assert_eq!(
            apply_policy("shot.png", RenamePolicy::DatePrefixed, fixed_now(), "abc123"),
            "2026-08-06-shot.png"
        );
    }

    #[test]
    fn random_keeps_the_extension() {
        assert_eq!(
            apply_policy("shot.png", RenamePolicy::Random, fixed_now(), "abc123"),
            "MDH-abc123.png"
        );
        assert_eq!(
            apply_policy("noext", RenamePolicy::Random, fixed_now(), "abc123"),
            "MDH-abc123"
        );
    }

    #[test]
    fn policy_is_deterministic_given_clock_and_token() {
        let a = apply_policy("shot.png", RenamePolicy::DatePrefixed, fixed_now(), "x");
        let b = apply_policy("shot.png", RenamePolicy::DatePrefixed, fixed_now(), "x");
        assert_eq!(a, b);
    }

    #[test]
    fn random_tokens_are_six_chars() {
        let t = random_token();
        assert_eq!(t.len(), 6);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
