//! Storage clients: one uniform upload contract, one implementation per
//! remote provider.
//!
//! Six materially different wire protocols hide behind [`StorageClient`]:
//! signed-header REST (Aliyun), query-signed REST (Tencent), token-policy
//! multipart (Qiniu), JSON content APIs (GitHub/Gitee), generic multipart
//! (SM.MS and custom hosts), and external-process delegation (PicList).
//! The [`ClientRegistry`] maps the closed [`CloudKind`] enumeration onto
//! lazily constructed singletons through an explicit factory match — no
//! runtime scanning, and the registry itself is built per pipeline run
//! rather than living in a process-wide static.

pub mod aliyun;
pub mod custom;
pub mod gitee;
pub mod github;
pub mod multipart;
pub mod piclist;
pub mod qiniu;
pub mod sign;
pub mod smms;
pub mod tencent;

use crate::config::{HoistConfig, ProviderConfig};
use crate::error::{HoistError, ItemError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudKind {
    Aliyun,
    Tencent,
    Qiniu,
    Github,
    Gitee,
    Smms,
    Custom,
    PicList,
}

impl CloudKind {
    pub const ALL: [CloudKind; 8] = [
        CloudKind::Aliyun,
        CloudKind::Tencent,
        CloudKind::Qiniu,
        CloudKind::Github,
        CloudKind::Gitee,
        CloudKind::Smms,
        CloudKind::Custom,
        CloudKind::PicList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloudKind::Aliyun => "aliyun",
            CloudKind::Tencent => "tencent",
            CloudKind::Qiniu => "qiniu",
            CloudKind::Github => "github",
            CloudKind::Gitee => "gitee",
            CloudKind::Smms => "smms",
            CloudKind::Custom => "custom",
            CloudKind::PicList => "piclist",
        }
    }
}

impl fmt::Display for CloudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CloudKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aliyun" => Ok(CloudKind::Aliyun),
            "tencent" => Ok(CloudKind::Tencent),
            "qiniu" => Ok(CloudKind::Qiniu),
            "github" => Ok(CloudKind::Github),
            "gitee" => Ok(CloudKind::Gitee),
            "smms" | "sm.ms" => Ok(CloudKind::Smms),
            "custom" => Ok(CloudKind::Custom),
            "piclist" => Ok(CloudKind::PicList),
            other => Err(format!(
                "unknown provider '{other}', expected one of: aliyun, tencent, qiniu, github, gitee, smms, custom, piclist"
            )),
        }
    }
}

/// Uniform upload contract.
///
/// `upload` must either return a reachable, non-empty URL or fail; it must be
/// safe to call from multiple fan-out tasks concurrently. Clients are
/// immutable after construction — the external-process client is the one
/// exception, and it bounds its concurrent spawns internally.
#[async_trait]
pub trait StorageClient: Send + Sync {
    fn cloud_kind(&self) -> CloudKind;

    /// Push `data` under `name`, returning the public URL.
    async fn upload(&self, data: &[u8], name: &str) -> Result<String, ItemError>;

    /// Validate an **unsaved** settings bag by uploading with it.
    ///
    /// Implementations must use the supplied values, never the ones this
    /// client was constructed with, so callers can answer "does this
    /// credential set work" before persisting configuration.
    async fn probe(
        &self,
        data: &[u8],
        name: &str,
        settings: &ProviderConfig,
    ) -> Result<String, ItemError>;
}

/// The error every `probe` implementation returns when handed a settings bag
/// for a different provider.
pub(crate) fn probe_mismatch(kind: CloudKind, name: &str) -> ItemError {
    ItemError::Resource {
        name: name.to_string(),
        detail: format!("probe settings are not for provider '{kind}'"),
    }
}

/// Shared reqwest client construction for the HTTP-speaking providers.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("mdhoist")
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

/// Map a transport-level reqwest error onto the per-item taxonomy.
pub(crate) fn network_error(name: &str, err: reqwest::Error) -> ItemError {
    ItemError::Network {
        name: name.to_string(),
        detail: err.to_string(),
    }
}

/// `CloudKind → StorageClient` table with construct-once-publish semantics.
///
/// Entries are built lazily on first lookup through an explicit factory
/// match; repeated lookups return the same `Arc`. The registry is created
/// per pipeline build from that run's [`HoistConfig`] and threaded through
/// the processing context.
pub struct ClientRegistry {
    config: HoistConfig,
    clients: Mutex<HashMap<CloudKind, Arc<dyn StorageClient>>>,
}

impl ClientRegistry {
    pub fn new(config: HoistConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Look up (constructing on first use) the client for `kind`.
    pub fn client(&self, kind: CloudKind) -> Result<Arc<dyn StorageClient>, HoistError> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(existing) = clients.get(&kind) {
            return Ok(existing.clone());
        }
        let built = self.build(kind)?;
        clients.insert(kind, built.clone());
        Ok(built)
    }

    /// Explicit factory dispatch: one arm per provider, each requiring its
    /// settings bag to be present and complete.
    fn build(&self, kind: CloudKind) -> Result<Arc<dyn StorageClient>, HoistError> {
        let timeout = self.config.request_timeout_secs;
        let not_configured = |hint: String| HoistError::ClientNotConfigured {
            provider: kind.to_string(),
            hint,
        };

        let client: Arc<dyn StorageClient> = match kind {
            CloudKind::Aliyun => {
                let settings = self.config.aliyun.clone().ok_or_else(|| {
                    not_configured("Set bucket, endpoint, access_key and secret_key.".into())
                })?;
                Arc::new(aliyun::AliyunClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::Tencent => {
                let settings = self.config.tencent.clone().ok_or_else(|| {
                    not_configured("Set bucket, region, secret_id and secret_key.".into())
                })?;
                Arc::new(tencent::TencentClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::Qiniu => {
                let settings = self.config.qiniu.clone().ok_or_else(|| {
                    not_configured("Set bucket, domain, access_key and secret_key.".into())
                })?;
                Arc::new(qiniu::QiniuClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::Github => {
                let settings = self.config.github.clone().ok_or_else(|| {
                    not_configured("Set repo ('owner/name'), branch and token.".into())
                })?;
                Arc::new(github::GithubClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::Gitee => {
                let settings = self.config.gitee.clone().ok_or_else(|| {
                    not_configured("Set repo ('owner/name'), branch and token.".into())
                })?;
                Arc::new(gitee::GiteeClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::Smms => {
                let settings = self.config.smms.clone().ok_or_else(|| {
                    not_configured("Set the API token.".into())
                })?;
                Arc::new(smms::SmmsClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::Custom => {
                let settings = self.config.custom.clone().ok_or_else(|| {
                    not_configured("Set api, file_field and response_url_path.".into())
                })?;
                Arc::new(custom::CustomClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
            CloudKind::PicList => {
                let settings = self.config.piclist.clone().ok_or_else(|| {
                    not_configured("Set exe_path or api.".into())
                })?;
                Arc::new(piclist::PicListClient::from_settings(settings, timeout).map_err(not_configured)?)
            }
        };
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmmsSettings;

    #[test]
    fn cloud_kind_round_trips_through_strings() {
        for kind in CloudKind::ALL {
            assert_eq!(kind.as_str().parse::<CloudKind>().unwrap(), kind);
        }
        assert!("warehouse13".parse::<CloudKind>().is_err());
    }

    #[test]
    fn registry_memoizes_clients() {
        let config = HoistConfig::builder()
            .smms(SmmsSettings {
                token: "tok".into(),
                ..SmmsSettings::default()
            })
            .build()
            .unwrap();
        let registry = ClientRegistry::new(config);

        let a = registry.client(CloudKind::Smms).unwrap();
        let b = registry.client(CloudKind::Smms).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.cloud_kind(), CloudKind::Smms);
    }

    #[test]
    fn missing_settings_is_a_configuration_error() {
        let registry = ClientRegistry::new(HoistConfig::default());
        let err = match registry.client(CloudKind::Aliyun) {
            Ok(_) => panic!("expected configuration error"),
            Err(e) => e,
        };
        assert!(matches!(err, HoistError::ClientNotConfigured { .. }));
        assert!(err.to_string().contains("aliyun"));
    }
}
