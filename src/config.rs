//! Configuration types for a hoist run.
//!
//! All pipeline behaviour is controlled through [`HoistConfig`], built via
//! its [`HoistConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A constructor with a dozen provider-settings parameters is unreadable and
//! breaks on every new provider. The builder lets callers set only what they
//! care about and rely on documented defaults for the rest.

use crate::client::CloudKind;
use crate::error::HoistError;
use crate::stages::compress::ImageCompressor;
use crate::stages::download::ImageFetcher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How uploaded files are named.
///
/// Whitespace is always stripped from the name first — spaces in an uploaded
/// filename break animated gifs on several providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenamePolicy {
    /// Keep the parsed filename. (default)
    #[default]
    KeepName,
    /// Prefix with the current date: `2026-08-06-name.png`.
    DatePrefixed,
    /// Replace with a random name: `MDH-3fa9c1.png`.
    Random,
}

/// The markup flavour written back for uploaded images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum MarkStyle {
    /// Plain `![title](url)`. (default)
    #[default]
    Original,
    /// `<a title='{title}' href='{url}' >![{title}]({url})</a>`.
    HtmlCommon,
    /// `<a data-fancybox title='{title}' href='{url}' >![{title}]({url})</a>`.
    HtmlZoom,
    /// Custom template with `{title}` and `{url}` placeholders.
    Custom(String),
}

// ── Provider settings ────────────────────────────────────────────────────
//
// One plain-data struct per provider, independently serialisable so the CLI
// can load them from a TOML file and the probe path can validate an unsaved
// bag without touching constructed clients.

/// Signed-header object store settings (Aliyun OSS style).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliyunSettings {
    pub bucket: String,
    /// Service endpoint, e.g. `oss-cn-hangzhou.aliyuncs.com`.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Optional custom domain used both for the request and the public URL.
    #[serde(default)]
    pub custom_domain: Option<String>,
}

/// Query-signed object store settings (Tencent COS style).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TencentSettings {
    /// Bucket name including the APPID suffix, e.g. `shots-125000000`.
    pub bucket: String,
    /// Region, e.g. `ap-chengdu`.
    pub region: String,
    pub secret_id: String,
    pub secret_key: String,
}

/// Token-policy upload settings (Qiniu style).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QiniuSettings {
    pub bucket: String,
    /// Public domain the uploaded key is served from.
    pub domain: String,
    pub access_key: String,
    pub secret_key: String,
    /// Upload endpoint; region-specific hosts exist.
    #[serde(default = "QiniuSettings::default_upload_host")]
    pub upload_host: String,
}

impl QiniuSettings {
    fn default_upload_host() -> String {
        "https://upload.qiniu.com".to_string()
    }
}

/// Repository content-API settings (GitHub / Gitee).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSettings {
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
    pub token: String,
}

/// SM.MS settings: a raw Authorization header value plus the API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmmsSettings {
    pub token: String,
    #[serde(default = "SmmsSettings::default_api")]
    pub api: String,
}

impl SmmsSettings {
    fn default_api() -> String {
        "https://sm.ms/api/v2/upload".to_string()
    }
}

impl Default for SmmsSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            api: Self::default_api(),
        }
    }
}

/// Generic multipart image-host settings.
///
/// `response_url_path` is a dot-path into the JSON response, e.g. `data.url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSettings {
    pub api: String,
    /// `POST` or `PUT`.
    #[serde(default = "CustomSettings::default_method")]
    pub http_method: String,
    /// Form field name carrying the binary part.
    #[serde(default = "CustomSettings::default_file_field")]
    pub file_field: String,
    pub response_url_path: String,
    /// Extra text form fields sent alongside the file.
    #[serde(default)]
    pub extra_fields: Vec<(String, String)>,
    /// Extra request headers, e.g. a raw `Authorization` value.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl CustomSettings {
    fn default_method() -> String {
        "POST".to_string()
    }

    fn default_file_field() -> String {
        "image".to_string()
    }
}

/// PicList settings: command-line delegation when `exe_path` is set,
/// otherwise the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicListSettings {
    #[serde(default)]
    pub exe_path: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
    /// Target picbed name passed as a query parameter.
    #[serde(default)]
    pub picbed: Option<String>,
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    /// Hard wall-clock limit for one external-process upload.
    #[serde(default = "PicListSettings::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PicListSettings {
    fn default_timeout_secs() -> u64 {
        10
    }
}

impl Default for PicListSettings {
    fn default() -> Self {
        Self {
            exe_path: None,
            api: None,
            picbed: None,
            config_name: None,
            key: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// An unsaved settings bag for credential probing.
///
/// [`crate::client::StorageClient::probe`] must use these values, never the
/// ones the client was constructed with, so a caller can answer "does this
/// credential set work" before persisting anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderConfig {
    Aliyun(AliyunSettings),
    Tencent(TencentSettings),
    Qiniu(QiniuSettings),
    Github(RepoSettings),
    Gitee(RepoSettings),
    Smms(SmmsSettings),
    Custom(CustomSettings),
    PicList(PicListSettings),
}

impl ProviderConfig {
    /// The provider this bag belongs to.
    pub fn cloud_kind(&self) -> CloudKind {
        match self {
            ProviderConfig::Aliyun(_) => CloudKind::Aliyun,
            ProviderConfig::Tencent(_) => CloudKind::Tencent,
            ProviderConfig::Qiniu(_) => CloudKind::Qiniu,
            ProviderConfig::Github(_) => CloudKind::Github,
            ProviderConfig::Gitee(_) => CloudKind::Gitee,
            ProviderConfig::Smms(_) => CloudKind::Smms,
            ProviderConfig::Custom(_) => CloudKind::Custom,
            ProviderConfig::PicList(_) => CloudKind::PicList,
        }
    }
}

// ── HoistConfig ──────────────────────────────────────────────────────────

/// Configuration for one pipeline run.
///
/// Built via [`HoistConfig::builder()`] or [`HoistConfig::default()`].
///
/// # Example
/// ```rust
/// use mdhoist::{CloudKind, HoistConfig, RenamePolicy};
///
/// let config = HoistConfig::builder()
///     .cloud(CloudKind::Smms)
///     .rename(RenamePolicy::Random)
///     .upload_concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct HoistConfig {
    /// Selected storage provider.
    pub cloud: CloudKind,

    pub aliyun: Option<AliyunSettings>,
    pub tencent: Option<TencentSettings>,
    pub qiniu: Option<QiniuSettings>,
    pub github: Option<RepoSettings>,
    pub gitee: Option<RepoSettings>,
    pub smms: Option<SmmsSettings>,
    pub custom: Option<CustomSettings>,
    pub piclist: Option<PicListSettings>,

    /// Upload filename policy. Default: keep the parsed name.
    pub rename: RenamePolicy,

    /// Markup written back for uploaded images. Default: plain mark.
    pub mark_style: MarkStyle,

    /// Opaque compressor run over local image bytes before upload.
    /// The compress stage is enabled only when this is set.
    pub compressor: Option<Arc<dyn ImageCompressor>>,

    /// Fetcher used by the rehost chain's download stage. `None` means the
    /// bundled reqwest fetcher.
    pub fetcher: Option<Arc<dyn ImageFetcher>>,

    /// Skip the write-back stage (parse/upload only, documents untouched).
    pub dry_run: bool,

    /// Upper bound on concurrent uploads. Default: 10.
    ///
    /// The effective pool for n items is `min(max(n, 2), upload_concurrency)`
    /// — never unbounded, and never larger than the work available.
    pub upload_concurrency: usize,

    /// Upper bound on concurrent downloads. Default: 15.
    pub download_concurrency: usize,

    /// Per-request timeout in seconds for provider HTTP calls. Default: 30.
    pub request_timeout_secs: u64,

    /// Retry attempts for transient upload failures. Default: 2.
    ///
    /// Exponential backoff (`retry_backoff_ms × 2^attempt`) avoids the
    /// thundering-herd problem when a fan-out pool hits a recovering
    /// endpoint: with 500 ms base and 2 retries the waits are 500 ms → 1 s.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Default: 500.
    pub retry_backoff_ms: u64,
}

impl Default for HoistConfig {
    fn default() -> Self {
        Self {
            cloud: CloudKind::Smms,
            aliyun: None,
            tencent: None,
            qiniu: None,
            github: None,
            gitee: None,
            smms: None,
            custom: None,
            piclist: None,
            rename: RenamePolicy::default(),
            mark_style: MarkStyle::default(),
            compressor: None,
            fetcher: None,
            dry_run: false,
            upload_concurrency: 10,
            download_concurrency: 15,
            request_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl fmt::Debug for HoistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HoistConfig")
            .field("cloud", &self.cloud)
            .field("rename", &self.rename)
            .field("mark_style", &self.mark_style)
            .field("compressor", &self.compressor.as_ref().map(|_| "<dyn ImageCompressor>"))
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn ImageFetcher>"))
            .field("dry_run", &self.dry_run)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("download_concurrency", &self.download_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl HoistConfig {
    /// Create a new builder for `HoistConfig`.
    pub fn builder() -> HoistConfigBuilder {
        HoistConfigBuilder {
            config: Self::default(),
        }
    }

    /// The settings bag for the selected provider, if present.
    pub fn selected_provider(&self) -> Option<ProviderConfig> {
        match self.cloud {
            CloudKind::Aliyun => self.aliyun.clone().map(ProviderConfig::Aliyun),
            CloudKind::Tencent => self.tencent.clone().map(ProviderConfig::Tencent),
            CloudKind::Qiniu => self.qiniu.clone().map(ProviderConfig::Qiniu),
            CloudKind::Github => self.github.clone().map(ProviderConfig::Github),
            CloudKind::Gitee => self.gitee.clone().map(ProviderConfig::Gitee),
            CloudKind::Smms => self.smms.clone().map(ProviderConfig::Smms),
            CloudKind::Custom => self.custom.clone().map(ProviderConfig::Custom),
            CloudKind::PicList => self.piclist.clone().map(ProviderConfig::PicList),
        }
    }
}

/// Builder for [`HoistConfig`].
#[derive(Debug)]
pub struct HoistConfigBuilder {
    config: HoistConfig,
}

impl HoistConfigBuilder {
    pub fn cloud(mut self, cloud: CloudKind) -> Self {
        self.config.cloud = cloud;
        self
    }

    pub fn aliyun(mut self, settings: AliyunSettings) -> Self {
        self.config.aliyun = Some(settings);
        self
    }

    pub fn tencent(mut self, settings: TencentSettings) -> Self {
        self.config.tencent = Some(settings);
        self
    }

    pub fn qiniu(mut self, settings: QiniuSettings) -> Self {
        self.config.qiniu = Some(settings);
        self
    }

    pub fn github(mut self, settings: RepoSettings) -> Self {
        self.config.github = Some(settings);
        self
    }

    pub fn gitee(mut self, settings: RepoSettings) -> Self {
        self.config.gitee = Some(settings);
        self
    }

    pub fn smms(mut self, settings: SmmsSettings) -> Self {
        self.config.smms = Some(settings);
        self
    }

    pub fn custom(mut self, settings: CustomSettings) -> Self {
        self.config.custom = Some(settings);
        self
    }

    pub fn piclist(mut self, settings: PicListSettings) -> Self {
        self.config.piclist = Some(settings);
        self
    }

    pub fn rename(mut self, policy: RenamePolicy) -> Self {
        self.config.rename = policy;
        self
    }

    pub fn mark_style(mut self, style: MarkStyle) -> Self {
        self.config.mark_style = style;
        self
    }

    pub fn compressor(mut self, compressor: Arc<dyn ImageCompressor>) -> Self {
        self.config.compressor = Some(compressor);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.config.dry_run = v;
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload_concurrency = n.max(1);
        self
    }

    pub fn download_concurrency(mut self, n: usize) -> Self {
        self.config.download_concurrency = n.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HoistConfig, HoistError> {
        let c = &self.config;
        if c.upload_concurrency == 0 || c.download_concurrency == 0 {
            return Err(HoistError::InvalidConfig(
                "Concurrency bounds must be ≥ 1".into(),
            ));
        }
        if let MarkStyle::Custom(template) = &c.mark_style {
            if !template.contains("{url}") {
                return Err(HoistError::InvalidConfig(format!(
                    "Custom mark template must contain a {{url}} placeholder, got '{template}'"
                )));
            }
        }
        Ok(self.config)
    }
}
