//! Multipart upload to SM.MS with a raw `Authorization` header.
//!
//! The file goes up as the `smfile` part of a multipart POST. Two quirks the
//! server enforces: requests without a browser-looking User-Agent are
//! rejected with 403, and re-uploading known bytes answers HTTP 200 with
//! `code: "image_repeated"` and the existing URL in `images` — a success for
//! our purposes.

use crate::client::multipart::MultipartBody;
use crate::client::{network_error, probe_mismatch, CloudKind, StorageClient};
use crate::config::{ProviderConfig, SmmsSettings};
use crate::error::ItemError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows; U; Windows NT 6.1; zh-CN; rv:1.9.2.6)";

#[derive(Debug, Deserialize)]
struct SmmsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    /// Existing URL when `code == "image_repeated"`.
    #[serde(default)]
    images: Option<String>,
    data: Option<SmmsData>,
}

#[derive(Debug, Deserialize)]
struct SmmsData {
    url: String,
}

/// Pull the uploaded URL out of a parsed response, treating the duplicate
/// code as success.
fn extract_url(name: &str, response: SmmsResponse) -> Result<String, ItemError> {
    if response.code == "image_repeated" {
        if let Some(url) = response.images.filter(|u| !u.is_empty()) {
            return Ok(url);
        }
    }
    match response.data {
        Some(data) if response.success && !data.url.is_empty() => Ok(data.url),
        _ => Err(ItemError::Protocol {
            name: name.to_string(),
            status: 200,
            detail: format!("{} {}", response.code, response.message),
        }),
    }
}

pub struct SmmsClient {
    settings: SmmsSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl SmmsClient {
    pub fn from_settings(settings: SmmsSettings, timeout_secs: u64) -> Result<Self, String> {
        if settings.token.is_empty() {
            return Err("Set the API token.".into());
        }
        // Not the shared client: the server 403s without a browser UA.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(BROWSER_UA)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            http,
            settings,
            timeout_secs,
        })
    }

    async fn put_object(
        &self,
        settings: &SmmsSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let (content_type, body) = MultipartBody::new().file("smfile", name, data).finish();

        let response = self
            .http
            .post(&settings.api)
            .header(reqwest::header::AUTHORIZATION, settings.token.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let detail = response.text().await.unwrap_or_default();
            return Err(ItemError::Protocol {
                name: name.to_string(),
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: SmmsResponse =
            response
                .json()
                .await
                .map_err(|e| ItemError::Protocol {
                    name: name.to_string(),
                    status: 200,
                    detail: format!("unparseable response: {e}"),
                })?;
        extract_url(name, parsed)
    }
}

#[async_trait]
impl StorageClient for SmmsClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Smms
    }

    async fn upload(&self, data: &[u8], name: &str) -> Result<String, ItemError> {
        self.put_object(&self.settings, data, name).await
    }

    async fn probe(
        &self,
        data: &[u8],
        name: &str,
        settings: &ProviderConfig,
    ) -> Result<String, ItemError> {
        match settings {
            ProviderConfig::Smms(bag) => {
                let throwaway = SmmsClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Smms, name)),
        }
    }
}
