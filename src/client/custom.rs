//! Generic multipart upload for self-hosted image beds.
//!
//! Everything a bespoke host needs is configuration: the endpoint, the HTTP
//! method, the form field carrying the file, extra text fields, extra
//! headers (typically a raw `Authorization` value), and a dot-path telling
//! us where in the JSON response the public URL lives (e.g. `data.url`).

use crate::client::multipart::MultipartBody;
use crate::client::{http_client, network_error, probe_mismatch, CloudKind, StorageClient};
use crate::config::{CustomSettings, ProviderConfig};
use crate::error::ItemError;
use async_trait::async_trait;
use serde_json::Value;

/// Walk `path` (dot-separated keys) into `value` and return the string leaf.
fn extract_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    let mut cursor = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        cursor = cursor.get(segment)?;
    }
    cursor.as_str()
}

pub struct CustomClient {
    settings: CustomSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl CustomClient {
    pub fn from_settings(settings: CustomSettings, timeout_secs: u64) -> Result<Self, String> {
        if settings.api.is_empty()
            || settings.file_field.is_empty()
            || settings.response_url_path.is_empty()
        {
            return Err("Set api, file_field and response_url_path.".into());
        }
        match settings.http_method.to_uppercase().as_str() {
            "POST" | "PUT" => {}
            other => return Err(format!("http_method must be POST or PUT, got '{other}'")),
        }
        Ok(Self {
            http: http_client(timeout_secs)?,
            settings,
            timeout_secs,
        })
    }

    async fn put_object(
        &self,
        settings: &CustomSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let mut multipart = MultipartBody::new();
        for (field, value) in &settings.extra_fields {
            multipart = multipart.text(field, value);
        }
        let (content_type, body) = multipart.file(&settings.file_field, name, data).finish();

        let mut request = if settings.http_method.eq_ignore_ascii_case("put") {
            self.http.put(&settings.api)
        } else {
            self.http.post(&settings.api)
        };
        request = request
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, content_type);
        for (header, value) in &settings.headers {
            request = request.header(header.as_str(), value.as_str());
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let json: Value = serde_json::from_str(&text).map_err(|_| ItemError::Protocol {
            name: name.to_string(),
            status,
            detail: format!("non-JSON response: {}", text.chars().take(200).collect::<String>()),
        })?;

        match extract_by_path(&json, &settings.response_url_path) {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Err(ItemError::Protocol {
                name: name.to_string(),
                status,
                detail: format!(
                    "no URL at '{}' in response: {}",
                    settings.response_url_path,
                    text.chars().take(200).collect::<String>()
                ),
            }),
        }
    }
}

#[async_trait]
impl StorageClient for CustomClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Custom
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
            ProviderConfig::Custom(bag) => {
                let throwaway = CustomClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Custom, name)),
        }
    }
}
