//! Signed-header REST PUT (Aliyun OSS object-store style).
//!
//! The canonical string is `PUT\n\n\n{GMT date}\n/{bucket}{key}`, signed
//! with HMAC-SHA1 and attached as `Authorization: OSS {access_key}:{sig}`.
//! The two empty lines stand for the Content-MD5 and Content-Type slots we
//! leave blank; the server reconstructs the exact same string, so a single
//! byte of drift means HTTP 403.

use crate::client::{http_client, network_error, probe_mismatch, sign, CloudKind, StorageClient};
use crate::config::{AliyunSettings, ProviderConfig};
use crate::error::ItemError;
use async_trait::async_trait;
use chrono::Utc;

pub struct AliyunClient {
    settings: AliyunSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

/// The canonical string the server signs against.
fn canonical_put_string(date: &str, resource: &str) -> String {
    format!("PUT\n\n\n{date}\n{resource}")
}

/// `OSS {access_key}:{base64(hmac-sha1(secret, canonical))}`.
fn authorization(settings: &AliyunSettings, date: &str, resource: &str) -> String {
    let signature = sign::hmac_sha1_b64(&settings.secret_key, &canonical_put_string(date, resource));
    format!("OSS {}:{}", settings.access_key, signature)
}

/// Request URL and public URL for `key`, honouring the custom domain.
fn object_urls(settings: &AliyunSettings, key: &str) -> (String, String) {
    match settings.custom_domain.as_deref() {
        Some(domain) if !domain.is_empty() => {
            let url = format!("http://{domain}{key}");
            (url.clone(), url)
        }
        _ => {
            let url = format!("https://{}.{}{}", settings.bucket, settings.endpoint, key);
            (url.clone(), url)
        }
    }
}

impl AliyunClient {
    pub fn from_settings(settings: AliyunSettings, timeout_secs: u64) -> Result<Self, String> {
        if settings.bucket.is_empty()
            || settings.endpoint.is_empty()
            || settings.access_key.is_empty()
            || settings.secret_key.is_empty()
        {
            return Err("Set bucket, endpoint, access_key and secret_key.".into());
        }
        Ok(Self {
            http: http_client(timeout_secs)?,
            settings,
            timeout_secs,
        })
    }

    async fn put_object(
        &self,
        settings: &AliyunSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let key = format!("/{}", name.trim_start_matches('/'));
        let date = sign::gmt_date(Utc::now());
        let resource = format!("/{}{}", settings.bucket, key);
        let auth = authorization(settings, &date, &resource);
        let (request_url, public_url) = object_urls(settings, &key);

        let response = self
            .http
            .put(&request_url)
            .header("Date", date)
            .header("Authorization", auth)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        let status = response.status();
        if status.as_u16() == 200 {
            if let Some(etag) = response.headers().get(reqwest::header::ETAG) {
                tracing::debug!("uploaded {} (etag {:?})", name, etag);
            }
            Ok(public_url)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ItemError::Protocol {
                name: name.to_string(),
                status: status.as_u16(),
                detail: body,
            })
        }
    }
}

#[async_trait]
impl StorageClient for AliyunClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Aliyun
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
            ProviderConfig::Aliyun(bag) => {
                let throwaway = AliyunClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Aliyun, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AliyunSettings {
        AliyunSettings {
            bucket: "shots".into(),
            endpoint: "oss-cn-hangzhou.aliyuncs.com".into(),
            access_key: "AK".into(),
            secret_key: "SK".into(),
            custom_domain: None,
        }
    }

    #[test]
    fn canonical_string_has_two_blank_header_slots() {
        let s = canonical_put_string("Thu, 06 Aug 2026 10:20:30 GMT", "/shots/a.png");
        assert_eq!(s, "PUT\n\n\nThu, 06 Aug 2026 10:20:30 GMT\n/shots/a.png");
    }

    #[test]
    fn authorization_header_shape() {
        let auth = authorization(&settings(), "Thu, 06 Aug 2026 10:20:30 GMT", "/shots/a.png");
        assert!(auth.starts_with("OSS AK:"));
        // Base64 HMAC-SHA1 is always 28 characters.
        assert_eq!(auth.len(), "OSS AK:".len() + 28);
    }

    #[test]
    fn authorization_is_deterministic() {
        let a = authorization(&settings(), "Thu, 06 Aug 2026 10:20:30 GMT", "/shots/a.png");
        let b = authorization(&settings(), "Thu, 06 Aug 2026 10:20:30 GMT", "/shots/a.png");
        assert_eq!(a, b);
    }

    #[test]
    fn custom_domain_overrides_public_url() {
        let mut s = settings();
        let (req, public) = object_urls(&s, "/a.png");
        assert_eq!(req, "https://shots.oss-cn-hangzhou.aliyuncs.com/a.png");
        assert_eq!(public, req);

        s.custom_domain = Some("img.example.com".into());
        let (req, public) = object_urls(&s, "/a.png");
        assert_eq!(req, "http://img.example.com/a.png");
        assert_eq!(public, req);
    }

    #[test]
    fn incomplete_settings_are_rejected() {
        let mut s = settings();
        s.secret_key.clear();
        assert!(AliyunClient::from_settings(s, 30).is_err());
    }
}
