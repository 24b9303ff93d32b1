//! Token-policy multipart upload (Qiniu style).
//!
//! Authorization is an upload token built client-side: a JSON policy
//! `{"scope":"bucket:key","deadline":N}` is URL-safe-base64 encoded, the
//! encoded form is HMAC-SHA1 signed with the secret key, and
//! `access_key:signature:encoded_policy` travels as one multipart field
//! alongside the file.

use crate::client::multipart::MultipartBody;
use crate::client::{http_client, network_error, probe_mismatch, sign, CloudKind, StorageClient};
use crate::config::{ProviderConfig, QiniuSettings};
use crate::error::ItemError;
use async_trait::async_trait;
use chrono::Utc;

/// Token lifetime. The original tooling issues effectively non-expiring
/// tokens; one day is long enough for any single pipeline run.
const TOKEN_TTL_SECS: i64 = 3600 * 24;

pub struct QiniuClient {
    settings: QiniuSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

/// Build the upload token for `bucket`/`key` expiring at `deadline`
/// (unix seconds).
///
/// Pure: the deadline is a parameter, so identical inputs always produce
/// the identical token.
pub fn upload_token(
    bucket: &str,
    key: Option<&str>,
    deadline: i64,
    access_key: &str,
    secret_key: &str,
) -> String {
    let scope = match key {
        Some(k) => format!("{bucket}:{k}"),
        None => bucket.to_string(),
    };
    // Field order matters to nobody but the signature, which covers whatever
    // we send; keep scope first to match the documented policy layout.
    let policy = format!(
        "{{\"scope\":{},\"deadline\":{}}}",
        serde_json::to_string(&scope).expect("string serialises"),
        deadline
    );
    let encoded = sign::urlsafe_b64(policy.as_bytes());
    let signature = sign::urlsafe_b64(&sign::hmac_sha1(secret_key.as_bytes(), encoded.as_bytes()));
    format!("{access_key}:{signature}:{encoded}")
}

impl QiniuClient {
    pub fn from_settings(settings: QiniuSettings, timeout_secs: u64) -> Result<Self, String> {
        if settings.bucket.is_empty()
            || settings.domain.is_empty()
            || settings.access_key.is_empty()
            || settings.secret_key.is_empty()
        {
            return Err("Set bucket, domain, access_key and secret_key.".into());
        }
        Ok(Self {
            http: http_client(timeout_secs)?,
            settings,
            timeout_secs,
        })
    }

    async fn put_object(
        &self,
        settings: &QiniuSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let deadline = Utc::now().timestamp() + TOKEN_TTL_SECS;
        let token = upload_token(
            &settings.bucket,
            Some(name),
            deadline,
            &settings.access_key,
            &settings.secret_key,
        );

        let (content_type, body) = MultipartBody::new()
            .text("key", name)
            .text("token", &token)
            .file("file", name, data)
            .finish();

        let response = self
            .http
            .post(&settings.upload_host)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        let status = response.status();
        if status.as_u16() == 200 {
            Ok(public_url(&settings.domain, name))
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

/// `{domain}/{key}` with exactly one joining slash.
fn public_url(domain: &str, key: &str) -> String {
    format!("{}/{}", domain.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[async_trait]
impl StorageClient for QiniuClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Qiniu
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
            ProviderConfig::Qiniu(bag) => {
                let throwaway = QiniuClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Qiniu, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine;

    #[test]
    fn token_has_three_colon_separated_sections() {
        let token = upload_token("bucket", Some("a.png"), 1_700_000_000, "AK", "SK");
        let parts: Vec<&str> = token.splitn(3, ':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "AK");

        let policy = URL_SAFE.decode(parts[2]).unwrap();
        assert_eq!(
            String::from_utf8(policy).unwrap(),
            r#"{"scope":"bucket:a.png","deadline":1700000000}"#
        );
    }

    #[test]
    fn token_without_key_scopes_to_the_bucket() {
        let token = upload_token("bucket", None, 1_700_000_000, "AK", "SK");
        let encoded = token.splitn(3, ':').nth(2).unwrap();
        let policy = String::from_utf8(URL_SAFE.decode(encoded).unwrap()).unwrap();
        assert!(policy.contains(r#""scope":"bucket""#));
    }

    #[test]
    fn token_signature_covers_the_encoded_policy() {
        let token = upload_token("b", Some("k"), 42, "AK", "SK");
        let parts: Vec<&str> = token.splitn(3, ':').collect();
        let expected = sign::urlsafe_b64(&sign::hmac_sha1(b"SK", parts[2].as_bytes()));
        assert_eq!(parts[1], expected);
    }

    #[test]
    fn token_is_deterministic() {
        let a = upload_token("b", Some("k.png"), 1_700_000_000, "AK", "SK");
        let b = upload_token("b", Some("k.png"), 1_700_000_000, "AK", "SK");
        assert_eq!(a, b);
    }

    #[test]
    fn public_url_joins_with_one_slash() {
        assert_eq!(public_url("https://img.example.com/", "/a.png"), "https://img.example.com/a.png");
        assert_eq!(public_url("https://img.example.com", "a.png"), "https://img.example.com/a.png");
    }
}
