//! Query-parameter-signed REST PUT (Tencent COS style).
//!
//! The signature is a two-step HMAC chain over a canonical request:
//!
//! ```text
//! canonical      = "{verb}\n{path}\n{params}\n{headers}\n"
//! string_to_sign = "sha1\n{sign_time}\n{sha1_hex(canonical)}\n"
//! sign_key       = hex(hmac-sha1(secret_key, key_time))
//! signature      = hex(hmac-sha1(sign_key, string_to_sign))
//! ```
//!
//! and the result travels as query parameters appended to the PUT URL:
//! `q-sign-algorithm=sha1&q-ak=…&q-sign-time=…&q-key-time=…&q-header-list=…&
//! q-url-param-list=…&q-signature=…`.

use crate::client::{http_client, network_error, probe_mismatch, sign, CloudKind, StorageClient};
use crate::config::{ProviderConfig, TencentSettings};
use crate::error::ItemError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

/// Validity window for one signature. Matches the generous window the
/// protocol tolerates; the server only checks that "now" falls inside it.
const SIGN_WINDOW_SECS: i64 = 3600 * 24;

pub struct TencentClient {
    settings: TencentSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

/// Only these headers participate in the signature; keys are lowercased.
fn sign_headers(origin: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    origin
        .iter()
        .filter(|(k, _)| {
            let lower = k.to_lowercase();
            lower == "content-type"
                || lower == "content-length"
                || lower == "content-md5"
                || lower.starts_with('x')
        })
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Sorted keys joined with `;` — the `q-header-list`/`q-url-param-list` value.
fn member_list(map: &BTreeMap<String, String>) -> String {
    map.keys().cloned().collect::<Vec<_>>().join(";")
}

/// Sorted `key=value` pairs, canonically percent-encoded, joined with `&`.
fn format_map(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                sign::canonical_encode(&k.to_lowercase()),
                sign::canonical_encode(v)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the full `q-…` authorization query string.
///
/// Pure: the time window is a parameter, so identical inputs give identical
/// output (repeated-call determinism is asserted in the tests below).
pub fn build_authorization(
    headers: &BTreeMap<String, String>,
    params: &BTreeMap<String, String>,
    http_method: &str,
    uri_path: &str,
    secret_key: &str,
    secret_id: &str,
    start_secs: i64,
    end_secs: i64,
) -> String {
    let signed = sign_headers(headers);
    let header_list = member_list(&signed);
    let param_list = member_list(params);

    let canonical = format!(
        "{}\n{}\n{}\n{}\n",
        http_method,
        uri_path,
        format_map(params),
        format_map(&signed)
    );

    let key_time = format!("{start_secs};{end_secs}");
    let sign_time = key_time.clone();
    let string_to_sign = format!("sha1\n{}\n{}\n", sign_time, sign::sha1_hex(&canonical));
    let sign_key = sign::hmac_sha1_hex(secret_key, &key_time);
    let signature = sign::hmac_sha1_hex(&sign_key, &string_to_sign);

    format!(
        "q-sign-algorithm=sha1&q-ak={secret_id}&q-sign-time={sign_time}&q-key-time={key_time}\
         &q-header-list={header_list}&q-url-param-list={param_list}&q-signature={signature}"
    )
}

/// `https://{bucket}.cos.{region}.myqcloud.com{key}`.
fn object_url(settings: &TencentSettings, key: &str) -> String {
    format!(
        "https://{}.cos.{}.myqcloud.com{}",
        settings.bucket, settings.region, key
    )
}

impl TencentClient {
    pub fn from_settings(settings: TencentSettings, timeout_secs: u64) -> Result<Self, String> {
        if settings.bucket.is_empty()
            || settings.region.is_empty()
            || settings.secret_id.is_empty()
            || settings.secret_key.is_empty()
        {
            return Err("Set bucket, region, secret_id and secret_key.".into());
        }
        Ok(Self {
            http: http_client(timeout_secs)?,
            settings,
            timeout_secs,
        })
    }

    async fn put_object(
        &self,
        settings: &TencentSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let key = format!("/{}", name.trim_start_matches('/'));
        let now = Utc::now().timestamp();
        let auth = build_authorization(
            &BTreeMap::new(),
            &BTreeMap::new(),
            "put",
            &key,
            &settings.secret_key,
            &settings.secret_id,
            now,
            now + SIGN_WINDOW_SECS,
        );
        let url = format!("{}?{}", object_url(settings, &key), auth);

        let response = self
            .http
            .put(&url)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(object_url(settings, &key))
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
impl StorageClient for TencentClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Tencent
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
            ProviderConfig::Tencent(bag) => {
                let throwaway = TencentClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Tencent, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_carries_all_seven_parameters() {
        let auth = build_authorization(
            &BTreeMap::new(),
            &BTreeMap::new(),
            "put",
            "/a.png",
            "sk",
            "id",
            100,
            200,
        );
        for param in [
            "q-sign-algorithm=sha1",
            "q-ak=id",
            "q-sign-time=100;200",
            "q-key-time=100;200",
            "q-header-list=",
            "q-url-param-list=",
            "q-signature=",
        ] {
            assert!(auth.contains(param), "missing {param} in {auth}");
        }
    }

    #[test]
    fn signature_is_pure_given_a_fixed_window() {
        let make = || {
            build_authorization(
                &BTreeMap::new(),
                &BTreeMap::new(),
                "put",
                "/dir/a.png",
                "secret",
                "id",
                1_700_000_000,
                1_700_086_400,
            )
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn signature_matches_hand_computed_chain() {
        let auth = build_authorization(
            &BTreeMap::new(),
            &BTreeMap::new(),
            "put",
            "/a.png",
            "sk",
            "id",
            100,
            200,
        );
        let canonical = "put\n/a.png\n\n\n";
        let string_to_sign = format!("sha1\n100;200\n{}\n", sign::sha1_hex(canonical));
        let sign_key = sign::hmac_sha1_hex("sk", "100;200");
        let expected = sign::hmac_sha1_hex(&sign_key, &string_to_sign);
        assert!(auth.ends_with(&format!("q-signature={expected}")));
    }

    #[test]
    fn header_filter_keeps_only_signable_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "image/png".to_string());
        headers.insert("Accept".to_string(), "*/*".to_string());
        headers.insert("x-cos-meta-a".to_string(), "1".to_string());
        let signed = sign_headers(&headers);
        assert_eq!(member_list(&signed), "content-type;x-cos-meta-a");
    }

    #[test]
    fn object_url_shape() {
        let settings = TencentSettings {
            bucket: "shots-125".into(),
            region: "ap-chengdu".into(),
            secret_id: "id".into(),
            secret_key: "sk".into(),
        };
        assert_eq!(
            object_url(&settings, "/a.png"),
            "https://shots-125.cos.ap-chengdu.myqcloud.com/a.png"
        );
    }
}
