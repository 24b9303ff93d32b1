//! JSON content-API upload (Gitee repository contents).
//!
//! Same family as the GitHub client but POST instead of PUT, the token rides
//! inside the JSON body as `access_token`, and the duplicate-file status is
//! HTTP 400 rather than 422.

use crate::client::{http_client, network_error, probe_mismatch, CloudKind, StorageClient};
use crate::config::{ProviderConfig, RepoSettings};
use crate::error::ItemError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

const GITEE_API: &str = "https://gitee.com/api/v5";

#[derive(Debug, Serialize)]
struct ContentRequest<'a> {
    access_token: &'a str,
    message: &'a str,
    branch: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

/// `https://gitee.com/{owner}/{repo}/raw/{branch}{key}`.
fn raw_url(repo: &str, branch: &str, key: &str) -> String {
    format!("https://gitee.com/{repo}/raw/{branch}{key}")
}

pub struct GiteeClient {
    settings: RepoSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl GiteeClient {
    pub fn from_settings(settings: RepoSettings, timeout_secs: u64) -> Result<Self, String> {
        if settings.repo.is_empty() || settings.branch.is_empty() || settings.token.is_empty() {
            return Err("Set repo ('owner/name'), branch and token.".into());
        }
        Ok(Self {
            http: http_client(timeout_secs)?,
            settings,
            timeout_secs,
        })
    }

    async fn put_object(
        &self,
        settings: &RepoSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let key = format!("/{}", name.trim_start_matches('/'));
        let url = format!("{GITEE_API}/repos/{}/contents{key}", settings.repo);

        let body = ContentRequest {
            access_token: &settings.token,
            message: "mdhoist uploaded",
            branch: &settings.branch,
            content: STANDARD.encode(data),
            sha: None,
        };

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json;charset=UTF-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        match response.status().as_u16() {
            200 | 201 | 400 => Ok(raw_url(&settings.repo, &settings.branch, &key)),
            404 => Err(ItemError::Protocol {
                name: name.to_string(),
                status: 404,
                detail: format!(
                    "the branch '{}' may not exist in {}",
                    settings.branch, settings.repo
                ),
            }),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(ItemError::Protocol {
                    name: name.to_string(),
                    status,
                    detail,
                })
            }
        }
    }
}

#[async_trait]
impl StorageClient for GiteeClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Gitee
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
            ProviderConfig::Gitee(bag) => {
                let throwaway = GiteeClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Gitee, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_travels_in_the_body() {
        let body = ContentRequest {
            access_token: "tok",
            message: "mdhoist uploaded",
            branch: "master",
            content: STANDARD.encode(b"img"),
            sha: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.starts_with(r#"{"access_token":"tok""#));
        assert!(!json.contains("sha"));
    }

    #[test]
    fn raw_url_shape() {
        assert_eq!(
            raw_url("bob/images", "master", "/shot.png"),
            "https://gitee.com/bob/images/raw/master/shot.png"
        );
    }
}
