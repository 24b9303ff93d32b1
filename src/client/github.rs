//! JSON content-API upload (GitHub repository contents).
//!
//! The file travels base64-encoded inside a JSON body
//! `{message, branch, content, sha?}` PUT to the per-repository contents
//! path. HTTP 422 means the identical file already exists, which is success
//! for an image host; HTTP 404 almost always means the branch has never been
//! created and is reported as its own failure.

use crate::client::{http_client, network_error, probe_mismatch, CloudKind, StorageClient};
use crate::config::{ProviderConfig, RepoSettings};
use crate::error::ItemError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Serialize)]
struct ContentRequest<'a> {
    message: &'a str,
    branch: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

/// GitHub renamed the default branch; settings created for old repositories
/// still say `master`.
fn effective_branch(branch: &str) -> &str {
    if branch == "master" {
        "main"
    } else {
        branch
    }
}

/// `https://raw.githubusercontent.com/{owner}/{repo}/{branch}{key}`.
fn raw_url(repo: &str, branch: &str, key: &str) -> String {
    format!("https://raw.githubusercontent.com/{repo}/{branch}{key}")
}

pub struct GithubClient {
    settings: RepoSettings,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl GithubClient {
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
        let branch = effective_branch(&settings.branch);
        let url = format!("{GITHUB_API}/repos/{}/contents{key}", settings.repo);

        let body = ContentRequest {
            message: "mdhoist uploaded",
            branch,
            content: STANDARD.encode(data),
            sha: None,
        };

        let response = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.github.v3+json")
            .header(reqwest::header::AUTHORIZATION, format!("token {}", settings.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        match response.status().as_u16() {
            // 422: a file with this path and content already exists — the
            // raw URL is just as reachable as after a fresh creation.
            200 | 201 | 422 => Ok(raw_url(&settings.repo, branch, &key)),
            404 => Err(ItemError::Protocol {
                name: name.to_string(),
                status: 404,
                detail: format!("the branch '{branch}' may not exist in {}", settings.repo),
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
impl StorageClient for GithubClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::Github
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
            ProviderConfig::Github(bag) => {
                let throwaway = GithubClient::from_settings(bag.clone(), self.timeout_secs)
                    .map_err(|detail| ItemError::Resource {
                        name: name.to_string(),
                        detail,
                    })?;
                throwaway.put_object(bag, data, name).await
            }
            _ => Err(probe_mismatch(CloudKind::Github, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_request_serialises_without_null_sha() {
        let body = ContentRequest {
            message: "mdhoist uploaded",
            branch: "main",
            content: STANDARD.encode(b"img"),
            sha: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(
            json,
            r#"{"message":"mdhoist uploaded","branch":"main","content":"aW1n"}"#
        );
    }

    #[test]
    fn master_branch_is_rewritten_to_main() {
        assert_eq!(effective_branch("master"), "main");
        assert_eq!(effective_branch("main"), "main");
        assert_eq!(effective_branch("assets"), "assets");
    }

    #[test]
    fn raw_url_shape() {
        assert_eq!(
            raw_url("alice/images", "main", "/shot.png"),
            "https://raw.githubusercontent.com/alice/images/main/shot.png"
        );
    }
}
