//! Upload delegation to the PicList tool.
//!
//! Two transports share this client. With `exe_path` configured, each item
//! is written to a managed temp file and handed to `{exe} upload {path}`;
//! the uploaded URL is scraped from the process output. Without it, the
//! PicList HTTP API receives a multipart POST with `picbed`/`configName`/
//! `key` query parameters and answers `{"success":…,"result":[url]}`.
//!
//! The process path has two hard rules: stdout and stderr are drained on
//! separate reader tasks (a chatty tool would otherwise fill one pipe buffer
//! and deadlock against `wait()`), and every spawn races a wall-clock
//! timeout that is enforced even if the cooperative cancellation flag is
//! never checked. Spawns are serialised through a semaphore — the tool
//! reads its own config file and behaves badly when run concurrently.

use crate::client::multipart::MultipartBody;
use crate::client::{http_client, network_error, probe_mismatch, CloudKind, StorageClient};
use crate::config::{PicListSettings, ProviderConfig};
use crate::error::ItemError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'`]+"#).expect("static pattern compiles"));

/// Last URL in the combined output; the tool prints progress lines that may
/// themselves contain URLs, and the result is printed last.
fn extract_url(output: &str) -> Option<String> {
    URL_PATTERN
        .find_iter(output)
        .last()
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Vec<String>,
}

/// Append the configured query parameters to the API endpoint.
fn build_api_url(settings: &PicListSettings, api: &str) -> String {
    let mut url = api.to_string();
    let mut push = |name: &str, value: &Option<String>| {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(name);
            url.push('=');
            url.push_str(&utf8_percent_encode(v, NON_ALPHANUMERIC).to_string());
        }
    };
    push("picbed", &settings.picbed);
    push("configName", &settings.config_name);
    push("key", &settings.key);
    url
}

pub struct PicListClient {
    settings: PicListSettings,
    http: reqwest::Client,
    /// One spawn at a time; see module docs.
    spawn_permit: Semaphore,
}

impl PicListClient {
    pub fn from_settings(settings: PicListSettings, timeout_secs: u64) -> Result<Self, String> {
        let has_exe = settings.exe_path.as_deref().is_some_and(|p| !p.is_empty());
        let has_api = settings.api.as_deref().is_some_and(|a| !a.is_empty());
        if !has_exe && !has_api {
            return Err("Set exe_path or api.".into());
        }
        Ok(Self {
            http: http_client(timeout_secs)?,
            settings,
            spawn_permit: Semaphore::new(1),
        })
    }

    async fn upload_with(
        &self,
        settings: &PicListSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        match settings.exe_path.as_deref().filter(|p| !p.is_empty()) {
            Some(exe) => self.upload_via_process(settings, exe, data, name).await,
            None => self.upload_via_api(settings, data, name).await,
        }
    }

    async fn upload_via_process(
        &self,
        settings: &PicListSettings,
        exe: &str,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let process_err = |detail: String| ItemError::Process {
            name: name.to_string(),
            detail,
        };

        // The tool wants a file on disk; the temp file cleans itself up on
        // drop even when the upload fails.
        let tmp = tempfile::Builder::new()
            .prefix("mdhoist-")
            .suffix(&format!("-{name}"))
            .tempfile()
            .map_err(|e| process_err(format!("temp file: {e}")))?;
        std::fs::write(tmp.path(), data).map_err(|e| process_err(format!("temp file: {e}")))?;

        let _permit = self
            .spawn_permit
            .acquire()
            .await
            .map_err(|_| process_err("spawn semaphore closed".into()))?;

        let mut child = Command::new(exe)
            .arg("upload")
            .arg(tmp.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| process_err(format!("failed to spawn '{exe}': {e}")))?;

        let mut stdout = child.stdout.take().expect("stdout was piped");
        let mut stderr = child.stderr.take().expect("stderr was piped");
        let stdout_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf).await;
            buf
        });
        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let status = match timeout(Duration::from_secs(settings.timeout_secs), child.wait()).await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(process_err(format!("wait failed: {e}"))),
            Err(_) => {
                let _ = child.kill().await;
                return Err(process_err(format!(
                    "timed out after {}s",
                    settings.timeout_secs
                )));
            }
        };

        let out = stdout_reader.await.unwrap_or_default();
        let err = stderr_reader.await.unwrap_or_default();
        let combined = format!("{out}\n{err}");

        if !status.success() {
            return Err(process_err(format!(
                "exit code {}: {}",
                status.code().unwrap_or(-1),
                combined.trim().chars().take(300).collect::<String>()
            )));
        }

        extract_url(&combined)
            .ok_or_else(|| process_err("no URL found in tool output".into()))
    }

    async fn upload_via_api(
        &self,
        settings: &PicListSettings,
        data: &[u8],
        name: &str,
    ) -> Result<String, ItemError> {
        let api = settings
            .api
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ItemError::Resource {
                name: name.to_string(),
                detail: "neither exe_path nor api is configured".into(),
            })?;
        let url = build_api_url(settings, api);

        let (content_type, body) = MultipartBody::new().file("image", name, data).finish();
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| network_error(name, e))?;

        let status = response.status().as_u16();
        let parsed: ApiResponse = response.json().await.map_err(|e| ItemError::Protocol {
            name: name.to_string(),
            status,
            detail: format!("unparseable response: {e}"),
        })?;

        if !parsed.success || parsed.result.is_empty() {
            return Err(ItemError::Protocol {
                name: name.to_string(),
                status,
                detail: parsed.message.unwrap_or_else(|| "upload rejected".into()),
            });
        }
        Ok(parsed.result.into_iter().next().expect("checked non-empty"))
    }
}

#[async_trait]
impl StorageClient for PicListClient {
    fn cloud_kind(&self) -> CloudKind {
        CloudKind::PicList
    }

    async fn upload(&self, data: &[u8], name: &str) -> Result<String, ItemError> {
        self.upload_with(&self.settings, data, name).await
    }

    async fn probe(
        &self,
        data: &[u8],
        name: &str,
        settings: &ProviderConfig,
    ) -> Result<String, ItemError> {
        match settings {
            ProviderConfig::PicList(bag) => self.upload_with(bag, data, name).await,
            _ => Err(probe_mismatch(CloudKind::PicList, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_extraction_takes_the_last_match() {
        let output = "fetching https://cdn.example.com/progress\nuploaded!\nhttps://img.example.com/a.png\n";
        assert_eq!(extract_url(output).unwrap(), "https://img.example.com/a.png");
    }

    #[test]
    fn url_extraction_survives_noise_and_quotes() {
        assert_eq!(
            extract_url("result: \"https://x/y.png\"").unwrap(),
            "https://x/y.png"
        );
        assert!(extract_url("nothing to see").is_none());
    }

    #[test]
    fn api_url_appends_configured_parameters() {
        let settings = PicListSettings {
            api: Some("http://127.0.0.1:36677/upload".into()),
            picbed: Some("smms".into()),
            config_name: Some("piclist config".into()),
            key: None,
            ..PicListSettings::default()
        };
        assert_eq!(
            build_api_url(&settings, settings.api.as_deref().unwrap()),
            "http://127.0.0.1:36677/upload?picbed=smms&configName=piclist%20config"
        );
    }

    #[cfg(unix)]
    fn fake_tool(script_body: &str) -> (tempfile::TempDir, String) {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piclist");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        let exe = path.to_string_lossy().to_string();
        (dir, exe)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_upload_parses_url_from_stdout() {
        let (_dir, exe) = fake_tool("echo uploading...\necho https://img.example.com/ok.png");
        let settings = PicListSettings {
            exe_path: Some(exe),
            ..PicListSettings::default()
        };
        let client = PicListClient::from_settings(settings, 30).unwrap();
        let url = client.upload(b"data", "a.png").await.unwrap();
        assert_eq!(url, "https://img.example.com/ok.png");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_without_url_is_a_process_error() {
        let (_dir, exe) = fake_tool("echo done");
        let settings = PicListSettings {
            exe_path: Some(exe),
            ..PicListSettings::default()
        };
        let client = PicListClient::from_settings(settings, 30).unwrap();
        let err = client.upload(b"data", "a.png").await.unwrap_err();
        assert!(matches!(err, ItemError::Process { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_a_process_error() {
        let (_dir, exe) = fake_tool("echo broken >&2\nexit 3");
        let settings = PicListSettings {
            exe_path: Some(exe),
            ..PicListSettings::default()
        };
        let client = PicListClient::from_settings(settings, 30).unwrap();
        let err = client.upload(b"data", "a.png").await.unwrap_err();
        match err {
            ItemError::Process { detail, .. } => {
                assert!(detail.contains("exit code 3"), "got: {detail}");
                assert!(detail.contains("broken"));
            }
            other => panic!("expected Process error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_child() {
        let (_dir, exe) = fake_tool("sleep 30");
        let settings = PicListSettings {
            exe_path: Some(exe),
            timeout_secs: 1,
            ..PicListSettings::default()
        };
        let client = PicListClient::from_settings(settings, 30).unwrap();
        let err = client.upload(b"data", "a.png").await.unwrap_err();
        match err {
            ItemError::Process { detail, .. } => assert!(detail.contains("timed out")),
            other => panic!("expected Process error, got {other:?}"),
        }
    }
}
