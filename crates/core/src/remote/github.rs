//! GitHub contents-API progress mirror.
//!
//! The progress file lives in a repository and every save is a commit.
//! The blob SHA returned by the API is the version token, and GitHub
//! refuses a write whose `sha` is stale, so concurrent saves surface as
//! [`RemoteError::Conflict`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::GitHubConfig;
use super::error::RemoteError;
use super::traits::{RemoteBackend, RemoteDocument, VersionToken};

const USER_AGENT: &str = concat!("igr-harvest/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Progress document stored as a file in a GitHub repository.
pub struct GitHubBackend {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
    branch: Option<String>,
    commit_message: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsEntry,
}

#[derive(Debug, Deserialize)]
struct PutContentsEntry {
    sha: String,
}

impl GitHubBackend {
    pub fn new(config: &GitHubConfig) -> Result<Self, RemoteError> {
        if config.token.trim().is_empty() {
            return Err(RemoteError::NotConfigured(
                "GitHub token is required".to_string(),
            ));
        }
        if !is_valid_repository(&config.repository) {
            return Err(RemoteError::NotConfigured(format!(
                "GitHub repository must be owner/name, got '{}'",
                config.repository
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            token: config.token.clone(),
            branch: config.branch.clone(),
            commit_message: config.commit_message.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        contents_url(&self.api_url, &self.repository, path)
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// GET on the contents endpoint, pinned to the configured branch.
    fn get_contents(&self, key: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut request = self.authorized(self.client.get(self.contents_url(key)), accept);
        if let Some(branch) = &self.branch {
            request = request.query(&[("ref", branch)]);
        }
        request
    }

    /// Files over 1 MiB only come back in full through the raw media type.
    async fn fetch_raw(&self, key: &str) -> Result<Vec<u8>, RemoteError> {
        debug!("GitHub get raw contents: repo={}, path={}", self.repository, key);
        let response = self.get_contents(key, RAW_MEDIA_TYPE).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl RemoteBackend for GitHubBackend {
    fn name(&self) -> &str {
        "github"
    }

    async fn fetch(&self, key: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        debug!("GitHub get contents: repo={}, path={}", self.repository, key);
        let response = self.get_contents(key, JSON_MEDIA_TYPE).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("contents response: {}", e)))?;

        let body = match inline_body(&contents, key)? {
            Some(body) => body,
            None => self.fetch_raw(key).await?,
        };

        Ok(Some(RemoteDocument {
            body,
            version: VersionToken(contents.sha),
        }))
    }

    async fn write(
        &self,
        key: &str,
        body: &[u8],
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, RemoteError> {
        let url = self.contents_url(key);
        debug!(
            "GitHub put contents: repo={}, path={}, sha={:?}",
            self.repository,
            key,
            expected.map(VersionToken::as_str)
        );

        let payload = PutContentsRequest {
            message: &self.commit_message,
            content: BASE64.encode(body),
            sha: expected.map(VersionToken::as_str),
            branch: self.branch.as_deref(),
        };

        let response = self
            .authorized(self.client.put(&url), JSON_MEDIA_TYPE)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        // 409: sha does not match; 422: sha missing for an existing file.
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(RemoteError::Conflict {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let written: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("put contents response: {}", e)))?;
        Ok(VersionToken(written.content.sha))
    }
}

fn is_valid_repository(repository: &str) -> bool {
    match repository.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}

fn contents_url(api_url: &str, repository: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!(
        "{}/repos/{}/contents/{}",
        api_url,
        repository,
        encoded.join("/")
    )
}

/// Body carried in a contents response, or `None` when the file is too
/// large to be inlined and has to be fetched raw.
fn inline_body(contents: &ContentsResponse, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
    match contents.encoding.as_deref() {
        None | Some("base64") => decode_content(&contents.content).map(Some),
        Some("none") => Ok(None),
        Some(encoding) => Err(RemoteError::Decode(format!(
            "unsupported content encoding '{}' for {}",
            encoding, key
        ))),
    }
}

/// The API wraps base64 at 60 columns.
fn decode_content(content: &str) -> Result<Vec<u8>, RemoteError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| RemoteError::Decode(format!("invalid base64 content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GitHubConfig {
        GitHubConfig {
            repository: "acme/igr-progress".to_string(),
            token: "ghp_test".to_string(),
            branch: None,
            api_url: "https://api.github.com/".to_string(),
            commit_message: "Update progress file".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        assert_eq!(
            contents_url("https://api.github.com", "acme/igr", "progress.json"),
            "https://api.github.com/repos/acme/igr/contents/progress.json"
        );
        assert_eq!(
            contents_url("https://api.github.com", "acme/igr", "/state/run 1.json"),
            "https://api.github.com/repos/acme/igr/contents/state/run%201.json"
        );
    }

    #[test]
    fn test_decode_wrapped_content() {
        let encoded = BASE64.encode(br#"{"completed":["2024_Pune_Haveli_Hadapsar_1"]}"#);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(20)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        let decoded = decode_content(&wrapped).unwrap();
        assert_eq!(decoded, br#"{"completed":["2024_Pune_Haveli_Hadapsar_1"]}"#);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_content("not*base64"),
            Err(RemoteError::Decode(_))
        ));
    }

    fn contents(content: &str, encoding: Option<&str>) -> ContentsResponse {
        ContentsResponse {
            sha: "3d21ec53a331a6f037a91c368710b99387d012c1".to_string(),
            content: content.to_string(),
            encoding: encoding.map(str::to_string),
        }
    }

    #[test]
    fn test_inline_body_decodes_base64() {
        let body = inline_body(&contents("e30=", Some("base64")), "progress.json").unwrap();
        assert_eq!(body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_large_file_needs_raw_fetch() {
        // over 1 MiB the API answers with an empty body and encoding "none"
        let body = inline_body(&contents("", Some("none")), "progress.json").unwrap();
        assert_eq!(body, None);
    }

    #[test]
    fn test_inline_body_rejects_unknown_encoding() {
        assert!(matches!(
            inline_body(&contents("abc", Some("utf-16")), "progress.json"),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn test_raw_request_asks_for_raw_media_type() {
        let mut cfg = config();
        cfg.branch = Some("state".to_string());
        let backend = GitHubBackend::new(&cfg).unwrap();

        let request = backend
            .get_contents("progress.json", RAW_MEDIA_TYPE)
            .build()
            .unwrap();
        assert_eq!(request.headers()["Accept"], RAW_MEDIA_TYPE);
        assert_eq!(
            request.url().as_str(),
            "https://api.github.com/repos/acme/igr-progress/contents/progress.json?ref=state"
        );
    }

    #[test]
    fn test_put_request_shape() {
        let payload = PutContentsRequest {
            message: "Update progress file",
            content: BASE64.encode(b"{}"),
            sha: Some("abc123"),
            branch: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["message"], "Update progress file");
        assert_eq!(json["content"], "e30=");
        assert_eq!(json["sha"], "abc123");
        assert!(json.get("branch").is_none());
    }

    #[test]
    fn test_new_validates_config() {
        let backend = GitHubBackend::new(&config()).unwrap();
        assert_eq!(backend.api_url, "https://api.github.com");
        assert_eq!(backend.name(), "github");

        let mut bad = config();
        bad.token = String::new();
        assert!(matches!(
            GitHubBackend::new(&bad),
            Err(RemoteError::NotConfigured(_))
        ));

        let mut bad = config();
        bad.repository = "just-a-name".to_string();
        assert!(matches!(
            GitHubBackend::new(&bad),
            Err(RemoteError::NotConfigured(_))
        ));
    }
}
