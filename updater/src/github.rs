//! GitHub Release API 클라이언트
//!
//! `releases/latest`에서 최신 릴리즈를 가져오고, 설정된 패턴으로
//! 다운로드할 에셋을 고릅니다.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::UpdateError;
use crate::fetch::FetchError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// GitHub Release 응답 (필요한 필드만)
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub Release Asset
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// "sha256:<hex>" 형식 (API가 제공하는 경우만)
    #[serde(default)]
    pub digest: Option<String>,
}

impl GitHubAsset {
    /// digest 필드에서 SHA-256 hex만 추출
    pub fn sha256(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
            .filter(|hex| !hex.is_empty())
    }
}

/// 릴리즈 JSON 파싱
pub fn parse_release(json: &str) -> Result<GitHubRelease, UpdateError> {
    Ok(serde_json::from_str(json)?)
}

/// 다운로드 대상 에셋 선택 규칙
///
/// 실행 파일을 배포하든 패키지를 배포하든 이름 패턴만 바꾸면 되도록
/// 정규식으로 받는다 (대소문자 무시).
#[derive(Debug, Clone)]
pub struct AssetMatcher {
    pattern: Regex,
}

impl AssetMatcher {
    pub fn new(pattern: &str) -> Result<Self, UpdateError> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { pattern })
    }

    /// 패턴에 맞는 첫 에셋, 없으면 첫 번째 에셋
    pub fn select<'a>(&self, assets: &'a [GitHubAsset]) -> Option<&'a GitHubAsset> {
        assets
            .iter()
            .find(|a| self.pattern.is_match(&a.name))
            .or_else(|| assets.first())
    }
}

/// GitHub API 클라이언트
pub struct GitHubClient {
    owner: String,
    repo: String,
    http: reqwest::Client,
    /// API 베이스 URL (기본: "https://api.github.com")
    /// 로컬 mock 서버 테스트 시 "http://127.0.0.1:9876" 등으로 오버라이드
    base_url: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, owner: &str, repo: &str, base_url: Option<&str>) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            http,
            base_url: base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn latest_release_url(&self) -> String {
        format!("{}/repos/{}/{}/releases/latest", self.base_url, self.owner, self.repo)
    }

    /// 최신 릴리즈 가져오기
    pub async fn fetch_latest_release(&self) -> Result<GitHubRelease, UpdateError> {
        let url = self.latest_release_url();
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("[Updater] GitHub API error ({}): {}", status, body);
            return Err(FetchError::BadStatus(status.as_u16()).into());
        }

        let text = response.text().await.map_err(FetchError::from)?;
        parse_release(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str, url: &str) -> GitHubAsset {
        GitHubAsset {
            name: name.to_string(),
            browser_download_url: url.to_string(),
            size: None,
            digest: None,
        }
    }

    #[test]
    fn parse_latest_release() {
        let json = r#"{
            "tag_name": "v2.3.0",
            "body": "notes",
            "assets": [
                {"name": "app-2.3.0.jar", "browser_download_url": "https://x/app.jar",
                 "digest": "sha256:abc123"}
            ]
        }"#;

        let release = parse_release(json).unwrap();
        assert_eq!(release.tag_name, "v2.3.0");
        assert_eq!(release.body.as_deref(), Some("notes"));
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].sha256(), Some("abc123"));
        assert!(release.name.is_none());
    }

    #[test]
    fn matcher_prefers_pattern_then_falls_back() {
        let assets = vec![
            asset("Source.zip", "https://x/src.zip"),
            asset("HaloServerManager-2.3.0.EXE", "https://x/hsm.exe"),
        ];
        let exe = AssetMatcher::new(r"haloservermanager.*\.exe$").unwrap();
        assert_eq!(exe.select(&assets).unwrap().browser_download_url, "https://x/hsm.exe");

        let jar = AssetMatcher::new(r"\.jar$").unwrap();
        assert_eq!(jar.select(&assets).unwrap().name, "Source.zip");

        assert!(jar.select(&[]).is_none());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(AssetMatcher::new("("), Err(UpdateError::InvalidPattern(_))));
    }

    #[test]
    fn base_url_override_is_trimmed() {
        let client = GitHubClient::new(reqwest::Client::new(), "Chalwk", "HaloServerManager", Some("http://127.0.0.1:9876/"));
        assert_eq!(
            client.latest_release_url(),
            "http://127.0.0.1:9876/repos/Chalwk/HaloServerManager/releases/latest"
        );
    }
}
