//! # Halo Server Manager 업데이터/인스톨러 라이브러리
//!
//! 서버 패키지 설치와 관리 도구 자신의 셀프 업데이트가 공유하는
//! 전송 계층과, 셀프 업데이트 파이프라인을 제공합니다.
//!
//! ## 구성
//! - **fetch.rs**: HTTP 스트리밍 다운로드 (`.part` → rename)
//! - **extract.rs**: zip 압축 해제 (경로 탈출 엔트리 거부)
//! - **progress.rs**: 진행률 모델
//! - **github.rs**: 최신 릴리즈 조회, 에셋 선택
//! - **version.rs / version_file.rs**: 버전 비교, 로컬 버전 파일
//! - **self_update.rs**: 교체 스크립트 생성 및 실행
//!
//! ## 셀프 업데이트 흐름
//! 1. `check_for_updates` — 원격 최신 버전과 로컬 버전 비교
//! 2. `download_update` — 새 바이너리를 스테이징 경로로 다운로드 (+ SHA-256 검증)
//! 3. `apply_update` — 사용자 확인 후 교체 스크립트 실행, 호출자는 종료

pub mod error;
pub mod extract;
pub mod fetch;
pub mod github;
pub mod progress;
pub mod self_update;
pub mod version;
pub mod version_file;


pub use error::UpdateError;
pub use extract::{extract, extract_async, ExtractError};
pub use fetch::{FetchError, Fetcher};
pub use github::{AssetMatcher, GitHubAsset, GitHubClient, GitHubRelease};
pub use progress::TransferProgress;
pub use version_file::{VersionFile, VersionRecord};

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use self_update::UpdateScript;

// ══════════════════════════════════════════════════════
// 설정 / 버전 정보
// ══════════════════════════════════════════════════════

/// 업데이트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// GitHub 레포지토리 소유자
    pub github_owner: String,
    /// GitHub 레포지토리 이름
    pub github_repo: String,
    /// API 베이스 URL 오버라이드 (테스트용 로컬 서버 지원)
    pub api_base_url: Option<String>,
    /// 다운로드할 에셋 이름 패턴 (정규식, 대소문자 무시)
    pub asset_pattern: String,
    /// 버전 파일이 없을 때 사용할 기준 버전
    pub baseline_version: String,
    /// 로컬 버전 파일 경로
    pub version_file: PathBuf,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            github_owner: "Chalwk".to_string(),
            github_repo: "HaloServerManager".to_string(),
            api_base_url: None,
            asset_pattern: r"haloservermanager.*\.exe$".to_string(),
            baseline_version: "1.0.0".to_string(),
            version_file: PathBuf::from("version.toml"),
        }
    }
}

/// 한 번의 버전 확인 결과. 확인할 때마다 새로 만들어지며 변경되지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub current: String,
    pub latest: String,
    pub download_url: String,
    pub release_notes: String,
    pub asset_name: Option<String>,
    /// 릴리즈가 제공한 SHA-256 (hex)
    pub asset_sha256: Option<String>,
}

impl VersionInfo {
    /// 최신 릴리즈와 로컬 버전으로부터 생성
    pub fn from_release(current: &str, release: &GitHubRelease, matcher: &AssetMatcher) -> Self {
        let asset = matcher.select(&release.assets);
        Self {
            current: current.to_string(),
            latest: version::normalize_tag(&release.tag_name).to_string(),
            download_url: asset.map(|a| a.browser_download_url.clone()).unwrap_or_default(),
            release_notes: release.body.clone().unwrap_or_default(),
            asset_name: asset.map(|a| a.name.clone()),
            asset_sha256: asset.and_then(|a| a.sha256()).map(str::to_string),
        }
    }

    /// 로컬 버전과 원격 버전이 다르면 업데이트 대상
    pub fn update_available(&self) -> bool {
        self.current != self.latest
    }

    /// 원격 버전이 실제로 더 새로운지 (다운그레이드 방지용)
    pub fn is_newer(&self) -> bool {
        version::is_newer(&self.latest, &self.current)
    }
}

// ══════════════════════════════════════════════════════
// UpdateManager
// ══════════════════════════════════════════════════════

/// 셀프 업데이트 확인/다운로드/적용 매니저
pub struct UpdateManager {
    config: UpdateConfig,
    fetcher: Fetcher,
    matcher: AssetMatcher,
    version_file: VersionFile,
}

impl UpdateManager {
    pub fn new(config: UpdateConfig, fetcher: Fetcher) -> Result<Self, UpdateError> {
        let matcher = AssetMatcher::new(&config.asset_pattern)?;
        let version_file = VersionFile::new(config.version_file.clone());
        Ok(Self {
            config,
            fetcher,
            matcher,
            version_file,
        })
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    fn create_client(&self) -> GitHubClient {
        GitHubClient::new(
            self.fetcher.client().clone(),
            &self.config.github_owner,
            &self.config.github_repo,
            self.config.api_base_url.as_deref(),
        )
    }

    /// 로컬 버전 (버전 파일이 없으면 기준 버전으로 생성)
    pub fn current_version(&self) -> Result<String, UpdateError> {
        Ok(self.version_file.load_or_init(&self.config.baseline_version)?.version)
    }

    /// 최신 릴리즈를 조회하여 `VersionInfo`를 반환하고 버전 파일을 갱신
    ///
    /// 버전 파일의 `version`은 실제로 설치된 버전으로 유지되며,
    /// 다운로드 URL/릴리즈 노트/확인 시각만 갱신된다.
    pub async fn check_for_updates(&self) -> Result<VersionInfo, UpdateError> {
        let record = self.version_file.load_or_init(&self.config.baseline_version)?;
        let release = self.create_client().fetch_latest_release().await?;
        let info = VersionInfo::from_release(&record.version, &release, &self.matcher);

        self.version_file.save(&VersionRecord {
            version: record.version,
            download_url: info.download_url.clone(),
            release_notes: info.release_notes.clone(),
            last_checked: chrono::Utc::now().timestamp_millis(),
        })?;

        tracing::info!(
            "[Updater] Current {} / latest {} (update available: {})",
            info.current,
            info.latest,
            info.update_available()
        );
        Ok(info)
    }

    /// 새 바이너리를 `exe` 옆의 스테이징 경로로 다운로드
    pub async fn download_update<F>(
        &self,
        info: &VersionInfo,
        exe: &Path,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, UpdateError>
    where
        F: FnMut(TransferProgress),
    {
        if info.download_url.is_empty() {
            return Err(UpdateError::NoAsset(info.latest.clone()));
        }

        let staged = self_update::staged_binary_path(exe);
        self.fetcher
            .fetch(&info.download_url, &staged, on_progress, cancel)
            .await?;

        if let Some(expected) = info.asset_sha256.as_deref() {
            let path = staged.clone();
            let actual = tokio::task::spawn_blocking(move || sha256_file(&path)).await??;
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = std::fs::remove_file(&staged);
                return Err(UpdateError::DigestMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
            tracing::info!("[Updater] Checksum verified for {}", staged.display());
        }

        Ok(staged)
    }

    /// 버전 파일을 새 버전으로 갱신하고 교체 스크립트를 기록/실행
    ///
    /// `confirmed`가 false면 아무것도 하지 않는다. 성공 후 호출자는
    /// 즉시 프로세스를 종료해야 스크립트가 교체를 마칠 수 있다.
    pub fn apply_update(
        &self,
        info: &VersionInfo,
        exe: &Path,
        staged: &Path,
        confirmed: bool,
    ) -> Result<PathBuf, UpdateError> {
        if !confirmed {
            return Err(UpdateError::NotConfirmed);
        }
        if !staged.is_file() {
            return Err(UpdateError::io(
                staged,
                std::io::Error::new(std::io::ErrorKind::NotFound, "staged binary missing"),
            ));
        }

        // 교체가 시작되기 전에 새 버전을 기록하고, 스크립트를 못 띄우면 되돌린다
        let previous = self.version_file.load_or_init(&self.config.baseline_version)?;
        self.version_file.save(&VersionRecord {
            version: info.latest.clone(),
            download_url: info.download_url.clone(),
            release_notes: info.release_notes.clone(),
            last_checked: chrono::Utc::now().timestamp_millis(),
        })?;

        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        let handover = UpdateScript::for_current_process(exe.to_path_buf(), staged.to_path_buf())
            .write(dir)
            .and_then(|script| self_update::spawn_script(&script).map(|()| script));
        let script = match handover {
            Ok(script) => script,
            Err(e) => {
                if let Err(restore) = self.version_file.save(&previous) {
                    tracing::error!("[Updater] Could not restore version {}: {}", previous.version, restore);
                }
                return Err(e);
            }
        };

        tracing::info!("[Updater] Handing over to {} for version {}", script.display(), info.latest);
        Ok(script)
    }
}

/// 파일의 SHA-256 (소문자 hex)
pub fn sha256_file(path: &Path) -> Result<String, UpdateError> {
    let mut file = std::fs::File::open(path).map_err(|e| UpdateError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer).map_err(|e| UpdateError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
