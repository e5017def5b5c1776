//! 설치 / 셀프 업데이트 오케스트레이터
//!
//! ## 서버 설치 파이프라인
//! Fetch(`<root>/<folder>.zip`) → Extract(`<root>`) → Repair → zip 삭제 → 재감지 → 경로 저장
//!
//! 각 단계는 순서대로 실행되며, 실패하면 즉시 중단하고 결과를 보고합니다.
//! 부분 결과는 되돌리지 않습니다 (다음 시도가 같은 경로를 덮어씀).
//!
//! ## 단일 실행
//! 같은 대상(서버 폴더, 셀프 업데이트)에 대한 작업은 한 번에 하나만 실행됩니다.
//! 두 번째 요청은 기다리지 않고 `PipelineError::Busy`를 받습니다.

pub mod events;

pub use events::{EventReceiver, EventSender, PipelineEvent, Reporter};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hsm_updater_lib::{extract_async, Fetcher, UpdateManager, VersionInfo};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{ManagerConfig, Preferences};
use crate::error::{OperationOutcome, PipelineError};
use crate::launcher::{self, LaunchedServer, RunningProcess};
use crate::scripts::{ScriptCatalogue, ScriptEntry};
use crate::server::{self, Installation, ServerKind, INSTALL_LAYOUT};

const SELF_UPDATE_KEY: &str = "self-update";

/// 업데이트 확인을 누가 요청했는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// 시작 시 자동 확인: 설정을 따르고 실패는 로그만 남긴다
    Automatic,
    /// 사용자 요청: 실패를 그대로 보고한다
    Manual,
}

/// 상태 새로고침 결과
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub kind: ServerKind,
    pub installation: Option<Installation>,
    pub layout_complete: bool,
    pub running: Vec<RunningProcess>,
}

// ═══════════════════════════════════════════════════════
//  In-flight 레지스트리
// ═══════════════════════════════════════════════════════

type InFlight = Arc<Mutex<HashSet<String>>>;

/// 드롭될 때 대상 슬롯을 반환
pub struct InFlightGuard {
    registry: InFlight,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// 대상 디렉터리의 레지스트리 키. 같은 폴더는 어떻게 적어도 같은 키가 된다.
fn target_key(dir: &Path) -> String {
    server::normalize_path(dir).to_string_lossy().into_owned()
}

fn try_acquire(registry: &InFlight, key: String) -> Result<InFlightGuard, PipelineError> {
    let mut set = registry.lock().unwrap_or_else(|e| e.into_inner());
    if !set.insert(key.clone()) {
        tracing::warn!("[Installer] Rejected concurrent operation on {}", key);
        return Err(PipelineError::Busy(key));
    }
    Ok(InFlightGuard {
        registry: registry.clone(),
        key,
    })
}

// ═══════════════════════════════════════════════════════
//  Orchestrator
// ═══════════════════════════════════════════════════════

pub struct Orchestrator {
    config: ManagerConfig,
    fetcher: Fetcher,
    preferences: Arc<Preferences>,
    updater: UpdateManager,
    scripts: ScriptCatalogue,
    in_flight: InFlight,
}

impl Orchestrator {
    /// 설정의 환경설정 파일을 로드하고 HTTP 클라이언트를 만든다
    pub fn new(config: ManagerConfig) -> Result<Self, PipelineError> {
        let preferences = Arc::new(Preferences::load(&config.preferences_file));
        Self::with_preferences(config, preferences)
    }

    pub fn with_preferences(
        config: ManagerConfig,
        preferences: Arc<Preferences>,
    ) -> Result<Self, PipelineError> {
        let fetcher = Fetcher::new()?;
        let updater = UpdateManager::new(config.updater.clone(), fetcher.clone())?;
        let scripts = ScriptCatalogue::new(fetcher.clone(), config.scripts.clone());
        Ok(Self {
            config,
            fetcher,
            preferences,
            updater,
            scripts,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn updater(&self) -> &UpdateManager {
        &self.updater
    }

    /// 저장된 경로에서 다시 감지한 설치 정보 (경로가 없으면 None)
    pub fn installation(&self, kind: ServerKind) -> Option<Installation> {
        self.preferences
            .install_path(kind)
            .map(|root| server::detect(kind, &root))
    }

    /// 사용자가 고른 디렉터리를 감지하고 root를 저장
    pub fn set_install_path(&self, kind: ServerKind, selected: &Path) -> Result<Installation, PipelineError> {
        let installation = server::detect(kind, selected);
        self.preferences.set_install_path(kind, &installation.root)?;
        tracing::info!(
            "[Installer] {} path set to {} (installed: {})",
            kind.id(),
            installation.root.display(),
            installation.installed
        );
        Ok(installation)
    }

    /// 설치 상태를 파일시스템 기준으로 새로 계산. 설치된 경우 누락 폴더를 복구한다.
    pub async fn status(&self, kind: ServerKind) -> ServerStatus {
        let Some(installation) = self.installation(kind) else {
            return ServerStatus {
                kind,
                installation: None,
                layout_complete: false,
                running: Vec::new(),
            };
        };

        if let Err(e) = server::repair_if_installed(&installation) {
            tracing::warn!(
                "[Installer] Could not repair {}: {}",
                installation.server_directory().display(),
                e
            );
        }

        let running = if installation.installed {
            launcher::find_running_async(&installation.server_directory()).await
        } else {
            Vec::new()
        };

        ServerStatus {
            kind,
            layout_complete: server::verify_layout(&installation),
            installation: Some(installation),
            running,
        }
    }

    // ───────────────────────────────────────────────────
    //  서버 설치
    // ───────────────────────────────────────────────────

    /// 서버 패키지를 `target_dir`에 설치. 종료 시 `Finished` 이벤트를 정확히 한 번 보낸다.
    pub async fn install(
        &self,
        kind: ServerKind,
        target_dir: &Path,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<Installation, PipelineError> {
        let reporter = Reporter::new(events.clone());
        reporter.started(format!("Install {}", kind.display_name()));

        let result = self.run_install(kind, target_dir, &reporter, cancel).await;
        reporter.finish(match &result {
            Ok(inst) => OperationOutcome::ok(format!(
                "{} installed to {}",
                kind.display_name(),
                inst.server_directory().display()
            )),
            Err(e) => {
                tracing::error!("[Installer] {} install failed: {}", kind.id(), e);
                OperationOutcome::from(e)
            }
        });
        result
    }

    async fn run_install(
        &self,
        kind: ServerKind,
        target_dir: &Path,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<Installation, PipelineError> {
        // 서버 폴더 자체를 골랐어도 root 기준으로 정규화
        let target = server::detect(kind, target_dir);
        let root = target.root.clone();
        let server_dir = target.server_directory();
        let _guard = try_acquire(&self.in_flight, target_key(&server_dir))?;

        let url = self.config.download_url(kind);
        let archive = root.join(kind.archive_name());

        reporter.step(format!("Downloading {} server package...", kind.display_name()));
        self.fetcher
            .fetch(&url, &archive, reporter.progress_sink(), cancel)
            .await?;

        reporter.step("Extracting files...");
        let entries = extract_async(
            archive.clone(),
            root.clone(),
            reporter.progress_sink(),
            cancel.clone(),
        )
        .await?;
        tracing::info!("[Installer] Extracted {} entries into {}", entries, root.display());

        reporter.step("Creating server directories...");
        let dir = server_dir.clone();
        tokio::task::spawn_blocking(move || server::repair_layout(&dir, &INSTALL_LAYOUT))
            .await?
            .map_err(PipelineError::Repair)?;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            tracing::warn!("[Installer] Could not delete {}: {}", archive.display(), e);
        }

        let installation = server::detect(kind, &root);
        if !installation.installed {
            return Err(PipelineError::NotInstalled(format!(
                "{} (package did not contain {}/{})",
                kind.display_name(),
                kind.folder_name(),
                server::RUN_SCRIPT
            )));
        }

        self.preferences.set_install_path(kind, &installation.root)?;
        Ok(installation)
    }

    // ───────────────────────────────────────────────────
    //  실행 / 스크립트
    // ───────────────────────────────────────────────────

    pub fn launch(&self, kind: ServerKind) -> Result<LaunchedServer, PipelineError> {
        let installation = self
            .installation(kind)
            .ok_or_else(|| PipelineError::NotInstalled(kind.display_name().to_string()))?;
        Ok(launcher::launch(&installation)?)
    }

    pub async fn list_scripts(&self) -> Result<Vec<ScriptEntry>, PipelineError> {
        Ok(self.scripts.list().await?)
    }

    /// 카탈로그의 스크립트를 서버의 Lua 폴더로 내려받는다
    ///
    /// 같은 이름의 스크립트가 이미 있으면 `overwrite`가 true일 때만 교체한다.
    pub async fn install_script(
        &self,
        kind: ServerKind,
        key: &str,
        overwrite: bool,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let reporter = Reporter::new(events.clone());
        reporter.started(format!("Install script {}", key));

        let result = self.run_install_script(kind, key, overwrite, &reporter, cancel).await;
        reporter.finish(match &result {
            Ok(path) => OperationOutcome::ok(format!("Script saved to {}", path.display())),
            Err(e) => OperationOutcome::from(e),
        });
        result
    }

    async fn run_install_script(
        &self,
        kind: ServerKind,
        key: &str,
        overwrite: bool,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let installation = self
            .installation(kind)
            .filter(Installation::probe_installed)
            .ok_or_else(|| PipelineError::NotInstalled(kind.display_name().to_string()))?;
        let _guard = try_acquire(&self.in_flight, target_key(&installation.server_directory()))?;

        server::repair_if_installed(&installation).map_err(PipelineError::Repair)?;

        reporter.step(format!("Looking up {} in catalogue...", key));
        let entry = self.scripts.find(key).await?;

        reporter.step(format!("Downloading {}...", entry.filename));
        let path = self
            .scripts
            .download(
                &entry,
                &installation.lua_directory(),
                overwrite,
                reporter.progress_sink(),
                cancel,
            )
            .await?;
        Ok(path)
    }

    // ───────────────────────────────────────────────────
    //  셀프 업데이트
    // ───────────────────────────────────────────────────

    /// 최신 릴리즈 확인
    ///
    /// 자동 확인은 `update.autoCheck`가 꺼져 있거나, 실패했거나, 건너뛴 버전이면
    /// `Ok(None)`을 반환한다. 수동 확인은 실패를 에러로 돌려준다.
    pub async fn check_for_updates(&self, trigger: CheckTrigger) -> Result<Option<VersionInfo>, PipelineError> {
        if trigger == CheckTrigger::Automatic && !self.preferences.auto_check_enabled() {
            tracing::debug!("[Updater] Automatic update check disabled");
            return Ok(None);
        }

        let info = match self.updater.check_for_updates().await {
            Ok(info) => info,
            Err(e) if trigger == CheckTrigger::Automatic => {
                tracing::warn!("[Updater] Automatic update check failed: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if trigger == CheckTrigger::Automatic && info.latest == self.preferences.skipped_version() {
            tracing::info!("[Updater] Version {} was skipped by the user", info.latest);
            return Ok(None);
        }
        Ok(Some(info))
    }

    pub fn skip_version(&self, version: &str) -> Result<(), PipelineError> {
        self.preferences.set_skipped_version(version)?;
        Ok(())
    }

    /// 새 바이너리를 `exe` 옆에 내려받아 스테이징 경로를 반환
    pub async fn download_update(
        &self,
        info: &VersionInfo,
        exe: &Path,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let reporter = Reporter::new(events.clone());
        reporter.started(format!("Download version {}", info.latest));

        let result = async {
            let _guard = try_acquire(&self.in_flight, SELF_UPDATE_KEY.to_string())?;
            reporter.step(format!("Downloading version {}...", info.latest));
            let staged = self
                .updater
                .download_update(info, exe, reporter.progress_sink(), cancel)
                .await?;
            Ok::<_, PipelineError>(staged)
        }
        .await;

        reporter.finish(match &result {
            Ok(staged) => OperationOutcome::ok(format!("Update staged at {}", staged.display())),
            Err(e) => OperationOutcome::from(e),
        });
        result
    }

    /// 교체 스크립트 실행. 성공하면 호출자는 즉시 종료해야 한다.
    pub fn apply_update(
        &self,
        info: &VersionInfo,
        exe: &Path,
        staged: &Path,
        confirmed: bool,
    ) -> Result<PathBuf, PipelineError> {
        let _guard = try_acquire(&self.in_flight, SELF_UPDATE_KEY.to_string())?;
        Ok(self.updater.apply_update(info, exe, staged, confirmed)?)
    }
}
