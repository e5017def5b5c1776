//! 애플리케이션 설정 (`config/manager.toml`)
//!
//! ```toml
//! preferences_file = "halo_server_manager.toml"
//!
//! [updater]
//! github_owner = "Chalwk"
//! github_repo = "HaloServerManager"
//! asset_pattern = 'haloservermanager.*\.exe$'
//!
//! [servers.HCE]
//! download_url = "https://mirror.example/HCE_Server.zip"
//! ```
//!
//! 파일이 없으면 기본값을 사용합니다. 경로는 `HSM_CONFIG` 환경 변수로 바꿀 수 있습니다.

pub mod preferences;

pub use preferences::Preferences;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use hsm_updater_lib::UpdateConfig;
use serde::Deserialize;

use crate::server::ServerKind;

pub const DEFAULT_CONFIG_PATH: &str = "config/manager.toml";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ManagerConfig {
    pub preferences_file: PathBuf,
    pub updater: UpdateConfig,
    /// 서버 종류 ID("HPC"/"HCE")별 오버라이드
    pub servers: HashMap<String, ServerOverride>,
    pub scripts: ScriptSource,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServerOverride {
    pub download_url: Option<String>,
}

/// 스크립트 카탈로그 위치
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ScriptSource {
    pub metadata_url: String,
    /// `<raw_base_url>/<category>/<filename>`
    pub raw_base_url: String,
}

impl Default for ScriptSource {
    fn default() -> Self {
        Self {
            metadata_url: "https://raw.githubusercontent.com/Chalwk/HALO-SCRIPT-PROJECTS/master/metadata.json".to_string(),
            raw_base_url: "https://raw.githubusercontent.com/Chalwk/HALO-SCRIPT-PROJECTS/master/sapp".to_string(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            preferences_file: PathBuf::from("halo_server_manager.toml"),
            updater: UpdateConfig::default(),
            servers: HashMap::new(),
            scripts: ScriptSource::default(),
        }
    }
}

impl ManagerConfig {
    /// `HSM_CONFIG` 또는 기본 경로에서 로드
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("HSM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("[Config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg: Self = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        tracing::info!("[Config] Loaded {}", path.display());
        Ok(cfg)
    }

    /// 서버 패키지 다운로드 URL (오버라이드 우선)
    pub fn download_url(&self, kind: ServerKind) -> String {
        self.servers
            .get(kind.id())
            .and_then(|o| o.download_url.clone())
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| kind.download_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ManagerConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.preferences_file, PathBuf::from("halo_server_manager.toml"));
        assert_eq!(cfg.updater.github_repo, "HaloServerManager");
        assert_eq!(cfg.download_url(ServerKind::Hce), ServerKind::Hce.download_url());
    }

    #[test]
    fn partial_file_overrides_selected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manager.toml");
        std::fs::write(
            &path,
            r#"
preferences_file = "prefs.toml"

[updater]
api_base_url = "http://127.0.0.1:9876"
asset_pattern = '\.jar$'

[servers.HCE]
download_url = "http://mirror.local/HCE_Server.zip"
"#,
        )
        .unwrap();

        let cfg = ManagerConfig::load_from(&path).unwrap();
        assert_eq!(cfg.preferences_file, PathBuf::from("prefs.toml"));
        assert_eq!(cfg.updater.api_base_url.as_deref(), Some("http://127.0.0.1:9876"));
        assert_eq!(cfg.updater.asset_pattern, r"\.jar$");
        assert_eq!(cfg.updater.github_owner, "Chalwk");
        assert_eq!(cfg.download_url(ServerKind::Hce), "http://mirror.local/HCE_Server.zip");
        assert_eq!(cfg.download_url(ServerKind::Hpc), ServerKind::Hpc.download_url());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manager.toml");
        std::fs::write(&path, "preferences_file = [").unwrap();
        let err = ManagerConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }
}
