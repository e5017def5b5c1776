//! 사용자 환경설정 저장소
//!
//! 평면 key/value TOML 파일 하나에 저장됩니다.
//! - `<HPC|HCE>.install.path`: 서버 설치 루트
//! - `update.autoCheck`: 시작 시 업데이트 확인 여부 (기본 true)
//! - `update.skippedVersion`: 사용자가 건너뛴 버전
//!
//! 모든 쓰기는 하나의 Mutex를 거쳐 직렬화되고, 파일은 임시 파일 + rename으로 교체됩니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::server::ServerKind;

const AUTO_CHECK_KEY: &str = "update.autoCheck";
const SKIPPED_VERSION_KEY: &str = "update.skippedVersion";

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("failed to write preferences to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode preferences: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("preferences lock poisoned")]
    LockPoisoned,
}

pub struct Preferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl Preferences {
    /// 파일에서 로드. 파일이 없거나 읽을 수 없으면 빈 설정으로 시작
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("[Preferences] Ignoring unreadable {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, PreferencesError> {
        self.values.lock().map_err(|e| {
            tracing::error!("[Preferences] lock poisoned: {}", e);
            PreferencesError::LockPoisoned
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().ok().and_then(|values| values.get(key).cloned())
    }

    /// 값을 설정하고 즉시 파일에 기록
    pub fn set(&self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let mut values = self.lock()?;
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        // 락을 쥔 채로 기록해 쓰기 순서를 보장하고, 기록에 성공한 값만 메모리에 반영
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), PreferencesError> {
        let content = toml::to_string(values)?;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PreferencesError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }

    pub fn install_path(&self, kind: ServerKind) -> Option<PathBuf> {
        self.get(&install_key(kind))
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    pub fn set_install_path(&self, kind: ServerKind, root: &Path) -> Result<(), PreferencesError> {
        self.set(&install_key(kind), &root.to_string_lossy())
    }

    pub fn auto_check_enabled(&self) -> bool {
        self.get(AUTO_CHECK_KEY)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true)
    }

    pub fn set_auto_check_enabled(&self, enabled: bool) -> Result<(), PreferencesError> {
        self.set(AUTO_CHECK_KEY, if enabled { "true" } else { "false" })
    }

    pub fn skipped_version(&self) -> String {
        self.get(SKIPPED_VERSION_KEY).unwrap_or_default()
    }

    pub fn set_skipped_version(&self, version: &str) -> Result<(), PreferencesError> {
        self.set(SKIPPED_VERSION_KEY, version)
    }
}

fn install_key(kind: ServerKind) -> String {
    format!("{}.install.path", kind.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path().join("prefs.toml"));
        assert!(prefs.install_path(ServerKind::Hce).is_none());
        assert!(prefs.auto_check_enabled());
        assert_eq!(prefs.skipped_version(), "");
    }

    #[test]
    fn values_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        let prefs = Preferences::load(&path);
        prefs.set_install_path(ServerKind::Hce, Path::new("/games")).unwrap();
        prefs.set_auto_check_enabled(false).unwrap();
        prefs.set_skipped_version("2.3.0").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"HCE.install.path\" = \"/games\""));

        let reloaded = Preferences::load(&path);
        assert_eq!(reloaded.install_path(ServerKind::Hce), Some(PathBuf::from("/games")));
        assert!(reloaded.install_path(ServerKind::Hpc).is_none());
        assert!(!reloaded.auto_check_enabled());
        assert_eq!(reloaded.skipped_version(), "2.3.0");
    }

    #[test]
    fn concurrent_writers_do_not_lose_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        let prefs = Arc::new(Preferences::load(&path));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let prefs = prefs.clone();
                std::thread::spawn(move || prefs.set(&format!("key{}", i), "v").unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let reloaded = Preferences::load(&path);
        for i in 0..8 {
            assert_eq!(reloaded.get(&format!("key{}", i)).as_deref(), Some("v"));
        }
    }

    #[test]
    fn failed_write_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        // 부모 경로가 파일이라 기록할 수 없다
        std::fs::write(dir.path().join("blocker"), b"").unwrap();
        let prefs = Preferences::load(dir.path().join("blocker").join("prefs.toml"));

        let err = prefs.set_skipped_version("2.3.0").unwrap_err();
        assert!(matches!(err, PreferencesError::Io { .. }));
        assert_eq!(prefs.skipped_version(), "");
        assert!(prefs.auto_check_enabled());
    }

    #[test]
    fn unreadable_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let prefs = Preferences::load(&path);
        assert!(prefs.get("anything").is_none());
    }
}
