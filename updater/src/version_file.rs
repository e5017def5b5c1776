//! 로컬 버전 파일 (`version.toml`)
//!
//! ```toml
//! version = "1.0.0"
//! downloadUrl = ""
//! releaseNotes = "Initial release"
//! lastChecked = 1767225600000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

pub const BASELINE_NOTES: &str = "Initial release";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    #[serde(rename = "downloadUrl", default)]
    pub download_url: String,
    #[serde(rename = "releaseNotes", default)]
    pub release_notes: String,
    /// epoch millis
    #[serde(rename = "lastChecked", default)]
    pub last_checked: i64,
}

impl VersionRecord {
    pub fn baseline(version: &str) -> Self {
        Self {
            version: version.to_string(),
            download_url: String::new(),
            release_notes: BASELINE_NOTES.to_string(),
            last_checked: chrono::Utc::now().timestamp_millis(),
        }
    }
}

pub struct VersionFile {
    path: PathBuf,
}

impl VersionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 버전 파일을 읽고, 없으면 `baseline` 버전으로 생성한 뒤 반환
    pub fn load_or_init(&self, baseline: &str) -> Result<VersionRecord, UpdateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content).map_err(|e| UpdateError::VersionFile {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let record = VersionRecord::baseline(baseline);
                self.save(&record)?;
                tracing::info!(
                    "[Updater] Created {} with baseline version {}",
                    self.path.display(),
                    baseline
                );
                Ok(record)
            }
            Err(e) => Err(UpdateError::io(&self.path, e)),
        }
    }

    pub fn save(&self, record: &VersionRecord) -> Result<(), UpdateError> {
        let content = toml::to_string(record).map_err(|e| UpdateError::VersionFile {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| UpdateError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|e| UpdateError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| UpdateError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_creates_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let file = VersionFile::new(dir.path().join("version.toml"));

        let record = file.load_or_init("1.0.0").unwrap();
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.release_notes, BASELINE_NOTES);
        assert!(file.path().exists());

        // 두 번째 로드는 파일 내용을 그대로 읽음
        let again = file.load_or_init("9.9.9").unwrap();
        assert_eq!(again, record);
    }

    #[test]
    fn uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = VersionFile::new(dir.path().join("version.toml"));
        file.save(&VersionRecord {
            version: "2.2.0".into(),
            download_url: "https://x/app.exe".into(),
            release_notes: "line one\nline two".into(),
            last_checked: 42,
        })
        .unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        assert!(raw.contains("downloadUrl"));
        assert!(raw.contains("lastChecked = 42"));
        let loaded = file.load_or_init("1.0.0").unwrap();
        assert_eq!(loaded.release_notes, "line one\nline two");
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("version.toml");
        std::fs::write(&path, "version = [").unwrap();
        let err = VersionFile::new(&path).load_or_init("1.0.0").unwrap_err();
        assert!(matches!(err, UpdateError::VersionFile { .. }));
    }
}
