//! SAPP Lua 스크립트 카탈로그
//!
//! `metadata.json`은 카테고리(`attractive`, `custom_games`, `utility`)마다
//! `스크립트 키 → { title | truce, shortDescription, description, filename }`
//! 맵을 가집니다. 선택한 스크립트는 서버의 `cg/sapp/lua/`로 다운로드됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hsm_updater_lib::{FetchError, Fetcher, TransferProgress};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ScriptSource;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed script catalogue: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("script '{0}' not found in catalogue")]
    NotFound(String),

    #[error("script '{key}' has an invalid filename '{filename}'")]
    InvalidFilename { key: String, filename: String },

    #[error("{} already exists (overwrite not confirmed)", .0.display())]
    AlreadyExists(PathBuf),
}

// ═══════════════════════════════════════════════════════
//  카테고리 / 항목
// ═══════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    Attractive,
    CustomGames,
    Utility,
}

impl ScriptCategory {
    pub const ALL: [ScriptCategory; 3] = [
        ScriptCategory::Attractive,
        ScriptCategory::CustomGames,
        ScriptCategory::Utility,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ScriptCategory::Attractive => "Attractive",
            ScriptCategory::CustomGames => "Custom Games",
            ScriptCategory::Utility => "Utility",
        }
    }

    /// 카탈로그 키이자 저장소의 폴더 이름
    pub fn folder_name(self) -> &'static str {
        match self {
            ScriptCategory::Attractive => "attractive",
            ScriptCategory::CustomGames => "custom_games",
            ScriptCategory::Utility => "utility",
        }
    }
}

impl fmt::Display for ScriptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ScriptCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ScriptCategory::ALL
            .into_iter()
            .find(|c| c.folder_name().eq_ignore_ascii_case(s) || c.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown script category '{}'", s))
    }
}

/// 카탈로그 JSON의 원본 항목. 일부 항목은 `title` 대신 `truce`를 쓴다.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawEntry {
    title: Option<String>,
    truce: Option<String>,
    short_description: String,
    description: String,
    filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub key: String,
    pub category: ScriptCategory,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub filename: String,
}

impl ScriptEntry {
    /// `<raw_base_url>/<category>/<filename>`
    pub fn raw_url(&self, raw_base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            raw_base_url.trim_end_matches('/'),
            self.category.folder_name(),
            self.filename
        )
    }

    /// 파일 이름이 경로 구분자나 상위 경로를 포함하지 않는지
    fn has_plain_filename(&self) -> bool {
        !self.filename.is_empty()
            && self.filename != ".."
            && self.filename != "."
            && !self.filename.contains(|c| c == '/' || c == '\\')
    }
}

/// 카탈로그 JSON을 항목 목록으로 변환 (카테고리 순, 카테고리 안에서는 키 순)
///
/// 없는 카테고리는 건너뛰고, 모르는 최상위 키는 무시합니다.
pub fn parse_catalogue(json: &str) -> Result<Vec<ScriptEntry>, ScriptError> {
    let mut root: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
    let mut entries = Vec::new();

    for category in ScriptCategory::ALL {
        let Some(value) = root.remove(category.folder_name()) else {
            continue;
        };
        let scripts: BTreeMap<String, RawEntry> = serde_json::from_value(value)?;
        for (key, raw) in scripts {
            entries.push(ScriptEntry {
                title: raw.title.or(raw.truce).unwrap_or_else(|| key.clone()),
                key,
                category,
                short_description: raw.short_description,
                description: raw.description,
                filename: raw.filename,
            });
        }
    }
    Ok(entries)
}

// ═══════════════════════════════════════════════════════
//  원격 카탈로그
// ═══════════════════════════════════════════════════════

pub struct ScriptCatalogue {
    fetcher: Fetcher,
    source: ScriptSource,
}

impl ScriptCatalogue {
    pub fn new(fetcher: Fetcher, source: ScriptSource) -> Self {
        Self { fetcher, source }
    }

    pub async fn list(&self) -> Result<Vec<ScriptEntry>, ScriptError> {
        let json = self.fetcher.fetch_text(&self.source.metadata_url).await?;
        let entries = parse_catalogue(&json)?;
        tracing::info!("[Scripts] Loaded {} scripts from catalogue", entries.len());
        Ok(entries)
    }

    pub async fn find(&self, key: &str) -> Result<ScriptEntry, ScriptError> {
        self.list()
            .await?
            .into_iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .ok_or_else(|| ScriptError::NotFound(key.to_string()))
    }

    /// 스크립트를 `lua_dir/<filename>`으로 다운로드하고 경로를 반환
    ///
    /// 같은 이름의 파일이 있으면 `overwrite`가 true일 때만 교체한다.
    pub async fn download<F>(
        &self,
        entry: &ScriptEntry,
        lua_dir: &Path,
        overwrite: bool,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ScriptError>
    where
        F: FnMut(TransferProgress),
    {
        if !entry.has_plain_filename() {
            return Err(ScriptError::InvalidFilename {
                key: entry.key.clone(),
                filename: entry.filename.clone(),
            });
        }

        let dest = lua_dir.join(&entry.filename);
        if dest.exists() && !overwrite {
            return Err(ScriptError::AlreadyExists(dest));
        }
        let url = entry.raw_url(&self.source.raw_base_url);
        self.fetcher.fetch(&url, &dest, on_progress, cancel).await?;
        tracing::info!("[Scripts] Installed {} to {}", entry.key, dest.display());
        Ok(dest)
    }
}
