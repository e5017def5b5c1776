//! 오케스트레이터 경계의 에러 타입 — 각 단계의 에러를 감싸고
//! 프론트엔드에 전달할 `OperationOutcome`으로 변환합니다.

use hsm_updater_lib::{ExtractError, FetchError, UpdateError};
use serde::{Deserialize, Serialize};

use crate::config::preferences::PreferencesError;
use crate::launcher::LaunchError;
use crate::scripts::ScriptError;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Operation already in progress for {0}")]
    Busy(String),

    #[error("Failed to repair server directories: {0}")]
    Repair(#[source] std::io::Error),

    #[error("{0} server is not installed")]
    NotInstalled(String),

    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Update failed: {0}")]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Script install failed: {0}")]
    Script(#[from] ScriptError),

    #[error("Failed to save preferences: {0}")]
    Preferences(#[from] PreferencesError),

    #[error("Background task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Busy(_) => "BUSY",
            Self::Repair(_) => "REPAIR_FAILED",
            Self::NotInstalled(_) => "NOT_INSTALLED",
            Self::Fetch(FetchError::Cancelled) | Self::Extract(ExtractError::Cancelled) => "CANCELLED",
            Self::Fetch(_) => "FETCH_FAILED",
            Self::Extract(_) => "EXTRACT_FAILED",
            Self::Update(_) => "UPDATE_FAILED",
            Self::Launch(LaunchError::NotInstalled(_)) => "NOT_INSTALLED",
            Self::Launch(_) => "LAUNCH_FAILED",
            Self::Script(_) => "SCRIPT_FAILED",
            Self::Preferences(_) => "PREFERENCES_FAILED",
            Self::Worker(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_code() == "CANCELLED"
    }
}

/// 작업의 최종 결과. 프론트엔드에 그대로 표시된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl OperationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<&PipelineError> for OperationOutcome {
    fn from(err: &PipelineError) -> Self {
        Self::failed(err.to_string())
    }
}
