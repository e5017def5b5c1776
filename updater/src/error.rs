//! 셀프 업데이트 에러 타입
//!
//! 다운로드/압축 해제 에러는 각각 `FetchError`, `ExtractError`가 담당하고,
//! 여기서는 버전 확인부터 교체 스크립트 실행까지의 에러를 정의합니다.

use std::path::PathBuf;

use crate::fetch::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed release metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("release '{0}' has no downloadable asset")]
    NoAsset(String),

    #[error("invalid asset pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("checksum mismatch (expected {expected}, got {actual})")]
    DigestMismatch { expected: String, actual: String },

    #[error("version file {}: {message}", path.display())]
    VersionFile { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start update script: {0}")]
    Script(String),

    #[error("update must be confirmed before the running binary is replaced")]
    NotConfirmed,

    #[error("update worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl UpdateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 네트워크 계열 에러인지 (자동 확인 시 로그만 남길지 판단용)
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            UpdateError::Fetch(FetchError::Network(_)) | UpdateError::Fetch(FetchError::BadStatus(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_pass_through_display() {
        let err = UpdateError::from(FetchError::BadStatus(403));
        assert_eq!(err.to_string(), "server returned HTTP code 403");
        assert!(err.is_network());
    }

    #[test]
    fn parse_error_is_not_network() {
        let err: UpdateError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("malformed release metadata"));
        assert!(!err.is_network());
    }
}
