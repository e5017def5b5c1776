//! 전송 진행률 모델
//!
//! 다운로드(바이트 단위)와 압축 해제(엔트리 단위)가 같은 구조체로
//! 진행률을 보고합니다. 전체 크기를 알 수 없으면 `total`이 `None`이고
//! 진행률은 불확정(indeterminate) 상태로 취급됩니다.

/// 한 번의 진행률 보고
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// 지금까지 처리한 바이트 또는 엔트리 수
    pub done: u64,
    /// 전체 예상치 (None이면 불확정)
    pub total: Option<u64>,
    /// 사용자 표시용 라벨
    pub label: String,
}

impl TransferProgress {
    /// 다운로드 진행률 (바이트 단위)
    pub fn download(done: u64, total: Option<u64>) -> Self {
        Self {
            done,
            total,
            label: download_label(done, total),
        }
    }

    /// 압축 해제 진행률 (엔트리 단위)
    pub fn entries(done: usize, total: usize, entry_name: &str) -> Self {
        Self {
            done: done as u64,
            total: Some(total as u64),
            label: format!("Extracting: {}", entry_name),
        }
    }

    /// 0~100 퍼센트. 전체 크기를 모르면 None
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some((self.done.min(total) * 100 / total) as u8),
            None => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.total, Some(total) if self.done >= total)
    }
}

fn download_label(done: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => format!(
            "Downloading: {}% ({}/{} KB)",
            done.min(total) * 100 / total,
            done / 1024,
            total / 1024
        ),
        _ => format!("Downloading: {} KB", done / 1024),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_with_known_total() {
        let p = TransferProgress::download(512 * 1024, Some(1024 * 1024));
        assert_eq!(p.percent(), Some(50));
        assert_eq!(p.label, "Downloading: 50% (512/1024 KB)");
        assert!(!p.is_complete());
    }

    #[test]
    fn unknown_total_is_indeterminate() {
        let p = TransferProgress::download(4096, None);
        assert_eq!(p.percent(), None);
        // 바이트 수는 라벨에 계속 표시
        assert_eq!(p.label, "Downloading: 4 KB");
    }

    #[test]
    fn entry_progress_label() {
        let p = TransferProgress::entries(3, 3, "HCE_Server/run.bat");
        assert_eq!(p.percent(), Some(100));
        assert!(p.is_complete());
        assert_eq!(p.label, "Extracting: HCE_Server/run.bat");
    }
}
