//! zip 아카이브 압축 해제
//!
//! 엔트리는 아카이브 순서 그대로 처리합니다. 모든 엔트리 이름은
//! `enclosed_name()`으로 검사하여, 절대 경로이거나 `..`로 대상 디렉터리
//! 밖을 가리키는 엔트리가 있으면 아무것도 쓰지 않고 중단합니다.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::progress::TransferProgress;

const CHUNK_SIZE: usize = 8 * 1024;

/// 압축 해제 에러
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive is corrupt: {0}")]
    ArchiveCorrupt(#[from] zip::result::ZipError),

    #[error("entry '{0}' resolves outside the destination directory")]
    UnsafeEntry(String),

    #[error("extraction cancelled")]
    Cancelled,

    #[error("extraction worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ExtractError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// `archive`를 `destination` 아래에 풀고 처리한 엔트리 수를 반환
///
/// 진행률은 청크가 아니라 엔트리 하나가 끝날 때마다 보고됩니다.
/// 실패 시 남은 엔트리는 건너뛰며, 이미 풀린 파일은 그대로 남습니다.
pub fn extract<F>(
    archive: &Path,
    destination: &Path,
    mut on_progress: F,
    cancel: &CancellationToken,
) -> Result<usize, ExtractError>
where
    F: FnMut(TransferProgress),
{
    tracing::info!("[Extract] {} -> {}", archive.display(), destination.display());

    let file = File::open(archive).map_err(|e| ExtractError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(destination).map_err(|e| ExtractError::io(destination, e))?;

    let total = zip.len();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    for index in 0..total {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let mut entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| ExtractError::UnsafeEntry(name.clone()))?;
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| ExtractError::io(&out_path, e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
            }
            let mut out = File::create(&out_path).map_err(|e| ExtractError::io(&out_path, e))?;
            loop {
                if cancel.is_cancelled() {
                    return Err(ExtractError::Cancelled);
                }
                let n = entry
                    .read(&mut buffer)
                    .map_err(|e| ExtractError::io(&out_path, e))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buffer[..n])
                    .map_err(|e| ExtractError::io(&out_path, e))?;
            }
        }

        on_progress(TransferProgress::entries(index + 1, total, &name));
    }

    tracing::info!("[Extract] Extracted {} entries", total);
    Ok(total)
}

/// `extract`를 블로킹 스레드풀에서 실행하는 비동기 래퍼
pub async fn extract_async<F>(
    archive: PathBuf,
    destination: PathBuf,
    on_progress: F,
    cancel: CancellationToken,
) -> Result<usize, ExtractError>
where
    F: FnMut(TransferProgress) + Send + 'static,
{
    tokio::task::spawn_blocking(move || extract(&archive, &destination, on_progress, &cancel))
        .await?
}
