//! 원격 리소스 스트리밍 다운로드
//!
//! 응답 본문을 청크 단위로 `<dest>.part`에 기록한 뒤, 성공하면
//! 최종 경로로 rename 합니다. 실패/취소 시 `.part` 파일은 삭제되므로
//! 최종 경로에 반쯤 쓰인 파일이 남지 않습니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::progress::TransferProgress;

pub const USER_AGENT: &str = "HaloServerManager";

/// 다운로드 에러
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned HTTP code {0}")]
    BadStatus(u16),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download cancelled")]
    Cancelled,
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 공용 HTTP 클라이언트 생성
pub fn http_client() -> Result<reqwest::Client, FetchError> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(http)
}

/// `archive.zip` → `archive.zip.part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// 호출 간 상태가 없는 다운로더. 여러 태스크에서 동시에 사용해도 안전합니다.
#[derive(Clone)]
pub struct Fetcher {
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_client(http_client()?))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.http
    }

    /// `url`을 `dest`로 스트리밍 다운로드하고 기록한 바이트 수를 반환
    pub async fn fetch<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError>
    where
        F: FnMut(TransferProgress),
    {
        tracing::info!("[Fetch] {} -> {}", url, dest.display());

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.http.get(url).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("[Fetch] {} returned HTTP {}", url, status.as_u16());
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let part = part_path(dest);
        let total = response.content_length();

        match stream_to_file(response, &part, total, &mut on_progress, cancel).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| FetchError::io(dest, e))?;
                tracing::info!("[Fetch] Downloaded {} bytes to {}", written, dest.display());
                Ok(written)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("[Fetch] Could not remove {}: {}", part.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    /// 작은 텍스트 문서(JSON, 스크립트 소스)를 메모리로 가져오기
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

async fn stream_to_file<F>(
    response: reqwest::Response,
    part: &Path,
    total: Option<u64>,
    on_progress: &mut F,
    cancel: &CancellationToken,
) -> Result<u64, FetchError>
where
    F: FnMut(TransferProgress),
{
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| FetchError::io(part, e))?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;

        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(part, e))?;
        written += chunk.len() as u64;
        on_progress(TransferProgress::download(written, total));
    }

    // 빈 본문도 완료 보고는 한 번 내보낸다
    if written == 0 {
        on_progress(TransferProgress::download(0, total));
    }

    file.flush().await.map_err(|e| FetchError::io(part, e))?;
    file.sync_all().await.map_err(|e| FetchError::io(part, e))?;
    Ok(written)
}
