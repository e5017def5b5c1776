//! Halo Server Manager 코어 라이브러리
//!
//! 서버 설치 감지/복구, 설치 파이프라인, 서버 실행, 파일 편집, 스크립트 카탈로그.
//! 다운로드/압축 해제/셀프 업데이트는 `hsm-updater-lib` 크레이트가 담당합니다.

pub mod config;
pub mod error;
pub mod files;
pub mod launcher;
pub mod orchestrator;
pub mod scripts;
pub mod server;

pub use error::{OperationOutcome, PipelineError};
pub use orchestrator::{CheckTrigger, Orchestrator, PipelineEvent};
pub use server::{Installation, ServerKind};
