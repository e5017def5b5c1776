//! 서버 프로세스 실행 및 실행 상태 조회
//!
//! 서버는 `run.bat`을 통해 독립 프로세스로 실행되며, 관리 도구는
//! 종료를 기다리지 않습니다.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};

use crate::server::{Installation, RUN_SCRIPT};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{0} server is not installed")]
    NotInstalled(String),

    #[error("failed to launch server: {0}")]
    SpawnFailed(String),
}

/// 실행된 서버 프로세스
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchedServer {
    pub pid: u32,
    pub working_dir: String,
}

/// 서버 디렉터리 아래 실행 파일로 돌고 있는 프로세스
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningProcess {
    pub pid: u32,
    pub name: String,
}

/// 설치 여부를 다시 확인한 뒤 `run.bat`을 분리된 프로세스로 실행
pub fn launch(installation: &Installation) -> Result<LaunchedServer, LaunchError> {
    if !installation.probe_installed() {
        return Err(LaunchError::NotInstalled(installation.kind.display_name().to_string()));
    }

    let server_dir = installation.server_directory();
    let mut cmd = launch_command();
    cmd.current_dir(&server_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = cmd
        .spawn()
        .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;

    tracing::info!(
        "[Launcher] Started {} server (pid {}) in {}",
        installation.kind.id(),
        child.id(),
        server_dir.display()
    );
    Ok(LaunchedServer {
        pid: child.id(),
        working_dir: server_dir.to_string_lossy().to_string(),
    })
}

#[cfg(target_os = "windows")]
fn launch_command() -> Command {
    use std::os::windows::process::CommandExt;
    // CREATE_NEW_CONSOLE: 서버 콘솔은 자기 창을 가진다
    const CREATE_NEW_CONSOLE: u32 = 0x00000010;
    let mut cmd = Command::new("cmd.exe");
    cmd.args(["/c", RUN_SCRIPT]);
    cmd.creation_flags(CREATE_NEW_CONSOLE);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn launch_command() -> Command {
    use std::os::unix::process::CommandExt;
    let mut cmd = Command::new("sh");
    cmd.arg(RUN_SCRIPT);
    cmd.process_group(0);
    cmd
}

/// PID가 아직 살아 있는지
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

/// 실행 파일이 `server_dir` 아래에 있는 프로세스 목록
pub fn find_running(server_dir: &Path) -> Vec<RunningProcess> {
    let mut sys = System::new();
    sys.refresh_processes();

    let server_dir = server_dir.canonicalize().unwrap_or_else(|_| server_dir.to_path_buf());
    sys.processes()
        .iter()
        .filter(|(_, p)| p.exe().map_or(false, |exe| exe.starts_with(&server_dir)))
        .map(|(pid, p)| RunningProcess {
            pid: pid.as_u32(),
            name: p.name().to_string(),
        })
        .collect()
}

/// `find_running`의 비동기 래퍼. 프로세스 테이블 스캔은 블로킹 스레드에서 실행.
pub async fn find_running_async(server_dir: &Path) -> Vec<RunningProcess> {
    let server_dir = server_dir.to_path_buf();
    tokio::task::spawn_blocking(move || find_running(&server_dir))
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{detect, ServerKind};

    #[test]
    fn refuses_uninstalled_server() {
        let dir = tempfile::tempdir().unwrap();
        let inst = detect(ServerKind::Hpc, dir.path());

        let err = launch(&inst).unwrap_err();
        assert!(matches!(err, LaunchError::NotInstalled(_)));
        assert!(!inst.server_directory().exists());
    }

    #[test]
    fn stale_installed_flag_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let mut inst = detect(ServerKind::Hce, dir.path());
        inst.installed = true;

        assert!(matches!(launch(&inst), Err(LaunchError::NotInstalled(_))));
    }

    #[cfg(unix)]
    #[test]
    fn launches_run_script_in_server_dir() {
        let dir = tempfile::tempdir().unwrap();
        let server_dir = dir.path().join("HCE_Server");
        std::fs::create_dir_all(&server_dir).unwrap();
        std::fs::write(server_dir.join(RUN_SCRIPT), "pwd > launched.txt\n").unwrap();

        let inst = detect(ServerKind::Hce, dir.path());
        let launched = launch(&inst).unwrap();
        assert!(launched.pid > 0);

        // 실행 후 바로 반환하므로 결과 파일은 잠시 뒤에 생긴다
        let marker = server_dir.join("launched.txt");
        for _ in 0..50 {
            if marker.exists() && !std::fs::read_to_string(&marker).unwrap().is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        let cwd = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(
            std::path::PathBuf::from(cwd.trim()).canonicalize().unwrap(),
            server_dir.canonicalize().unwrap()
        );
    }

    #[test]
    fn current_process_is_running() {
        assert!(is_running(std::process::id()));
    }
}
