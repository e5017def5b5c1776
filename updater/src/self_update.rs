//! 셀프 업데이트 — 실행 중인 바이너리 교체
//!
//! 실행 중인 실행 파일은 자기 자신을 덮어쓸 수 없으므로 작은 스크립트에
//! 교체 작업을 넘깁니다.
//! 1. 현재 프로세스(PID)가 종료될 때까지 대기
//! 2. 기존 바이너리 삭제
//! 3. 스테이징된 새 바이너리를 제자리로 rename
//! 4. 재실행
//! 5. 스크립트 자신 삭제
//!
//! 스크립트를 스폰한 뒤 호출자는 즉시 프로세스를 종료해야 합니다.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::UpdateError;

#[cfg(target_os = "windows")]
pub const SCRIPT_NAME: &str = "halo-update.bat";
#[cfg(not(target_os = "windows"))]
pub const SCRIPT_NAME: &str = "halo-update.sh";

/// `HaloServerManager.exe` → `HaloServerManager.update.exe`
pub fn staged_binary_path(exe: &Path) -> PathBuf {
    let stem = exe.file_stem().unwrap_or_default().to_string_lossy();
    let name = match exe.extension() {
        Some(ext) => format!("{}.update.{}", stem, ext.to_string_lossy()),
        None => format!("{}.update", stem),
    };
    exe.with_file_name(name)
}

/// 교체 스크립트 내용
#[derive(Debug, Clone)]
pub struct UpdateScript {
    /// 종료를 기다릴 프로세스
    pub pid: u32,
    /// 교체 대상 (현재 실행 파일)
    pub exe: PathBuf,
    /// 새 바이너리
    pub staged: PathBuf,
}

impl UpdateScript {
    pub fn for_current_process(exe: PathBuf, staged: PathBuf) -> Self {
        Self {
            pid: std::process::id(),
            exe,
            staged,
        }
    }

    /// Windows 배치 스크립트
    pub fn render_batch(&self) -> String {
        let exe = self.exe.display();
        let staged = self.staged.display();
        let pid = self.pid;
        format!(
            "@echo off\r\n\
             chcp 65001 >nul\r\n\
             echo Updating Halo Server Manager...\r\n\
             :wait_for_close\r\n\
             tasklist /FI \"PID eq {pid}\" 2>nul | find \"{pid}\" >nul\r\n\
             if %errorlevel% == 0 (\r\n\
             \x20   timeout /t 1 /nobreak >nul\r\n\
             \x20   goto wait_for_close\r\n\
             )\r\n\
             if not exist \"{staged}\" (\r\n\
             \x20   echo Error: new version file not found!\r\n\
             \x20   exit /b 1\r\n\
             )\r\n\
             if exist \"{exe}\" del /f /q \"{exe}\"\r\n\
             move /y \"{staged}\" \"{exe}\" >nul\r\n\
             start \"\" \"{exe}\"\r\n\
             del \"%~f0\"\r\n\
             exit\r\n"
        )
    }

    /// POSIX 셸 스크립트
    pub fn render_shell(&self) -> String {
        let exe = sh_quote(&self.exe.to_string_lossy());
        let staged = sh_quote(&self.staged.to_string_lossy());
        let pid = self.pid;
        format!(
            "#!/bin/sh\n\
             while kill -0 {pid} 2>/dev/null; do\n\
             \x20   sleep 1\n\
             done\n\
             if [ ! -f {staged} ]; then\n\
             \x20   echo 'Error: new version file not found!' >&2\n\
             \x20   exit 1\n\
             fi\n\
             rm -f {exe}\n\
             mv {staged} {exe}\n\
             chmod +x {exe}\n\
             nohup {exe} >/dev/null 2>&1 &\n\
             rm -f \"$0\"\n"
        )
    }

    pub fn render(&self) -> String {
        if cfg!(target_os = "windows") {
            self.render_batch()
        } else {
            self.render_shell()
        }
    }

    /// `dir`에 스크립트를 기록하고 경로를 반환
    pub fn write(&self, dir: &Path) -> Result<PathBuf, UpdateError> {
        let path = dir.join(SCRIPT_NAME);
        std::fs::write(&path, self.render()).map_err(|e| UpdateError::io(&path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| UpdateError::io(&path, e))?;
        }
        Ok(path)
    }
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// 스크립트를 분리된 프로세스로 실행
///
/// 이 함수 호출 후 현재 프로세스는 종료되어야 합니다.
pub fn spawn_script(script: &Path) -> Result<(), UpdateError> {
    let dir = script.parent().unwrap_or_else(|| Path::new("."));

    #[cfg(target_os = "windows")]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        let mut cmd = Command::new("cmd");
        cmd.raw_arg(format!("/c start \"\" /min \"{}\"", script.display()));
        // DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP
        cmd.creation_flags(0x00000008 | 0x00000200);
        cmd
    };

    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        use std::os::unix::process::CommandExt;
        let mut cmd = Command::new("sh");
        cmd.arg(script);
        cmd.process_group(0);
        cmd
    };

    cmd.current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| UpdateError::Script(e.to_string()))?;

    tracing::info!("[SelfUpdate] Update script spawned, current process should exit now");
    Ok(())
}
