//! 서버 설치 감지와 디렉터리 구조 복구
//!
//! 설치 여부는 항상 파일시스템을 다시 확인해서 결정합니다.
//! `Installation::installed`는 마지막으로 확인한 시점의 값일 뿐이며,
//! 다운로드/압축 해제/삭제 이후에는 `detect`나 `probe_installed`로 다시 확인해야 합니다.

pub mod kind;

pub use kind::{ServerKind, ServerSpec};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 서버 폴더 안의 실행 스크립트
pub const RUN_SCRIPT: &str = "run.bat";

/// 설치 직후 보장하는 디렉터리 (zip에 빈 폴더가 빠져 있을 수 있음)
pub const INSTALL_LAYOUT: [&str; 5] = ["maps", "cg", "cg/sapp/lua", "cg/savegames", "sapp"];

/// "구조적으로 완전한" 설치에 필요한 디렉터리
pub const ESSENTIAL_DIRS: [&str; 4] = ["cg/sapp/lua", "cg/savegames", "maps", "sapp"];

/// 감지된 서버 설치
///
/// `root`는 서버 폴더를 *포함하는* 디렉터리입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub kind: ServerKind,
    pub root: PathBuf,
    pub installed: bool,
}

impl Installation {
    pub fn server_directory(&self) -> PathBuf {
        self.root.join(self.kind.folder_name())
    }

    pub fn launch_script(&self) -> PathBuf {
        self.server_directory().join(RUN_SCRIPT)
    }

    /// Lua 스크립트 폴더 (`cg/sapp/lua`)
    pub fn lua_directory(&self) -> PathBuf {
        self.server_directory().join("cg").join("sapp").join("lua")
    }

    /// 서버 폴더와 run.bat이 있는지 지금 다시 확인
    pub fn probe_installed(&self) -> bool {
        is_installed_at(&self.server_directory())
    }

    /// 파일시스템 기준으로 `installed`를 갱신한 사본
    pub fn refreshed(&self) -> Self {
        Self {
            installed: self.probe_installed(),
            ..self.clone()
        }
    }
}

fn is_installed_at(server_dir: &Path) -> bool {
    server_dir.is_dir() && server_dir.join(RUN_SCRIPT).is_file()
}

/// 사용자가 고른 디렉터리에서 서버 설치를 감지
///
/// `selected`는 서버 폴더 자체일 수도, 서버 폴더를 포함한 부모일 수도,
/// 아직 비어 있는 설치 대상일 수도 있습니다.
pub fn detect(kind: ServerKind, selected: &Path) -> Installation {
    let folder = kind.folder_name();

    let server_dir = if selected.file_name().map_or(false, |n| n == folder) {
        selected.to_path_buf()
    } else {
        // 포함하고 있든 아니든 설치 위치는 selected/folder
        selected.join(folder)
    };

    let installed = is_installed_at(&server_dir);
    // 부모를 root로 저장해야 server_directory()가 같은 경로로 다시 풀린다
    let root = server_dir.parent().map(Path::to_path_buf).unwrap_or_default();

    tracing::debug!(
        "[Detect] {} at {} (installed: {})",
        kind.id(),
        server_dir.display(),
        installed
    );
    Installation { kind, root, installed }
}

/// 필수 디렉터리까지 모두 갖췄는지 확인 (run.bat 확인보다 엄격)
pub fn verify_layout(installation: &Installation) -> bool {
    let server_dir = installation.server_directory();
    is_installed_at(&server_dir) && ESSENTIAL_DIRS.iter().all(|d| server_dir.join(d).is_dir())
}

/// 기대하는 하위 디렉터리가 없으면 생성. 기존 내용은 건드리지 않는다.
pub fn repair_layout(server_dir: &Path, expected: &[&str]) -> std::io::Result<()> {
    for relative in expected {
        let dir = server_dir.join(relative);
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)?;
            tracing::debug!("[Repair] Created {}", dir.display());
        }
    }
    Ok(())
}

/// 설치된 경우에만 필수 디렉터리를 복구하고, 복구 여부를 반환
pub fn repair_if_installed(installation: &Installation) -> std::io::Result<bool> {
    if !installation.probe_installed() {
        return Ok(false);
    }
    repair_layout(&installation.server_directory(), &ESSENTIAL_DIRS)?;
    Ok(true)
}

/// 같은 디렉터리의 다른 표기(상대 경로, `x/..`, 심볼릭 링크)를 하나로 모은 경로
///
/// 존재하는 가장 가까운 조상을 canonicalize하고, 아직 없는 나머지 구성 요소는
/// 어휘적으로 이어 붙인다. 파일시스템은 변경하지 않는다.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut base = absolute.as_path();
    let mut rest = Vec::new();
    let canonical = loop {
        if let Ok(canonical) = base.canonicalize() {
            break canonical;
        }
        match (base.parent(), base.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                base = parent;
            }
            // `..`로 끝나거나 루트까지 올라간 경우
            _ => match base.parent() {
                Some(parent) => {
                    rest.push(std::ffi::OsString::from(".."));
                    base = parent;
                }
                None => break base.to_path_buf(),
            },
        }
    };

    let mut normalized = canonical;
    for part in rest.iter().rev() {
        if part == ".." {
            normalized.pop();
        } else if part != "." {
            normalized.push(part);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn install_run_bat(server_dir: &Path) {
        fs::create_dir_all(server_dir).unwrap();
        fs::write(server_dir.join(RUN_SCRIPT), "@echo off\r\nhaloceded.exe\r\n").unwrap();
    }

    #[test]
    fn detects_from_parent_directory() {
        let games = tempfile::tempdir().unwrap();
        install_run_bat(&games.path().join("HCE_Server"));

        let inst = detect(ServerKind::Hce, games.path());
        assert!(inst.installed);
        assert_eq!(inst.server_directory(), games.path().join("HCE_Server"));
        assert_eq!(inst.root, games.path());
    }

    #[test]
    fn detects_when_server_dir_selected() {
        let games = tempfile::tempdir().unwrap();
        let server_dir = games.path().join("HPC_Server");
        install_run_bat(&server_dir);

        let inst = detect(ServerKind::Hpc, &server_dir);
        assert!(inst.installed);
        assert_eq!(inst.server_directory(), server_dir);
    }

    #[test]
    fn empty_target_is_not_installed() {
        let empty = tempfile::tempdir().unwrap();
        let inst = detect(ServerKind::Hpc, empty.path());
        assert!(!inst.installed);
        assert_eq!(inst.server_directory(), empty.path().join("HPC_Server"));
    }

    #[test]
    fn folder_without_run_bat_is_not_installed() {
        let games = tempfile::tempdir().unwrap();
        fs::create_dir_all(games.path().join("HCE_Server/maps")).unwrap();
        assert!(!detect(ServerKind::Hce, games.path()).installed);
    }

    #[test]
    fn detection_is_idempotent() {
        let games = tempfile::tempdir().unwrap();
        install_run_bat(&games.path().join("HCE_Server"));

        let first = detect(ServerKind::Hce, games.path());
        let second = detect(ServerKind::Hce, games.path());
        assert_eq!(first, second);
        // root에서 다시 감지해도 같은 결과
        assert_eq!(detect(ServerKind::Hce, &first.root), first);
        assert_eq!(detect(ServerKind::Hce, &first.server_directory()), first);
    }

    #[test]
    fn layout_check_is_stricter_than_installed() {
        let games = tempfile::tempdir().unwrap();
        install_run_bat(&games.path().join("HCE_Server"));
        let inst = detect(ServerKind::Hce, games.path());

        assert!(inst.installed);
        assert!(!verify_layout(&inst));

        assert!(repair_if_installed(&inst).unwrap());
        assert!(verify_layout(&inst));
    }

    #[test]
    fn repair_is_idempotent_and_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let server_dir = dir.path().join("HCE_Server");
        fs::create_dir_all(server_dir.join("cg")).unwrap();
        fs::write(server_dir.join("cg/init.txt"), "sv_name \"My Server\"").unwrap();

        repair_layout(&server_dir, &INSTALL_LAYOUT).unwrap();
        repair_layout(&server_dir, &INSTALL_LAYOUT).unwrap();

        for d in INSTALL_LAYOUT {
            assert!(server_dir.join(d).is_dir(), "{} missing", d);
        }
        assert_eq!(
            fs::read_to_string(server_dir.join("cg/init.txt")).unwrap(),
            "sv_name \"My Server\""
        );
    }

    #[test]
    fn repair_skips_uninstalled_targets() {
        let dir = tempfile::tempdir().unwrap();
        let inst = detect(ServerKind::Hpc, dir.path());
        assert!(!repair_if_installed(&inst).unwrap());
        assert!(!inst.server_directory().exists());
    }

    #[test]
    fn repair_propagates_creation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let server_dir = dir.path().join("HCE_Server");
        fs::create_dir_all(&server_dir).unwrap();
        // 디렉터리가 있어야 할 자리에 파일
        fs::write(server_dir.join("cg"), "not a directory").unwrap();

        assert!(repair_layout(&server_dir, &INSTALL_LAYOUT).is_err());
    }

    #[test]
    fn normalize_path_merges_spellings() {
        let dir = tempfile::tempdir().unwrap();
        let games = dir.path().join("games");
        fs::create_dir_all(&games).unwrap();
        let canonical = games.canonicalize().unwrap();

        assert_eq!(normalize_path(&games), canonical);
        assert_eq!(normalize_path(&games.join("x").join("..")), canonical);
        assert_eq!(normalize_path(&games.join(".").join("HCE_Server")), canonical.join("HCE_Server"));
        // 아직 없는 경로도 만들지 않고 정규화
        assert_eq!(
            normalize_path(&games.join("new").join("..").join("HCE_Server")),
            canonical.join("HCE_Server")
        );
        assert!(!games.join("new").exists());
    }

    #[cfg(unix)]
    #[test]
    fn normalize_path_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let games = dir.path().join("games");
        fs::create_dir_all(&games).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&games, &link).unwrap();

        assert_eq!(
            normalize_path(&link.join("HCE_Server")),
            normalize_path(&games.join("HCE_Server"))
        );
    }
}
