//! 서버 폴더 파일 브라우저 / 편집기 모델
//!
//! 트리는 디렉터리 먼저, 그다음 파일 순이며 같은 종류끼리는 대소문자를
//! 무시한 이름 순으로 정렬됩니다.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} already exists (overwrite not confirmed)", .0.display())]
    AlreadyExists(PathBuf),

    #[error("{} is not an editable server file", .0.display())]
    NotEditable(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FilesError + '_ {
    move |source| FilesError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

/// `root` 아래 전체 트리. 읽을 수 없는 하위 디렉터리는 빈 노드로 남는다.
pub fn tree(root: &Path) -> Result<FileNode, FilesError> {
    let meta = std::fs::metadata(root).map_err(io_err(root))?;
    let mut node = FileNode {
        name: root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string()),
        path: root.to_path_buf(),
        is_dir: meta.is_dir(),
        children: Vec::new(),
    };
    if node.is_dir {
        node.children = children_of(root);
    }
    Ok(node)
}

fn children_of(dir: &Path) -> Vec<FileNode> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("[Files] Cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<FileNode> = entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            FileNode {
                name: entry.file_name().to_string_lossy().to_string(),
                children: if is_dir { children_of(&path) } else { Vec::new() },
                path,
                is_dir,
            }
        })
        .collect();

    nodes.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    nodes
}

/// 편집 가능한 파일 규칙 (존재 여부는 보지 않음)
/// - `run.bat`
/// - `sapp` 또는 `cg` 폴더 아래의 `.txt`
/// - 이름에 `lua`가 들어간 폴더 아래의 `.lua`
pub fn is_editable_name(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    let dirs: Vec<String> = path
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().to_lowercase()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if name == "run.bat" {
        return true;
    }
    if name.ends_with(".txt") {
        return dirs.iter().any(|d| d == "sapp" || d == "cg");
    }
    name.ends_with(".lua") && dirs.iter().any(|d| d.contains("lua"))
}

/// 실제 파일이면서 편집 규칙에 맞는지
pub fn is_editable(path: &Path) -> bool {
    path.is_file() && is_editable_name(path)
}

pub fn read_content(path: &Path) -> Result<String, FilesError> {
    std::fs::read_to_string(path).map_err(io_err(path))
}

/// 파일 내용을 기록. 이미 있는 파일은 `overwrite`가 true일 때만 덮어쓴다.
pub fn write_content(path: &Path, content: &str, overwrite: bool) -> Result<(), FilesError> {
    if !is_editable_name(path) {
        return Err(FilesError::NotEditable(path.to_path_buf()));
    }
    if path.exists() && !overwrite {
        return Err(FilesError::AlreadyExists(path.to_path_buf()));
    }
    std::fs::write(path, content).map_err(io_err(path))?;
    tracing::info!("[Files] Saved {} ({} bytes)", path.display(), content.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_server() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cg/sapp/lua")).unwrap();
        fs::create_dir_all(root.join("Maps")).unwrap();
        fs::write(root.join("run.bat"), "haloceded.exe").unwrap();
        fs::write(root.join("a_readme.md"), "").unwrap();
        fs::write(root.join("cg/init.txt"), "sv_name x").unwrap();
        fs::write(root.join("cg/sapp/lua/rank.lua"), "-- lua").unwrap();
        dir
    }

    #[test]
    fn tree_lists_directories_first() {
        let dir = sample_server();
        let root = tree(dir.path()).unwrap();
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["cg", "Maps", "a_readme.md", "run.bat"]);

        let cg = &root.children[0];
        let cg_names: Vec<_> = cg.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cg_names, ["sapp", "init.txt"]);
    }

    #[test]
    fn editable_rules() {
        let dir = sample_server();
        let root = dir.path();
        assert!(is_editable(&root.join("run.bat")));
        assert!(is_editable(&root.join("cg/init.txt")));
        assert!(is_editable(&root.join("cg/sapp/lua/rank.lua")));
        assert!(!is_editable(&root.join("a_readme.md")));
        assert!(!is_editable(&root.join("cg")));
        assert!(!is_editable(&root.join("cg/missing.txt")));

        assert!(is_editable_name(Path::new("server/sapp/commands.txt")));
        assert!(!is_editable_name(Path::new("server/maps/notes.txt")));
        assert!(!is_editable_name(Path::new("server/scripts/x.lua")));
    }

    #[test]
    fn write_requires_overwrite_for_existing_files() {
        let dir = sample_server();
        let init = dir.path().join("cg/init.txt");

        let err = write_content(&init, "sv_name y", false).unwrap_err();
        assert!(matches!(err, FilesError::AlreadyExists(_)));
        assert_eq!(read_content(&init).unwrap(), "sv_name x");

        write_content(&init, "sv_name y", true).unwrap();
        assert_eq!(read_content(&init).unwrap(), "sv_name y");
    }

    #[test]
    fn write_creates_new_editable_file() {
        let dir = sample_server();
        let new_script = dir.path().join("cg/sapp/lua/new.lua");
        write_content(&new_script, "print('hi')", false).unwrap();
        assert_eq!(read_content(&new_script).unwrap(), "print('hi')");
    }

    #[test]
    fn write_refuses_non_editable_paths() {
        let dir = sample_server();
        let err = write_content(&dir.path().join("haloceded.exe"), "x", true).unwrap_err();
        assert!(matches!(err, FilesError::NotEditable(_)));
    }
}
