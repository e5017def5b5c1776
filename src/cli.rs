//! 커맨드라인 프론트엔드
//!
//! 긴 작업은 별도 태스크에서 실행되고, 이 모듈의 코디네이터 루프가
//! 이벤트 채널을 읽어 진행 상황을 출력합니다.

use std::future::Future;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use halo_server_manager::files::{self, FileNode};
use halo_server_manager::orchestrator::{events, EventSender, ServerStatus};
use halo_server_manager::scripts::ScriptError;
use halo_server_manager::{CheckTrigger, Orchestrator, PipelineError, PipelineEvent, ServerKind};

#[derive(Parser, Debug)]
#[command(name = "halo-server-manager", author, version, about = "Install, update and launch Halo PC/CE dedicated servers")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 설치 상태와 실행 중인 서버 표시
    Status {
        /// HPC 또는 HCE (생략하면 모두)
        kind: Option<ServerKind>,
    },
    /// 기존 설치 위치 지정
    SetPath { kind: ServerKind, dir: PathBuf },
    /// 서버 패키지 다운로드 및 설치
    Install {
        kind: ServerKind,
        dir: PathBuf,
        /// 기존 설치 덮어쓰기 확인 생략
        #[arg(long)]
        yes: bool,
    },
    /// run.bat으로 서버 실행
    Launch { kind: ServerKind },
    /// 새 버전 확인
    CheckUpdate,
    /// 새 버전 다운로드 후 교체
    SelfUpdate {
        #[arg(long)]
        yes: bool,
    },
    /// 업데이트 환경설정
    Update {
        #[command(subcommand)]
        action: UpdateAction,
    },
    /// 서버 파일 탐색/편집
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
    /// SAPP Lua 스크립트 카탈로그
    Scripts {
        #[command(subcommand)]
        action: ScriptsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum UpdateAction {
    AutoCheck {
        #[arg(value_enum)]
        state: Switch,
    },
    /// 자동 확인에서 이 버전을 알리지 않음
    Skip { version: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Switch {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
pub enum FilesAction {
    Tree { kind: ServerKind },
    Show { kind: ServerKind, path: PathBuf },
    /// 파일 내용 기록 (`--from`이 없으면 표준 입력)
    Write {
        kind: ServerKind,
        path: PathBuf,
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScriptsAction {
    List,
    Install {
        kind: ServerKind,
        key: String,
        /// 기존 스크립트 덮어쓰기 확인 생략
        #[arg(long)]
        yes: bool,
    },
}

pub async fn run(orch: Arc<Orchestrator>, command: Command) -> Result<()> {
    match command {
        Command::Status { kind } => {
            let kinds = kind.map(|k| vec![k]).unwrap_or_else(|| ServerKind::ALL.to_vec());
            for kind in kinds {
                print_status(&orch.status(kind).await);
            }
            if let Some(info) = orch.check_for_updates(CheckTrigger::Automatic).await? {
                if info.update_available() && info.is_newer() {
                    println!(
                        "\nVersion {} is available (current {}). Run `self-update` to install it.",
                        info.latest, info.current
                    );
                }
            }
        }
        Command::SetPath { kind, dir } => {
            let inst = orch.set_install_path(kind, &dir)?;
            println!(
                "{} path set to {} ({})",
                kind,
                inst.root.display(),
                if inst.installed { "installed" } else { "not installed" }
            );
        }
        Command::Install { kind, dir, yes } => {
            let existing = halo_server_manager::server::detect(kind, &dir);
            if existing.installed
                && !confirm(
                    &format!(
                        "{} already contains a server. Overwrite its files?",
                        existing.server_directory().display()
                    ),
                    yes,
                )?
            {
                println!("Install cancelled.");
                return Ok(());
            }
            let inst = drive(&orch, move |orch, tx, cancel| async move {
                orch.install(kind, &dir, &tx, &cancel).await
            })
            .await?;
            println!("Server directory: {}", inst.server_directory().display());
        }
        Command::Launch { kind } => {
            let launched = orch.launch(kind)?;
            println!("{} started (pid {}) in {}", kind, launched.pid, launched.working_dir);
        }
        Command::CheckUpdate => {
            if let Some(info) = orch.check_for_updates(CheckTrigger::Manual).await? {
                println!("Current version: {}", info.current);
                println!("Latest version:  {}", info.latest);
                if info.update_available() {
                    println!("Update available.");
                    if !info.release_notes.is_empty() {
                        println!("\n{}", info.release_notes);
                    }
                } else {
                    println!("You are running the latest version.");
                }
            }
        }
        Command::SelfUpdate { yes } => self_update(orch, yes).await?,
        Command::Update { action } => match action {
            UpdateAction::AutoCheck { state } => {
                let enabled = matches!(state, Switch::On);
                orch.preferences().set_auto_check_enabled(enabled)?;
                println!("Automatic update check {}", if enabled { "enabled" } else { "disabled" });
            }
            UpdateAction::Skip { version } => {
                orch.skip_version(&version)?;
                println!("Version {} will not be announced.", version);
            }
        },
        Command::Files { action } => files_command(&orch, action)?,
        Command::Scripts { action } => match action {
            ScriptsAction::List => {
                let scripts = orch.list_scripts().await?;
                let mut category = None;
                for script in &scripts {
                    if category != Some(script.category) {
                        category = Some(script.category);
                        println!("\n[{}]", script.category);
                    }
                    println!("  {:<28} {}", script.key, script.short_description);
                }
            }
            ScriptsAction::Install { kind, key, yes } => {
                let first = {
                    let key = key.clone();
                    drive(&orch, move |orch, tx, cancel| async move {
                        orch.install_script(kind, &key, yes, &tx, &cancel).await
                    })
                    .await
                };
                let path = match first {
                    Ok(path) => path,
                    Err(e) => {
                        let Some(existing) = existing_script(&e) else {
                            return Err(e);
                        };
                        if !confirm(
                            &format!("Script '{}' already exists. Overwrite?", existing.display()),
                            false,
                        )? {
                            println!("Script install cancelled.");
                            return Ok(());
                        }
                        drive(&orch, move |orch, tx, cancel| async move {
                            orch.install_script(kind, &key, true, &tx, &cancel).await
                        })
                        .await?
                    }
                };
                println!("Saved {}", path.display());
            }
        },
    }
    Ok(())
}

async fn self_update(orch: Arc<Orchestrator>, yes: bool) -> Result<()> {
    let Some(info) = orch.check_for_updates(CheckTrigger::Manual).await? else {
        return Ok(());
    };
    if !info.update_available() || !info.is_newer() {
        println!("You are running the latest version ({}).", info.current);
        return Ok(());
    }

    let exe = std::env::current_exe().context("locating the running executable")?;
    let download_info = info.clone();
    let download_exe = exe.clone();
    let staged = drive(&orch, move |orch, tx, cancel| async move {
        orch.download_update(&download_info, &download_exe, &tx, &cancel).await
    })
    .await?;

    if !confirm(
        &format!("Replace {} with version {} and restart?", exe.display(), info.latest),
        yes,
    )? {
        println!("Update downloaded to {} but not applied.", staged.display());
        return Ok(());
    }

    orch.apply_update(&info, &exe, &staged, true)?;
    println!("Restarting into version {}...", info.latest);
    // 교체 스크립트는 이 프로세스의 종료를 기다린다
    std::process::exit(0);
}

fn files_command(orch: &Orchestrator, action: FilesAction) -> Result<()> {
    let server_dir = |kind: ServerKind| -> Result<PathBuf> {
        match orch.installation(kind) {
            Some(inst) if inst.probe_installed() => Ok(inst.server_directory()),
            _ => Err(PipelineError::NotInstalled(kind.display_name().to_string()).into()),
        }
    };

    match action {
        FilesAction::Tree { kind } => {
            let root = files::tree(&server_dir(kind)?)?;
            print_tree(&root, 0);
        }
        FilesAction::Show { kind, path } => {
            let path = resolve_inside(&server_dir(kind)?, &path)?;
            print!("{}", files::read_content(&path)?);
        }
        FilesAction::Write { kind, path, from, yes } => {
            let path = resolve_inside(&server_dir(kind)?, &path)?;
            let content = match from {
                Some(src) => std::fs::read_to_string(&src)
                    .with_context(|| format!("reading {}", src.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
                    buf
                }
            };
            let overwrite = path.exists()
                && confirm(&format!("Overwrite {}?", path.display()), yes)?;
            files::write_content(&path, &content, overwrite)?;
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}

/// 덮어쓰기 확인이 필요해 거부된 스크립트 경로
fn existing_script(err: &anyhow::Error) -> Option<PathBuf> {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Script(ScriptError::AlreadyExists(path))) => Some(path.clone()),
        _ => None,
    }
}

/// 서버 폴더 기준 상대 경로만 허용
fn resolve_inside(server_dir: &Path, relative: &Path) -> Result<PathBuf> {
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("{} must be a path inside the server folder", relative.display());
    }
    Ok(server_dir.join(relative))
}

/// 긴 작업을 태스크로 실행하고 끝날 때까지 이벤트를 출력. Ctrl+C는 작업을 취소한다.
async fn drive<T, F, Fut>(orch: &Arc<Orchestrator>, op: F) -> Result<T>
where
    F: FnOnce(Arc<Orchestrator>, EventSender, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, mut rx) = events::channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(op(orch.clone(), tx, cancel.clone()));

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => render(&event),
                // 작업 태스크가 송신기를 놓으면 종료
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                println!("\nCancelling...");
                cancel.cancel();
            }
        }
    }

    Ok(task.await??)
}

fn render(event: &PipelineEvent) {
    match event {
        PipelineEvent::Started { label, .. } => println!("==> {}", label),
        PipelineEvent::Step { message, .. } => println!("\n{}", message),
        PipelineEvent::Progress { message, .. } => {
            print!("\r{:<72}", message);
            let _ = std::io::stdout().flush();
        }
        PipelineEvent::Finished { outcome, .. } => {
            if outcome.success {
                println!("\n{}", outcome.message);
            } else {
                println!();
            }
        }
    }
}

fn confirm(question: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_status(status: &ServerStatus) {
    match &status.installation {
        None => println!("{}: no install path configured", status.kind),
        Some(inst) if !inst.installed => println!(
            "{}: not installed at {}",
            status.kind,
            inst.server_directory().display()
        ),
        Some(inst) => {
            println!("{}: installed at {}", status.kind, inst.server_directory().display());
            if !status.layout_complete {
                println!("  warning: some server folders are missing");
            }
            if status.running.is_empty() {
                println!("  not running");
            }
            for p in &status.running {
                println!("  running: {} (pid {})", p.name, p.pid);
            }
        }
    }
}

fn print_tree(node: &FileNode, depth: usize) {
    let marker = if node.is_dir {
        "/"
    } else if files::is_editable(&node.path) {
        " *"
    } else {
        ""
    };
    println!("{}{}{}", "  ".repeat(depth), node.name, marker);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_install_command() {
        let args = Args::try_parse_from(["hsm", "install", "hce", "/games", "--yes"]).unwrap();
        match args.command {
            Command::Install { kind, dir, yes } => {
                assert_eq!(kind, ServerKind::Hce);
                assert_eq!(dir, PathBuf::from("/games"));
                assert!(yes);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Args::try_parse_from(["hsm", "install", "halo3", "/games"]).is_err());
    }

    #[test]
    fn parses_script_install_confirmation() {
        let args = Args::try_parse_from(["hsm", "scripts", "install", "hce", "admin_chat", "--yes"]).unwrap();
        match args.command {
            Command::Scripts {
                action: ScriptsAction::Install { kind, key, yes },
            } => {
                assert_eq!(kind, ServerKind::Hce);
                assert_eq!(key, "admin_chat");
                assert!(yes);
            }
            other => panic!("unexpected {:?}", other),
        }
        let args = Args::try_parse_from(["hsm", "scripts", "install", "hpc", "admin_chat"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Scripts { action: ScriptsAction::Install { yes: false, .. } }
        ));
    }

    #[test]
    fn existing_script_error_asks_for_confirmation() {
        let path = PathBuf::from("/srv/HCE_Server/cg/sapp/lua/admin_chat.lua");
        let err = anyhow::Error::from(PipelineError::Script(ScriptError::AlreadyExists(path.clone())));
        assert_eq!(existing_script(&err), Some(path));

        let other = anyhow::Error::from(PipelineError::NotInstalled("Halo CE".into()));
        assert!(existing_script(&other).is_none());
    }

    #[test]
    fn relative_paths_stay_inside_server() {
        let dir = Path::new("/srv/HCE_Server");
        assert_eq!(
            resolve_inside(dir, Path::new("cg/init.txt")).unwrap(),
            dir.join("cg/init.txt")
        );
        assert!(resolve_inside(dir, Path::new("../secret.txt")).is_err());
        assert!(resolve_inside(dir, Path::new("/etc/passwd")).is_err());
    }
}
