//! 관리 대상 서버 종류 레지스트리
//!
//! 종류별 데이터는 컴파일 타임 테이블 하나에만 존재합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 서버 종류별 고정 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSpec {
    /// 설정 키에 쓰이는 식별자 (예: "HCE")
    pub id: &'static str,
    pub display_name: &'static str,
    /// 설치 루트 아래 서버 폴더 이름
    pub folder_name: &'static str,
    pub download_url: &'static str,
}

const REGISTRY: [ServerSpec; 2] = [
    ServerSpec {
        id: "HPC",
        display_name: "Halo PC",
        folder_name: "HPC_Server",
        download_url: "https://github.com/Chalwk/HALO-SCRIPT-PROJECTS/releases/download/ReadyToGo/HPC_Server.zip",
    },
    ServerSpec {
        id: "HCE",
        display_name: "Halo CE",
        folder_name: "HCE_Server",
        download_url: "https://github.com/Chalwk/HALO-SCRIPT-PROJECTS/releases/download/ReadyToGo/HCE_Server.zip",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerKind {
    #[serde(rename = "HPC")]
    Hpc,
    #[serde(rename = "HCE")]
    Hce,
}

impl ServerKind {
    pub const ALL: [ServerKind; 2] = [ServerKind::Hpc, ServerKind::Hce];

    pub fn spec(self) -> &'static ServerSpec {
        match self {
            ServerKind::Hpc => &REGISTRY[0],
            ServerKind::Hce => &REGISTRY[1],
        }
    }

    pub fn id(self) -> &'static str {
        self.spec().id
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    pub fn folder_name(self) -> &'static str {
        self.spec().folder_name
    }

    pub fn download_url(self) -> &'static str {
        self.spec().download_url
    }

    /// 다운로드한 패키지의 임시 파일 이름
    pub fn archive_name(self) -> String {
        format!("{}.zip", self.folder_name())
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown server kind '{0}' (expected HPC or HCE)")]
pub struct UnknownKind(String);

impl FromStr for ServerKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServerKind::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup() {
        assert_eq!(ServerKind::Hce.folder_name(), "HCE_Server");
        assert_eq!(ServerKind::Hpc.display_name(), "Halo PC");
        assert!(ServerKind::Hpc.download_url().ends_with("/HPC_Server.zip"));
        assert_eq!(ServerKind::Hce.archive_name(), "HCE_Server.zip");
    }

    #[test]
    fn parses_ids_case_insensitively() {
        assert_eq!("hce".parse::<ServerKind>().unwrap(), ServerKind::Hce);
        assert_eq!(" HPC ".parse::<ServerKind>().unwrap(), ServerKind::Hpc);
        assert!("halo2".parse::<ServerKind>().is_err());
    }
}
