//! 릴리즈 태그 정규화와 시맨틱 버전 비교

use std::cmp::Ordering;
use std::fmt;

/// "v2.3.0" → "2.3.0". 앞뒤 공백과 `v`/`V` 접두사를 제거
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// 시맨틱 버전 (major.minor[.patch][-prerelease])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl SemVer {
    pub fn parse(s: &str) -> Option<Self> {
        let s = normalize_tag(s);
        let (core, prerelease) = match s.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (s, None),
        };

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self { major, minor, patch, prerelease })
    }

    pub fn is_newer_than(&self, other: &SemVer) -> bool {
        self > other
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                // 정식 릴리즈 > 프리릴리즈
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `latest`가 `current`보다 새 버전인지 판정
///
/// 둘 중 하나라도 시맨틱 버전이 아니면 문자열이 다를 때 새 버전으로 본다.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (SemVer::parse(latest), SemVer::parse(current)) {
        (Some(l), Some(c)) => l.is_newer_than(&c),
        _ => normalize_tag(latest) != normalize_tag(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tag_prefix() {
        assert_eq!(normalize_tag("v2.3.0"), "2.3.0");
        assert_eq!(normalize_tag(" V1.0.0 "), "1.0.0");
        assert_eq!(normalize_tag("2.3.0"), "2.3.0");
    }

    #[test]
    fn parses_two_and_three_part_versions() {
        let v = SemVer::parse("v1.4").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 4, 0));

        let v = SemVer::parse("2.3.1-beta.2").unwrap();
        assert_eq!(v.patch, 1);
        assert_eq!(v.prerelease.as_deref(), Some("beta.2"));

        assert!(SemVer::parse("1.2.3.4").is_none());
        assert!(SemVer::parse("latest").is_none());
    }

    #[test]
    fn release_beats_prerelease() {
        let pre = SemVer::parse("2.0.0-rc.1").unwrap();
        let rel = SemVer::parse("2.0.0").unwrap();
        assert!(rel.is_newer_than(&pre));
        assert_eq!(rel.to_string(), "2.0.0");
    }

    #[test]
    fn newer_check_falls_back_to_inequality() {
        assert!(is_newer("2.3.0", "2.2.0"));
        assert!(!is_newer("2.2.0", "2.3.0"));
        assert!(!is_newer("v2.2.0", "2.2.0"));
        assert!(is_newer("nightly-7", "1.0.0"));
    }
}
