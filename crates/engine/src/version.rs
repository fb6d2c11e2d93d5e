//! Version strings and the ordering used to gate migration steps.
//!
//! Versions follow the dotted `major.minor.patch[-suffix]` convention used by
//! release tags, but the comparison is deliberately permissive: suffixes such
//! as `-dev`, `-beta-2`, `-beta.3`, `-rc.2` or `-pr1195.1` are ranked so that
//! pre-releases sort before the release they precede.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Rank a bare number takes when compared against a word part.
const NUMBER_RANK: i8 = 4;

/// Rank of words that match no known pre-/post-release form.
const UNKNOWN_RANK: i8 = -6;

/// Known release words, matched by prefix in this order.
const SPECIAL_FORMS: &[(&str, i8)] = &[
    ("dev", 0),
    ("alpha", 1),
    ("a", 1),
    ("beta", 2),
    ("b", 2),
    ("RC", 3),
    ("rc", 3),
    ("pl", 5),
    ("p", 5),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Number(u64),
    Word(i8),
}

impl Part {
    fn rank(self) -> i8 {
        match self {
            Part::Number(_) => NUMBER_RANK,
            Part::Word(rank) => rank,
        }
    }
}

fn cmp_part(a: Part, b: Part) -> Ordering {
    match (a, b) {
        (Part::Number(x), Part::Number(y)) => x.cmp(&y),
        _ => a.rank().cmp(&b.rank()),
    }
}

fn word_rank(word: &str) -> i8 {
    SPECIAL_FORMS
        .iter()
        .find(|(form, _)| word.starts_with(form))
        .map(|(_, rank)| *rank)
        .unwrap_or(UNKNOWN_RANK)
}

/// Split a version string into numeric and word parts. Every
/// non-alphanumeric character separates parts, and so does every switch
/// between digits and letters (`rc2` is `rc` followed by `2`).
fn split_parts(raw: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    let flush = |buf: &mut String, digits: bool, parts: &mut Vec<Part>| {
        if buf.is_empty() {
            return;
        }
        let part = if digits {
            Part::Number(buf.parse().unwrap_or(u64::MAX))
        } else {
            Part::Word(word_rank(buf))
        };
        parts.push(part);
        buf.clear();
    };

    for c in raw.trim().chars() {
        if !c.is_ascii_alphanumeric() {
            flush(&mut current, in_digits, &mut parts);
            continue;
        }
        let digit = c.is_ascii_digit();
        if !current.is_empty() && digit != in_digits {
            flush(&mut current, in_digits, &mut parts);
        }
        in_digits = digit;
        current.push(c);
    }
    flush(&mut current, in_digits, &mut parts);
    parts
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("version string has no comparable parts: {0:?}")]
    NoParts(String),
}

/// A release version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    raw: String,
    parts: Vec<Part>,
}

impl Version {
    /// Parse a version, rejecting blank strings.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let parts = split_parts(trimmed);
        if parts.is_empty() {
            return Err(VersionError::NoParts(raw.to_string()));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<&str> for Version {
    /// Infallible constructor for hardcoded thresholds. A blank string
    /// yields a version lower than every real one.
    fn from(raw: &str) -> Self {
        Self {
            raw: raw.trim().to_string(),
            parts: split_parts(raw),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.raw
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.parts, &other.parts);
        for (x, y) in a.iter().zip(b.iter()) {
            let ord = cmp_part(*x, *y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        // Only the first surplus part decides: a trailing number always
        // makes the longer version newer, a trailing word is ranked
        // against a number (`2.0-dev` < `2.0` < `2.0-pl1`).
        match a.len().cmp(&b.len()) {
            Ordering::Equal => Ordering::Equal,
            Ordering::Greater => match a[b.len()] {
                Part::Number(_) => Ordering::Greater,
                Part::Word(rank) => rank.cmp(&NUMBER_RANK),
            },
            Ordering::Less => match b[a.len()] {
                Part::Number(_) => Ordering::Less,
                Part::Word(rank) => NUMBER_RANK.cmp(&rank),
            },
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// What the version marker says about the installation.
///
/// Ordered `Missing < Versionless < Release(_)`: a missing marker means a
/// fresh install, `Versionless` means the software was installed before the
/// marker existed, so every historical step still has to run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstalledVersion {
    Missing,
    Versionless,
    Release(Version),
}

pub const VERSIONLESS: &str = "versionless";

impl InstalledVersion {
    /// Interpret a raw marker value. Blank or unparsable markers count as
    /// missing.
    pub fn from_marker(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => InstalledVersion::Missing,
            Some(VERSIONLESS) => InstalledVersion::Versionless,
            Some(s) => match Version::parse(s) {
                Ok(v) => InstalledVersion::Release(v),
                Err(e) => {
                    tracing::warn!(marker = s, error = %e, "unreadable version marker, treating as missing");
                    InstalledVersion::Missing
                }
            },
        }
    }

    /// True when a step with `threshold` has not been applied yet.
    pub fn is_below(&self, threshold: &Version) -> bool {
        match self {
            InstalledVersion::Missing | InstalledVersion::Versionless => true,
            InstalledVersion::Release(v) => v < threshold,
        }
    }

    pub fn release(&self) -> Option<&Version> {
        match self {
            InstalledVersion::Release(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for InstalledVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstalledVersion::Missing => f.write_str(""),
            InstalledVersion::Versionless => f.write_str(VERSIONLESS),
            InstalledVersion::Release(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.5.0") < v("2.0.0"));
        assert!(v("2.11.5") > v("2.2.0"));
        assert!(v("4.2.0") == v("4.2.0"));
        assert!(v("1.0.0") > v("1.0"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("2.0-dev") < v("2.0"));
        assert!(v("2.0-dev") < v("2.0.0"));
        assert!(v("2.0-beta-2") < v("2.0.0"));
        assert!(v("4.2.0-beta.3") < v("4.2.0"));
        assert!(v("4.3.0-rc.2") < v("4.3.0"));
        assert!(v("3.7.0-beta-4") > v("3.6.3"));
    }

    #[test]
    fn test_prerelease_ranking() {
        assert!(v("1.0-dev") < v("1.0-alpha"));
        assert!(v("1.0-alpha") < v("1.0-beta"));
        assert!(v("1.0-beta") < v("1.0-RC1"));
        assert!(v("1.0-rc1") < v("1.0"));
        assert!(v("1.0") < v("1.0-pl1"));
        assert!(v("1.0-a1") == v("1.0-alpha1"));
    }

    #[test]
    fn test_separators_and_letter_digit_switch() {
        assert!(v("4.2.0-beta.3") == v("4.2.0-beta3"));
        assert!(v("3.5.7-dev-1") == v("3.5.7.dev.1"));
        assert!(v("1_0+1") == v("1.0.1"));
    }

    #[test]
    fn test_pr_suffix_ranks_as_patch_level() {
        // `pr` matches the `p` form by prefix
        assert!(v("4.5.3-pr1195.1") > v("4.5.3"));
        assert!(v("4.5.3-pr1195.1") < v("4.5.4"));
    }

    #[test]
    fn test_blank_rejected() {
        assert_eq!(Version::parse("  "), Err(VersionError::Empty));
        assert!(matches!(Version::parse("..."), Err(VersionError::NoParts(_))));
    }

    #[test]
    fn test_installed_ordering() {
        let release = InstalledVersion::Release(v("0.0.1"));
        assert!(InstalledVersion::Missing < InstalledVersion::Versionless);
        assert!(InstalledVersion::Versionless < release);
        assert_ne!(InstalledVersion::Missing, InstalledVersion::Versionless);
    }

    #[test]
    fn test_from_marker() {
        assert_eq!(InstalledVersion::from_marker(None), InstalledVersion::Missing);
        assert_eq!(InstalledVersion::from_marker(Some("")), InstalledVersion::Missing);
        assert_eq!(
            InstalledVersion::from_marker(Some("versionless")),
            InstalledVersion::Versionless
        );
        assert_eq!(
            InstalledVersion::from_marker(Some("3.5.0")),
            InstalledVersion::Release(v("3.5.0"))
        );
    }

    #[test]
    fn test_versionless_is_below_every_threshold() {
        assert!(InstalledVersion::Versionless.is_below(&v("1.5.28")));
        assert!(InstalledVersion::Versionless.is_below(&v("0.0.1")));
        assert!(!InstalledVersion::Release(v("2.0.0")).is_below(&v("2.0-dev")));
        assert!(!InstalledVersion::Release(v("3.7.0")).is_below(&v("3.7.0")));
    }

    #[test]
    fn test_serde_roundtrip_keeps_raw() {
        let json = serde_json::to_string(&v("2.0-dev")).unwrap();
        assert_eq!(json, "\"2.0-dev\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "2.0-dev");
        assert!(serde_json::from_str::<Version>("\"\"").is_err());
    }
}
