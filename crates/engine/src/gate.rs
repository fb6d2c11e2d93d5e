//! Classify the transition between the installed and the running version.

use crate::version::{InstalledVersion, Version};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Install,
    Upgrade,
    Downgrade,
    NoOp,
}

impl Transition {
    /// Whether the marker is rewritten after this transition.
    pub fn writes_marker(self) -> bool {
        !matches!(self, Transition::NoOp)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::Install => "install",
            Transition::Upgrade => "upgrade",
            Transition::Downgrade => "downgrade",
            Transition::NoOp => "no_op",
        };
        f.write_str(s)
    }
}

/// Decide what kind of run `(installed, current)` calls for. Equal versions
/// never migrate.
pub fn classify(installed: &InstalledVersion, current: &Version) -> Transition {
    match installed {
        InstalledVersion::Missing => Transition::Install,
        InstalledVersion::Versionless => Transition::Upgrade,
        InstalledVersion::Release(v) => match v.cmp(current) {
            Ordering::Less => Transition::Upgrade,
            Ordering::Greater => Transition::Downgrade,
            Ordering::Equal => Transition::NoOp,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(s: &str) -> InstalledVersion {
        InstalledVersion::Release(Version::from(s))
    }

    #[test]
    fn test_missing_is_install() {
        assert_eq!(
            classify(&InstalledVersion::Missing, &Version::from("2.0.0")),
            Transition::Install
        );
    }

    #[test]
    fn test_versionless_is_upgrade() {
        assert_eq!(
            classify(&InstalledVersion::Versionless, &Version::from("1.0.0")),
            Transition::Upgrade
        );
    }

    #[test]
    fn test_release_pairs() {
        let current = Version::from("2.0.0");
        assert_eq!(classify(&release("1.5.0"), &current), Transition::Upgrade);
        assert_eq!(classify(&release("4.0.0"), &current), Transition::Downgrade);
        assert_eq!(classify(&release("2.0.0"), &current), Transition::NoOp);
        assert_eq!(classify(&release("2.0"), &current), Transition::Upgrade);
        assert_eq!(classify(&release("2.0.0-rc.1"), &current), Transition::Upgrade);
    }

    #[test]
    fn test_only_noop_keeps_marker() {
        assert!(Transition::Install.writes_marker());
        assert!(Transition::Upgrade.writes_marker());
        assert!(Transition::Downgrade.writes_marker());
        assert!(!Transition::NoOp.writes_marker());
    }
}
