//! Migration steps and the registry that orders them.
//!
//! Steps are plain function pointers tagged with a [`Threshold`] and a
//! [`Direction`]. Registration order does not matter: selection always
//! returns steps in ascending threshold order.

use crate::context::MigrationContext;
use crate::gate::Transition;
use crate::traits::StoreError;
use crate::types::ErrorCode;
use crate::version::{InstalledVersion, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type StepResult<T> = Result<T, StepError>;

/// Signature for all migration steps.
pub type StepAction = fn(&MigrationContext) -> StepResult<StepOutcome>;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            StepError::Store(StoreError::ResourceUnavailable(_)) => ErrorCode::ResourceUnavailable,
            StepError::Store(StoreError::PermissionDenied(_)) => ErrorCode::PermissionDenied,
            StepError::Store(StoreError::Io(_)) => ErrorCode::IoError,
            StepError::Store(_) => ErrorCode::StoreError,
            StepError::Other(_) => ErrorCode::InternalError,
        }
    }
}

/// What a step did when it returned successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    /// Nothing to do: already migrated, nothing to migrate, or a missing
    /// resource the step can live without.
    Skipped(String),
}

impl StepOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StepOutcome::Skipped(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    InstallOnly,
    UpgradeOnly,
    /// Install and upgrade.
    Both,
    DowngradeOnly,
}

impl Direction {
    pub fn runs_on(self, transition: Transition) -> bool {
        matches!(
            (self, transition),
            (Direction::InstallOnly, Transition::Install)
                | (Direction::UpgradeOnly, Transition::Upgrade)
                | (Direction::Both, Transition::Install)
                | (Direction::Both, Transition::Upgrade)
                | (Direction::DowngradeOnly, Transition::Downgrade)
        )
    }
}

/// When a step is due. Ordered `Prologue < Before(_) < Epilogue`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Threshold {
    /// Every run of the step's direction, ahead of versioned steps.
    Prologue,
    /// Runs when the installation is older than this version.
    Before(Version),
    /// Every run of the step's direction, after all versioned steps.
    Epilogue,
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Prologue => f.write_str("prologue"),
            Threshold::Before(v) => write!(f, "{}", v),
            Threshold::Epilogue => f.write_str("epilogue"),
        }
    }
}

#[derive(Clone)]
pub struct MigrationStep {
    pub name: &'static str,
    pub threshold: Threshold,
    pub direction: Direction,
    pub action: StepAction,
}

impl MigrationStep {
    /// Upgrade step due when the installation predates `threshold`.
    pub fn upgrade(name: &'static str, threshold: &str, action: StepAction) -> Self {
        Self {
            name,
            threshold: Threshold::Before(Version::from(threshold)),
            direction: Direction::UpgradeOnly,
            action,
        }
    }

    pub fn new(
        name: &'static str,
        threshold: Threshold,
        direction: Direction,
        action: StepAction,
    ) -> Self {
        Self {
            name,
            threshold,
            direction,
            action,
        }
    }

    /// Whether this step belongs to a run from `installed` to `current`.
    ///
    /// Upgrades take every threshold above `installed`, whatever the
    /// running version; downgrades take every threshold in
    /// `(current, installed]`.
    pub fn is_due(&self, transition: Transition, installed: &InstalledVersion, current: &Version) -> bool {
        if !self.direction.runs_on(transition) {
            return false;
        }
        match &self.threshold {
            Threshold::Prologue | Threshold::Epilogue => true,
            Threshold::Before(t) => match transition {
                Transition::Downgrade => {
                    current < t && installed.release().is_some_and(|v| t <= v)
                }
                _ => installed.is_below(t),
            },
        }
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .field("direction", &self.direction)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<MigrationStep>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: MigrationStep) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// All steps, ordered by threshold.
    pub fn list(&self) -> Vec<&MigrationStep> {
        let mut steps: Vec<&MigrationStep> = self.steps.iter().collect();
        steps.sort_by(|a, b| a.threshold.cmp(&b.threshold));
        steps
    }

    /// Steps due for this run, in execution order. Steps sharing a
    /// threshold keep their registration order.
    pub fn select(
        &self,
        transition: Transition,
        installed: &InstalledVersion,
        current: &Version,
    ) -> Vec<&MigrationStep> {
        self.list()
            .into_iter()
            .filter(|s| s.is_due(transition, installed, current))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &MigrationContext) -> StepResult<StepOutcome> {
        Ok(StepOutcome::Applied)
    }

    fn registry(thresholds: &[&'static str]) -> StepRegistry {
        let mut reg = StepRegistry::new();
        for &t in thresholds {
            reg.register(MigrationStep::upgrade(t, t, noop));
        }
        reg
    }

    fn names(steps: Vec<&MigrationStep>) -> Vec<&'static str> {
        steps.into_iter().map(|s| s.name).collect()
    }

    fn release(s: &str) -> InstalledVersion {
        InstalledVersion::Release(Version::from(s))
    }

    #[test]
    fn test_selection_is_ascending_regardless_of_registration() {
        let reg = registry(&["4.2.0", "3.6.3", "4.0.0", "3.9.5", "3.7.0"]);
        let due = reg.select(Transition::Upgrade, &release("3.5.0"), &Version::from("4.2.0"));
        assert_eq!(names(due), vec!["3.6.3", "3.7.0", "3.9.5", "4.0.0", "4.2.0"]);
    }

    #[test]
    fn test_threshold_exactness() {
        let reg = registry(&["3.7.0"]);
        let current = Version::from("5.0.0");
        assert_eq!(reg.select(Transition::Upgrade, &release("3.6.9"), &current).len(), 1);
        assert!(reg.select(Transition::Upgrade, &release("3.7.0"), &current).is_empty());
        assert!(reg.select(Transition::Upgrade, &release("3.7.1"), &current).is_empty());
    }

    #[test]
    fn test_upgrade_has_no_ceiling_at_current() {
        let reg = registry(&["2.0-dev", "2.1.9", "4.3.0-rc.2"]);
        let due = reg.select(Transition::Upgrade, &release("1.5.0"), &Version::from("2.0.0"));
        assert_eq!(names(due), vec!["2.0-dev", "2.1.9", "4.3.0-rc.2"]);
    }

    #[test]
    fn test_versionless_runs_everything() {
        let reg = registry(&["1.5.28", "2.0-dev", "2.0-beta-2"]);
        let due = reg.select(Transition::Upgrade, &InstalledVersion::Versionless, &Version::from("3.0.0"));
        assert_eq!(names(due), vec!["1.5.28", "2.0-dev", "2.0-beta-2"]);
    }

    #[test]
    fn test_prologue_and_epilogue_bracket_versioned_steps() {
        let mut reg = registry(&["2.0.0"]);
        reg.register(MigrationStep::new("last", Threshold::Epilogue, Direction::UpgradeOnly, noop));
        reg.register(MigrationStep::new("first", Threshold::Prologue, Direction::Both, noop));
        reg.register(MigrationStep::new("seed", Threshold::Prologue, Direction::InstallOnly, noop));

        let up = reg.select(Transition::Upgrade, &release("1.0.0"), &Version::from("2.0.0"));
        assert_eq!(names(up), vec!["first", "2.0.0", "last"]);

        let install = reg.select(Transition::Install, &InstalledVersion::Missing, &Version::from("2.0.0"));
        assert_eq!(names(install), vec!["first", "seed"]);
    }

    #[test]
    fn test_downgrade_selection() {
        let mut reg = registry(&["2.0.0"]);
        reg.register(MigrationStep::new("resync", Threshold::Prologue, Direction::DowngradeOnly, noop));
        reg.register(MigrationStep::new("undo-3", Threshold::Before(Version::from("3.0.0")), Direction::DowngradeOnly, noop));

        let due = reg.select(Transition::Downgrade, &release("4.0.0"), &Version::from("1.9.0"));
        assert_eq!(names(due), vec!["resync", "undo-3"]);

        let due = reg.select(Transition::Downgrade, &release("4.0.0"), &Version::from("3.5.0"));
        assert_eq!(names(due), vec!["resync"]);
    }

    #[test]
    fn test_error_codes() {
        let e = StepError::from(StoreError::ResourceUnavailable("x".into()));
        assert_eq!(e.error_code(), ErrorCode::ResourceUnavailable);
        let e = StepError::Other("unexpected".into());
        assert_eq!(e.error_code(), ErrorCode::InternalError);
    }
}
